//! OpenAI-compatible chat-completions backend.
//!
//! Also serves GitHub Models, which exposes the same API under a different
//! base URL with a GitHub token as bearer credential.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::FunctionTool;
use crate::llm::{
    CompletionProvider, FinishReason, Message, ModelRequest, ModelResponse, Part, ProviderError,
    Role, ToolCall, ToolChoice, Usage,
};
use crate::{Error, Result};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GITHUB_MODELS_BASE_URL: &str = "https://models.github.ai/inference";

/// Where chat completions are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// api.openai.com, authenticated with `OPENAI_API_KEY`.
    OpenAi,
    /// GitHub Models inference, authenticated with `GITHUB_TOKEN`.
    GitHubModels,
    /// Any other OpenAI-compatible base URL.
    Custom(String),
}

impl Endpoint {
    pub fn base_url(&self) -> &str {
        match self {
            Self::OpenAi => OPENAI_BASE_URL,
            Self::GitHubModels => GITHUB_MODELS_BASE_URL,
            Self::Custom(url) => url.trim_end_matches('/'),
        }
    }

    /// Environment variable holding the credential for this endpoint.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::GitHubModels => "GITHUB_TOKEN",
            Self::OpenAi | Self::Custom(_) => "OPENAI_API_KEY",
        }
    }

    /// Model used when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::GitHubModels => "openai/gpt-4o",
            Self::OpenAi | Self::Custom(_) => "gpt-4o",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::GitHubModels => write!(f, "github"),
            Self::Custom(url) => write!(f, "{url}"),
        }
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "github" | "github-models" => Ok(Self::GitHubModels),
            lower if lower.starts_with("http://") || lower.starts_with("https://") => {
                Ok(Self::Custom(trimmed.to_string()))
            }
            _ => Err(Error::Config(format!(
                "unknown endpoint `{s}`: expected `openai`, `github` or an http(s) URL"
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [FunctionTool]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ApiToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiToolChoice {
    Mode(&'static str),
    Function {
        #[serde(rename = "type")]
        kind: &'static str,
        function: ApiFunctionName,
    },
}

#[derive(Debug, Serialize)]
struct ApiFunctionName {
    name: String,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: ApiFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an OpenAI-compatible provider.
#[derive(Debug, Clone)]
pub struct OpenAiProviderBuilder {
    endpoint: Endpoint,
    api_key: String,
    model: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    timeout: Option<Duration>,
}

impl OpenAiProviderBuilder {
    pub fn new(endpoint: Endpoint, api_key: impl Into<String>) -> Self {
        let model = endpoint.default_model().to_string();
        Self {
            endpoint,
            api_key: api_key.into(),
            model,
            max_tokens: None,
            temperature: None,
            timeout: None,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Overall HTTP timeout per completion call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<OpenAiProvider> {
        let mut client = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            client = client.timeout(timeout);
        }
        let client = client
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(OpenAiProvider {
            client,
            url: format!("{}/chat/completions", self.endpoint.base_url()),
            endpoint: self.endpoint,
            api_key: self.api_key,
            model: self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        })
    }
}

/// OpenAI-compatible chat-completions provider.
pub struct OpenAiProvider {
    client: reqwest::Client,
    url: String,
    endpoint: Endpoint,
    api_key: String,
    model: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl OpenAiProvider {
    pub fn builder(endpoint: Endpoint, api_key: impl Into<String>) -> OpenAiProviderBuilder {
        OpenAiProviderBuilder::new(endpoint, api_key)
    }

    /// Read the credential for `endpoint` from its environment variable.
    pub fn from_env(endpoint: Endpoint) -> Result<OpenAiProviderBuilder> {
        let var = endpoint.api_key_env();
        let api_key = std::env::var(var)
            .map_err(|_| Error::Config(format!("{var} environment variable is required for {endpoint}")))?;
        Ok(OpenAiProviderBuilder::new(endpoint, api_key))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn role_to_api(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    fn message_to_api(msg: &Message) -> ApiMessage {
        let role = Self::role_to_api(msg.role);

        if let [Part::ToolResult(result)] = msg.parts.as_slice() {
            return ApiMessage {
                role,
                content: Some(result.outcome.to_model_text()),
                tool_calls: None,
                tool_call_id: Some(result.tool_call_id.clone()),
            };
        }

        let tool_calls: Vec<ApiToolCall> = msg
            .tool_calls()
            .into_iter()
            .map(|call| ApiToolCall {
                id: call.id.clone(),
                kind: function_kind(),
                function: ApiFunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                },
            })
            .collect();

        let text = msg.text();
        let content = if text.is_empty() && !tool_calls.is_empty() {
            None
        } else {
            Some(text)
        };

        ApiMessage {
            role,
            content,
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            tool_call_id: None,
        }
    }

    fn tool_choice_to_api(choice: &ToolChoice) -> ApiToolChoice {
        match choice {
            ToolChoice::Auto => ApiToolChoice::Mode("auto"),
            ToolChoice::None => ApiToolChoice::Mode("none"),
            ToolChoice::Forced(name) => ApiToolChoice::Function {
                kind: "function",
                function: ApiFunctionName { name: name.clone() },
            },
        }
    }

    fn build_request<'a>(&'a self, request: &ModelRequest<'a>) -> ApiRequest<'a> {
        // tool_choice without tools is rejected by the API.
        let (tools, tool_choice) = if request.tools.is_empty() {
            (None, None)
        } else {
            (
                Some(request.tools),
                Some(Self::tool_choice_to_api(&request.tool_choice)),
            )
        };

        ApiRequest {
            model: &self.model,
            messages: request.messages.iter().map(Self::message_to_api).collect(),
            tools,
            tool_choice,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    fn response_to_model(response: ApiResponse) -> std::result::Result<ModelResponse, ProviderError> {
        let choice = response.choices.into_iter().next().ok_or_else(|| {
            ProviderError::InvalidResponse("response did not include choices".to_string())
        })?;

        let mut parts = Vec::new();
        if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
            parts.push(Part::text(text));
        }
        parts.extend(
            choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|call| Part::ToolCall(ToolCall::new(call.id, call.function.name, call.function.arguments))),
        );

        let usage = response
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(ModelResponse {
            message: Message::from_parts(Role::Assistant, parts),
            usage,
            finish_reason: FinishReason::parse(choice.finish_reason.as_deref()),
        })
    }

    fn error_message(body: &str) -> String {
        serde_json::from_str::<ApiErrorEnvelope>(body)
            .map(|envelope| envelope.error.message)
            .unwrap_or_else(|_| body.to_string())
    }
}

impl fmt::Display for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.endpoint, self.model)
    }
}

impl CompletionProvider for OpenAiProvider {
    async fn complete(
        &self,
        request: ModelRequest<'_>,
    ) -> std::result::Result<ModelResponse, ProviderError> {
        let api_request = self.build_request(&request);

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .header("accept", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: Self::error_message(&body),
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Self::response_to_model(api_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ToolCatalog, ToolDescriptor, to_function_tools};
    use crate::llm::ToolResult;
    use serde_json::json;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::builder(Endpoint::GitHubModels, "token")
            .build()
            .unwrap()
    }

    #[test]
    fn endpoint_parsing() {
        assert_eq!("github".parse::<Endpoint>().unwrap(), Endpoint::GitHubModels);
        assert_eq!("OpenAI".parse::<Endpoint>().unwrap(), Endpoint::OpenAi);
        assert_eq!(
            "http://localhost:11434/v1/".parse::<Endpoint>().unwrap().base_url(),
            "http://localhost:11434/v1"
        );
        assert!("carrier-pigeon".parse::<Endpoint>().is_err());
    }

    #[test]
    fn endpoint_url_is_trimmed_and_scheme_is_case_insensitive() {
        assert_eq!(
            "  https://models.example/v1\n".parse::<Endpoint>().unwrap(),
            Endpoint::Custom("https://models.example/v1".to_string())
        );
        assert_eq!(
            "HTTPS://Models.Example/v1".parse::<Endpoint>().unwrap(),
            Endpoint::Custom("HTTPS://Models.Example/v1".to_string())
        );
    }

    #[test]
    fn builder_uses_endpoint_defaults() {
        let provider = provider();
        assert_eq!(provider.model(), "openai/gpt-4o");
        assert_eq!(provider.url, "https://models.github.ai/inference/chat/completions");
        assert_eq!(provider.to_string(), "github(openai/gpt-4o)");
    }

    #[test]
    fn request_omits_tool_choice_without_tools() {
        let provider = provider();
        let messages = [Message::system("sys"), Message::user("2+2?")];
        let request = ModelRequest {
            messages: &messages,
            tools: &[],
            tool_choice: ToolChoice::Auto,
        };
        let value = serde_json::to_value(provider.build_request(&request)).unwrap();
        assert_eq!(value["model"], "openai/gpt-4o");
        assert!(value.get("tools").is_none());
        assert!(value.get("tool_choice").is_none());
        assert_eq!(value["messages"][0], json!({"role": "system", "content": "sys"}));
    }

    #[test]
    fn request_carries_transcript_and_tool_choice() {
        let provider = provider();
        let catalog = ToolCatalog::new([ToolDescriptor {
            name: "get_knowledge_base".to_string(),
            description: "kb".to_string(),
            input_schema: json!({"type": "object"}),
        }]);
        let tools = to_function_tools(&catalog);
        let messages = [
            Message::system("sys"),
            Message::user("What is MCP?"),
            Message::from_parts(
                Role::Assistant,
                vec![Part::ToolCall(ToolCall::new("call_1", "get_knowledge_base", "{}"))],
            ),
            Message::tool_result(ToolResult::error("call_1", "unknown tool: x")),
        ];
        let request = ModelRequest {
            messages: &messages,
            tools: &tools,
            tool_choice: ToolChoice::None,
        };

        let value = serde_json::to_value(provider.build_request(&request)).unwrap();
        assert_eq!(value["tool_choice"], "none");
        assert_eq!(value["tools"][0]["function"]["name"], "get_knowledge_base");
        assert_eq!(
            value["messages"][2],
            json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "get_knowledge_base", "arguments": "{}"}
                }]
            })
        );
        assert_eq!(
            value["messages"][3],
            json!({"role": "tool", "content": "Error: unknown tool: x", "tool_call_id": "call_1"})
        );
    }

    #[test]
    fn forced_choice_names_the_function() {
        let value = serde_json::to_value(OpenAiProvider::tool_choice_to_api(&ToolChoice::Forced(
            "add".to_string(),
        )))
        .unwrap();
        assert_eq!(value, json!({"type": "function", "function": {"name": "add"}}));
    }

    #[test]
    fn parses_tool_call_response() {
        let body = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "get_knowledge_base", "arguments": "{}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        });
        let response: ApiResponse = serde_json::from_value(body).unwrap();
        let response = OpenAiProvider::response_to_model(response).unwrap();

        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        assert_eq!(response.usage.total_tokens(), 15);
        assert_eq!(response.message.text(), "");
        let calls = response.message.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
    }

    #[test]
    fn empty_choices_is_invalid() {
        let response: ApiResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(
            OpenAiProvider::response_to_model(response),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn error_body_message_is_extracted() {
        let body = r#"{"error": {"message": "Bad credentials", "type": "auth"}}"#;
        assert_eq!(OpenAiProvider::error_message(body), "Bad credentials");
        assert_eq!(OpenAiProvider::error_message("gateway timeout"), "gateway timeout");
    }
}
