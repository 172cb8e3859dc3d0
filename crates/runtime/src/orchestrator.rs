//! Two-phase tool-augmented conversation.
//!
//! One call to [`Orchestrator::resolve`] makes exactly one or exactly two
//! provider calls:
//!
//! 1. system prompt + user query + tool catalog, tool choice `Auto`;
//! 2. only if (1) asked for tools: the transcript extended with the
//!    assistant's tool calls and one tool-result message per call, tool
//!    choice `None`.
//!
//! Without a connected session the query is answered from the provider's own
//! knowledge in a single call.

use crate::catalog::{self, FunctionTool};
use crate::error::Result;
use crate::lifecycle::CleanupReport;
use crate::llm::{CompletionProvider, Message, ModelRequest, ToolCall, ToolChoice, ToolResult};
use crate::session::{
    McpSession, SessionState, ToolInvocationRequest, ToolInvocationResult, ToolSession,
};

/// Prompt biasing the model toward the knowledge-base tool.
pub const TOOL_FIRST_SYSTEM_PROMPT: &str = "You are a helpful assistant with access to specialized knowledge base tools.

IMPORTANT: When answering questions, you should ALWAYS first check if there's relevant information in the available knowledge base using the get_knowledge_base tool, especially for questions about:
- MCP (Model Context Protocol)
- Transport protocols
- Technical specifications
- System capabilities

Only provide your own knowledge if the knowledge base doesn't contain relevant information.";

/// Prompt used when no tools are available.
pub const PLAIN_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Prompt policy.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// System prompt for queries answered with tools available.
    pub system_prompt: String,
    /// System prompt for degraded (no tools) queries.
    pub fallback_system_prompt: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_prompt: TOOL_FIRST_SYSTEM_PROMPT.to_string(),
            fallback_system_prompt: PLAIN_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// The messages of one query's resolution. Append-only.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(system: &str, query: &str) -> Self {
        Self {
            messages: vec![Message::system(system), Message::user(query)],
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }
}

/// Drives queries through a completion provider and an optional tool host.
pub struct Orchestrator<P, S = McpSession> {
    provider: P,
    session: Option<S>,
    config: OrchestratorConfig,
}

impl<P, S> Orchestrator<P, S>
where
    P: CompletionProvider,
    S: ToolSession,
{
    /// Create an orchestrator. `None` means every query runs degraded.
    pub fn new(provider: P, session: Option<S>) -> Self {
        Self {
            provider,
            session,
            config: OrchestratorConfig::default(),
        }
    }

    /// Replace the prompt policy.
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn session(&self) -> Option<&S> {
        self.session.as_ref()
    }

    /// Whether queries currently go through the tool path.
    pub fn has_tools(&self) -> bool {
        self.active_session().is_some()
    }

    /// Answer `query`, consulting the tool host when one is connected.
    ///
    /// Tool failures are fed back to the model as text; only provider
    /// failures are returned as errors.
    pub async fn resolve(&self, query: &str) -> Result<String> {
        let Some(session) = self.active_session() else {
            tracing::info!("no tool host session; answering without tools");
            return self.resolve_without_tools(query).await;
        };

        let catalog = match session.list_tools().await {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::warn!(error = %e, "tool discovery failed; answering without tools");
                return self.resolve_without_tools(query).await;
            }
        };
        let tools = catalog::to_function_tools(&catalog);
        tracing::info!(tools = tools.len(), "resolving query with tool catalog");

        let mut conversation = Conversation::new(&self.config.system_prompt, query);

        let first = self
            .provider
            .complete(ModelRequest {
                messages: conversation.messages(),
                tools: &tools,
                tool_choice: ToolChoice::Auto,
            })
            .await?;
        tracing::debug!(
            input_tokens = first.usage.input_tokens,
            output_tokens = first.usage.output_tokens,
            "first completion"
        );

        let calls: Vec<ToolCall> = first.message.tool_calls().into_iter().cloned().collect();
        if calls.is_empty() {
            return Ok(first.message.text());
        }

        tracing::info!(calls = calls.len(), "model requested tool calls");
        conversation.push(first.message);

        for call in &calls {
            let result = self.execute(session, call).await;
            conversation.push(Message::tool_result(result));
        }

        self.finish(&conversation, &tools).await
    }

    /// Close the tool host session, if any. Later calls do nothing and
    /// later queries run degraded.
    pub async fn shutdown(&mut self) -> CleanupReport {
        match self.session.take() {
            Some(mut session) => session.close().await,
            None => CleanupReport::default(),
        }
    }

    fn active_session(&self) -> Option<&S> {
        self.session
            .as_ref()
            .filter(|s| s.state() == SessionState::Connected)
    }

    async fn resolve_without_tools(&self, query: &str) -> Result<String> {
        let conversation = Conversation::new(&self.config.fallback_system_prompt, query);
        let response = self
            .provider
            .complete(ModelRequest {
                messages: conversation.messages(),
                tools: &[],
                tool_choice: ToolChoice::Auto,
            })
            .await?;
        Ok(response.message.text())
    }

    async fn execute(&self, session: &S, call: &ToolCall) -> ToolResult {
        let result = match ToolInvocationRequest::try_from(call) {
            Ok(request) => match session.invoke(&request).await {
                Ok(result) => result,
                Err(e) => ToolInvocationResult::failure(&call.id, e.to_string()),
            },
            Err(reason) => ToolInvocationResult::failure(&call.id, reason),
        };

        if result.success {
            tracing::info!(tool = %call.name, call_id = %call.id, "tool call succeeded");
        } else {
            tracing::warn!(tool = %call.name, call_id = %call.id, error = %result.text(), "tool call failed");
        }
        result.into()
    }

    async fn finish(&self, conversation: &Conversation, tools: &[FunctionTool]) -> Result<String> {
        let response = self
            .provider
            .complete(ModelRequest {
                messages: conversation.messages(),
                tools,
                tool_choice: ToolChoice::None,
            })
            .await?;
        Ok(response.message.text())
    }
}

impl<P, S> std::fmt::Debug for Orchestrator<P, S>
where
    S: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("session", &self.session)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
