#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use runtime::CompletionProvider;
use runtime::llm::{
    FinishReason, Message, ModelRequest, ModelResponse, Part, ProviderError, Role, ToolCall,
    ToolChoice, Usage,
};

/// What the provider saw on one call.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
    pub tool_choice: ToolChoice,
}

/// Replays canned replies in order and records every request.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<ModelResponse, ProviderError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: impl IntoIterator<Item = Result<ModelResponse, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ProviderError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            messages: request.messages.to_vec(),
            tools: request
                .tools
                .iter()
                .map(|tool| tool.function.name.clone())
                .collect(),
            tool_choice: request.tool_choice,
        });

        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::InvalidResponse("script exhausted".to_string())))
    }
}

/// A plain text answer.
pub fn text_reply(text: &str) -> Result<ModelResponse, ProviderError> {
    Ok(ModelResponse {
        message: Message::assistant(text),
        usage: Usage {
            input_tokens: 10,
            output_tokens: 5,
        },
        finish_reason: FinishReason::Stop,
    })
}

/// An answer asking for `(id, name, arguments)` tool calls.
pub fn tool_call_reply(calls: &[(&str, &str, &str)]) -> Result<ModelResponse, ProviderError> {
    let parts = calls
        .iter()
        .map(|(id, name, args)| Part::ToolCall(ToolCall::new(*id, *name, *args)))
        .collect();
    Ok(ModelResponse {
        message: Message::from_parts(Role::Assistant, parts),
        usage: Usage {
            input_tokens: 20,
            output_tokens: 8,
        },
        finish_reason: FinishReason::ToolCalls,
    })
}
