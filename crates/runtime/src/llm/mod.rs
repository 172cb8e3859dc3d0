//! LLM protocol types and the completion provider trait.

pub mod errors;
pub mod types;

use std::future::Future;

pub use errors::ProviderError;
pub use types::{
    FinishReason, Message, ModelRequest, ModelResponse, Part, Role, ToolCall, ToolChoice,
    ToolOutcome, ToolResult, Usage,
};

/// Trait for chat-completion services.
///
/// Implementations handle the specifics of one provider's wire format; the
/// orchestrator only sees [`ModelRequest`] and [`ModelResponse`].
pub trait CompletionProvider: Send + Sync {
    fn complete(
        &self,
        request: ModelRequest<'_>,
    ) -> impl Future<Output = Result<ModelResponse, ProviderError>> + Send;
}
