//! Knowledge-base chat runtime: tool host sessions and tool-augmented
//! completions.
//!
//! # Overview
//!
//! The runtime is organized around these concepts:
//!
//! - **McpSession**: a connection to an MCP tool host, with discovery,
//!   invocation and deterministic teardown.
//! - **CompletionProvider**: a trait abstracting chat-completion services
//!   (OpenAI, GitHub Models, or any compatible endpoint).
//! - **Orchestrator**: answers a query with at most two provider calls,
//!   executing whatever tools the model asks for in between.
//!
//! # Example
//!
//! ```ignore
//! use mcp::ChildProcess;
//! use runtime::{Endpoint, McpSession, OpenAiProvider, Orchestrator, lifecycle};
//!
//! # async fn example() -> runtime::Result<()> {
//! let provider = OpenAiProvider::from_env(Endpoint::GitHubModels)?.build()?;
//! let session = McpSession::open(
//!     ChildProcess::new("kb-server").args(["--data", "kb.json"]),
//!     runtime::DEFAULT_CONNECT_TIMEOUT,
//! )
//! .await
//! .ok();
//!
//! let answer = lifecycle::scoped(Orchestrator::new(provider, session), async |o| {
//!     o.resolve("What is MCP?").await
//! })
//! .await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

pub mod catalog;
mod error;
pub mod lifecycle;
pub mod llm;
mod orchestrator;
mod providers;
mod session;

pub use catalog::{FunctionTool, ToolCatalog, ToolDescriptor};

// Error types
pub use error::{Error, Result, SessionError};

pub use lifecycle::{CleanupFailure, CleanupReport, CleanupStep};

pub use llm::{CompletionProvider, ProviderError};

pub use orchestrator::{
    Conversation, Orchestrator, OrchestratorConfig, PLAIN_SYSTEM_PROMPT, TOOL_FIRST_SYSTEM_PROMPT,
};

pub use providers::{Endpoint, OpenAiProvider, OpenAiProviderBuilder};

// Tool host sessions
pub use session::{
    DEFAULT_CONNECT_TIMEOUT, McpSession, SessionState, ToolInvocationRequest,
    ToolInvocationResult, ToolSession,
};
