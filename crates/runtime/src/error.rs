use std::time::Duration;

use thiserror::Error;

use crate::llm::ProviderError;

/// Runtime errors surfaced to callers of the orchestrator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Tool host session errors.
///
/// Connect failures are recoverable (the orchestrator answers without tools);
/// the lifecycle variants signal a call made in the wrong state.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("timed out connecting to {endpoint} after {timeout:?}")]
    ConnectTimeout { endpoint: String, timeout: Duration },

    #[error("failed to connect to {endpoint}: {source}")]
    ConnectFailure {
        endpoint: String,
        #[source]
        source: mcp::Error,
    },

    #[error("session not connected")]
    NotConnected,

    #[error("session closed")]
    Closed,

    #[error("session already connected to {0}")]
    AlreadyConnected(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] mcp::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
