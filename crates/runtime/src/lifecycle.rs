//! Teardown bookkeeping and scoped session ownership.
//!
//! Release happens in two ordered steps: the MCP session first (our write
//! half is shut so the host sees end-of-input), then the transport beneath it
//! (read half dropped, child process reaped or killed). Each step is attempted
//! even if an earlier one failed; failures are collected in a
//! [`CleanupReport`] and logged, and the handle ends up closed regardless.

use std::fmt;

use crate::llm::CompletionProvider;
use crate::orchestrator::Orchestrator;
use crate::session::ToolSession;

/// One release step, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStep {
    Session,
    Transport,
}

impl fmt::Display for CleanupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session => write!(f, "session"),
            Self::Transport => write!(f, "transport"),
        }
    }
}

/// A release step that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    pub step: CleanupStep,
    pub error: String,
}

/// Outcome of closing a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    released: Vec<CleanupStep>,
    failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    /// Record the result of one step.
    pub fn record<E: fmt::Display>(&mut self, step: CleanupStep, result: Result<(), E>) {
        match result {
            Ok(()) => self.released.push(step),
            Err(e) => self.failures.push(CleanupFailure {
                step,
                error: e.to_string(),
            }),
        }
    }

    /// Steps that completed cleanly, in order.
    pub fn released(&self) -> &[CleanupStep] {
        &self.released
    }

    pub fn failures(&self) -> &[CleanupFailure] {
        &self.failures
    }

    /// True when nothing failed (including when there was nothing to do).
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// True when no step ran at all: the handle was never connected or was
    /// already closed.
    pub fn is_noop(&self) -> bool {
        self.released.is_empty() && self.failures.is_empty()
    }

    /// Log each failure as a warning.
    pub fn log(&self, endpoint: &str) {
        for failure in &self.failures {
            tracing::warn!(
                %endpoint,
                step = %failure.step,
                error = %failure.error,
                "cleanup step failed; continuing"
            );
        }
        if !self.is_noop() {
            tracing::debug!(%endpoint, released = self.released.len(), "session released");
        }
    }
}

/// Run `body` against the orchestrator, then shut it down on every exit path.
///
/// `body` typically returns a `Result`; the orchestrator is shut down whether
/// it is `Ok` or `Err` and the value is handed back untouched.
pub async fn scoped<P, S, T>(
    mut orchestrator: Orchestrator<P, S>,
    body: impl AsyncFnOnce(&Orchestrator<P, S>) -> T,
) -> T
where
    P: CompletionProvider,
    S: ToolSession,
{
    let output = body(&orchestrator).await;
    orchestrator.shutdown().await;
    output
}
