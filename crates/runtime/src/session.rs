//! Tool host session: connection lifecycle, discovery and invocation.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use mcp::{Client, ToolContent, Transport};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::catalog::{ToolCatalog, ToolDescriptor};
use crate::error::SessionError;
use crate::lifecycle::{CleanupReport, CleanupStep};
use crate::llm::{ToolCall, ToolOutcome, ToolResult};

/// Default deadline for transport open plus initialize handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A tool call ready to send to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocationRequest {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

impl TryFrom<&ToolCall> for ToolInvocationRequest {
    type Error = String;

    fn try_from(call: &ToolCall) -> Result<Self, Self::Error> {
        Ok(Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.parse_arguments()?,
        })
    }
}

/// What came back from one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocationResult {
    pub call_id: String,
    pub content: Vec<ToolContent>,
    pub success: bool,
}

impl ToolInvocationResult {
    /// A failed result carrying a human-readable description.
    pub fn failure(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: vec![ToolContent::text(message)],
            success: false,
        }
    }

    /// Render the content blocks as text for the model.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|block| match block {
                ToolContent::Text { text } => text.clone(),
                ToolContent::Image { mime_type, .. } => format!("[image: {mime_type}]"),
                ToolContent::Resource { resource } => resource
                    .text
                    .clone()
                    .unwrap_or_else(|| format!("[resource: {}]", resource.uri)),
                ToolContent::Unsupported => "[unsupported content]".to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<ToolInvocationResult> for ToolResult {
    fn from(result: ToolInvocationResult) -> Self {
        let text = result.text();
        let outcome = if result.success {
            ToolOutcome::success(text)
        } else {
            ToolOutcome::error(text)
        };
        Self {
            tool_call_id: result.call_id,
            outcome,
        }
    }
}

/// Lifecycle state of a session handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Closed,
}

/// Boundary between the orchestrator and whatever hosts the tools.
pub trait ToolSession: Send + Sync {
    fn state(&self) -> SessionState;

    /// Fetch the host's current tool list.
    fn list_tools(&self) -> impl Future<Output = Result<ToolCatalog, SessionError>> + Send;

    /// Invoke one tool. Remote failures come back as a failed result; `Err`
    /// is reserved for calls made outside the Connected state.
    fn invoke(
        &self,
        request: &ToolInvocationRequest,
    ) -> impl Future<Output = Result<ToolInvocationResult, SessionError>> + Send;

    /// Release everything. Idempotent; always ends Closed.
    fn close(&mut self) -> impl Future<Output = CleanupReport> + Send;
}

enum State {
    Disconnected,
    Connected(Client),
    Closed,
}

/// A session with an MCP tool host.
pub struct McpSession {
    endpoint: String,
    state: State,
    request_timeout: Duration,
    /// Names from the most recent listing; calls outside this set are
    /// answered locally.
    known_tools: Mutex<Option<HashSet<String>>>,
}

impl McpSession {
    /// A disconnected handle.
    pub fn new() -> Self {
        Self {
            endpoint: String::from("(not connected)"),
            state: State::Disconnected,
            request_timeout: mcp::DEFAULT_TIMEOUT,
            known_tools: Mutex::new(None),
        }
    }

    /// Bound each request (including tool calls) by `timeout`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Connect a fresh handle, see [`McpSession::connect`].
    pub async fn open(
        transport: impl Transport,
        connect_timeout: Duration,
    ) -> Result<Self, SessionError> {
        let mut session = Self::new();
        session.connect(transport, connect_timeout).await?;
        Ok(session)
    }

    /// Open the transport and complete the MCP handshake within
    /// `connect_timeout`.
    ///
    /// On timeout or failure the in-flight attempt is dropped, which releases
    /// its streams and kills any spawned process, and the handle stays
    /// Disconnected.
    pub async fn connect(
        &mut self,
        transport: impl Transport,
        connect_timeout: Duration,
    ) -> Result<(), SessionError> {
        match self.state {
            State::Disconnected => {}
            State::Connected(_) => return Err(SessionError::AlreadyConnected(self.endpoint.clone())),
            State::Closed => return Err(SessionError::Closed),
        }

        let endpoint = transport.describe();
        let request_timeout = self.request_timeout;
        tracing::info!(%endpoint, timeout = ?connect_timeout, "connecting to tool host");

        let attempt = async move {
            let client = Client::connect(transport)
                .await?
                .with_request_timeout(request_timeout);
            client.initialize().await?;
            Ok::<_, mcp::Error>(client)
        };

        match tokio::time::timeout(connect_timeout, attempt).await {
            Ok(Ok(client)) => {
                if let Some(info) = client.server_info().await {
                    tracing::info!(
                        %endpoint,
                        server = %info.server_info.name,
                        protocol = %info.protocol_version,
                        "tool host connected"
                    );
                }
                self.endpoint = endpoint;
                self.state = State::Connected(client);
                Ok(())
            }
            Ok(Err(source)) => {
                tracing::warn!(%endpoint, error = %source, "tool host connection failed");
                Err(SessionError::ConnectFailure { endpoint, source })
            }
            Err(_) => {
                tracing::warn!(%endpoint, timeout = ?connect_timeout, "tool host connection timed out");
                Err(SessionError::ConnectTimeout {
                    endpoint,
                    timeout: connect_timeout,
                })
            }
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn client(&self) -> Result<&Client, SessionError> {
        match &self.state {
            State::Connected(client) => Ok(client),
            State::Disconnected => Err(SessionError::NotConnected),
            State::Closed => Err(SessionError::Closed),
        }
    }
}

impl Default for McpSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolSession for McpSession {
    fn state(&self) -> SessionState {
        match self.state {
            State::Disconnected => SessionState::Disconnected,
            State::Connected(_) => SessionState::Connected,
            State::Closed => SessionState::Closed,
        }
    }

    async fn list_tools(&self) -> Result<ToolCatalog, SessionError> {
        let client = self.client()?;
        let catalog: ToolCatalog = client
            .list_tools()
            .await?
            .into_iter()
            .map(ToolDescriptor::from)
            .collect();

        *self.known_tools.lock().await = Some(catalog.names().map(str::to_string).collect());
        tracing::debug!(endpoint = %self.endpoint, tools = catalog.len(), "tool catalog fetched");
        Ok(catalog)
    }

    async fn invoke(
        &self,
        request: &ToolInvocationRequest,
    ) -> Result<ToolInvocationResult, SessionError> {
        let client = self.client()?;

        let known = self
            .known_tools
            .lock()
            .await
            .as_ref()
            .map(|names| names.contains(&request.tool_name));
        if known == Some(false) {
            return Ok(ToolInvocationResult::failure(
                &request.call_id,
                format!("unknown tool: {}", request.tool_name),
            ));
        }

        let result = client
            .call_tool(&request.tool_name, Some(request.arguments.clone()))
            .await;

        Ok(match result {
            Ok(result) => ToolInvocationResult {
                call_id: request.call_id.clone(),
                success: !result.is_error,
                content: result.content,
            },
            Err(e) => ToolInvocationResult::failure(
                &request.call_id,
                format!("tool `{}` failed: {e}", request.tool_name),
            ),
        })
    }

    async fn close(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let state = std::mem::replace(&mut self.state, State::Closed);

        if let State::Connected(client) = state {
            tracing::info!(endpoint = %self.endpoint, "closing tool host session");
            report.record(CleanupStep::Session, client.close_session().await);
            report.record(CleanupStep::Transport, client.close_transport().await);
        }

        report.log(&self.endpoint);
        report
    }
}

impl Drop for McpSession {
    fn drop(&mut self) {
        if let State::Connected(client) = &mut self.state {
            tracing::warn!(
                endpoint = %self.endpoint,
                "session dropped without close(); killing tool host"
            );
            client.abort();
        }
    }
}

impl std::fmt::Debug for McpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpSession")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp::EmbeddedResource;

    #[tokio::test]
    async fn disconnected_handle_rejects_operations() {
        let session = McpSession::new();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(session.list_tools().await, Err(SessionError::NotConnected)));

        let request = ToolInvocationRequest {
            call_id: "c1".to_string(),
            tool_name: "add".to_string(),
            arguments: Map::new(),
        };
        assert!(matches!(session.invoke(&request).await, Err(SessionError::NotConnected)));
    }

    #[tokio::test]
    async fn closed_is_terminal() {
        let mut session = McpSession::new();
        assert!(session.close().await.is_noop());
        assert_eq!(session.state(), SessionState::Closed);

        assert!(matches!(session.list_tools().await, Err(SessionError::Closed)));
        assert!(session.close().await.is_noop());

        let (a, _b) = tokio::io::duplex(64);
        let (r, w) = tokio::io::split(a);
        let err = session
            .connect(mcp::Connection::from_streams(r, w), DEFAULT_CONNECT_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Closed));
    }

    #[test]
    fn malformed_arguments_do_not_make_a_request() {
        let call = ToolCall::new("c1", "add", "{not json");
        let err = ToolInvocationRequest::try_from(&call).unwrap_err();
        assert!(err.contains("malformed"));
    }

    #[test]
    fn result_text_renders_every_block_kind() {
        let result = ToolInvocationResult {
            call_id: "c1".to_string(),
            content: vec![
                ToolContent::text("Q1: **What is MCP?**"),
                ToolContent::Image {
                    data: "AAAA".to_string(),
                    mime_type: "image/png".to_string(),
                },
                ToolContent::Resource {
                    resource: EmbeddedResource {
                        uri: "file:///kb.json".to_string(),
                        mime_type: None,
                        text: None,
                    },
                },
            ],
            success: true,
        };
        assert_eq!(
            result.text(),
            "Q1: **What is MCP?**\n[image: image/png]\n[resource: file:///kb.json]"
        );
    }

    #[test]
    fn failed_result_becomes_error_outcome() {
        let result: ToolResult = ToolInvocationResult::failure("c9", "unknown tool: nope").into();
        assert_eq!(result.tool_call_id, "c9");
        assert_eq!(result.outcome, ToolOutcome::error("unknown tool: nope"));
    }
}
