//! MCP client: request/response exchange and lifecycle over a [`Transport`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, Incoming, InitializeParams, InitializeResult,
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsParams,
    ListToolsResult, RequestId, Tool,
};
use crate::transport::{BoxedReader, BoxedWriter, Connection, Transport};

/// Default timeout for MCP operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Maximum output size (1MB).
/// Sized for large tool outputs (file reads, search results).
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// How long a child process gets to exit on its own after its stdin closes.
pub const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Handle to a connected MCP server.
pub struct Client {
    // Persistent so a timed-out read keeps any partial line it buffered.
    reader: Mutex<Lines<BufReader<BoxedReader>>>,
    writer: Mutex<Option<BoxedWriter>>,
    child: Mutex<Option<Child>>,
    next_id: AtomicI64,
    request_timeout: Duration,
    server_info: Mutex<Option<InitializeResult>>,
}

impl Client {
    /// Wrap an open connection. No messages are exchanged yet.
    pub fn new(connection: Connection) -> Self {
        Self {
            reader: Mutex::new(BufReader::new(connection.reader).lines()),
            writer: Mutex::new(Some(connection.writer)),
            child: Mutex::new(connection.child),
            next_id: AtomicI64::new(1),
            request_timeout: DEFAULT_TIMEOUT,
            server_info: Mutex::new(None),
        }
    }

    /// Open the transport and wrap the resulting connection.
    pub async fn connect(transport: impl Transport) -> Result<Self> {
        let connection = transport.open().await?;
        Ok(Self::new(connection))
    }

    /// Override the per-request response timeout.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Perform the initialize handshake (must be called before tool calls).
    pub async fn initialize(&self) -> Result<InitializeResult> {
        let params = InitializeParams::default();
        let result: InitializeResult = self.request("initialize", Some(params)).await?;

        self.notify("notifications/initialized").await?;

        *self.server_info.lock().await = Some(result.clone());
        Ok(result)
    }

    /// Check if the handshake has completed.
    pub async fn is_initialized(&self) -> bool {
        self.server_info.lock().await.is_some()
    }

    /// Get server info (after initialization).
    pub async fn server_info(&self) -> Option<InitializeResult> {
        self.server_info.lock().await.clone()
    }

    /// Fetch the full tool list, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        if !self.is_initialized().await {
            return Err(Error::NotInitialized);
        }

        let mut tools = Vec::new();
        let mut cursor = None;
        loop {
            let page: ListToolsResult = self
                .request("tools/list", Some(ListToolsParams { cursor }))
                .await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(tools)
    }

    /// Call a tool by name.
    ///
    /// A result flagged `isError` is returned as-is; only protocol and
    /// transport failures are errors.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallToolResult> {
        if !self.is_initialized().await {
            return Err(Error::NotInitialized);
        }

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };

        self.request("tools/call", Some(params)).await
    }

    /// Liveness check.
    pub async fn ping(&self) -> Result<()> {
        let _: Value = self.request("ping", None::<()>).await?;
        Ok(())
    }

    /// End the MCP session by closing our write half.
    ///
    /// For stdio servers this is the end-of-input signal to exit. Calling it
    /// again is a no-op.
    pub async fn close_session(&self) -> Result<()> {
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            writer.shutdown().await?;
        }
        Ok(())
    }

    /// Release the transport: drop the read half and reap the child process,
    /// killing it if it does not exit within [`EXIT_GRACE`].
    pub async fn close_transport(self) -> Result<()> {
        drop(self.reader);
        drop(self.writer);

        let Some(mut child) = self.child.into_inner() else {
            return Ok(());
        };

        match timeout(EXIT_GRACE, child.wait()).await {
            Ok(status) => {
                status?;
                Ok(())
            }
            Err(_) => {
                child.kill().await?;
                Ok(())
            }
        }
    }

    /// Start killing the child process without waiting. For use from `Drop`.
    pub fn abort(&mut self) {
        if let Some(child) = self.child.get_mut() {
            let _ = child.start_kill();
        }
    }

    /// OS process id of the child, if the transport spawned one.
    pub async fn process_id(&self) -> Option<u32> {
        self.child.lock().await.as_ref().and_then(Child::id)
    }

    // --- Internal methods ---

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let id = self.next_request_id();
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(p);
        }

        // Holding the reader for the whole exchange keeps concurrent callers
        // from reading each other's responses.
        let mut reader = self.reader.lock().await;

        self.write_line(&serde_json::to_string(&request)?).await?;

        let response = timeout(self.request_timeout, Self::read_response(&mut reader, &id))
            .await
            .map_err(|_| Error::Timeout)??;

        let result_value = response.into_result()?;
        let result: R = serde_json::from_value(result_value)?;

        Ok(result)
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let notification = JsonRpcNotification::new(method);
        self.write_line(&serde_json::to_string(&notification)?).await
    }

    async fn write_line(&self, json: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(Error::Closed)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read until the response for `id` arrives.
    ///
    /// Responses to earlier requests that timed out are discarded.
    async fn read_response(
        reader: &mut Lines<BufReader<BoxedReader>>,
        id: &RequestId,
    ) -> Result<JsonRpcResponse> {
        loop {
            let Some(line) = reader.next_line().await? else {
                return Err(Error::ServerExited);
            };

            if line.len() > MAX_OUTPUT_SIZE {
                return Err(Error::OutputTooLarge {
                    size: line.len(),
                    max: MAX_OUTPUT_SIZE,
                });
            }

            if line.trim().is_empty() {
                continue;
            }

            let message: JsonRpcMessage = serde_json::from_str(&line)?;
            match message.classify() {
                Incoming::Response(response) if response.id == *id => return Ok(response),
                Incoming::Response(response) => {
                    tracing::debug!(
                        expected = ?id,
                        got = ?response.id,
                        "discarding stale response"
                    );
                }
                Incoming::Notification { method } | Incoming::Request { method, .. } => {
                    tracing::debug!(%method, "ignoring server-initiated message");
                }
                Incoming::Invalid => {
                    return Err(Error::InvalidResponse(line.trim().to_string()));
                }
            }
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}
