//! Serving tools over MCP: the host side of a [`Connection`](crate::Connection).

use std::future::Future;

use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, Incoming, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcMessage, JsonRpcResponse, ListToolsResult, PROTOCOL_VERSION, RequestId,
    ServerCapabilities, ServerInfo, Tool,
};

/// A set of tools that can be served over MCP.
pub trait ToolHandler: Send + Sync {
    /// Identity reported during initialize.
    fn info(&self) -> ServerInfo;

    /// Tool definitions reported by tools/list.
    fn tools(&self) -> Vec<Tool>;

    /// Execute a tool. `Err` values are reported to the client as results
    /// flagged `isError`, not as protocol errors.
    fn call(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> impl Future<Output = Result<CallToolResult>> + Send;
}

/// Serve `handler` until the peer closes its write half.
pub async fn serve<H, R, W>(handler: &H, reader: R, mut writer: W) -> Result<()>
where
    H: ToolHandler,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let message: JsonRpcMessage = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "dropping unparseable message");
                continue;
            }
        };

        match message.classify() {
            Incoming::Request { id, method, params } => {
                let response = dispatch(handler, id, &method, params).await;
                write_message(&mut writer, &response).await?;
            }
            Incoming::Notification { method } => {
                tracing::debug!(%method, "notification");
            }
            Incoming::Response(response) => {
                tracing::debug!(id = ?response.id, "ignoring unsolicited response");
            }
            Incoming::Invalid => {
                tracing::warn!("dropping message with neither id nor method");
            }
        }
    }

    tracing::debug!("peer closed the connection");
    Ok(())
}

async fn dispatch<H: ToolHandler>(
    handler: &H,
    id: RequestId,
    method: &str,
    params: Option<Value>,
) -> JsonRpcResponse {
    let outcome = match method {
        "initialize" => initialize(handler, params),
        "ping" => Ok(json!({})),
        "tools/list" => to_value(&ListToolsResult {
            tools: handler.tools(),
            next_cursor: None,
        }),
        "tools/call" => call_tool(handler, params).await,
        other => Err(JsonRpcError::method_not_found(other)),
    };

    match outcome {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(error) => JsonRpcResponse::failure(id, error),
    }
}

fn initialize<H: ToolHandler>(
    handler: &H,
    params: Option<Value>,
) -> std::result::Result<Value, JsonRpcError> {
    let params: InitializeParams = parse_params(params)?;
    tracing::info!(
        client = %params.client_info.name,
        version = %params.client_info.version,
        "client connected"
    );

    to_value(&InitializeResult {
        protocol_version: PROTOCOL_VERSION.to_string(),
        capabilities: ServerCapabilities::tools_only(),
        server_info: handler.info(),
    })
}

async fn call_tool<H: ToolHandler>(
    handler: &H,
    params: Option<Value>,
) -> std::result::Result<Value, JsonRpcError> {
    let params: CallToolParams = parse_params(params)?;
    tracing::info!(tool = %params.name, "tool call");

    let result = match handler.call(&params.name, params.arguments).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(tool = %params.name, error = %e, "tool call failed");
            CallToolResult::error(e.to_string())
        }
    };
    to_value(&result)
}

fn parse_params<T: serde::de::DeserializeOwned>(
    params: Option<Value>,
) -> std::result::Result<T, JsonRpcError> {
    serde_json::from_value(params.unwrap_or(Value::Null)).map_err(JsonRpcError::invalid_params)
}

fn to_value(value: &impl Serialize) -> std::result::Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(JsonRpcError::internal)
}

async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &impl Serialize,
) -> Result<()> {
    let json = serde_json::to_string(message).map_err(Error::Serialize)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
