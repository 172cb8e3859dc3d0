//! MCP (Model Context Protocol) client and tool-server library.
//!
//! This crate speaks the tool subset of MCP (initialize, tools/list,
//! tools/call, ping) as newline-delimited JSON-RPC over any byte stream.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{ChildProcess, Client};
//!
//! # async fn example() -> mcp::Result<()> {
//! let transport = ChildProcess::new("kb-server").args(["--data", "data/kb.json"]);
//!
//! let client = Client::connect(transport).await?;
//! client.initialize().await?;
//!
//! for tool in client.list_tools().await? {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let result = client.call_tool("get_knowledge_base", None).await?;
//! println!("{}", result.joined_text());
//!
//! client.close_session().await?;
//! client.close_transport().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod protocol;
mod server;
mod transport;

pub use client::{Client, DEFAULT_TIMEOUT, EXIT_GRACE, MAX_OUTPUT_SIZE};
pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, EmbeddedResource, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListToolsResult, PROTOCOL_VERSION, RequestId,
    ServerCapabilities, ServerInfo, Tool, ToolContent,
};
pub use server::{ToolHandler, serve};
pub use transport::{BoxedReader, BoxedWriter, ChildProcess, Connection, Tcp, Transport};
