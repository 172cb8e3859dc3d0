//! Knowledge-base MCP tool host.
//!
//! Serves a JSON question/answer artifact through the `get_knowledge_base`
//! tool, plus a small `add` tool, over stdio or TCP.
//!
//! # Example
//!
//! ```no_run
//! use kb_server::{KbServer, KnowledgeBase};
//!
//! # async fn example() -> kb_server::Result<()> {
//! let server = KbServer::new(KnowledgeBase::new("data/kb.json"));
//! mcp::serve(&server, tokio::io::stdin(), tokio::io::stdout()).await?;
//! # Ok(())
//! # }
//! ```

mod error;
pub mod knowledge;
mod tools;

pub use error::{Error, Result};
pub use knowledge::{KnowledgeBase, QaPair, render_document, seed_records};
pub use tools::{KbServer, KbTool, SERVER_NAME};
