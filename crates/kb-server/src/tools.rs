//! The closed set of tools this host serves.

use mcp::{CallToolResult, ServerInfo, Tool, ToolHandler};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::knowledge::KnowledgeBase;

pub const SERVER_NAME: &str = "knowledge-base-server";

/// A parsed tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum KbTool {
    /// Return the whole knowledge base as formatted text.
    GetKnowledgeBase,
    /// Add two numbers.
    Add { a: f64, b: f64 },
}

#[derive(Deserialize)]
struct AddArgs {
    a: f64,
    b: f64,
}

impl KbTool {
    pub const GET_KNOWLEDGE_BASE: &'static str = "get_knowledge_base";
    pub const ADD: &'static str = "add";

    /// Resolve a call by name. Unknown names and bad arguments are errors.
    pub fn parse(name: &str, arguments: Option<Map<String, Value>>) -> mcp::Result<Self> {
        match name {
            Self::GET_KNOWLEDGE_BASE => Ok(Self::GetKnowledgeBase),
            Self::ADD => {
                let args: AddArgs =
                    serde_json::from_value(Value::Object(arguments.unwrap_or_default()))
                        .map_err(|e| mcp::Error::InvalidArguments(e.to_string()))?;
                Ok(Self::Add {
                    a: args.a,
                    b: args.b,
                })
            }
            other => Err(mcp::Error::ToolNotFound(other.to_string())),
        }
    }

    fn knowledge_base_definition() -> Tool {
        Tool {
            name: Self::GET_KNOWLEDGE_BASE.to_string(),
            description: Some("Retrieve the entire knowledge base as a formatted string".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "required": [],
            }),
        }
    }

    fn add_definition() -> Tool {
        Tool {
            name: Self::ADD.to_string(),
            description: Some("Add two numbers together".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "a": {"type": "number"},
                    "b": {"type": "number"}
                },
                "required": ["a", "b"],
            }),
        }
    }
}

/// Serves the knowledge base (and optionally arithmetic) over MCP.
#[derive(Debug, Clone)]
pub struct KbServer {
    knowledge: KnowledgeBase,
    arithmetic: bool,
}

impl KbServer {
    pub fn new(knowledge: KnowledgeBase) -> Self {
        Self {
            knowledge,
            arithmetic: true,
        }
    }

    /// Stop advertising and accepting `add`.
    pub fn without_arithmetic(mut self) -> Self {
        self.arithmetic = false;
        self
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }
}

impl ToolHandler for KbServer {
    fn info(&self) -> ServerInfo {
        ServerInfo {
            name: SERVER_NAME.to_string(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }
    }

    fn tools(&self) -> Vec<Tool> {
        let mut tools = vec![KbTool::knowledge_base_definition()];
        if self.arithmetic {
            tools.push(KbTool::add_definition());
        }
        tools
    }

    async fn call(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> mcp::Result<CallToolResult> {
        let tool = KbTool::parse(name, arguments)?;

        match tool {
            KbTool::GetKnowledgeBase => Ok(CallToolResult::text(self.knowledge.render().await)),
            KbTool::Add { .. } if !self.arithmetic => {
                Err(mcp::Error::ToolNotFound(name.to_string()))
            }
            KbTool::Add { a, b } => Ok(CallToolResult::text((a + b).to_string())),
        }
    }
}
