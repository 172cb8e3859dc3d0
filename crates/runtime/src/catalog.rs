//! Tool catalog and its translation into the provider's function-tool schema.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

/// A tool as described by the tool host.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's arguments, passed through untouched.
    pub input_schema: Value,
}

impl From<mcp::Tool> for ToolDescriptor {
    fn from(tool: mcp::Tool) -> Self {
        Self {
            name: tool.name,
            description: tool.description.unwrap_or_default(),
            input_schema: tool.input_schema,
        }
    }
}

/// Ordered tool list from one discovery round trip.
///
/// Names are unique; a repeated name keeps its first definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
}

impl ToolCatalog {
    pub fn new(tools: impl IntoIterator<Item = ToolDescriptor>) -> Self {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for tool in tools {
            if seen.insert(tool.name.clone()) {
                unique.push(tool);
            } else {
                tracing::warn!(tool = %tool.name, "duplicate tool name in catalog; keeping the first");
            }
        }
        Self { tools: unique }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ToolDescriptor> {
        self.tools.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name.as_str())
    }
}

impl FromIterator<ToolDescriptor> for ToolCatalog {
    fn from_iter<I: IntoIterator<Item = ToolDescriptor>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl<'a> IntoIterator for &'a ToolCatalog {
    type Item = &'a ToolDescriptor;
    type IntoIter = std::slice::Iter<'a, ToolDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A "callable function" entry in a chat-completions request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl From<&ToolDescriptor> for FunctionTool {
    fn from(tool: &ToolDescriptor) -> Self {
        Self {
            kind: "function",
            function: FunctionDefinition {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.input_schema.clone(),
            },
        }
    }
}

/// Map every descriptor to a function tool, preserving order.
///
/// Schemas are not validated here; the provider rejects what it cannot use.
pub fn to_function_tools(catalog: &ToolCatalog) -> Vec<FunctionTool> {
    catalog.iter().map(FunctionTool::from).collect()
}
