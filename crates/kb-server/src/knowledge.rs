//! The question/answer artifact and its text rendering.
//!
//! Reads never fail: a missing file, malformed JSON or an unexpected document
//! shape each resolve to text the model can read. Writing the artifact is a
//! separate, explicit provisioning step ([`KnowledgeBase::seed`]).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

pub const HEADER: &str = "===============Here is the retrieved knowledge base:\n\n";
pub const NOT_FOUND: &str = "Knowledge base file not found.";
pub const MALFORMED: &str =
    "Error decoding knowledge base file. Please ensure it is in valid JSON format.";

/// One record of the artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

impl QaPair {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Records written by [`KnowledgeBase::seed`].
pub fn seed_records() -> Vec<QaPair> {
    vec![
        QaPair::new(
            "What is MCP?",
            "MCP (Model Context Protocol) is a protocol for connecting AI models with external tools and data sources.",
        ),
        QaPair::new(
            "What is the default transport protocol for MCP?",
            "The default transport protocol for MCP is stdio (standard input/output).",
        ),
    ]
}

/// A knowledge artifact on disk.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    path: PathBuf,
}

impl KnowledgeBase {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the artifact and render it for the model.
    pub async fn render(&self) -> String {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => render_document(&raw),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "knowledge base file not found");
                NOT_FOUND.to_string()
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read knowledge base");
                format!("An error occurred while retrieving the knowledge base: {e}")
            }
        }
    }

    /// Write the seed records.
    ///
    /// An existing artifact is left alone unless `overwrite` is set. Returns
    /// whether anything was written.
    pub async fn seed(&self, overwrite: bool) -> Result<bool> {
        if !overwrite && tokio::fs::try_exists(&self.path).await? {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut json = serde_json::to_string_pretty(&seed_records())?;
        json.push('\n');
        tokio::fs::write(&self.path, json).await?;

        tracing::info!(path = %self.path.display(), "knowledge base seeded");
        Ok(true)
    }
}

/// Render raw artifact text.
pub fn render_document(raw: &str) -> String {
    let document: Value = match serde_json::from_str(raw) {
        Ok(document) => document,
        Err(e) => {
            tracing::warn!(error = %e, "knowledge base is not valid JSON");
            return MALFORMED.to_string();
        }
    };

    let mut text = String::from(HEADER);
    match &document {
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let n = i + 1;
                let (question, answer) = match item {
                    Value::Object(record) => (
                        field(record, "question", "Unknown question"),
                        field(record, "answer", "Unknown answer"),
                    ),
                    other => (format!("Item {n}"), plain(other)),
                };
                text.push_str(&format!("Q{n}: **{question}**\n"));
                text.push_str(&format!("A{n}: {answer}\n\n"));
            }
        }
        other => {
            let pretty = serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string());
            text.push_str(&format!("Knowledge base content: {pretty}\n\n"));
        }
    }
    text
}

fn field(record: &Map<String, Value>, key: &str, missing: &str) -> String {
    match record.get(key) {
        None | Some(Value::Null) => missing.to_string(),
        Some(value) => plain(value),
    }
}

/// Strings without quotes, everything else as compact JSON.
fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
