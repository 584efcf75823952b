//! Tool executors: native builtins plus user-defined and MCP-delegated tools.

pub mod edit;
pub mod exec;
pub mod grep;
pub mod mcp;
pub mod user;
pub mod view;

pub use edit::EditFileTool;
pub use exec::ExecTool;
pub use grep::GrepTool;
pub use mcp::{McpError, McpManager, McpTool};
pub use user::{InterpreterError, ToolInterpreter, ToolParam, UserTool};
pub use view::ViewFileTool;

use crate::provider::ToolDefinition;
use crate::render::SharedWriter;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A capability the model may request. The result body is the string placed
/// into the tool message verbatim (JSON for most tools, plain text for
/// `view_file`).
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name, as declared to the model.
    fn name(&self) -> &str;
    /// Description for the model.
    fn description(&self) -> &str;
    /// JSON Schema for the arguments object.
    fn parameters_schema(&self) -> serde_json::Value;
    /// Execute with the model-supplied arguments.
    async fn execute(
        &self,
        args: serde_json::Map<String, serde_json::Value>,
        cancel: CancellationToken,
    ) -> Result<String, ToolError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("{0}")]
    Failed(String),
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("cancelled")]
    Cancelled,
}

/// Coarse classification of a tool by name, for renderer hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Execute,
    Read,
    Write,
    Search,
    Other,
}

impl ToolKind {
    pub fn classify(name: &str) -> Self {
        match name {
            "exec" | "bash" | "shell" => Self::Execute,
            "view_file" | "read_file" | "view" => Self::Read,
            "edit_file" | "write_file" | "edit" => Self::Write,
            "grep" | "search" | "glob" => Self::Search,
            _ => Self::Other,
        }
    }
}

/// Convert a tool into the declaration sent to the provider.
pub fn declaration(tool: &dyn Tool) -> ToolDefinition {
    ToolDefinition {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        parameters: tool.parameters_schema(),
    }
}

/// The native tool set, with `exec` teeing live output into `live`.
pub fn default_tools(live: Option<SharedWriter>) -> Vec<Arc<dyn Tool>> {
    let mut exec = ExecTool::new();
    if let Some(live) = live {
        exec = exec.with_live_writer(live);
    }
    vec![
        Arc::new(exec),
        Arc::new(ViewFileTool::new()),
        Arc::new(EditFileTool::new()),
        Arc::new(GrepTool::new()),
    ]
}

// -- shared argument helpers --

pub(crate) fn require_str<'a>(
    args: &'a serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArgs(format!("missing '{}' parameter", key)))
}

pub(crate) fn optional_i64(
    args: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Option<i64> {
    args.get(key).and_then(|v| v.as_i64())
}
