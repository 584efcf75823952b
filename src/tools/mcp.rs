//! MCP-delegated tools.
//!
//! Invocation goes through an `McpManager` handle owned by the shell; the
//! wire transport behind it is not the agent core's business.

use super::{Tool, ToolError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Handle to the shell's MCP connection manager.
#[async_trait]
pub trait McpManager: Send + Sync {
    async fn call_tool(
        &self,
        server_name: &str,
        tool_name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, McpError>;
}

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("MCP server error: {0}")]
    Server(String),
    #[error("MCP transport error: {0}")]
    Transport(String),
}

/// One tool exposed by an MCP server, adapted to the agent's `Tool` trait.
pub struct McpTool {
    server_name: String,
    tool_name: String,
    description: String,
    input_schema: serde_json::Value,
    manager: Arc<dyn McpManager>,
}

impl McpTool {
    pub fn new(
        server_name: impl Into<String>,
        tool_name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
        manager: Arc<dyn McpManager>,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            tool_name: tool_name.into(),
            description: description.into(),
            input_schema,
            manager,
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.tool_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        if self.input_schema.is_null() {
            serde_json::json!({"type": "object", "properties": {}})
        } else {
            self.input_schema.clone()
        }
    }

    async fn execute(
        &self,
        args: serde_json::Map<String, serde_json::Value>,
        cancel: CancellationToken,
    ) -> Result<String, ToolError> {
        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }

        let result = self
            .manager
            .call_tool(
                &self.server_name,
                &self.tool_name,
                serde_json::Value::Object(args),
            )
            .await
            .map_err(|e| ToolError::Failed(e.to_string()))?;

        Ok(match result {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
    }
}
