//! User-defined tools backed by the shell's script interpreter.
//!
//! The interpreter itself is an external collaborator; the agent core only
//! knows its tool-call entry point. Parameters are declared up front, so
//! model-supplied arguments are looked up by declared name and passed to the
//! interpreter in declaration order.

use super::{Tool, ToolError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The script interpreter's tool-call entry point.
#[async_trait]
pub trait ToolInterpreter: Send + Sync {
    async fn call_tool(
        &self,
        name: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, InterpreterError>;
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct InterpreterError(pub String);

/// One declared parameter of a user-defined tool.
#[derive(Debug, Clone)]
pub struct ToolParam {
    pub name: String,
    pub description: String,
    /// JSON Schema type name ("string", "integer", "boolean", ...).
    pub type_name: String,
    pub required: bool,
}

impl ToolParam {
    pub fn required(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            type_name: type_name.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, type_name)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

pub struct UserTool {
    name: String,
    description: String,
    params: Vec<ToolParam>,
    interpreter: Arc<dyn ToolInterpreter>,
}

impl UserTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        params: Vec<ToolParam>,
        interpreter: Arc<dyn ToolInterpreter>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params,
            interpreter,
        }
    }
}

#[async_trait]
impl Tool for UserTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            properties.insert(
                param.name.clone(),
                serde_json::json!({
                    "type": param.type_name,
                    "description": param.description,
                }),
            );
            if param.required {
                required.push(serde_json::Value::String(param.name.clone()));
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    async fn execute(
        &self,
        args: serde_json::Map<String, serde_json::Value>,
        cancel: CancellationToken,
    ) -> Result<String, ToolError> {
        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }

        let mut positional = Vec::with_capacity(self.params.len());
        for param in &self.params {
            match args.get(&param.name) {
                Some(value) => positional.push(value.clone()),
                None if param.required => {
                    return Err(ToolError::InvalidArgs(format!(
                        "missing '{}' parameter",
                        param.name
                    )));
                }
                None => positional.push(serde_json::Value::Null),
            }
        }

        let result = self
            .interpreter
            .call_tool(&self.name, positional)
            .await
            .map_err(|e| ToolError::Failed(e.to_string()))?;

        Ok(match result {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
    }
}
