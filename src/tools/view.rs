//! `view_file` tool: read a file with line numbers.

use super::{optional_i64, require_str, Tool, ToolError};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

const MAX_OUTPUT_BYTES: usize = 100_000;

/// Read a file, prefixing each line with a 5-digit line number. Large output
/// keeps a prefix and a suffix of roughly equal size around a `(truncated)`
/// marker.
pub struct ViewFileTool {
    pub max_output_bytes: usize,
}

impl Default for ViewFileTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewFileTool {
    pub fn new() -> Self {
        Self {
            max_output_bytes: MAX_OUTPUT_BYTES,
        }
    }
}

#[async_trait]
impl Tool for ViewFileTool {
    fn name(&self) -> &str {
        "view_file"
    }

    fn description(&self) -> &str {
        "View the contents of a file with line numbers. Optionally specify a \
         1-indexed inclusive line range."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the file to view"
                },
                "start_line": {
                    "type": "integer",
                    "description": "First line to show (1-indexed, default 1)"
                },
                "end_line": {
                    "type": "integer",
                    "description": "Last line to show (inclusive, default end of file)"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(
        &self,
        args: serde_json::Map<String, serde_json::Value>,
        cancel: CancellationToken,
    ) -> Result<String, ToolError> {
        let file_path = require_str(&args, "file_path")?;

        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }

        let content = tokio::fs::read_to_string(file_path)
            .await
            .map_err(|e| ToolError::Failed(format!("cannot read {}: {}", file_path, e)))?;
        let content = content.replace("\r\n", "\n").replace('\r', "\n");

        let lines: Vec<&str> = content.lines().collect();
        let total = lines.len() as i64;

        let explicit_start = optional_i64(&args, "start_line");
        let explicit_end = optional_i64(&args, "end_line");
        let start = explicit_start.unwrap_or(1);
        let end = explicit_end.unwrap_or(total);

        // an empty file with no requested range is empty output, not an
        // error; an explicit range still gets validated below
        if total == 0 && explicit_start.is_none() && explicit_end.is_none() {
            return Ok(String::new());
        }

        if start < 1 || start > total {
            return Err(ToolError::InvalidArgs(format!(
                "start_line {} is out of range: {} has {} lines",
                start, file_path, total
            )));
        }
        if end < start || end > total {
            return Err(ToolError::InvalidArgs(format!(
                "end_line {} is out of range: {} has {} lines",
                end, file_path, total
            )));
        }

        let numbered: Vec<String> = lines[(start - 1) as usize..end as usize]
            .iter()
            .zip(start..)
            .map(|(line, number)| format!("{:5}:{}", number, line))
            .collect();

        Ok(truncate_middle(&numbered, self.max_output_bytes))
    }
}

/// Join numbered lines, dropping the middle when the whole output would
/// exceed `max_bytes`. Prefix and suffix get roughly half the budget each.
fn truncate_middle(lines: &[String], max_bytes: usize) -> String {
    let total: usize = lines.iter().map(|l| l.len() + 1).sum();
    if total <= max_bytes {
        return lines.join("\n");
    }

    let half = max_bytes / 2;
    let mut head = Vec::new();
    let mut used = 0;
    for line in lines {
        if used + line.len() + 1 > half {
            break;
        }
        used += line.len() + 1;
        head.push(line.as_str());
    }

    let mut tail = Vec::new();
    used = 0;
    for line in lines.iter().rev() {
        if used + line.len() + 1 > half {
            break;
        }
        used += line.len() + 1;
        tail.push(line.as_str());
    }
    tail.reverse();

    format!("{}\n(truncated)\n{}", head.join("\n"), tail.join("\n"))
}
