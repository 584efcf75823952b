//! `edit_file` tool: exact-match search/replace with atomic writes.
//!
//! The `find` string must occur exactly once in the searched region, so an
//! edit either applies precisely or reports why it could not. The file's
//! line-ending style survives the rewrite.

use super::{optional_i64, require_str, Tool, ToolError};
use async_trait::async_trait;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tokio_util::sync::CancellationToken;

pub struct EditFileTool;

impl Default for EditFileTool {
    fn default() -> Self {
        Self::new()
    }
}

impl EditFileTool {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Serialize)]
struct EditResult {
    success: bool,
    message: String,
}

impl EditResult {
    fn to_json(&self) -> Result<String, ToolError> {
        serde_json::to_string(self).map_err(|e| ToolError::Failed(e.to_string()))
    }
}

#[derive(Clone, Copy, PartialEq)]
enum LineEnding {
    Lf,
    CrLf,
    Cr,
}

fn detect_line_ending(content: &str) -> LineEnding {
    if content.contains("\r\n") {
        LineEnding::CrLf
    } else if content.contains('\r') {
        LineEnding::Cr
    } else {
        LineEnding::Lf
    }
}

fn restore_line_ending(content: String, ending: LineEnding) -> String {
    match ending {
        LineEnding::Lf => content,
        LineEnding::CrLf => content.replace('\n', "\r\n"),
        LineEnding::Cr => content.replace('\n', "\r"),
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Edit a file by replacing an exact string. The find string must occur \
         exactly once in the file (or in the given line range). Multi-line \
         find/replace strings are allowed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the file to edit"
                },
                "find": {
                    "type": "string",
                    "description": "Exact text to find (must occur exactly once)"
                },
                "replace": {
                    "type": "string",
                    "description": "Text to replace it with"
                },
                "start_line": {
                    "type": "integer",
                    "description": "Restrict the search to lines starting here (1-indexed)"
                },
                "end_line": {
                    "type": "integer",
                    "description": "Restrict the search to lines ending here (inclusive)"
                }
            },
            "required": ["file_path", "find", "replace"]
        })
    }

    async fn execute(
        &self,
        args: serde_json::Map<String, serde_json::Value>,
        cancel: CancellationToken,
    ) -> Result<String, ToolError> {
        let file_path = require_str(&args, "file_path")?;
        let find = require_str(&args, "find")?;
        let replace = require_str(&args, "replace")?;
        if find.is_empty() {
            return Err(ToolError::InvalidArgs("'find' must not be empty".into()));
        }

        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }

        let raw = tokio::fs::read_to_string(file_path)
            .await
            .map_err(|e| ToolError::Failed(format!("cannot read {}: {}", file_path, e)))?;
        let ending = detect_line_ending(&raw);
        let content = raw.replace("\r\n", "\n").replace('\r', "\n");

        let lines: Vec<&str> = content.split('\n').collect();
        let total = lines.len() as i64;
        let start = optional_i64(&args, "start_line").unwrap_or(1);
        let end = optional_i64(&args, "end_line").unwrap_or(total);
        if start < 1 || end < start || end > total {
            return Err(ToolError::InvalidArgs(format!(
                "line range {}..{} is out of range: {} has {} lines",
                start, end, file_path, total
            )));
        }

        let region = lines[(start - 1) as usize..end as usize].join("\n");
        let occurrences = region.matches(find).count();
        if occurrences == 0 {
            return EditResult {
                success: false,
                message: format!("find string not found in {}", file_path),
            }
            .to_json();
        }
        if occurrences > 1 {
            return EditResult {
                success: false,
                message: format!(
                    "find string appears {} times in {}; include more surrounding context",
                    occurrences, file_path
                ),
            }
            .to_json();
        }

        let new_region = region.replacen(find, replace, 1);
        let mut rebuilt = String::with_capacity(content.len());
        if start > 1 {
            rebuilt.push_str(&lines[..(start - 1) as usize].join("\n"));
            rebuilt.push('\n');
        }
        rebuilt.push_str(&new_region);
        if (end as usize) < lines.len() {
            rebuilt.push('\n');
            rebuilt.push_str(&lines[end as usize..].join("\n"));
        }

        write_atomic(file_path, &restore_line_ending(rebuilt, ending))
            .map_err(|e| ToolError::Failed(format!("cannot write {}: {}", file_path, e)))?;

        EditResult {
            success: true,
            message: format!("replaced 1 occurrence in {}", file_path),
        }
        .to_json()
    }
}

/// Replace the file by writing a sibling temp file and renaming it over the
/// original, keeping the original permissions.
fn write_atomic(path: &str, content: &str) -> std::io::Result<()> {
    let metadata = std::fs::metadata(path)?;
    let dir = Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty());
    let mut tmp = match dir {
        Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
        None => tempfile::NamedTempFile::new_in(".")?,
    };
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().set_permissions(metadata.permissions())?;
    tmp.persist(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_ending_detection() {
        assert!(matches!(detect_line_ending("a\r\nb"), LineEnding::CrLf));
        assert!(matches!(detect_line_ending("a\rb"), LineEnding::Cr));
        assert!(matches!(detect_line_ending("a\nb"), LineEnding::Lf));
        assert!(matches!(detect_line_ending("plain"), LineEnding::Lf));
    }

    #[test]
    fn test_line_ending_round_trip() {
        let normalized = "a\nb\nc".to_string();
        assert_eq!(
            restore_line_ending(normalized.clone(), LineEnding::CrLf),
            "a\r\nb\r\nc"
        );
        assert_eq!(restore_line_ending(normalized, LineEnding::Lf), "a\nb\nc");
    }
}
