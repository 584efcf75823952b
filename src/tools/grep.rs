//! `grep` tool: recursive pattern search with backend detection.
//!
//! Prefers ripgrep, falls back to `git grep` inside a repository, then to
//! plain `grep`. The pattern is always passed via `-e` so a pattern starting
//! with `-` cannot be read as a flag.

use super::{require_str, Tool, ToolError};
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrepBackend {
    Ripgrep,
    GitGrep,
    Grep,
}

impl GrepBackend {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Ripgrep => "rg",
            Self::GitGrep => "git grep",
            Self::Grep => "grep",
        }
    }
}

pub struct GrepTool {
    /// Directory to search from; defaults to the working directory.
    pub root: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for GrepTool {
    fn default() -> Self {
        Self::new()
    }
}

impl GrepTool {
    pub fn new() -> Self {
        Self {
            root: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    fn detect_backend(&self) -> GrepBackend {
        if which_exists("rg") {
            return GrepBackend::Ripgrep;
        }
        if self.inside_git_repo() {
            return GrepBackend::GitGrep;
        }
        GrepBackend::Grep
    }

    fn inside_git_repo(&self) -> bool {
        let mut cmd = std::process::Command::new("git");
        cmd.args(["rev-parse", "--is-inside-work-tree"]);
        if let Some(root) = &self.root {
            cmd.current_dir(root);
        }
        cmd.stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

#[derive(Serialize)]
struct GrepResult {
    output: String,
    #[serde(rename = "exitCode")]
    exit_code: i32,
    status: &'static str,
    backend: &'static str,
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents recursively for a pattern. Returns matching \
         lines with file paths and line numbers."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "The pattern to search for (regular expression)"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(
        &self,
        args: serde_json::Map<String, serde_json::Value>,
        cancel: CancellationToken,
    ) -> Result<String, ToolError> {
        let pattern = require_str(&args, "pattern")?;
        if pattern.is_empty() {
            return Err(ToolError::InvalidArgs("'pattern' must not be empty".into()));
        }

        let backend = self.detect_backend();
        let (program, base_args) = backend_command(backend);

        let mut cmd = Command::new(program);
        cmd.args(base_args);
        cmd.arg("-e").arg(pattern);
        if backend == GrepBackend::Grep {
            cmd.arg(".");
        }
        if let Some(root) = &self.root {
            cmd.current_dir(root);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(ToolError::Cancelled),
            _ = tokio::time::sleep(self.timeout) => {
                return Err(ToolError::Failed("search timed out".into()));
            }
            output = cmd.output() => {
                output.map_err(|e| ToolError::Failed(format!("cannot run {}: {}", backend.as_str(), e)))?
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        // every backend exits 1 for "no matches"; that is not an error
        let status = match exit_code {
            0 => "matches_found",
            1 => "no_matches",
            _ => "error",
        };
        let text = if status == "error" {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };

        let result = GrepResult {
            output: text,
            exit_code,
            status,
            backend: backend.as_str(),
        };
        serde_json::to_string(&result).map_err(|e| ToolError::Failed(e.to_string()))
    }
}

fn backend_command(backend: GrepBackend) -> (&'static str, Vec<&'static str>) {
    match backend {
        GrepBackend::Ripgrep => (
            "rg",
            vec![
                "--line-number",
                "--no-heading",
                "--hidden",
                "--glob",
                "!.git",
                "--color",
                "never",
            ],
        ),
        GrepBackend::GitGrep => ("git", vec!["grep", "-I", "-n"]),
        GrepBackend::Grep => ("grep", vec!["-r", "-n", "-I", "--exclude-dir=.git"]),
    }
}

fn which_exists(name: &str) -> bool {
    std::process::Command::new("which")
        .arg(name)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
