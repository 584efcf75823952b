//! `exec` tool: run a shell command under a pseudoterminal.
//!
//! The PTY keeps colored output and terminal-aware programs working, and the
//! child runs in its own session so timeout and cancellation can kill the
//! whole process group. Output is teed into the live writer for the renderer
//! and into a capture buffer for the tool result.

use super::{optional_i64, require_str, Tool, ToolError};
use crate::render::SharedWriter;
use async_trait::async_trait;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, PtySize};
use serde::Serialize;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const MAX_OUTPUT_BYTES: usize = 50_000;

pub struct ExecTool {
    live_writer: Option<SharedWriter>,
    #[cfg(unix)]
    ignore_sigint: Option<Arc<std::sync::atomic::AtomicBool>>,
    pub default_timeout: Duration,
    pub max_output_bytes: usize,
}

impl Default for ExecTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecTool {
    pub fn new() -> Self {
        Self {
            live_writer: None,
            #[cfg(unix)]
            ignore_sigint: None,
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_output_bytes: MAX_OUTPUT_BYTES,
        }
    }

    /// Tee subprocess output into this writer as it arrives.
    pub fn with_live_writer(mut self, writer: SharedWriter) -> Self {
        self.live_writer = Some(writer);
        self
    }

    /// Share the signal handler's ignore flag so Ctrl+C is left to the
    /// child while it owns the terminal.
    #[cfg(unix)]
    pub fn with_ignore_sigint(mut self, flag: Arc<std::sync::atomic::AtomicBool>) -> Self {
        self.ignore_sigint = Some(flag);
        self
    }
}

#[derive(Serialize)]
struct ExecResult {
    output: String,
    #[serde(rename = "exitCode")]
    exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    truncated: Option<bool>,
}

#[async_trait]
impl Tool for ExecTool {
    fn name(&self) -> &str {
        "exec"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its combined output and exit code. \
         The command runs under a pseudoterminal; interactive commands that \
         read stdin are not supported."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default 60)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(
        &self,
        args: serde_json::Map<String, serde_json::Value>,
        cancel: CancellationToken,
    ) -> Result<String, ToolError> {
        let command = require_str(&args, "command")?;
        let timeout_secs = optional_i64(&args, "timeout")
            .filter(|t| *t > 0)
            .map(|t| t as u64)
            .unwrap_or(self.default_timeout.as_secs());
        let timeout = Duration::from_secs(timeout_secs);

        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }

        debug!("exec: {}", command);

        let pty = native_pty_system();
        let pair = pty
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| ToolError::Failed(format!("cannot open pty: {}", e)))?;

        let mut cmd = CommandBuilder::new("sh");
        cmd.args(["-c", command]);
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }
        cmd.env("PAGER", "cat");
        cmd.env("GIT_PAGER", "cat");
        cmd.env("GIT_TERMINAL_PROMPT", "0");

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| ToolError::Failed(format!("cannot spawn '{}': {}", command, e)))?;
        drop(pair.slave);

        let child_pid = child.process_id();
        let mut killer = child.clone_killer();

        #[cfg(unix)]
        let _foreground = child_pid.and_then(|pid| {
            crate::signals::ForegroundGuard::hand_over(pid, self.ignore_sigint.clone())
        });

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| ToolError::Failed(format!("cannot read pty: {}", e)))?;

        // PTY drain and child wait race on the same buffer; the mutex keeps
        // live bytes and capture bytes in the same order
        let capture: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        let reader_task = spawn_drain(reader, capture.clone(), self.live_writer.clone());

        let mut wait_task = tokio::task::spawn_blocking(move || child.wait());

        let mut timed_out = false;
        let mut cancelled = false;
        let status = tokio::select! {
            _ = cancel.cancelled() => {
                cancelled = true;
                kill_group(child_pid, &mut killer);
                wait_task.await
            }
            _ = tokio::time::sleep(timeout) => {
                timed_out = true;
                kill_group(child_pid, &mut killer);
                wait_task.await
            }
            status = &mut wait_task => status,
        };

        // closing the master EOFs the drain task
        drop(pair.master);
        let _ = reader_task.await;

        if cancelled {
            return Err(ToolError::Cancelled);
        }
        if timed_out {
            return Err(ToolError::Failed(format!(
                "command timed out after {}s",
                timeout_secs
            )));
        }

        let status = status
            .map_err(|e| ToolError::Failed(format!("wait failed: {}", e)))?
            .map_err(|e| ToolError::Failed(format!("wait failed: {}", e)))?;

        let mut bytes = std::mem::take(&mut *capture.lock().unwrap());
        let truncated = bytes.len() > self.max_output_bytes;
        if truncated {
            bytes.truncate(self.max_output_bytes);
        }
        let output = String::from_utf8_lossy(&bytes).into_owned();

        let result = ExecResult {
            output,
            exit_code: status.exit_code() as i32,
            truncated: truncated.then_some(true),
        };
        serde_json::to_string(&result).map_err(|e| ToolError::Failed(e.to_string()))
    }
}

fn spawn_drain(
    mut reader: Box<dyn Read + Send>,
    capture: Arc<Mutex<Vec<u8>>>,
    live: Option<SharedWriter>,
) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                // EIO is the usual Linux EOF once the child side closes
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Some(live) = &live {
                        let mut w = live.lock().unwrap();
                        let _ = w.write_all(&buf[..n]);
                        let _ = w.flush();
                    }
                    capture.lock().unwrap().extend_from_slice(&buf[..n]);
                }
            }
        }
    })
}

/// Kill the child's whole process group (the PTY session), falling back to
/// the single process where group kill is unavailable.
fn kill_group(pid: Option<u32>, killer: &mut Box<dyn ChildKiller + Send + Sync>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        let _ = nix::sys::signal::killpg(
            nix::unistd::Pid::from_raw(pid as i32),
            nix::sys::signal::Signal::SIGKILL,
        );
    }
    let _ = killer.kill();
}
