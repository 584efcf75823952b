//! Stream-safe writer for agent prose and tool-call lifecycle.
//!
//! Symbol conventions: `▶` exec start, `○` other tool start, `●` completion
//! with `✓`/`✗`, dim footer with cumulative token usage.

use crate::callbacks::{AgentCallbacks, ToolCallStatus, ToolCallUpdate};
use crate::tools::ToolKind;
use crate::types::{ToolCall, Usage};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A writer shared between the renderer and the `exec` tool's live tee.
pub type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

pub fn shared_writer(w: impl Write + Send + 'static) -> SharedWriter {
    Arc::new(Mutex::new(Box::new(w)))
}

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";

pub struct Renderer {
    out: SharedWriter,
    color: bool,
}

impl Renderer {
    pub fn new(out: SharedWriter) -> Self {
        Self { out, color: true }
    }

    pub fn stdout() -> Self {
        Self::new(shared_writer(io::stdout()))
    }

    /// Disable ANSI styling (non-TTY output, NO_COLOR).
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// The live writer `exec` tees subprocess output into.
    pub fn writer(&self) -> SharedWriter {
        self.out.clone()
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("{}{}{}", code, text, RESET)
        } else {
            text.to_string()
        }
    }

    fn write(&self, text: &str) {
        let mut out = self.out.lock().unwrap();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    pub fn agent_header(&self, name: &str) {
        self.write(&format!("{}\n", self.paint(BOLD, name)));
    }

    pub fn content_chunk(&self, chunk: &str) {
        self.write(chunk);
    }

    pub fn tool_start(&self, call: &ToolCall, kind: ToolKind) {
        let symbol = match kind {
            ToolKind::Execute => "▶",
            _ => "○",
        };
        let line = format!(
            "\n{} {} {}\n",
            self.paint(CYAN, symbol),
            call.name,
            self.paint(DIM, &summarize_args(call, kind))
        );
        self.write(&line);
    }

    pub fn tool_end(&self, call: &ToolCall, update: &ToolCallUpdate) {
        let failed = is_failure(call, update);
        let mark = if failed {
            self.paint(RED, "✗")
        } else {
            self.paint(GREEN, "✓")
        };
        let line = format!(
            "● {} {} {}\n",
            call.name,
            mark,
            self.paint(DIM, &fmt_duration(update.duration))
        );
        self.write(&line);
    }

    pub fn usage_footer(&self, usage: &Usage) {
        let footer = format!(
            "\n[tokens: {} in ({} cached), {} out]\n",
            usage.prompt_tokens, usage.cached_tokens, usage.completion_tokens
        );
        self.write(&self.paint(DIM, &footer));
    }

    /// User-visible failure line, stderr with the shell prefix.
    pub fn error(&self, message: &str) {
        eprintln!("gsh: {}", message);
    }

    pub fn info(&self, message: &str) {
        self.write(&format!("{}\n", message));
    }

    /// Wire this renderer into a callbacks bundle for one agent invocation.
    ///
    /// The agent header is re-armed at each iteration so every assistant
    /// turn that produces prose gets one.
    pub fn callbacks(self: Arc<Self>, agent_name: &str, streaming: bool) -> AgentCallbacks {
        let needs_header = Arc::new(AtomicBool::new(true));
        let name = agent_name.to_string();

        let header_flag = needs_header.clone();
        let on_iteration_start = Arc::new(move |_iteration: u32| {
            header_flag.store(true, Ordering::SeqCst);
        });

        let r = self.clone();
        let header_flag = needs_header.clone();
        let on_content_chunk = Arc::new(move |chunk: &str| {
            if header_flag.swap(false, Ordering::SeqCst) {
                r.agent_header(&name);
            }
            r.content_chunk(chunk);
        });

        let r = self.clone();
        let on_tool_call_start = Arc::new(move |call: &ToolCall, kind: ToolKind| {
            r.tool_start(call, kind);
        });

        let r = self.clone();
        let on_tool_call_end = Arc::new(move |call: &ToolCall, update: &ToolCallUpdate| {
            r.tool_end(call, update);
        });

        let r = self.clone();
        let on_final_response = Arc::new(move |_content: &str| {
            r.content_chunk("\n");
        });

        let r = self.clone();
        let on_complete = Arc::new(
            move |_stop: crate::types::StopReason,
                  usage: &Usage,
                  error: Option<&crate::agent_loop::AgentError>| {
                if let Some(error) = error {
                    r.error(&error.to_string());
                }
                if usage.total() > 0 {
                    r.usage_footer(usage);
                }
            },
        );

        AgentCallbacks {
            on_iteration_start: Some(on_iteration_start),
            on_content_chunk: Some(on_content_chunk),
            on_tool_call_start: Some(on_tool_call_start),
            on_tool_call_end: Some(on_tool_call_end),
            on_final_response: Some(on_final_response),
            on_complete: Some(on_complete),
            streaming,
            ..Default::default()
        }
    }
}

/// Non-zero exit from `exec` counts as failure even when the executor
/// itself succeeded.
fn is_failure(call: &ToolCall, update: &ToolCallUpdate) -> bool {
    if update.status == ToolCallStatus::Failed {
        return true;
    }
    if ToolKind::classify(&call.name) == ToolKind::Execute {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&update.content) {
            return value["exitCode"].as_i64().unwrap_or(0) != 0;
        }
    }
    false
}

fn summarize_args(call: &ToolCall, kind: ToolKind) -> String {
    let summary = match kind {
        ToolKind::Execute => call.arg_str("command").unwrap_or_default().to_string(),
        ToolKind::Read | ToolKind::Write => call.arg_str("file_path").unwrap_or_default().to_string(),
        ToolKind::Search => call.arg_str("pattern").unwrap_or_default().to_string(),
        ToolKind::Other => serde_json::Value::Object(call.arguments.clone()).to_string(),
    };
    let mut summary = summary.replace('\n', " ");
    if summary.len() > 80 {
        let cut = (0..=80).rev().find(|i| summary.is_char_boundary(*i)).unwrap_or(0);
        summary.truncate(cut);
        summary.push_str("...");
    }
    summary
}

fn fmt_duration(d: Duration) -> String {
    if d < Duration::from_secs(1) {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture() -> (SharedWriter, Arc<Mutex<Vec<u8>>>) {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let writer = buf.clone();
        struct Tee(Arc<Mutex<Vec<u8>>>);
        impl Write for Tee {
            fn write(&mut self, data: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(data);
                Ok(data.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        (shared_writer(Tee(writer)), buf)
    }

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        let serde_json::Value::Object(map) = args else {
            panic!("args must be an object")
        };
        ToolCall::new("c1", name, map)
    }

    #[test]
    fn test_tool_end_marks_nonzero_exit_as_failure() {
        let (out, buf) = capture();
        let renderer = Renderer::new(out).with_color(false);
        let update = ToolCallUpdate {
            status: ToolCallStatus::Completed,
            content: r#"{"output":"boom","exitCode":1}"#.into(),
            duration: Duration::from_millis(12),
            error: None,
        };
        renderer.tool_end(&call("exec", serde_json::json!({"command": "false"})), &update);
        let text = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert!(text.contains('✗'));
        assert!(text.contains("12ms"));
    }

    #[test]
    fn test_plain_mode_has_no_ansi() {
        let (out, buf) = capture();
        let renderer = Renderer::new(out).with_color(false);
        renderer.agent_header("coder");
        renderer.usage_footer(&Usage {
            prompt_tokens: 10,
            completion_tokens: 4,
            cached_tokens: 2,
        });
        let text = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert!(!text.contains("\x1b["));
        assert!(text.contains("coder"));
        assert!(text.contains("10 in (2 cached), 4 out"));
    }

    #[test]
    fn test_exec_start_summarizes_command() {
        let (out, buf) = capture();
        let renderer = Renderer::new(out).with_color(false);
        renderer.tool_start(
            &call("exec", serde_json::json!({"command": "git status"})),
            ToolKind::Execute,
        );
        let text = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert!(text.contains("▶ exec git status"));
    }
}
