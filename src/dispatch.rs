//! Entry-point glue: route a submitted line to the shell runner or the
//! agent, after the middleware chain has had its say.
//!
//! A line starting with `#` enters agent mode; the remainder is either a
//! slash-command (`/clear`, `/agents`, `/agent <name>`) or a message for
//! the current agent. Bare `exit` ends the REPL. Everything else goes to
//! the embedded POSIX shell runner.

use crate::manager::AgentManager;
use crate::render::Renderer;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Handle to the embedded POSIX shell runner. Signals and history are wired
/// by the shell itself, identically to the agent path.
#[async_trait]
pub trait ShellRunner: Send + Sync {
    /// Run a command line; returns its exit code.
    async fn run(&self, command: &str, cancel: CancellationToken) -> Result<i32, ShellError>;
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ShellError(pub String);

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind<'a> {
    Empty,
    Exit,
    AgentClear,
    AgentList,
    AgentSwitch(&'a str),
    AgentMessage(&'a str),
    Shell(&'a str),
}

pub fn classify_input(line: &str) -> InputKind<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return InputKind::Empty;
    }
    if trimmed == "exit" {
        return InputKind::Exit;
    }
    if let Some(rest) = trimmed.strip_prefix('#') {
        let rest = rest.trim();
        if rest.is_empty() {
            return InputKind::Empty;
        }
        if rest == "/clear" {
            return InputKind::AgentClear;
        }
        if rest == "/agents" {
            return InputKind::AgentList;
        }
        if let Some(name) = rest.strip_prefix("/agent ") {
            return InputKind::AgentSwitch(name.trim());
        }
        return InputKind::AgentMessage(rest);
    }
    InputKind::Shell(trimmed)
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

/// Result of one middleware step. `handled` short-circuits the dispatch;
/// `input` replaces the line for subsequent steps.
pub struct MiddlewareOutcome {
    pub handled: bool,
    pub input: Option<String>,
}

pub trait Middleware: Send + Sync {
    fn process(&self, input: &str) -> MiddlewareOutcome;
}

/// Run the chain; `None` means some middleware consumed the line.
pub fn run_middlewares(middlewares: &[Arc<dyn Middleware>], input: &str) -> Option<String> {
    let mut current = input.to_string();
    for middleware in middlewares {
        let outcome = middleware.process(&current);
        if outcome.handled {
            return None;
        }
        if let Some(replacement) = outcome.input {
            current = replacement;
        }
    }
    Some(current)
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Continue,
    Exit,
}

pub struct Dispatcher {
    manager: Arc<AgentManager>,
    shell: Arc<dyn ShellRunner>,
    renderer: Arc<Renderer>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl Dispatcher {
    pub fn new(
        manager: Arc<AgentManager>,
        shell: Arc<dyn ShellRunner>,
        renderer: Arc<Renderer>,
    ) -> Self {
        Self {
            manager,
            shell,
            renderer,
            middlewares: Vec::new(),
        }
    }

    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Route one submitted line. Failures are rendered, never propagated;
    /// the REPL keeps going.
    pub async fn dispatch(&self, line: &str, cancel: CancellationToken) -> DispatchOutcome {
        let Some(line) = run_middlewares(&self.middlewares, line) else {
            return DispatchOutcome::Continue;
        };

        match classify_input(&line) {
            InputKind::Empty => {}
            InputKind::Exit => return DispatchOutcome::Exit,
            InputKind::AgentClear => match self.manager.clear_current_conversation() {
                Ok(()) => self.renderer.info("conversation cleared"),
                Err(e) => self.renderer.error(&e.to_string()),
            },
            InputKind::AgentList => {
                let current = self.manager.current_agent();
                for name in self.manager.list_agents() {
                    let marker = if current.as_deref() == Some(name.as_str()) {
                        "* "
                    } else {
                        "  "
                    };
                    self.renderer.info(&format!("{}{}", marker, name));
                }
            }
            InputKind::AgentSwitch(name) => match self.manager.set_current_agent(name) {
                Ok(()) => self.renderer.info(&format!("switched to agent {}", name)),
                Err(e) => self.renderer.error(&e.to_string()),
            },
            InputKind::AgentMessage(text) => {
                let Some(agent_name) = self.manager.current_agent() else {
                    self.renderer.error("no agent configured");
                    return DispatchOutcome::Continue;
                };
                let callbacks = self.renderer.clone().callbacks(&agent_name, true);
                if let Err(e) = self
                    .manager
                    .send_message_with_callbacks(text, callbacks, cancel)
                    .await
                {
                    self.renderer.error(&e.to_string());
                }
            }
            InputKind::Shell(command) => {
                if let Err(e) = self.shell.run(command, cancel).await {
                    self.renderer.error(&e.to_string());
                }
            }
        }
        DispatchOutcome::Continue
    }
}
