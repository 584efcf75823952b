pub mod agent;
pub mod agent_loop;
pub mod callbacks;
pub mod dispatch;
pub mod manager;
pub mod provider;
pub mod render;
pub mod signals;
pub mod tools;
pub mod types;

pub use agent::{Agent, AgentConfig, Model, DEFAULT_MAX_ITERATIONS};
pub use agent_loop::{execute_agent_with_callbacks, AgentError, AgentTurn};
pub use callbacks::{AgentCallbacks, ToolCallStatus, ToolCallUpdate};
pub use dispatch::{classify_input, DispatchOutcome, Dispatcher, InputKind};
pub use manager::{AgentManager, AgentState, ManagerError};
pub use render::{shared_writer, Renderer, SharedWriter};
pub use signals::SignalHandler;
pub use types::*;
