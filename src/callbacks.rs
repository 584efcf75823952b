//! The per-invocation observer bundle handed to the agent loop.
//!
//! Every hook is optional; callers set the subset they care about. The
//! renderer is wired through this bundle, never through shared state.

use crate::agent_loop::AgentError;
use crate::tools::{Tool, ToolError, ToolKind};
use crate::types::{StopReason, ToolCall, Usage};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub type IterationStartFn = Arc<dyn Fn(u32) + Send + Sync>;
pub type ContentChunkFn = Arc<dyn Fn(&str) + Send + Sync>;
/// `(tool_call_id, tool_name)` as soon as a streamed call's name is known.
pub type ToolCallStreamingStartFn = Arc<dyn Fn(&str, &str) + Send + Sync>;
pub type ToolCallStartFn = Arc<dyn Fn(&ToolCall, ToolKind) + Send + Sync>;
pub type ToolCallEndFn = Arc<dyn Fn(&ToolCall, &ToolCallUpdate) + Send + Sync>;
pub type FinalResponseFn = Arc<dyn Fn(&str) + Send + Sync>;
pub type CompleteFn = Arc<dyn Fn(StopReason, &Usage, Option<&AgentError>) + Send + Sync>;
/// Overrides the built-in tool dispatch when set.
pub type ToolExecutorFn = Arc<
    dyn Fn(ToolCall, CancellationToken) -> BoxFuture<'static, Result<String, ToolError>>
        + Send
        + Sync,
>;

#[derive(Clone, Default)]
pub struct AgentCallbacks {
    pub on_iteration_start: Option<IterationStartFn>,
    pub on_content_chunk: Option<ContentChunkFn>,
    pub on_tool_call_streaming_start: Option<ToolCallStreamingStartFn>,
    pub on_tool_call_start: Option<ToolCallStartFn>,
    pub on_tool_call_end: Option<ToolCallEndFn>,
    pub on_final_response: Option<FinalResponseFn>,
    /// Called exactly once per invocation, on every exit path.
    pub on_complete: Option<CompleteFn>,
    pub tool_executor: Option<ToolExecutorFn>,
    /// Extra tools offered to the model ahead of the agent's own.
    pub extra_tools: Vec<Arc<dyn Tool>>,
    /// Use the provider's streaming endpoint and report content deltas.
    pub streaming: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallStatus {
    Completed,
    Failed,
}

/// Outcome of one tool call, reported to `on_tool_call_end`.
#[derive(Debug, Clone)]
pub struct ToolCallUpdate {
    pub status: ToolCallStatus,
    /// The body appended to the conversation as the tool message.
    pub content: String,
    pub duration: Duration,
    pub error: Option<String>,
}
