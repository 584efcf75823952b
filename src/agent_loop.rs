//! The agent loop: build request → call provider → dispatch tool calls →
//! append results → repeat until the model stops asking for tools or a
//! limit is reached.
//!
//! The loop never mutates the caller's conversation; it works on a copy
//! with all `system` messages stripped and returns the appended result.
//! Tool failures are folded into tool results so the model can recover;
//! only provider transport failures and cancellation abort the turn.

use crate::agent::Agent;
use crate::callbacks::{AgentCallbacks, ToolCallStatus, ToolCallUpdate};
use crate::provider::{ChatRequest, ProviderError, StreamCallbacks, ToolDefinition};
use crate::tools::{declaration, Tool, ToolError, ToolKind};
use crate::types::{Message, StopReason, ToolCall, Usage};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Outcome of one `execute_agent_with_callbacks` invocation. The updated
/// conversation is returned on every path, including cancellation and
/// iteration exhaustion.
#[derive(Debug)]
pub struct AgentTurn {
    pub conversation: Vec<Message>,
    pub stop_reason: StopReason,
    pub usage: Usage,
    pub error: Option<AgentError>,
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent configuration error: {0}")]
    Config(String),
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("cancelled")]
    Cancelled,
    #[error("maximum iterations ({0}) reached")]
    MaxIterations(u32),
}

/// Run one user turn of the agent: iterate provider calls and tool
/// executions until the model returns no tool calls, the iteration cap is
/// hit, the provider fails, or `cancel` fires.
pub async fn execute_agent_with_callbacks(
    conversation: &[Message],
    agent: &Agent,
    callbacks: &AgentCallbacks,
    cancel: CancellationToken,
) -> AgentTurn {
    let mut usage = Usage::default();
    let mut working: Vec<Message> = conversation
        .iter()
        .filter(|m| !matches!(m, Message::System { .. }))
        .cloned()
        .collect();

    let Some(model) = agent.config.model.clone() else {
        let error = AgentError::Config(format!("agent '{}' has no model", agent.name));
        return finish(callbacks, working, StopReason::Error, usage, Some(error));
    };

    let max_iterations = agent.config.effective_max_iterations();

    // the model is offered the merged list (per-invocation extras ahead of
    // the agent's own); built-in dispatch resolves over the agent's tools
    // only, so extras require a tool_executor override
    let declarations: Vec<ToolDefinition> = callbacks
        .extra_tools
        .iter()
        .chain(agent.config.tools.iter())
        .map(|t| declaration(t.as_ref()))
        .collect();

    for iteration in 0..max_iterations {
        if cancel.is_cancelled() {
            return finish(
                callbacks,
                working,
                StopReason::Cancelled,
                usage,
                Some(AgentError::Cancelled),
            );
        }

        if let Some(f) = &callbacks.on_iteration_start {
            f(iteration);
        }

        let mut messages = Vec::with_capacity(working.len() + 1);
        if let Some(prompt) = &agent.config.system_prompt {
            if !prompt.is_empty() {
                messages.push(Message::system(prompt.clone()));
            }
        }
        messages.extend(working.iter().cloned());

        let request = ChatRequest {
            params: model.params.clone(),
            messages,
            tools: declarations.clone(),
        };

        let result = if callbacks.streaming {
            let stream_callbacks = StreamCallbacks {
                on_content: callbacks.on_content_chunk.clone(),
                on_tool_call_start: callbacks.on_tool_call_streaming_start.clone(),
            };
            model
                .provider
                .streaming_chat_completion(request, stream_callbacks, cancel.child_token())
                .await
        } else {
            model.provider.chat_completion(request, cancel.child_token()).await
        };

        let response = match result {
            Ok(response) => response,
            Err(ProviderError::Cancelled) => {
                return finish(
                    callbacks,
                    working,
                    StopReason::Cancelled,
                    usage,
                    Some(AgentError::Cancelled),
                );
            }
            Err(e) => {
                warn!("provider error: {}", e);
                return finish(
                    callbacks,
                    working,
                    StopReason::Error,
                    usage,
                    Some(AgentError::Provider(e)),
                );
            }
        };

        usage.add(&response.usage);

        // blocking completions still reach the content observer, as one chunk
        if !callbacks.streaming && !response.content.is_empty() {
            if let Some(f) = &callbacks.on_content_chunk {
                f(&response.content);
            }
        }

        if response.tool_calls.is_empty() {
            working.push(Message::assistant(response.content.clone()));
            if let Some(f) = &callbacks.on_final_response {
                f(&response.content);
            }
            return finish(callbacks, working, StopReason::EndTurn, usage, None);
        }

        working.push(Message::assistant_with_tool_calls(
            response.content.clone(),
            response.tool_calls.clone(),
        ));

        // strictly sequential, in emission order
        for call in &response.tool_calls {
            let kind = ToolKind::classify(&call.name);
            if let Some(f) = &callbacks.on_tool_call_start {
                f(call, kind);
            }

            let started = Instant::now();
            let result = match &callbacks.tool_executor {
                Some(executor) => executor(call.clone(), cancel.child_token()).await,
                None => dispatch_tool(&agent.config.tools, call, cancel.child_token()).await,
            };
            let duration = started.elapsed();

            let update = match result {
                Ok(content) => ToolCallUpdate {
                    status: ToolCallStatus::Completed,
                    content,
                    duration,
                    error: None,
                },
                Err(e) => {
                    warn!("tool {} failed: {}", call.name, e);
                    ToolCallUpdate {
                        status: ToolCallStatus::Failed,
                        content: format!("Error executing tool: {}", e),
                        duration,
                        error: Some(e.to_string()),
                    }
                }
            };

            if let Some(f) = &callbacks.on_tool_call_end {
                f(call, &update);
            }
            working.push(Message::tool(
                update.content.clone(),
                call.name.clone(),
                call.id.clone(),
            ));
        }
    }

    let error = AgentError::MaxIterations(max_iterations);
    finish(
        callbacks,
        working,
        StopReason::MaxIterations,
        usage,
        Some(error),
    )
}

async fn dispatch_tool(
    tools: &[Arc<dyn Tool>],
    call: &ToolCall,
    cancel: CancellationToken,
) -> Result<String, ToolError> {
    let tool = tools
        .iter()
        .find(|t| t.name() == call.name)
        .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
    tool.execute(call.arguments.clone(), cancel).await
}

/// Single exit point so `on_complete` fires exactly once per invocation.
fn finish(
    callbacks: &AgentCallbacks,
    conversation: Vec<Message>,
    stop_reason: StopReason,
    usage: Usage,
    error: Option<AgentError>,
) -> AgentTurn {
    if let Some(f) = &callbacks.on_complete {
        f(stop_reason, &usage, error.as_ref());
    }
    AgentTurn {
        conversation,
        stop_reason,
        usage,
        error,
    }
}
