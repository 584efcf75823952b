//! Provider contract: the core's chat request/response pair and the trait
//! each LLM backend implements.

use crate::types::{Message, ToolCall, Usage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Connection parameters for one configured model. Immutable after
/// construction; produced by the shell's config layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    /// Provider-side model identifier, e.g. "gpt-4o".
    pub model_id: String,
    pub api_key: String,
    /// Base URL up to but excluding `/chat/completions`.
    pub base_url: String,
    pub temperature: Option<f32>,
}

impl ModelParams {
    pub fn new(model_id: impl Into<String>, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Tool declaration sent to the model (schema only, no execute fn).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// One completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub params: ModelParams,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
}

/// One completion response, already translated out of the wire format.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
}

/// Content delta observer for streaming completions.
pub type ContentDeltaFn = Arc<dyn Fn(&str) + Send + Sync>;
/// Fired once per tool call as soon as its `(id, name)` is known, possibly
/// before any arguments have streamed.
pub type ToolCallAnnounceFn = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Observer hooks for token-by-token streaming. All optional.
#[derive(Clone, Default)]
pub struct StreamCallbacks {
    pub on_content: Option<ContentDeltaFn>,
    pub on_tool_call_start: Option<ToolCallAnnounceFn>,
}

/// The provider adapter. Implementations translate the core request to a
/// concrete wire protocol and back.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Blocking completion: one request, one fully-assembled response.
    async fn chat_completion(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, ProviderError>;

    /// Streaming completion. Deltas are reported through `callbacks` in
    /// provider-emission order; the returned response is the assembled whole,
    /// including tool calls whose argument fragments arrived incrementally.
    async fn streaming_chat_completion(
        &self,
        request: ChatRequest,
        callbacks: StreamCallbacks,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API error: {0}")]
    Api(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("cancelled")]
    Cancelled,
}
