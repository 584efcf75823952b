//! Scripted provider for tests. No network.

use super::traits::*;
use crate::types::{ToolCall, Usage};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// One scripted turn of the mock provider.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Text(String),
    /// Prose plus tool calls in one assistant turn.
    ToolCalls {
        content: String,
        calls: Vec<ToolCall>,
    },
    /// Simulated transport failure.
    Error(String),
}

/// Mock provider: returns a scripted response sequence and counts calls.
pub struct MockProvider {
    responses: Mutex<Vec<MockResponse>>,
    calls: AtomicUsize,
    usage_per_call: Usage,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: AtomicUsize::new(0),
            usage_per_call: Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                cached_tokens: 0,
            },
        }
    }

    /// Provider that always returns the same text once.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![MockResponse::Text(text.into())])
    }

    pub fn with_usage_per_call(mut self, usage: Usage) -> Self {
        self.usage_per_call = usage;
        self
    }

    /// How many completion requests this provider has served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> MockResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            MockResponse::Text("(no more scripted responses)".into())
        } else {
            responses.remove(0)
        }
    }

    fn to_chat_response(&self, response: MockResponse) -> Result<ChatResponse, ProviderError> {
        match response {
            MockResponse::Text(content) => Ok(ChatResponse {
                content,
                tool_calls: vec![],
                usage: self.usage_per_call,
            }),
            MockResponse::ToolCalls { content, calls } => Ok(ChatResponse {
                content,
                tool_calls: calls,
                usage: self.usage_per_call,
            }),
            MockResponse::Error(message) => Err(ProviderError::Network(message)),
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn chat_completion(
        &self,
        _request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        self.to_chat_response(self.next_response())
    }

    async fn streaming_chat_completion(
        &self,
        request: ChatRequest,
        callbacks: StreamCallbacks,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, ProviderError> {
        let response = self.chat_completion(request, cancel).await?;
        if let Some(on_content) = &callbacks.on_content {
            // split into two deltas so callers see more than one chunk
            let mid = response.content.len() / 2;
            let mid = (0..=mid)
                .rev()
                .find(|i| response.content.is_char_boundary(*i))
                .unwrap_or(0);
            let (head, tail) = response.content.split_at(mid);
            if !head.is_empty() {
                on_content(head);
            }
            if !tail.is_empty() {
                on_content(tail);
            }
        }
        if let Some(on_start) = &callbacks.on_tool_call_start {
            for call in &response.tool_calls {
                on_start(&call.id, &call.name);
            }
        }
        Ok(response)
    }
}
