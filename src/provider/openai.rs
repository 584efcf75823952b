//! OpenAI Chat Completions compatible adapter.
//!
//! One implementation covers any backend speaking the Chat Completions API
//! (OpenAI, OpenRouter, Groq, DeepSeek, local gateways, ...). The base URL
//! and API key come from the model's [`ModelParams`].

use super::traits::*;
use crate::types::{Message, ToolCall, Usage};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::EventSource;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct OpenAiCompatProvider {
    client: reqwest::Client,
}

impl Default for OpenAiCompatProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiCompatProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    async fn chat_completion(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, ProviderError> {
        let url = format!("{}/chat/completions", request.params.base_url);
        let body = build_request_body(&request, false);
        debug!("chat completion: model={} url={}", request.params.model_id, url);

        let send = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", request.params.api_key))
            .json(&body)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            response = send => response.map_err(|e| ProviderError::Network(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!("{}: {}", status, text)));
        }

        let completion: Completion = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            decoded = response.json() => decoded.map_err(|e| ProviderError::Decode(e.to_string()))?,
        };

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Decode("response has no choices".into()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: parse_arguments(&tc.function.arguments),
            })
            .collect();

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage: completion.usage.map(Usage::from).unwrap_or_default(),
        })
    }

    async fn streaming_chat_completion(
        &self,
        request: ChatRequest,
        callbacks: StreamCallbacks,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, ProviderError> {
        let url = format!("{}/chat/completions", request.params.base_url);
        let body = build_request_body(&request, true);
        debug!("streaming chat completion: model={} url={}", request.params.model_id, url);

        let builder = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", request.params.api_key))
            .json(&body);

        let mut es = EventSource::new(builder).map_err(|e| ProviderError::Network(e.to_string()))?;

        let mut content = String::new();
        let mut usage = Usage::default();
        let mut buffers: Vec<ToolCallBuffer> = Vec::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    es.close();
                    return Err(ProviderError::Cancelled);
                }
                event = es.next() => {
                    match event {
                        None => break,
                        Some(Ok(reqwest_eventsource::Event::Open)) => {}
                        Some(Ok(reqwest_eventsource::Event::Message(msg))) => {
                            if msg.data == "[DONE]" {
                                break;
                            }
                            let chunk: Chunk = match serde_json::from_str(&msg.data) {
                                Ok(c) => c,
                                Err(e) => {
                                    debug!("skipping unparseable chunk: {} data={}", e, &msg.data);
                                    continue;
                                }
                            };
                            if let Some(u) = chunk.usage {
                                usage = Usage::from(u);
                            }
                            for choice in &chunk.choices {
                                apply_delta(&choice.delta, &mut content, &mut buffers, &callbacks);
                            }
                        }
                        Some(Err(reqwest_eventsource::Error::StreamEnded)) => break,
                        Some(Err(e)) => {
                            warn!("SSE stream error: {}", e);
                            es.close();
                            return Err(ProviderError::Network(e.to_string()));
                        }
                    }
                }
            }
        }

        let tool_calls = buffers
            .into_iter()
            .map(|buf| ToolCall {
                id: buf.id,
                name: buf.name,
                arguments: parse_arguments(&buf.arguments),
            })
            .collect();

        Ok(ChatResponse {
            content,
            tool_calls,
            usage,
        })
    }
}

/// Per-index assembly buffer for a streamed tool call. Argument fragments
/// are concatenated across chunks and parsed once the stream ends.
#[derive(Default)]
struct ToolCallBuffer {
    id: String,
    name: String,
    arguments: String,
    announced: bool,
}

fn apply_delta(
    delta: &Delta,
    content: &mut String,
    buffers: &mut Vec<ToolCallBuffer>,
    callbacks: &StreamCallbacks,
) {
    if let Some(text) = &delta.content {
        content.push_str(text);
        if let Some(on_content) = &callbacks.on_content {
            on_content(text);
        }
    }

    let Some(tool_calls) = &delta.tool_calls else {
        return;
    };
    for tc in tool_calls {
        let index = tc.index as usize;
        while buffers.len() <= index {
            buffers.push(ToolCallBuffer::default());
        }
        let buf = &mut buffers[index];
        if let Some(id) = &tc.id {
            buf.id.clone_from(id);
        }
        if let Some(function) = &tc.function {
            if let Some(name) = &function.name {
                buf.name.clone_from(name);
            }
            if let Some(args) = &function.arguments {
                buf.arguments.push_str(args);
            }
        }
        if !buf.announced && !buf.name.is_empty() {
            if buf.id.is_empty() {
                buf.id = format!("call_{}", Uuid::new_v4().simple());
            }
            buf.announced = true;
            if let Some(on_start) = &callbacks.on_tool_call_start {
                on_start(&buf.id, &buf.name);
            }
        }
    }
}

fn parse_arguments(raw: &str) -> serde_json::Map<String, serde_json::Value> {
    if raw.trim().is_empty() {
        return serde_json::Map::new();
    }
    match serde_json::from_str(raw) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(other) => {
            debug!("tool arguments are not an object: {}", other);
            serde_json::Map::new()
        }
        Err(e) => {
            debug!("failed to parse tool arguments: {} raw={}", e, raw);
            serde_json::Map::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Request encoding
// ---------------------------------------------------------------------------

fn build_request_body(request: &ChatRequest, stream: bool) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = request.messages.iter().map(message_to_wire).collect();

    let mut body = serde_json::json!({
        "model": request.params.model_id,
        "messages": messages,
    });

    if stream {
        body["stream"] = serde_json::json!(true);
        body["stream_options"] = serde_json::json!({"include_usage": true});
    }

    if !request.tools.is_empty() {
        let tools: Vec<serde_json::Value> = request
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        body["tools"] = serde_json::json!(tools);
    }

    if let Some(temperature) = request.params.temperature {
        body["temperature"] = serde_json::json!(temperature);
    }

    body
}

fn message_to_wire(msg: &Message) -> serde_json::Value {
    match msg {
        Message::System { content } => serde_json::json!({
            "role": "system",
            "content": content,
        }),
        Message::User { content } => serde_json::json!({
            "role": "user",
            "content": content,
        }),
        Message::Assistant {
            content,
            tool_calls,
        } => {
            let mut wire = serde_json::json!({
                "role": "assistant",
                "content": content,
            });
            if let Some(calls) = tool_calls {
                let calls: Vec<serde_json::Value> = calls
                    .iter()
                    .map(|c| {
                        serde_json::json!({
                            "id": c.id,
                            "type": "function",
                            "function": {
                                "name": c.name,
                                // arguments travel as a JSON-encoded string
                                "arguments": serde_json::Value::Object(c.arguments.clone()).to_string(),
                            }
                        })
                    })
                    .collect();
                wire["tool_calls"] = serde_json::json!(calls);
            }
            wire
        }
        Message::Tool {
            content,
            name,
            tool_call_id,
        } => serde_json::json!({
            "role": "tool",
            "content": content,
            "tool_call_id": tool_call_id,
            "name": name,
        }),
    }
}

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct Chunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: u64,
}

impl From<WireUsage> for Usage {
    fn from(u: WireUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            cached_tokens: u
                .prompt_tokens_details
                .map(|d| d.cached_tokens)
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ModelParams {
        ModelParams::new("gpt-4o", "test-key", "https://api.example.com/v1")
    }

    #[test]
    fn test_build_request_body_basic() {
        let request = ChatRequest {
            params: params().with_temperature(0.5),
            messages: vec![Message::system("You are helpful."), Message::user("Hello")],
            tools: vec![],
        };

        let body = build_request_body(&request, false);
        assert_eq!(body["model"], "gpt-4o");
        assert!(body.get("stream").is_none());
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["temperature"], 0.5);
    }

    #[test]
    fn test_build_request_body_streaming_with_tools() {
        let request = ChatRequest {
            params: params(),
            messages: vec![Message::user("List files")],
            tools: vec![ToolDefinition {
                name: "exec".into(),
                description: "Run a command".into(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            }],
        };

        let body = build_request_body(&request, true);
        assert!(body["stream"].as_bool().unwrap());
        assert!(body["stream_options"]["include_usage"].as_bool().unwrap());
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "exec");
    }

    #[test]
    fn test_assistant_tool_calls_encode_arguments_as_string() {
        let mut args = serde_json::Map::new();
        args.insert("city".into(), serde_json::json!("SF"));
        let request = ChatRequest {
            params: params(),
            messages: vec![
                Message::assistant_with_tool_calls("", vec![ToolCall::new("c1", "get_weather", args)]),
                Message::tool("{\"temp\":72}", "get_weather", "c1"),
            ],
            tools: vec![],
        };

        let body = build_request_body(&request, false);
        let call = &body["messages"][0]["tool_calls"][0];
        assert_eq!(call["id"], "c1");
        assert_eq!(call["type"], "function");
        assert_eq!(call["function"]["name"], "get_weather");
        // arguments must be a JSON-encoded string, not a nested object
        let raw = call["function"]["arguments"].as_str().unwrap();
        assert_eq!(serde_json::from_str::<serde_json::Value>(raw).unwrap()["city"], "SF");

        let tool_msg = &body["messages"][1];
        assert_eq!(tool_msg["role"], "tool");
        assert_eq!(tool_msg["tool_call_id"], "c1");
        assert_eq!(tool_msg["name"], "get_weather");
    }

    #[test]
    fn test_delta_assembly_fires_start_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let starts = Arc::new(AtomicUsize::new(0));
        let starts_clone = starts.clone();
        let callbacks = StreamCallbacks {
            on_content: None,
            on_tool_call_start: Some(Arc::new(move |id, name| {
                assert_eq!(id, "c1");
                assert_eq!(name, "get_weather");
                starts_clone.fetch_add(1, Ordering::SeqCst);
            })),
        };

        let mut content = String::new();
        let mut buffers = Vec::new();

        // name arrives before any arguments
        let first: Delta = serde_json::from_value(serde_json::json!({
            "tool_calls": [{"index": 0, "id": "c1", "function": {"name": "get_weather"}}]
        }))
        .unwrap();
        apply_delta(&first, &mut content, &mut buffers, &callbacks);

        // arguments arrive split across two fragments
        let second: Delta = serde_json::from_value(serde_json::json!({
            "tool_calls": [{"index": 0, "function": {"arguments": "{\"city\":"}}]
        }))
        .unwrap();
        apply_delta(&second, &mut content, &mut buffers, &callbacks);
        let third: Delta = serde_json::from_value(serde_json::json!({
            "tool_calls": [{"index": 0, "function": {"arguments": "\"SF\"}"}}]
        }))
        .unwrap();
        apply_delta(&third, &mut content, &mut buffers, &callbacks);

        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(buffers.len(), 1);
        let args = parse_arguments(&buffers[0].arguments);
        assert_eq!(args["city"], "SF");
    }

    #[test]
    fn test_parse_arguments_tolerates_garbage() {
        assert!(parse_arguments("").is_empty());
        assert!(parse_arguments("not json").is_empty());
        assert!(parse_arguments("[1,2]").is_empty());
        assert_eq!(parse_arguments("{\"a\":1}")["a"], 1);
    }
}
