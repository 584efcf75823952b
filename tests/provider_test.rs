//! HTTP-level tests of the OpenAI-compatible adapter.

use gsh_agent::provider::{
    ChatRequest, ModelParams, OpenAiCompatProvider, Provider, ProviderError, StreamCallbacks,
};
use gsh_agent::types::Message;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(server: &MockServer, messages: Vec<Message>) -> ChatRequest {
    ChatRequest {
        params: ModelParams::new("gpt-4o", "test-key", format!("{}/v1", server.uri())),
        messages,
        tools: vec![],
    }
}

#[tokio::test]
async fn test_chat_completion_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({"model": "gpt-4o"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{
                "message": {
                    "content": "Let me check.",
                    "tool_calls": [{
                        "id": "c1",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"city\":\"SF\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {
                "prompt_tokens": 12,
                "completion_tokens": 3,
                "prompt_tokens_details": {"cached_tokens": 4}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiCompatProvider::new();
    let response = provider
        .chat_completion(
            request(&server, vec![Message::user("weather in SF?")]),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.content, "Let me check.");
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].id, "c1");
    assert_eq!(response.tool_calls[0].name, "get_weather");
    assert_eq!(response.tool_calls[0].arguments["city"], "SF");
    assert_eq!(response.usage.prompt_tokens, 12);
    assert_eq!(response.usage.completion_tokens, 3);
    assert_eq!(response.usage.cached_tokens, 4);
}

#[tokio::test]
async fn test_chat_completion_http_error_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let provider = OpenAiCompatProvider::new();
    let err = provider
        .chat_completion(
            request(&server, vec![Message::user("hi")]),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Api(_)));
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn test_chat_completion_garbage_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let provider = OpenAiCompatProvider::new();
    let err = provider
        .chat_completion(
            request(&server, vec![Message::user("hi")]),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Decode(_)));
}

#[tokio::test]
async fn test_streaming_assembles_content_and_tool_calls() {
    let sse_body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Let me \"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"check.\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"c1\",\"function\":{\"name\":\"get_weather\"}}]}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"city\\\":\"}}]}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"SF\\\"}\"}}]}}]}\n\n",
        "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":9,\"completion_tokens\":2}}\n\n",
        "data: [DONE]\n\n",
    );

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(serde_json::json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw(sse_body, "text/event-stream"),
        )
        .mount(&server)
        .await;

    let chunks: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));
    let starts: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let chunks_clone = chunks.clone();
    let starts_clone = starts.clone();
    let callbacks = StreamCallbacks {
        on_content: Some(Arc::new(move |delta| {
            chunks_clone.lock().unwrap().push_str(delta);
        })),
        on_tool_call_start: Some(Arc::new(move |id, name| {
            starts_clone
                .lock()
                .unwrap()
                .push((id.to_string(), name.to_string()));
        })),
    };

    let provider = OpenAiCompatProvider::new();
    let response = provider
        .streaming_chat_completion(
            request(&server, vec![Message::user("weather in SF?")]),
            callbacks,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    // deltas reached the observer in emission order
    assert_eq!(*chunks.lock().unwrap(), "Let me check.");
    // start fired once, as soon as the name was known
    assert_eq!(
        *starts.lock().unwrap(),
        vec![("c1".to_string(), "get_weather".to_string())]
    );

    assert_eq!(response.content, "Let me check.");
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].arguments["city"], "SF");
    assert_eq!(response.usage.prompt_tokens, 9);
    assert_eq!(response.usage.completion_tokens, 2);
}

#[tokio::test]
async fn test_streaming_cancellation() {
    // a stream that never sends [DONE]; cancellation must end the call
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw(
                    "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n",
                    "text/event-stream",
                )
                .set_delay(std::time::Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        cancel_clone.cancel();
    });

    let provider = OpenAiCompatProvider::new();
    let err = provider
        .streaming_chat_completion(
            request(&server, vec![Message::user("hi")]),
            StreamCallbacks::default(),
            cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Cancelled));
}
