// gptutils-core/src/client_tests.rs
#![cfg(test)]

use crate::tools::builtin::calculator_tool;
use crate::*;

use httpmock::prelude::*;
use serde_json::json;
use std::time::{Duration, Instant};

// --- Test Helpers ---

const COMPLETIONS_PATH: &str = "/v1/chat/completions";
const TEST_API_KEY: &str = "test-api-key";

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn test_client(server: &MockServer) -> ChatClient {
    let config = Config::new(TEST_API_KEY)
        .with_base_url(server.url("/v1"))
        .with_model("test-model");
    ChatClient::new(config).expect("valid test config")
}

fn sse_body(events: &[&str]) -> String {
    events
        .iter()
        .map(|event| format!("data: {}\n\n", event))
        .collect()
}

fn collecting_handler(out: &mut Vec<String>) -> impl FnMut(&str) -> Result<(), BoxError> + '_ {
    move |text: &str| {
        out.push(text.to_string());
        Ok(())
    }
}

// --- Non-streaming ---

#[tokio::test]
async fn test_chat_success_fills_model_and_id() {
    init_tracing();
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(COMPLETIONS_PATH)
                .header("authorization", "Bearer test-api-key")
                .header("content-type", "application/json")
                .json_body(json!({
                    "model": "test-model",
                    "messages": [{"role": "user", "content": "Ping"}],
                    "temperature": 0.0
                }));
            then.status(200).json_body(json!({
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Pong"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
            }));
        })
        .await;

    let client = test_client(&server);
    let request = ChatRequest::new(vec![Message::user("Ping")]).temperature(0.0);
    let response = client.chat(request).await.unwrap();

    mock.assert_async().await;
    assert!(response.id.starts_with("chatcmpl-"));
    assert_eq!(response.first_content(), "Pong");
    assert_eq!(response.choices[0].finish_reason, Some(FinishReason::Stop));
    assert_eq!(response.usage.unwrap().total_tokens, 4);
}

#[tokio::test]
async fn test_chat_non_success_status_carries_body() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(COMPLETIONS_PATH);
            then.status(401).body("Invalid API-key provided.");
        })
        .await;

    let client = test_client(&server);
    let err = client.simple_chat("Hello").await.unwrap_err();
    assert_eq!(err.status(), Some(reqwest::StatusCode::UNAUTHORIZED));
    match err {
        ChatError::Transport(TransportError::Status { body, .. }) => {
            assert_eq!(body, "Invalid API-key provided.")
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_chat_invalid_body_is_invalid_response() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(COMPLETIONS_PATH);
            then.status(200).body("<html>not json</html>");
        })
        .await;

    let client = test_client(&server);
    let err = client.simple_chat("Hello").await.unwrap_err();
    assert!(matches!(err, ChatError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_simple_chat_returns_first_choice() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path(COMPLETIONS_PATH)
                .body_contains(r#""content":"Hello""#);
            then.status(200).json_body(json!({
                "id": "chatcmpl-42",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hi!"}, "finish_reason": "stop"}]
            }));
        })
        .await;

    let client = test_client(&server);
    assert_eq!(client.simple_chat("Hello").await.unwrap(), "Hi!");
}

#[tokio::test]
async fn test_connection_failure_is_transport_error() {
    // Nothing listens on port 1.
    let config = Config::new(TEST_API_KEY).with_base_url("http://127.0.0.1:1/v1");
    let client = ChatClient::new(config).unwrap();
    let err = client.simple_chat("Hello").await.unwrap_err();
    assert!(matches!(err, ChatError::Transport(TransportError::Request(_))));
}

#[test]
fn test_client_rejects_invalid_config() {
    let err = ChatClient::new(Config::new("")).unwrap_err();
    assert!(matches!(err, ChatError::Config(ConfigError::MissingApiKey { .. })));
}

// --- Streaming ---

#[tokio::test]
async fn test_chat_stream_delivers_fragments_in_order() {
    init_tracing();
    let server = MockServer::start_async().await;
    let body = sse_body(&[
        r#"{"id":"c1","choices":[{"index":0,"delta":{"role":"assistant","content":""}}]}"#,
        r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"He"}}]}"#,
        r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"llo"},"finish_reason":"stop"}]}"#,
        r#"{"id":"c1","choices":[],"usage":{"prompt_tokens":5,"completion_tokens":2,"total_tokens":7}}"#,
        "[DONE]",
    ]);
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(COMPLETIONS_PATH)
                .header("accept", "text/event-stream")
                .json_body_partial(
                    r#"{"model":"test-model","stream":true,"stream_options":{"include_usage":true}}"#,
                );
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(body);
        })
        .await;

    let client = test_client(&server);
    let mut fragments = Vec::new();
    let summary = client
        .simple_chat_stream("Say hello", collecting_handler(&mut fragments))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(fragments, vec!["He", "llo"]);
    assert_eq!(fragments.concat(), "Hello");
    assert!(summary.completed);
    assert_eq!(summary.fragments, 2);
    assert_eq!(summary.finish_reason, Some(FinishReason::Stop));
    assert_eq!(summary.usage.map(|u| u.total_tokens), Some(7));
}

#[tokio::test]
async fn test_chat_stream_skips_malformed_lines() {
    let server = MockServer::start_async().await;
    let body = format!(
        "{}data: not-json\n\n: keep-alive\n\n{}",
        sse_body(&[r#"{"choices":[{"delta":{"content":"He"}}]}"#]),
        sse_body(&[r#"{"choices":[{"delta":{"content":"llo"}}]}"#, "[DONE]"]),
    );
    server
        .mock_async(|when, then| {
            when.method(POST).path(COMPLETIONS_PATH);
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(body);
        })
        .await;

    let client = test_client(&server);
    let mut fragments = Vec::new();
    let result = client
        .simple_chat_stream("Hi", collecting_handler(&mut fragments))
        .await;
    assert!(result.is_ok());
    assert_eq!(fragments, vec!["He", "llo"]);
}

#[tokio::test]
async fn test_chat_stream_without_sentinel_ends_cleanly() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(COMPLETIONS_PATH);
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(sse_body(&[r#"{"choices":[{"delta":{"content":"partial"}}]}"#]));
        })
        .await;

    let client = test_client(&server);
    let mut fragments = Vec::new();
    let summary = client
        .simple_chat_stream("Hi", collecting_handler(&mut fragments))
        .await
        .unwrap();
    assert!(!summary.completed);
    assert_eq!(fragments, vec!["partial"]);
}

#[tokio::test]
async fn test_chat_stream_non_success_never_reaches_handler() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(COMPLETIONS_PATH);
            // Looks like a valid stream, but the status must win.
            then.status(503).body(sse_body(&[
                r#"{"choices":[{"delta":{"content":"nope"}}]}"#,
                "[DONE]",
            ]));
        })
        .await;

    let client = test_client(&server);
    let mut calls = 0;
    let err = client
        .simple_chat_stream("Hi", |_text: &str| {
            calls += 1;
            Ok::<(), BoxError>(())
        })
        .await
        .unwrap_err();

    assert_eq!(calls, 0);
    match err {
        ChatError::Transport(TransportError::Status { status, body }) => {
            assert_eq!(status.as_u16(), 503);
            assert!(body.contains("nope"));
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_chat_stream_handler_error_propagates() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(COMPLETIONS_PATH);
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(sse_body(&[
                    r#"{"choices":[{"delta":{"content":"one"}}]}"#,
                    r#"{"choices":[{"delta":{"content":"two"}}]}"#,
                    r#"{"choices":[{"delta":{"content":"three"}}]}"#,
                    "[DONE]",
                ]));
        })
        .await;

    let client = test_client(&server);
    let mut delivered = Vec::new();
    let err = client
        .simple_chat_stream("Count", |text: &str| -> Result<(), BoxError> {
            if text == "two" {
                return Err("display closed".into());
            }
            delivered.push(text.to_string());
            Ok(())
        })
        .await
        .unwrap_err();

    assert_eq!(delivered, vec!["one"]);
    match err {
        ChatError::Handler(e) => assert_eq!(e.to_string(), "display closed"),
        other => panic!("expected handler error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_chat_stream_to_writer() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(COMPLETIONS_PATH);
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(sse_body(&[
                    r#"{"choices":[{"delta":{"content":"你好"}}]}"#,
                    r#"{"choices":[{"delta":{"content":"，世界"}}]}"#,
                    "[DONE]",
                ]));
        })
        .await;

    let client = test_client(&server);
    let mut out: Vec<u8> = Vec::new();
    let request = ChatRequest::new(vec![Message::user("Greet")]);
    client.chat_stream_to_writer(request, &mut out).await.unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "你好，世界");
}

// --- Cancellation ---

#[tokio::test]
async fn test_chat_stream_cancellation_is_an_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(COMPLETIONS_PATH);
            then.status(200)
                .delay(Duration::from_secs(5))
                .header("content-type", "text/event-stream")
                .body(sse_body(&["[DONE]"]));
        })
        .await;

    let client = test_client(&server);
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let err = client
        .chat_stream_with_cancel(
            ChatRequest::new(vec![Message::user("Slow")]),
            &token,
            |_text: &str| Ok::<(), BoxError>(()),
        )
        .await
        .unwrap_err();

    assert!(err.is_cancelled(), "unexpected error: {:?}", err);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_cancellation_after_first_fragment_keeps_delivered_text() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    // Sends one chunk, then keeps the connection open without writing more.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n";
        socket.write_all(head.as_bytes()).await.unwrap();
        let chunk = sse_body(&[r#"{"choices":[{"delta":{"content":"He"}}]}"#]);
        socket.write_all(chunk.as_bytes()).await.unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let config = Config::new(TEST_API_KEY).with_base_url(format!("http://{}/v1", addr));
    let client = ChatClient::new(config).unwrap();
    let token = CancellationToken::new();
    let canceller = token.clone();

    let started = Instant::now();
    let mut delivered = Vec::new();
    let err = client
        .chat_stream_with_cancel(
            ChatRequest::new(vec![Message::user("Stall")]),
            &token,
            |text: &str| {
                delivered.push(text.to_string());
                canceller.cancel();
                Ok::<(), BoxError>(())
            },
        )
        .await
        .unwrap_err();
    server.abort();

    assert!(err.is_cancelled(), "unexpected error: {:?}", err);
    assert_eq!(delivered, vec!["He"]);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_already_cancelled_token_sends_nothing() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path(COMPLETIONS_PATH);
            then.status(200).json_body(json!({"choices": []}));
        })
        .await;

    let client = test_client(&server);
    let token = CancellationToken::new();
    token.cancel();
    let err = client
        .chat_with_cancel(ChatRequest::new(vec![Message::user("Hi")]), &token)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(mock.hits_async().await, 0);
}

// --- Search ---

#[tokio::test]
async fn test_chat_with_search_sends_search_fields() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(COMPLETIONS_PATH)
                .json_body_partial(r#"{"enable_search":true,"search_options":{"forced_search":true}}"#);
            then.status(200).json_body(json!({
                "id": "chatcmpl-search",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Sunny today."}, "finish_reason": "stop"}]
            }));
        })
        .await;

    let client = test_client(&server);
    let response = client
        .chat_with_search("Weather in Hangzhou today?", SearchOptions::forced())
        .await
        .unwrap();
    mock.assert_async().await;
    assert_eq!(response.first_content(), "Sunny today.");
}

// --- Tool loop ---

fn tool_call_response(call_id: &str, name: &str, arguments: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-tools",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": call_id,
                    "type": "function",
                    "function": {"name": name, "arguments": arguments}
                }]
            },
            "finish_reason": "tool_calls"
        }]
    })
}

#[tokio::test]
async fn test_chat_with_tools_round_trip() {
    init_tracing();
    let server = MockServer::start_async().await;

    // The first request ends its messages array right after the user message;
    // the follow-up carries the tool result.
    let first = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(COMPLETIONS_PATH)
                .body_contains(r#""content":"What is 6*7?"}]"#)
                .body_contains(r#""name":"calculator""#);
            then.status(200).json_body(tool_call_response(
                "call_1",
                "calculator",
                r#"{"expression":"6*7"}"#,
            ));
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(COMPLETIONS_PATH)
                .body_contains(r#""role":"tool""#)
                .body_contains(r#""content":"6*7 = 42""#)
                .body_contains(r#""tool_call_id":"call_1""#);
            then.status(200).json_body(json!({
                "id": "chatcmpl-final",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "6*7 is 42."}, "finish_reason": "stop"}]
            }));
        })
        .await;

    let mut registry = ToolRegistry::new();
    registry.register(calculator_tool());

    let client = test_client(&server);
    let output = client
        .chat_with_tools(
            ChatRequest::new(vec![Message::user("What is 6*7?")]),
            &registry,
            0,
        )
        .await
        .unwrap();

    first.assert_async().await;
    second.assert_async().await;
    assert_eq!(output.response.first_content(), "6*7 is 42.");
    assert_eq!(output.tool_results.len(), 1);
    assert_eq!(output.tool_results[0].status, ToolExecutionStatus::Success);
    assert_eq!(output.tool_results[0].output, "6*7 = 42");
    // user, assistant tool call, tool result
    assert_eq!(output.messages.len(), 3);
    assert_eq!(output.messages[1].role, Role::Assistant);
    assert_eq!(output.messages[2].tool_call_id.as_deref(), Some("call_1"));
}

#[tokio::test]
async fn test_chat_with_tools_answers_unsupported_call_types() {
    let server = MockServer::start_async().await;
    let first = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(COMPLETIONS_PATH)
                .body_contains(r#""content":"Run it"}]"#);
            then.status(200).json_body(json!({
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_r",
                            "type": "retrieval",
                            "function": {"name": "lookup", "arguments": "{}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            }));
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(COMPLETIONS_PATH)
                .body_contains(r#""tool_call_id":"call_r""#)
                .body_contains("unsupported tool call type 'retrieval'");
            then.status(200).json_body(json!({
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Done."}, "finish_reason": "stop"}]
            }));
        })
        .await;

    let client = test_client(&server);
    let output = client
        .chat_with_tools(
            ChatRequest::new(vec![Message::user("Run it")]),
            &ToolRegistry::new(),
            0,
        )
        .await
        .unwrap();

    first.assert_async().await;
    second.assert_async().await;
    assert_eq!(output.response.first_content(), "Done.");
    assert_eq!(output.tool_results.len(), 1);
    assert_eq!(output.tool_results[0].status, ToolExecutionStatus::Failure);
    assert_eq!(output.messages[2].tool_call_id.as_deref(), Some("call_r"));
}

#[tokio::test]
async fn test_chat_with_tools_stops_at_iteration_limit() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path(COMPLETIONS_PATH);
            then.status(200)
                .json_body(tool_call_response("call_x", "missing_tool", "{}"));
        })
        .await;

    let registry = ToolRegistry::new();
    let client = test_client(&server);
    let output = client
        .chat_with_tools(ChatRequest::new(vec![Message::user("Loop")]), &registry, 2)
        .await
        .unwrap();

    assert_eq!(mock.hits_async().await, 2);
    assert_eq!(
        output.response.choices[0].finish_reason,
        Some(FinishReason::ToolCalls)
    );
    // Only the first round's call was executed; it names an unknown tool.
    assert_eq!(output.tool_results.len(), 1);
    assert_eq!(output.tool_results[0].status, ToolExecutionStatus::Failure);
    assert_eq!(
        output.tool_results[0].output,
        "Error executing tool: tool not found: missing_tool"
    );
}
