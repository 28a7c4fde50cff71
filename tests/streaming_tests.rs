//! Streaming relay tests: NDJSON backend chunks in, SSE frames out.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use ollamao::{
    api::{chat_completions, AppState, UpstreamClient},
    core::{
        config::{GatewayConfig, KeyConfig, ModelEntry, ServerConfig},
        hash_key, init_metrics, request_id_middleware,
    },
    services::ModelRegistry,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

const TEST_KEY: &str = "sk-ollamao-stream-test";

fn create_test_app(mock_server: &MockServer, idle_timeout: Duration) -> Router {
    create_test_app_at(*mock_server.address(), idle_timeout)
}

fn create_test_app_at(addr: std::net::SocketAddr, idle_timeout: Duration) -> Router {
    init_metrics();

    let mut models = HashMap::new();
    models.insert(
        "llama3".to_string(),
        ModelEntry {
            name: "llama3".to_string(),
            host: addr.ip().to_string(),
            port: addr.port(),
            model: "llama3:8b".to_string(),
            quant: None,
            timeout: 5,
        },
    );

    let mut keys = HashMap::new();
    keys.insert(
        hash_key(TEST_KEY),
        KeyConfig {
            name: "stream-tester".to_string(),
            quota: "unlimited".to_string(),
            enabled: true,
        },
    );

    let config = GatewayConfig {
        models,
        keys,
        server: ServerConfig::default(),
        stream_idle_timeout_secs: idle_timeout.as_secs(),
    };

    let state = Arc::new(AppState {
        registry: ModelRegistry::new(&config),
        upstream: UpstreamClient::new(reqwest::Client::new(), idle_timeout),
    });

    Router::new()
        .route(
            "/v1/chat/completions",
            axum::routing::post(chat_completions),
        )
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(state)
}

fn streaming_request() -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", TEST_KEY))
        .body(Body::from(
            json!({
                "model": "llama3",
                "messages": [{"role": "user", "content": "hello"}],
                "stream": true
            })
            .to_string(),
        ))
        .unwrap()
}

/// Collect the raw SSE frames from a response body, without the `data: `
/// prefix.
async fn collect_frames(response: axum::response::Response) -> Vec<String> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    text.split("\n\n")
        .filter(|s| !s.is_empty())
        .map(|s| s.strip_prefix("data: ").unwrap_or(s).to_string())
        .collect()
}

fn ndjson(lines: &[Value]) -> String {
    lines
        .iter()
        .map(|v| v.to_string() + "\n")
        .collect::<String>()
}

#[tokio::test]
async fn test_stream_relays_chunks_in_order() {
    let mock_server = MockServer::start().await;

    let body = ndjson(&[
        json!({"message": {"role": "assistant", "content": "Hel"}, "done": false}),
        json!({"message": {"role": "assistant", "content": "lo"}, "done": false}),
        json!({"message": {"role": "assistant", "content": "!"}, "done": false}),
        json!({"done": true, "prompt_eval_count": 7, "eval_count": 3}),
    ]);

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = create_test_app(&mock_server, Duration::from_secs(5));
    let response = app.oneshot(streaming_request()).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );

    let frames = collect_frames(response).await;
    // role + 3 content + stop + [DONE]
    assert_eq!(frames.len(), 6);

    let role: Value = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!(role["choices"][0]["delta"]["role"], "assistant");
    assert_eq!(role["object"], "chat.completion.chunk");
    assert_eq!(role["model"], "llama3");

    let contents: Vec<String> = frames[1..4]
        .iter()
        .map(|f| {
            let v: Value = serde_json::from_str(f).unwrap();
            v["choices"][0]["delta"]["content"]
                .as_str()
                .unwrap()
                .to_string()
        })
        .collect();
    assert_eq!(contents, vec!["Hel", "lo", "!"]);

    let stop: Value = serde_json::from_str(&frames[4]).unwrap();
    assert_eq!(stop["choices"][0]["finish_reason"], "stop");

    assert_eq!(frames[5], "[DONE]");
}

#[tokio::test]
async fn test_stream_chunk_ids_are_consistent() {
    let mock_server = MockServer::start().await;

    let body = ndjson(&[
        json!({"message": {"role": "assistant", "content": "hi"}, "done": false}),
        json!({"done": true}),
    ]);

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&mock_server)
        .await;

    let app = create_test_app(&mock_server, Duration::from_secs(5));
    let response = app.oneshot(streaming_request()).await.unwrap();

    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();

    let frames = collect_frames(response).await;
    let expected_id = format!("chatcmpl-{}", request_id);
    for frame in &frames[..frames.len() - 1] {
        let v: Value = serde_json::from_str(frame).unwrap();
        assert_eq!(v["id"].as_str().unwrap(), expected_id);
    }
}

#[tokio::test]
async fn test_truncated_stream_ends_with_error_frame() {
    let mock_server = MockServer::start().await;

    // Body ends without a done marker
    let body = ndjson(&[
        json!({"message": {"role": "assistant", "content": "par"}, "done": false}),
        json!({"message": {"role": "assistant", "content": "tial"}, "done": false}),
    ]);

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&mock_server)
        .await;

    let app = create_test_app(&mock_server, Duration::from_secs(5));
    let response = app.oneshot(streaming_request()).await.unwrap();

    // The connection was committed before truncation was visible
    assert_eq!(response.status(), StatusCode::OK);

    let frames = collect_frames(response).await;
    // role + 2 content + error + [DONE]
    assert_eq!(frames.len(), 5);

    let error: Value = serde_json::from_str(&frames[3]).unwrap();
    assert_eq!(error["error"]["type"], "stream_truncated");

    // Even a failed stream terminates explicitly
    assert_eq!(frames[4], "[DONE]");
}

#[tokio::test]
async fn test_malformed_lines_are_skipped() {
    let mock_server = MockServer::start().await;

    let body = format!(
        "{}not json at all\n{}",
        ndjson(&[
            json!({"message": {"role": "assistant", "content": "ok"}, "done": false}),
        ]),
        ndjson(&[json!({"done": true})]),
    );

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&mock_server)
        .await;

    let app = create_test_app(&mock_server, Duration::from_secs(5));
    let response = app.oneshot(streaming_request()).await.unwrap();
    let frames = collect_frames(response).await;

    // role + 1 content + stop + [DONE]: the junk line produced nothing
    assert_eq!(frames.len(), 4);
    assert_eq!(frames[3], "[DONE]");
}

/// Minimal backend that sends one chunk, then stalls without closing.
async fn spawn_stalling_backend() -> std::net::SocketAddr {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        // Drain the request headers/body; content is irrelevant here
        let _ = socket.read(&mut buf).await;

        let line = r#"{"message":{"role":"assistant","content":"slow"},"done":false}"#;
        let chunk = format!("{}\n", line);
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\ntransfer-encoding: chunked\r\n\r\n{:x}\r\n{}\r\n",
            chunk.len(),
            chunk
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.flush().await.unwrap();

        // Hold the connection open well past the idle deadline
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    addr
}

/// Backend that accepts the TCP connection but never sends a response.
async fn spawn_silent_backend() -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(socket);
    });

    addr
}

#[tokio::test]
async fn test_unresponsive_backend_times_out_before_any_frame() {
    let addr = spawn_silent_backend().await;
    let app = create_test_app_at(addr, Duration::from_millis(200));

    // The request must resolve within the idle deadline, not hang on the
    // header wait
    let response = tokio::time::timeout(Duration::from_secs(2), app.oneshot(streaming_request()))
        .await
        .expect("request should time out, not hang")
        .unwrap();

    // Nothing was streamed yet, so this is a plain error response
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["type"], "upstream_timeout");
}

#[tokio::test]
async fn test_idle_upstream_times_out() {
    let addr = spawn_stalling_backend().await;
    let app = create_test_app_at(addr, Duration::from_millis(200));
    let response = app.oneshot(streaming_request()).await.unwrap();
    let frames = collect_frames(response).await;

    // role + 1 content + error + [DONE]
    assert_eq!(frames.len(), 4);
    let error: Value = serde_json::from_str(&frames[2]).unwrap();
    assert_eq!(error["error"]["type"], "upstream_timeout");
    assert_eq!(frames[3], "[DONE]");
}

#[tokio::test]
async fn test_upstream_refusal_is_an_http_error_not_a_stream() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(404).set_body_string("model not loaded"))
        .mount(&mock_server)
        .await;

    let app = create_test_app(&mock_server, Duration::from_secs(5));
    let response = app.oneshot(streaming_request()).await.unwrap();

    // Refusal happens before any frame is written, so the client gets a
    // plain JSON error, not an SSE body
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["type"], "upstream_error");
}
