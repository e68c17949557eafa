//! Backend tests against a throwaway Ollama-shaped HTTP server.
//!
//! Run with: `cargo test -p glasswire-providers --test integration`

use axum::Router;
use axum::http::StatusCode;
use axum::routing::post;
use futures::StreamExt;
use serde_json::{Value, json};

use glasswire_core::config::BackendConfig;
use glasswire_providers::ollama::{OllamaChat, OllamaGenerate};
use glasswire_providers::{BackendError, CompletionBackend, GenerateRequest, StreamingBackend};

async fn chat_handler(axum::Json(body): axum::Json<Value>) -> String {
    assert_eq!(body["stream"], true);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["content"], "hello");
    [
        r#"{"model":"granite3.3:8b","message":{"role":"assistant","content":"Hi"},"done":false}"#,
        "garbage that is not json",
        r#"{"model":"granite3.3:8b","message":{"role":"assistant","content":" there"},"done":false}"#,
        r#"{"model":"granite3.3:8b","message":{"role":"assistant","content":"!"},"done":true}"#,
    ]
    .join("\n")
}

async fn generate_handler(axum::Json(body): axum::Json<Value>) -> axum::Json<Value> {
    assert_eq!(body["stream"], false);
    assert_eq!(body["system"], "You are terse.");
    axum::Json(json!({
        "model": body["model"],
        "response": format!("echo: {}", body["prompt"].as_str().unwrap_or_default()),
        "done": true,
    }))
}

async fn failing_handler() -> (StatusCode, &'static str) {
    (StatusCode::SERVICE_UNAVAILABLE, "model is loading")
}

/// Serve `router` on a free local port and return its base URL.
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

fn backend_config(base_url: String) -> BackendConfig {
    BackendConfig {
        base_url,
        model: "granite3.3:8b".into(),
    }
}

/// An address nothing is listening on.
fn dead_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

#[tokio::test]
async fn test_chat_stream_skips_malformed_lines() {
    let url = serve(Router::new().route("/api/chat", post(chat_handler))).await;
    let backend = OllamaChat::new(&backend_config(url));

    let stream = backend
        .stream(&GenerateRequest::new("You are terse.", "hello"))
        .await
        .expect("stream should open");
    let chunks: Vec<_> = stream.map(|c| c.unwrap()).collect().await;

    let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(contents, vec!["Hi", " there", "!"]);
    let dones: Vec<bool> = chunks.iter().map(|c| c.done).collect();
    assert_eq!(dones, vec![false, false, true]);
}

#[tokio::test]
async fn test_chat_unreachable_is_unavailable() {
    let backend = OllamaChat::new(&backend_config(dead_url()));
    let err = backend
        .stream(&GenerateRequest::new("sys", "hello"))
        .await
        .err()
        .expect("dead backend must fail");
    assert!(matches!(err, BackendError::Unreachable(_)));
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn test_chat_error_status_is_unavailable() {
    let url = serve(Router::new().route("/api/chat", post(failing_handler))).await;
    let backend = OllamaChat::new(&backend_config(url));

    let err = backend
        .stream(&GenerateRequest::new("sys", "hello"))
        .await
        .err()
        .expect("503 must fail");
    match &err {
        BackendError::Status { status, body } => {
            assert_eq!(*status, 503);
            assert_eq!(body, "model is loading");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn test_generate_returns_full_text() {
    let url = serve(Router::new().route("/api/generate", post(generate_handler))).await;
    let backend = OllamaGenerate::new(&backend_config(url));

    let text = backend
        .complete(&GenerateRequest::new("You are terse.", "hello"))
        .await
        .unwrap();
    assert_eq!(text, "echo: hello");
}

#[tokio::test]
async fn test_generate_unreachable() {
    let backend = OllamaGenerate::new(&backend_config(dead_url()));
    let err = backend
        .complete(&GenerateRequest::new("sys", "hello"))
        .await
        .unwrap_err();
    assert!(err.is_unavailable());
}
