use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use chatterbox_audio::{CommandLineBackend, EngineConfig};
use chatterbox_bridge::{router, serve, BridgeState};
use chatterbox_core::{CommandDispatcher, HostPlatform, ModelController, ShutdownSignal};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Dispatcher over a backend that finds no engine, so every generate uses the fallback
fn offline_state() -> BridgeState {
    let backend = Arc::new(CommandLineBackend::new(Some(EngineConfig::empty())));
    let controller =
        ModelController::new(backend).with_platform(HostPlatform::new("linux", "x86_64"));
    let dispatcher = CommandDispatcher::new(Arc::new(controller), ShutdownSignal::new())
        .with_grace(Duration::from_millis(20));
    BridgeState::new(Arc::new(dispatcher))
}

async fn post(state: &BridgeState, body: Value) -> (StatusCode, Value) {
    post_raw(state, body.to_string()).await
}

async fn post_raw(state: &BridgeState, body: String) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(Method::POST)
        .uri("/")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let resp = router(state.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health_ok() {
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = router(offline_state()).oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        body,
        json!({ "status": "success", "message": "Server is running" })
    );
}

#[tokio::test]
async fn test_init_then_generate_fallback() {
    let state = offline_state();
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("hello.wav");

    let (status, body) = post(&state, json!({ "command": "init", "parameters": {} })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["device"], "cpu");
    assert!(body["device_name"].as_str().unwrap().contains("x86_64"));

    let (status, body) = post(
        &state,
        json!({
            "command": "generate",
            "parameters": { "text": "a".repeat(20), "output_path": out }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["output_path"], out.to_string_lossy().as_ref());
    assert!(body["duration"].as_f64().is_some());
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("not available"));

    // 20 chars -> about 1 s of 16-bit mono at 22050 Hz, plus a 44 byte header
    let len = std::fs::metadata(&out).unwrap().len();
    assert!((44 + 2 * 22_040..=44 + 2 * 22_060).contains(&len));
}

#[tokio::test]
async fn test_generate_before_init_is_bad_request() {
    let (status, body) = post(
        &offline_state(),
        json!({
            "command": "generate",
            "parameters": { "text": "hi", "output_path": "/tmp/never.wav" }
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Model not initialized");
}

#[tokio::test]
async fn test_generate_missing_fields_is_bad_request() {
    let state = offline_state();
    post(&state, json!({ "command": "init" })).await;

    let (status, body) = post(
        &state,
        json!({ "command": "generate", "parameters": { "text": "hi" } }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "Missing required parameters: text and output_path"
    );
}

#[tokio::test]
async fn test_unknown_command_is_bad_request() {
    let (status, body) = post(
        &offline_state(),
        json!({ "command": "frobnicate", "parameters": {} }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Unknown command: frobnicate");
}

#[tokio::test]
async fn test_invalid_json_is_server_error() {
    let (status, body) = post_raw(&offline_state(), "this is not json".to_string()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_catastrophic_generate_is_server_error() {
    let state = offline_state();
    post(&state, json!({ "command": "init" })).await;
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("no-such-dir").join("x.wav");

    let (status, body) = post(
        &state,
        json!({
            "command": "generate",
            "parameters": { "text": "hi", "output_path": out }
        }),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Generation failed"));
}

#[tokio::test]
async fn test_shutdown_command_stops_server() {
    let state = offline_state();
    let signal = state.dispatcher.shutdown_signal().clone();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve(listener, state.dispatcher.clone(), signal.clone()));

    let client = reqwest::Client::new();
    let health: Value = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["message"], "Server is running");

    let resp = client
        .post(format!("http://{}/", addr))
        .json(&json!({ "command": "shutdown" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Server shutting down");

    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
    assert!(signal.is_triggered());
}
