//! Router tests over a scripted gateway

use super::*;
use crate::attachment::DEFAULT_MAX_BYTES;
use crate::gateway::testing::MockGateway;
use crate::gateway::{GatewayError, Role};
use crate::prompts;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

const PDF_DATA_URL: &str = "data:application/pdf;base64,JVBERi0xLjQ=";

fn app() -> (Arc<MockGateway>, Router) {
    let gateway = Arc::new(MockGateway::new());
    let router = create_router(AppState::new(gateway.clone(), DEFAULT_MAX_BYTES));
    (gateway, router)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

/// POST a body verbatim, bypassing JSON serialization
async fn post_raw(app: &Router, uri: &str, body: &'static str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn send_json(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, method, uri, body).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// JSON payloads of every `data:` line in an SSE body
fn sse_payloads(body: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(body)
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .filter_map(|data| serde_json::from_str(data).ok())
        .collect()
}

#[tokio::test]
async fn test_version() {
    let (_, app) = app();
    let (status, body) = send(&app, "GET", "/version", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8_lossy(&body).starts_with("study-companion "));
}

#[tokio::test]
async fn test_analyze_requires_file_and_language() {
    let (gateway, app) = app();

    let (status, body) = send_json(&app, "POST", "/api/analyze", Some(json!({ "language": "Hindi" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "File data is required");

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/analyze",
        Some(json!({ "fileData": PDF_DATA_URL, "mimeType": "application/pdf" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Language is required");

    let (status, _) = send_json(
        &app,
        "POST",
        "/api/analyze",
        Some(json!({ "fileData": "data:application/zip;base64,UEs=", "language": "Hindi" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(gateway.recorded_requests().is_empty());
}

#[tokio::test]
async fn test_analyze_streams_content_then_done() {
    let (gateway, app) = app();
    gateway.queue_stream(vec![Ok("## Key".into()), Ok(" Concepts".into())]);

    let (status, body) = send(
        &app,
        "POST",
        "/api/analyze",
        Some(json!({
            "fileData": PDF_DATA_URL,
            "mimeType": "application/pdf",
            "language": "Hindi",
            "isInitialAnalysis": true,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        sse_payloads(&body),
        vec![
            json!({ "type": "content", "content": "## Key" }),
            json!({ "type": "content", "content": " Concepts" }),
            json!({ "type": "done" }),
        ]
    );
    assert_eq!(gateway.recorded_requests()[0].prompt, prompts::summary_prompt("Hindi"));
}

#[tokio::test]
async fn test_analyze_follow_up_uses_history() {
    let (gateway, app) = app();
    gateway.queue_stream(vec![Ok("Because light.".into())]);

    let (_, body) = send(
        &app,
        "POST",
        "/api/analyze",
        Some(json!({
            "fileData": PDF_DATA_URL,
            "mimeType": "application/pdf",
            "language": "English",
            "isInitialAnalysis": false,
            "userMessage": "Why green?",
            "chatHistory": [
                { "role": "user", "parts": [{ "text": "Summarize" }] },
                { "role": "model", "text": "Summary" },
            ],
        })),
    )
    .await;
    assert_eq!(sse_payloads(&body).last(), Some(&json!({ "type": "done" })));

    let request = &gateway.recorded_requests()[0];
    assert_eq!(request.prompt, "Why green?");
    assert_eq!(request.history.len(), 2);
    assert_eq!(request.history[0].text, "Summarize");
    assert_eq!(request.history[1].role, Role::Model);
    assert!(request.attachment.is_some());
}

#[tokio::test]
async fn test_analyze_rejects_history_out_of_order() {
    let (gateway, app) = app();

    for history in [
        json!([{ "role": "model", "text": "Summary" }]),
        json!([
            { "role": "user", "text": "Summarize" },
            { "role": "user", "text": "Again" },
        ]),
    ] {
        let (status, body) = send_json(
            &app,
            "POST",
            "/api/analyze",
            Some(json!({
                "fileData": PDF_DATA_URL,
                "mimeType": "application/pdf",
                "language": "English",
                "userMessage": "Why green?",
                "chatHistory": history,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid chat history"));
    }
    assert!(gateway.recorded_requests().is_empty());
}

#[tokio::test]
async fn test_malformed_json_gets_error_body() {
    let (gateway, app) = app();

    let (status, body) = post_raw(&app, "/api/analyze", r#"{"fileData": "#).await;
    assert!(status.is_client_error());
    assert!(body["error"].is_string());

    let (status, body) = post_raw(&app, "/api/quiz", r#"{"fileData": 7}"#).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].is_string());
    assert!(gateway.recorded_requests().is_empty());
}

#[test]
fn test_body_limit_saturates() {
    let gateway = Arc::new(MockGateway::new());
    assert_eq!(AppState::new(gateway.clone(), usize::MAX).body_limit(), usize::MAX);
    assert_eq!(AppState::new(gateway, 3).body_limit(), 4 + 1024 * 1024);
}

#[tokio::test]
async fn test_analyze_gateway_failure_is_terminal_error_event() {
    let (gateway, app) = app();
    gateway.queue_open_error(GatewayError::auth("bad key"));

    let (status, body) = send(
        &app,
        "POST",
        "/api/analyze",
        Some(json!({
            "fileData": PDF_DATA_URL,
            "language": "Hindi",
            "isInitialAnalysis": true,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        sse_payloads(&body),
        vec![json!({ "type": "error", "message": "bad key" })]
    );
}

#[tokio::test]
async fn test_quiz_never_hard_fails() {
    let (gateway, app) = app();
    gateway.queue_once(Ok("not a quiz".into()));

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/quiz",
        Some(json!({ "fileData": PDF_DATA_URL, "mimeType": "application/pdf" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["warning"], crate::quiz::FALLBACK_WARNING);
    assert_eq!(body["quiz"].as_array().unwrap().len(), 5);
    assert_eq!(body["quiz"][4]["id"], 5);

    let (status, body) = send_json(&app, "POST", "/api/quiz", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "File data is required");
}

#[tokio::test]
async fn test_quiz_success_has_no_warning() {
    let (gateway, app) = app();
    let questions: Vec<Value> = (0..5)
        .map(|i| {
            json!({
                "question": format!("Q{i}"),
                "options": ["a", "b", "c", "d"],
                "correctAnswer": 3,
                "explanation": "e",
            })
        })
        .collect();
    gateway.queue_once(Ok(format!("```json\n{}\n```", Value::Array(questions))));

    let (_, body) = send_json(
        &app,
        "POST",
        "/api/quiz",
        Some(json!({ "fileData": PDF_DATA_URL, "mimeType": "application/pdf" })),
    )
    .await;
    assert!(body.get("warning").is_none());
    assert_eq!(body["quiz"][0]["correctAnswer"], 3);
}

#[tokio::test]
async fn test_session_journey_over_http() {
    let (gateway, app) = app();
    gateway.queue_stream(vec![Ok("Summary text".into())]);

    let (status, session) = send_json(&app, "POST", "/api/sessions", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(session["phase"], "idle");
    let id = session["id"].as_str().unwrap().to_string();

    let (_, outcome) = send_json(
        &app,
        "POST",
        &format!("/api/sessions/{id}/analyze"),
        None,
    )
    .await;
    assert_eq!(outcome["applied"], false);
    assert!(outcome["reason"].is_string());

    let (_, outcome) = send_json(
        &app,
        "POST",
        &format!("/api/sessions/{id}/attachment"),
        Some(json!({ "fileData": "data:application/zip;base64,UEs=", "fileName": "a.zip" })),
    )
    .await;
    assert_eq!(outcome["applied"], false);
    assert_eq!(outcome["session"]["phase"], "idle");

    let (_, outcome) = send_json(
        &app,
        "POST",
        &format!("/api/sessions/{id}/attachment"),
        Some(json!({ "fileData": PDF_DATA_URL, "fileName": "cells.pdf" })),
    )
    .await;
    assert_eq!(outcome["applied"], true);
    assert_eq!(outcome["session"]["attachment"]["description"], "PDF Document");

    send_json(
        &app,
        "POST",
        &format!("/api/sessions/{id}/language"),
        Some(json!({ "language": "Hindi" })),
    )
    .await;
    let (_, outcome) = send_json(&app, "POST", &format!("/api/sessions/{id}/analyze"), None).await;
    assert_eq!(outcome["applied"], true);
    assert_eq!(outcome["session"]["phase"], "analyzing");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let session = loop {
        let (_, session) = send_json(&app, "GET", &format!("/api/sessions/{id}"), None).await;
        if session["phase"] == "results_ready" {
            break session;
        }
        assert!(tokio::time::Instant::now() < deadline, "analysis never finished");
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    assert_eq!(session["messages"].as_array().unwrap().len(), 2);
    assert_eq!(session["messages"][1]["text"], "Summary text");
    assert_eq!(session["actions"]["sendMessage"], true);

    let (status, _) = send_json(&app, "DELETE", &format!("/api/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send_json(&app, "GET", &format!("/api/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains(&id));
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let (_, app) = app();
    let (status, _) = send_json(&app, "POST", "/api/sessions/nope/quiz/next", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send_json(&app, "DELETE", "/api/sessions/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
