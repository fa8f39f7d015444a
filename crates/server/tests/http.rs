// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the flowbot HTTP API.
//!
//! Uses `axum_test::TestServer` — no real TCP needed.

use std::sync::Arc;

use axum_test::TestServer;

use flowbot::clock::FakeClock;
use flowbot::conversation::ConversationRepository;
use flowbot::dispatcher::Dispatcher;
use flowbot::flow_engine::FlowEngine;
use flowbot::llm::{CompletionRequest, LlmClient, LlmError};
use flowbot::locks::SessionLockManager;
use flowbot::queue::memory::MemoryQueue;
use flowbot::resolvers::NullDeviceFlowConfig;
use flowbot::store::memory::MemoryStore;
use flowbot::transport::{build_router, AppState};

struct CannedLlm;

#[async_trait::async_trait]
impl LlmClient for CannedLlm {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, LlmError> {
        Ok("Hello there".to_owned())
    }
}

fn test_server() -> TestServer {
    let clock = FakeClock::new(chrono::Utc::now());
    let store = Arc::new(MemoryStore::new());
    let conversations = Arc::new(ConversationRepository::new(store.clone()));
    let queue = Arc::new(MemoryQueue::new());
    let llm = Arc::new(CannedLlm);
    let flow_engine = Arc::new(FlowEngine::new(
        store.clone(),
        conversations.clone(),
        queue.clone(),
        llm.clone(),
        clock.clone(),
        "fallback",
    ));
    let locks = Arc::new(SessionLockManager::new(store.clone(), clock, std::time::Duration::from_secs(30)));
    let dispatcher = Arc::new(Dispatcher::new(
        locks,
        store.clone(),
        conversations.clone(),
        flow_engine,
        Arc::new(NullDeviceFlowConfig),
        llm.clone(),
        queue,
    ));

    let state = Arc::new(AppState {
        dispatcher,
        store,
        conversations,
        llm,
        admin_auth_token: Some("secret".to_owned()),
        app_env: "test".to_owned(),
    });

    TestServer::new(build_router(state)).expect("failed to create test server")
}

#[tokio::test]
async fn health_requires_no_auth() {
    let server = test_server();
    let resp = server.get("/api/v1/health").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["app_env"], "test");
}

#[tokio::test]
async fn admin_endpoint_rejects_missing_bearer_token() {
    let server = test_server();
    let resp = server.get("/api/v1/admin/dead-letters").await;
    resp.assert_status(axum::http::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_endpoint_accepts_correct_bearer_token() {
    let server = test_server();
    let resp = server
        .get("/api/v1/admin/dead-letters")
        .add_header(axum::http::header::AUTHORIZATION, "Bearer secret")
        .await;
    resp.assert_status_ok();

    let body: Vec<serde_json::Value> = resp.json();
    assert!(body.is_empty());
}

#[tokio::test]
async fn webhook_takes_the_ai_only_path_and_replies() {
    let server = test_server();
    let resp = server
        .post("/api/v1/webhook/wablas")
        .json(&serde_json::json!({
            "device_id": "D1",
            "prospect_num": "60123",
            "message_text": "hi there",
        }))
        .await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "processed");
}

#[tokio::test]
async fn webhook_does_not_require_bearer_auth() {
    let server = test_server();
    let resp = server
        .post("/api/v1/webhook/waha")
        .json(&serde_json::json!({
            "device_id": "D2",
            "prospect_num": "60999",
            "message_text": "hi",
        }))
        .await;
    resp.assert_status_ok();
}

#[tokio::test]
async fn human_takeover_toggle_requires_existing_conversation() {
    let server = test_server();
    let resp = server
        .post("/api/v1/admin/conversations/D1/60123/human")
        .add_header(axum::http::header::AUTHORIZATION, "Bearer secret")
        .json(&serde_json::json!({"human_takeover": true}))
        .await;
    resp.assert_status(axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn human_takeover_toggle_succeeds_for_existing_conversation() {
    let server = test_server();
    let webhook_resp = server
        .post("/api/v1/webhook/wablas")
        .json(&serde_json::json!({
            "device_id": "D1",
            "prospect_num": "60123",
            "message_text": "hi",
        }))
        .await;
    webhook_resp.assert_status_ok();

    let resp = server
        .post("/api/v1/admin/conversations/D1/60123/human")
        .add_header(axum::http::header::AUTHORIZATION, "Bearer secret")
        .json(&serde_json::json!({"human_takeover": true}))
        .await;
    resp.assert_status_ok();
}
