// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport: webhook ingestion, health, and admin endpoints.

pub mod admin;
pub mod auth;
pub mod webhook;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::conversation::ConversationRepository;
use crate::dispatcher::Dispatcher;
use crate::llm::LlmClient;
use crate::store::Store;

/// Shared state handed to every handler.
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<dyn Store>,
    pub conversations: Arc<ConversationRepository>,
    pub llm: Arc<dyn LlmClient>,
    pub admin_auth_token: Option<String>,
    pub app_env: String,
}

/// Build the axum `Router` with all flowbot routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(admin::health))
        // Inbound webhook ingestion, one path per provider channel
        .route("/api/v1/webhook/{provider}", post(webhook::receive))
        // Admin
        .route("/api/v1/admin/dead-letters", get(admin::list_dead_letters))
        .route(
            "/api/v1/admin/conversations/{device_id}/{prospect_num}/human",
            post(admin::set_human_takeover),
        )
        .route("/api/v1/llm/status", get(admin::llm_status))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
