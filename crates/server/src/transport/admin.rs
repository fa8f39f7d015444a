// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health and admin endpoints: dead-letter inspection and the human-takeover
//! toggle (spec §9).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::store::StoreError;
use crate::transport::AppState;

#[derive(Debug, Serialize)]
pub struct LlmStatusResponse {
    /// Endpoint name (e.g. `"openrouter"`, `"openai"`) → circuit breaker open?
    pub breakers: std::collections::HashMap<String, bool>,
}

/// `GET /api/v1/llm/status`. Read-only circuit breaker introspection for
/// operators (SPEC_FULL.md §3) — not the "analytics queries" spec.md §1
/// scopes out.
pub async fn llm_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(LlmStatusResponse { breakers: state.llm.breaker_status().await })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub app_env: String,
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse { status: "ok", app_env: state.app_env.clone() })
}

pub async fn list_dead_letters(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.list_failed().await {
        Ok(failed) => Json(failed).into_response(),
        Err(err) => AppError::degraded(err.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct SetHumanTakeoverRequest {
    pub human_takeover: bool,
}

/// `POST /api/v1/admin/conversations/{device_id}/{prospect_num}/human`. Does
/// not acquire the session lock; spec §9 documents the resulting race with
/// an in-flight inbound worker as open.
pub async fn set_human_takeover(
    Path((device_id, prospect_num)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetHumanTakeoverRequest>,
) -> impl IntoResponse {
    match state.conversations.set_human(&device_id, &prospect_num, req.human_takeover).await {
        Ok(()) => Json(serde_json::json!({"ok": true})).into_response(),
        Err(StoreError::NotFound) => AppError::invalid("conversation not found").into_response(),
        Err(err) => AppError::degraded(err.to_string()).into_response(),
    }
}
