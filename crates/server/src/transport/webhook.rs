// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound webhook ingestion. Per-provider wire format decoding happens
//! upstream of this handler (spec §6); by the time a request reaches here it
//! is already a normalized [`WebhookPayload`].

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dispatcher::{DispatchOutcome, InboundMessage, MessageType};
use crate::transport::AppState;

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub device_id: String,
    pub prospect_num: String,
    #[serde(default)]
    pub prospect_name: Option<String>,
    #[serde(default)]
    pub message_text: String,
    #[serde(default = "default_message_type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub media_url: Option<String>,
}

fn default_message_type() -> MessageType {
    MessageType::Text
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
}

/// `POST /api/v1/webhook/{provider}`. `provider` identifies the inbound
/// channel for logging only — the payload has already been normalized.
pub async fn receive(
    Path(provider): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WebhookPayload>,
) -> impl IntoResponse {
    let message = InboundMessage {
        device_id: payload.device_id,
        prospect_num: payload.prospect_num,
        prospect_name: payload.prospect_name,
        message_text: payload.message_text,
        message_type: payload.message_type,
        timestamp: payload.timestamp.unwrap_or_else(Utc::now),
        media_url: payload.media_url,
    };

    tracing::debug!(provider = %provider, device_id = %message.device_id, "inbound webhook");

    match state.dispatcher.dispatch(message).await {
        Ok(DispatchOutcome::Processed(_)) => Json(WebhookResponse { status: "processed" }).into_response(),
        Ok(DispatchOutcome::Dropped) => Json(WebhookResponse { status: "dropped" }).into_response(),
        Err(err) => err.into_response(),
    }
}
