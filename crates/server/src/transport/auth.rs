// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::{ErrorBody, ErrorResponse};
use crate::transport::AppState;

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate a Bearer token from HTTP headers. `expected == None` disables
/// auth entirely (spec §6: `ADMIN_AUTH_TOKEN` unset means admin auth is off).
fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ()> {
    let expected = match expected {
        Some(tok) => tok,
        None => return Ok(()),
    };

    let header = headers.get("authorization").and_then(|v| v.to_str().ok()).ok_or(())?;
    let token = header.strip_prefix("Bearer ").ok_or(())?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(())
    }
}

/// Axum middleware enforcing bearer auth on admin endpoints.
///
/// Exempt: `/api/v1/health` and `/api/v1/webhook/*` — providers authenticate
/// inbound deliveries by their own signature scheme, out of scope for the
/// core (spec §6).
pub async fn auth_layer(
    State(state): State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();

    if path == "/api/v1/health" || path.starts_with("/api/v1/webhook/") {
        return next.run(req).await;
    }

    if validate_bearer(req.headers(), state.admin_auth_token.as_deref()).is_err() {
        let body = ErrorResponse { error: ErrorBody { code: "UNAUTHORIZED".to_owned(), message: "missing or invalid bearer token".to_owned() } };
        return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    }

    next.run(req).await
}
