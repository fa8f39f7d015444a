// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds, by what the caller should do about them (spec §7).

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error kinds classified by recovery strategy, not by subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Network blip, rate-limit: retry with backoff, surface only after
    /// retries are exhausted.
    Transient,
    /// Malformed webhook, unknown node id, parse failure: log, abandon this
    /// message, release the lock, do not retry.
    Invalid,
    /// Session lock already held: drop silently, the other holder responds.
    Conflict,
    /// Store or Redis unavailable: continue in fallback mode.
    Degraded,
    /// Misconfiguration: refuse to start.
    Fatal,
}

impl ErrorKind {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Transient => 503,
            Self::Invalid => 400,
            Self::Conflict => 409,
            Self::Degraded => 200,
            Self::Fatal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "TRANSIENT",
            Self::Invalid => "INVALID",
            Self::Conflict => "CONFLICT",
            Self::Degraded => "DEGRADED",
            Self::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An application-level error, tagged with its recovery `kind`.
#[derive(Debug)]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invalid, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Degraded, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody { code: self.kind.as_str().to_owned(), message: self.message.clone() }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for AppError {}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body() };
        (status, Json(body)).into_response()
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
