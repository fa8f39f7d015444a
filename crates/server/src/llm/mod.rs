// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LLM Client (L5): single call operation with circuit breaker, three-tier
//! rate limiting, and a response cache, over OpenRouter or OpenAI depending
//! on endpoint selection (spec §4.5).

pub mod cache;
pub mod circuit_breaker;
pub mod http;
pub mod rate_limit;

use serde::{Deserialize, Serialize};

/// A chat message role, as sent to the completions endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Which upstream endpoint family a call resolves to (spec §4.5 endpoint
/// selection rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    OpenRouter,
    OpenAi,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenRouter => "openrouter",
            Self::OpenAi => "openai",
        }
    }
}

/// Device ids pinned to the OpenAI endpoint with a hardcoded project-scoped
/// key, regardless of the device's own configured provider (spec §4.5).
pub const OPENAI_PINNED_DEVICES: &[&str] = &["SCHQ-S94", "SCHQ-S12"];
pub const OPENAI_PINNED_MODEL: &str = "gpt-4.1";

/// Select the endpoint for `device_id` per spec §4.5's hardcoded device list.
pub fn select_endpoint(device_id: &str) -> Endpoint {
    if OPENAI_PINNED_DEVICES.contains(&device_id) {
        Endpoint::OpenAi
    } else {
        Endpoint::OpenRouter
    }
}

/// A single `complete` call's parameters, resolved by the caller (flow
/// engine) before dispatch.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub device_id: String,
    /// Model override from the node, or the device's configured default.
    pub model: String,
    pub system_prompt: String,
    /// Conversation history, oldest first, already trimmed to the last N
    /// messages by the caller (spec §4.4: last N=10).
    pub history: Vec<Message>,
    pub user_input: String,
    /// `false` for `advanced_ai_prompt` calls: spec §4.5 excludes those from
    /// the response cache since drift between calls is expected there.
    pub cacheable: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self { temperature: 0.67, top_p: 1.0, repetition_penalty: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// The circuit breaker for this endpoint is open.
    CircuitOpen,
    /// A rate limit tier rejected this call.
    RateLimited,
    /// The request timed out.
    Timeout,
    /// The endpoint returned an error after exhausting retries.
    Upstream(String),
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CircuitOpen => write!(f, "circuit breaker open"),
            Self::RateLimited => write!(f, "rate limited"),
            Self::Timeout => write!(f, "request timed out"),
            Self::Upstream(msg) => write!(f, "upstream error: {msg}"),
        }
    }
}

impl std::error::Error for LlmError {}

/// Per-device key/model configuration, external to the core (device-settings
/// CRUD is out of scope per spec §1); the core is handed a resolver.
pub trait DeviceLlmConfig: Send + Sync {
    fn resolve(&self, device_id: &str) -> Option<DeviceLlmSettings>;
}

#[derive(Debug, Clone)]
pub struct DeviceLlmSettings {
    pub api_key: String,
    pub model: String,
}

#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;

    /// Per-endpoint circuit breaker state (`endpoint` → open?), for the
    /// introspection admin endpoint (SPEC_FULL.md §3). Clients with no
    /// breaker of their own report nothing.
    async fn breaker_status(&self) -> std::collections::HashMap<String, bool> {
        std::collections::HashMap::new()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
