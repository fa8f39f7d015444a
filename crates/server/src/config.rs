// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime configuration, all overridable from the environment (spec §6).

use std::time::Duration;

/// Configuration for the flowbot automation server.
#[derive(Debug, Clone, clap::Args)]
pub struct AppConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080, env = "PORT")]
    pub port: u16,

    /// Deployment environment tag (e.g. "production", "staging").
    #[arg(long, default_value = "development", env = "APP_ENV")]
    pub app_env: String,

    /// Bearer token for admin endpoint auth. If unset, admin auth is disabled.
    #[arg(long, env = "ADMIN_AUTH_TOKEN")]
    pub admin_auth_token: Option<String>,

    /// MySQL connection string. If unset, the service runs in degraded
    /// (in-memory, non-persistent) store mode.
    #[arg(long, env = "MYSQL_URI")]
    pub mysql_uri: Option<String>,

    /// Redis connection string for the message queue. If unset, the service
    /// falls back to an in-process queue.
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Default OpenRouter API key used when a device has none configured.
    #[arg(long, env = "OPENROUTER_DEFAULT_KEY")]
    pub openrouter_default_key: Option<String>,

    /// Project-scoped OpenAI key used for the hardcoded pinned-device
    /// endpoint override (spec §4.5).
    #[arg(long, env = "OPENAI_PINNED_API_KEY")]
    pub openai_pinned_api_key: Option<String>,

    /// OpenRouter request timeout, seconds.
    #[arg(long, default_value_t = 15, env = "OPENROUTER_TIMEOUT")]
    pub openrouter_timeout_secs: u64,

    /// Max LLM call retries before surfacing a fallback reply.
    #[arg(long, default_value_t = 3, env = "OPENROUTER_MAX_RETRIES")]
    pub openrouter_max_retries: u32,

    /// Caps the outbound worker pool size and concurrent WebSocket
    /// connection count.
    #[arg(long, default_value_t = 50, env = "MAX_CONCURRENT_USERS")]
    pub max_concurrent_users: usize,

    /// Session lock TTL, seconds. A lock older than this is stale and
    /// replaceable by the next acquirer.
    #[arg(long, default_value_t = 30, env = "SESSION_LOCK_TTL_SECS")]
    pub session_lock_ttl_secs: u64,

    /// Scheduler sweep period, milliseconds.
    #[arg(long, default_value_t = 5000, env = "SCHEDULER_PERIOD_MS")]
    pub scheduler_period_ms: u64,

    /// Max send/LLM retries for a queued message before it moves to the
    /// dead-letter stream.
    #[arg(long, default_value_t = 3, env = "MESSAGE_MAX_RETRIES")]
    pub message_max_retries: u32,

    /// Provider HTTP send timeout, seconds.
    #[arg(long, default_value_t = 30, env = "PROVIDER_TIMEOUT_SECS")]
    pub provider_timeout_secs: u64,

    /// Store round-trip timeout, seconds.
    #[arg(long, default_value_t = 5, env = "STORE_TIMEOUT_SECS")]
    pub store_timeout_secs: u64,

    /// Consecutive LLM failures before the circuit breaker opens.
    #[arg(long, default_value_t = 5, env = "LLM_CIRCUIT_BREAKER_THRESHOLD")]
    pub llm_circuit_breaker_threshold: u32,

    /// How long the circuit breaker stays open once tripped, seconds.
    #[arg(long, default_value_t = 30, env = "LLM_CIRCUIT_BREAKER_OPEN_SECS")]
    pub llm_circuit_breaker_open_secs: u64,

    /// LLM response cache TTL, seconds.
    #[arg(long, default_value_t = 300, env = "LLM_CACHE_TTL_SECS")]
    pub llm_cache_ttl_secs: u64,

    /// Reply sent in place of an AI prompt node's output when the LLM call
    /// fails after exhausting retries (spec §4.3).
    #[arg(
        long,
        default_value = "Sorry, I'm having trouble responding right now. Please try again in a moment.",
        env = "AI_FALLBACK_TEXT"
    )]
    pub ai_fallback_text: String,
}

impl AppConfig {
    pub fn session_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.session_lock_ttl_secs)
    }

    pub fn scheduler_period(&self) -> Duration {
        Duration::from_millis(self.scheduler_period_ms)
    }

    pub fn openrouter_timeout(&self) -> Duration {
        Duration::from_secs(self.openrouter_timeout_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn llm_circuit_breaker_open(&self) -> Duration {
        Duration::from_secs(self.llm_circuit_breaker_open_secs)
    }

    pub fn llm_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.llm_cache_ttl_secs)
    }
}
