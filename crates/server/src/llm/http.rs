// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP-backed [`LlmClient`] over OpenRouter/OpenAI chat-completions
//! endpoints, wired through the circuit breaker, rate limiter, and response
//! cache (spec §4.5).
//!
//! Retry loop grounded on `crates/mux/src/credential/refresh.rs`'s
//! `refresh_with_retries` (exponential backoff, bounded attempts),
//! generalized from OAuth token refresh to a chat-completion call.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::json;

use crate::clock::Clock;
use crate::llm::cache::ResponseCache;
use crate::llm::circuit_breaker::CircuitBreaker;
use crate::llm::rate_limit::{LlmProvider, ThreeTierRateLimiter};
use crate::llm::{
    select_endpoint, CompletionOptions, CompletionRequest, DeviceLlmConfig, Endpoint, LlmClient,
    LlmError, Message, Role, OPENAI_PINNED_MODEL,
};

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct HttpLlmClient {
    client: Client,
    clock: Arc<dyn Clock>,
    device_config: Arc<dyn DeviceLlmConfig>,
    breaker: CircuitBreaker,
    rate_limiter: ThreeTierRateLimiter,
    cache: ResponseCache,
    openrouter_default_key: Option<String>,
    openai_hardcoded_key: Option<String>,
    max_retries: u32,
}

impl HttpLlmClient {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timeout: Duration,
        clock: Arc<dyn Clock>,
        device_config: Arc<dyn DeviceLlmConfig>,
        circuit_breaker_threshold: u32,
        circuit_breaker_open: Duration,
        cache_ttl: Duration,
        openrouter_default_key: Option<String>,
        openai_hardcoded_key: Option<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
            clock,
            device_config,
            breaker: CircuitBreaker::new(circuit_breaker_threshold, circuit_breaker_open),
            rate_limiter: ThreeTierRateLimiter::with_spec_defaults(),
            cache: ResponseCache::new(cache_ttl),
            openrouter_default_key,
            openai_hardcoded_key,
            max_retries,
        }
    }

    fn resolve_auth(&self, endpoint: Endpoint, device_id: &str, model_override: &str) -> Result<(String, String), LlmError> {
        match endpoint {
            Endpoint::OpenAi => {
                let key = self
                    .openai_hardcoded_key
                    .clone()
                    .ok_or_else(|| LlmError::Upstream("no OpenAI key configured".to_owned()))?;
                Ok((key, OPENAI_PINNED_MODEL.to_owned()))
            }
            Endpoint::OpenRouter => {
                let model = if !model_override.is_empty() { model_override.to_owned() } else { String::new() };
                match self.device_config.resolve(device_id) {
                    Some(settings) => {
                        let model = if model.is_empty() { settings.model } else { model };
                        Ok((settings.api_key, model))
                    }
                    None => {
                        let key = self
                            .openrouter_default_key
                            .clone()
                            .ok_or_else(|| LlmError::Upstream("no OpenRouter key configured".to_owned()))?;
                        Ok((key, model))
                    }
                }
            }
        }
    }

    async fn do_call(
        &self,
        endpoint: Endpoint,
        url: &str,
        api_key: &str,
        model: &str,
        request: &CompletionRequest,
        opts: CompletionOptions,
    ) -> Result<String, LlmError> {
        let mut messages = vec![json!({ "role": "system", "content": request.system_prompt })];
        for m in &request.history {
            messages.push(json!({ "role": role_str(m.role), "content": m.content }));
        }
        messages.push(json!({ "role": "user", "content": request.user_input }));

        let body = json!({
            "model": model,
            "messages": messages,
            "temperature": opts.temperature,
            "top_p": opts.top_p,
            "repetition_penalty": opts.repetition_penalty,
        });

        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { LlmError::Timeout } else { LlmError::Upstream(e.to_string()) })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Upstream(format!("{} ({status}): {text}", endpoint.as_str())));
        }

        let parsed: serde_json::Value =
            response.json().await.map_err(|e| LlmError::Upstream(e.to_string()))?;
        parsed
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_owned)
            .ok_or_else(|| LlmError::Upstream("missing choices[0].message.content".to_owned()))
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[async_trait::async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let endpoint = select_endpoint(&request.device_id);
        let provider = match endpoint {
            Endpoint::OpenRouter => LlmProvider::OpenRouter,
            Endpoint::OpenAi => LlmProvider::OpenAi,
        };

        let cache_key = request.cacheable.then(|| {
            let history: Vec<String> = request.history.iter().map(|m| m.content.clone()).collect();
            ResponseCache::key(&request.system_prompt, &request.user_input, &history)
        });
        if let Some(ref key) = cache_key {
            if let Some(cached) = self.cache.get(key).await {
                tracing::debug!(device_id = %request.device_id, "llm response cache hit");
                return Ok(cached);
            }
        }

        if !self.breaker.allow(endpoint.as_str(), self.clock.as_ref()).await {
            tracing::debug!(endpoint = endpoint.as_str(), "circuit breaker open, skipping call");
            return Err(LlmError::CircuitOpen);
        }

        if !self.rate_limiter.acquire(provider, &request.device_id) {
            return Err(LlmError::RateLimited);
        }

        let (api_key, model) = self.resolve_auth(endpoint, &request.device_id, &request.model)?;
        let url = match endpoint {
            Endpoint::OpenRouter => OPENROUTER_URL,
            Endpoint::OpenAi => OPENAI_URL,
        };
        let opts = CompletionOptions::default();

        let mut backoff = Duration::from_millis(500);
        let mut last_err = LlmError::Upstream("no attempts made".to_owned());
        for attempt in 0..=self.max_retries {
            match self.do_call(endpoint, url, &api_key, &model, &request, opts).await {
                Ok(text) => {
                    self.breaker.record_success(endpoint.as_str()).await;
                    if let Some(key) = cache_key {
                        self.cache.insert(key, text.clone()).await;
                    }
                    return Ok(text);
                }
                Err(err) => {
                    last_err = err;
                    if attempt == self.max_retries {
                        break;
                    }
                    tracing::debug!(attempt, err = %last_err, "llm call failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(8));
                }
            }
        }

        self.breaker.record_failure(endpoint.as_str(), self.clock.as_ref()).await;
        Err(last_err)
    }

    async fn breaker_status(&self) -> std::collections::HashMap<String, bool> {
        self.breaker.status().await
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
