// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Three-tier token bucket rate limiter (spec §4.5): global, per-provider,
//! and per-device. An acquisition must pass all three tiers.
//!
//! Crate grounded on `sven-gateway`'s `governor`-based per-IP limiter
//! (`crates/sven-gateway/src/http/auth.rs`): direct (non-keyed) limiters for
//! the global and per-provider tiers, a `DashMapStateStore`-keyed limiter for
//! the per-device tier since the device set is open-ended.
//!
//! Note: `governor`'s `check`/`check_key` consume a token as part of the
//! check itself, so a request that passes the global tier but fails the
//! per-device tier still spends one global token. Acceptable here — the
//! global tier exists to bound aggregate load, not to give individual
//! callers a precise budget.

use std::num::NonZeroU32;

use governor::clock::DefaultClock;
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter};

type DirectLimiter = RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, DefaultClock>;
type DeviceLimiter = RateLimiter<String, DashMapStateStore<String>, DefaultClock>;

fn quota_per_minute(n: u32) -> Quota {
    Quota::per_minute(NonZeroU32::new(n.max(1)).unwrap_or(NonZeroU32::MIN))
}

/// Which upstream endpoint family a call targets, for the per-provider tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenRouter,
    OpenAi,
}

pub struct ThreeTierRateLimiter {
    global: DirectLimiter,
    openrouter: DirectLimiter,
    openai: DirectLimiter,
    per_device: DeviceLimiter,
}

impl ThreeTierRateLimiter {
    pub fn new(global_rpm: u32, openrouter_rpm: u32, openai_rpm: u32, per_device_rpm: u32) -> Self {
        Self {
            global: RateLimiter::direct(quota_per_minute(global_rpm)),
            openrouter: RateLimiter::direct(quota_per_minute(openrouter_rpm)),
            openai: RateLimiter::direct(quota_per_minute(openai_rpm)),
            per_device: RateLimiter::keyed(quota_per_minute(per_device_rpm)),
        }
    }

    /// spec §4.5 defaults: global 100rpm, OpenRouter 60rpm, OpenAI 40rpm,
    /// per-device 10rpm.
    pub fn with_spec_defaults() -> Self {
        Self::new(100, 60, 40, 10)
    }

    /// `true` iff the call passes the global tier, the `provider`-specific
    /// tier, and the `device_id` tier, in that order.
    pub fn acquire(&self, provider: LlmProvider, device_id: &str) -> bool {
        if self.global.check().is_err() {
            return false;
        }
        let provider_limiter = match provider {
            LlmProvider::OpenRouter => &self.openrouter,
            LlmProvider::OpenAi => &self.openai,
        };
        if provider_limiter.check().is_err() {
            return false;
        }
        self.per_device.check_key(&device_id.to_owned()).is_ok()
    }
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;
