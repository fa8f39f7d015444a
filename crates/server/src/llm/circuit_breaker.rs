// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-endpoint circuit breaker (spec §4.5): opens after `threshold`
//! consecutive failures, stays open for `open_duration`, and closes again on
//! the first success after that window elapses.
//!
//! Generalized from `crates/mux/src/upstream/health.rs`'s consecutive-failure
//! counter (`AtomicU32` + threshold-triggered eviction) into an explicit
//! open/closed state machine with a recovery window instead of eviction.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::clock::Clock;

#[derive(Debug, Clone, Copy, Default)]
struct EndpointState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Tracks open/closed state independently per endpoint key (e.g. `"openrouter"`,
/// `"openai"`).
pub struct CircuitBreaker {
    threshold: u32,
    open_duration: Duration,
    state: RwLock<HashMap<String, EndpointState>>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, open_duration: Duration) -> Self {
        Self { threshold, open_duration, state: RwLock::new(HashMap::new()) }
    }

    /// Whether a call to `key` is currently allowed. An open breaker whose
    /// `open_duration` has elapsed allows exactly one trial call through
    /// (half-open); its outcome decides whether the breaker closes again.
    pub async fn allow(&self, key: &str, clock: &dyn Clock) -> bool {
        let state = self.state.read().await;
        match state.get(key) {
            None => true,
            Some(entry) => match entry.opened_at {
                None => true,
                Some(opened_at) => clock.now_monotonic().duration_since(opened_at) >= self.open_duration,
            },
        }
    }

    pub async fn record_success(&self, key: &str) {
        let mut state = self.state.write().await;
        state.insert(key.to_owned(), EndpointState::default());
    }

    pub async fn record_failure(&self, key: &str, clock: &dyn Clock) {
        let mut state = self.state.write().await;
        let entry = state.entry(key.to_owned()).or_default();
        entry.consecutive_failures += 1;
        if entry.consecutive_failures >= self.threshold {
            entry.opened_at = Some(clock.now_monotonic());
        }
    }

    /// Snapshot of each known endpoint's open/closed state, for the
    /// introspection admin endpoint (SPEC_FULL.md §3).
    pub async fn status(&self) -> HashMap<String, bool> {
        self.state.read().await.iter().map(|(k, v)| (k.clone(), v.opened_at.is_some())).collect()
    }
}

#[cfg(test)]
#[path = "circuit_breaker_tests.rs"]
mod tests;
