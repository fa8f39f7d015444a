// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use chrono::Utc;

use super::*;
use crate::clock::FakeClock;

#[tokio::test]
async fn closed_breaker_allows_calls() {
    let breaker = CircuitBreaker::new(5, Duration::from_secs(30));
    let clock = FakeClock::new(Utc::now());
    assert!(breaker.allow("openrouter", clock.as_ref()).await);
}

#[tokio::test]
async fn opens_after_threshold_consecutive_failures() {
    let breaker = CircuitBreaker::new(5, Duration::from_secs(30));
    let clock = FakeClock::new(Utc::now());
    for _ in 0..4 {
        breaker.record_failure("openrouter", clock.as_ref()).await;
        assert!(breaker.allow("openrouter", clock.as_ref()).await);
    }
    breaker.record_failure("openrouter", clock.as_ref()).await;
    assert!(!breaker.allow("openrouter", clock.as_ref()).await);
}

#[tokio::test]
async fn closes_after_open_duration_elapses() {
    let breaker = CircuitBreaker::new(5, Duration::from_secs(30));
    let clock = FakeClock::new(Utc::now());
    for _ in 0..5 {
        breaker.record_failure("openrouter", clock.as_ref()).await;
    }
    assert!(!breaker.allow("openrouter", clock.as_ref()).await);
    clock.advance(Duration::from_secs(31));
    assert!(breaker.allow("openrouter", clock.as_ref()).await);
}

#[tokio::test]
async fn success_resets_failure_count() {
    let breaker = CircuitBreaker::new(5, Duration::from_secs(30));
    let clock = FakeClock::new(Utc::now());
    for _ in 0..4 {
        breaker.record_failure("openrouter", clock.as_ref()).await;
    }
    breaker.record_success("openrouter").await;
    breaker.record_failure("openrouter", clock.as_ref()).await;
    assert!(breaker.allow("openrouter", clock.as_ref()).await);
}

#[tokio::test]
async fn breakers_are_independent_per_endpoint() {
    let breaker = CircuitBreaker::new(5, Duration::from_secs(30));
    let clock = FakeClock::new(Utc::now());
    for _ in 0..5 {
        breaker.record_failure("openrouter", clock.as_ref()).await;
    }
    assert!(!breaker.allow("openrouter", clock.as_ref()).await);
    assert!(breaker.allow("openai", clock.as_ref()).await);
}
