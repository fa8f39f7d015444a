// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Injectable time source so lock staleness, delay scheduling, and circuit
//! breaker timing are deterministic under test.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A source of monotonic and wall-clock time.
pub trait Clock: Send + Sync {
    /// Monotonic instant, used for durations (circuit breaker open windows,
    /// poll intervals).
    fn now_monotonic(&self) -> Instant;
    /// Wall-clock time, used for persisted timestamps (lock `acquired_at`,
    /// queue `scheduled_at`, conversation timestamps).
    fn now_utc(&self) -> chrono::DateTime<chrono::Utc>;
}

/// Real wall-clock / monotonic clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_monotonic(&self) -> Instant {
        Instant::now()
    }

    fn now_utc(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now()
    }
}

/// Fake clock for tests: starts at a fixed instant and only advances when
/// told to, so lock-TTL and circuit-breaker tests don't need real sleeps.
pub struct FakeClock {
    monotonic_base: Instant,
    /// Offset from `monotonic_base`, in milliseconds.
    offset_ms: AtomicI64,
    utc_base: chrono::DateTime<chrono::Utc>,
}

impl FakeClock {
    pub fn new(utc_base: chrono::DateTime<chrono::Utc>) -> Arc<Self> {
        Arc::new(Self { monotonic_base: Instant::now(), offset_ms: AtomicI64::new(0), utc_base })
    }

    /// Advance the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.offset_ms.fetch_add(delta.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_monotonic(&self) -> Instant {
        let offset = self.offset_ms.load(Ordering::SeqCst);
        self.monotonic_base + Duration::from_millis(offset.max(0) as u64)
    }

    fn now_utc(&self) -> chrono::DateTime<chrono::Utc> {
        let offset = self.offset_ms.load(Ordering::SeqCst);
        self.utc_base + chrono::Duration::milliseconds(offset)
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
