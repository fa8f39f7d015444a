// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use chrono::Utc;

use super::*;
use crate::clock::FakeClock;
use crate::store::memory::MemoryStore;

fn manager(clock: Arc<FakeClock>) -> SessionLockManager {
    SessionLockManager::new(Arc::new(MemoryStore::new()), clock, Duration::from_secs(30))
}

#[tokio::test]
async fn second_concurrent_acquire_fails() {
    let clock = FakeClock::new(Utc::now());
    let manager = manager(clock);
    let first = manager.try_acquire("D1", "60123").await;
    assert!(first.is_some());
    let second = manager.try_acquire("D1", "60123").await;
    assert!(second.is_none());
}

#[tokio::test]
async fn release_then_acquire_succeeds() {
    let clock = FakeClock::new(Utc::now());
    let manager = manager(clock);
    let handle = manager.try_acquire("D1", "60123").await.unwrap();
    manager.release(handle).await;
    assert!(manager.try_acquire("D1", "60123").await.is_some());
}

#[tokio::test]
async fn stale_lock_is_reacquirable_after_ttl() {
    let clock = FakeClock::new(Utc::now());
    let manager = manager(Arc::clone(&clock));
    assert!(manager.try_acquire("D1", "60123").await.is_some());
    clock.advance(Duration::from_secs(31));
    assert!(manager.try_acquire("D1", "60123").await.is_some());
}
