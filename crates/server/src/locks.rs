// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session Lock Manager (C1): a short-TTL distributed mutex keyed by
//! (device, prospect) that deduplicates concurrent webhook deliveries.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::store::Store;

/// A held lock. Dropping this without calling [`SessionLockManager::release`]
/// leaks the row until TTL expiry — callers must pair every successful
/// `try_acquire` with exactly one `release`, on every exit path (spec §4.1).
#[derive(Debug, Clone)]
pub struct LockHandle {
    pub device_id: String,
    pub prospect_num: String,
}

pub struct SessionLockManager {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl SessionLockManager {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    /// Attempt to acquire the lock for (device, prospect). Returns `Some`
    /// handle on success. On store error, treats the attempt as already
    /// locked and returns `None` — an inbound message is dropped rather than
    /// risk double-processing (spec §4.1 failure policy).
    pub async fn try_acquire(&self, device_id: &str, prospect_num: &str) -> Option<LockHandle> {
        let now = self.clock.now_utc();
        match self.store.try_acquire_lock(device_id, prospect_num, now, self.ttl).await {
            Ok(true) => Some(LockHandle {
                device_id: device_id.to_owned(),
                prospect_num: prospect_num.to_owned(),
            }),
            Ok(false) => {
                tracing::debug!(device_id, prospect_num, "session lock already held");
                None
            }
            Err(err) => {
                tracing::warn!(device_id, prospect_num, %err, "session lock store error, treating as held");
                None
            }
        }
    }

    pub async fn release(&self, handle: LockHandle) {
        if let Err(err) = self.store.release_lock(&handle.device_id, &handle.prospect_num).await {
            tracing::warn!(
                device_id = %handle.device_id,
                prospect_num = %handle.prospect_num,
                %err,
                "failed to release session lock"
            );
        }
    }

    /// Opportunistic GC sweep, invoked by the Scheduler (spec §3 lifecycle).
    pub async fn gc_stale(&self) -> u64 {
        let cutoff = self.clock.now_utc() - chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::zero());
        match self.store.gc_stale_locks(cutoff).await {
            Ok(n) => n,
            Err(err) => {
                tracing::warn!(%err, "stale lock gc sweep failed");
                0
            }
        }
    }
}

#[cfg(test)]
#[path = "locks_tests.rs"]
mod tests;
