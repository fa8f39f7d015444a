// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process queue used when `REDIS_URL` is unset. Non-persistent: queued
//! sends are lost on process restart, same caveat as [`crate::store::memory`].

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::QueueMessage;
use crate::queue::{MessageQueue, QueueError};

#[derive(Default)]
pub struct MemoryQueue {
    ready: Mutex<VecDeque<QueueMessage>>,
    delayed: Mutex<Vec<QueueMessage>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl MessageQueue for MemoryQueue {
    async fn enqueue(&self, message: QueueMessage) -> Result<(), QueueError> {
        self.ready.lock().await.push_back(message);
        Ok(())
    }

    async fn enqueue_delayed(&self, message: QueueMessage) -> Result<(), QueueError> {
        self.delayed.lock().await.push(message);
        Ok(())
    }

    async fn dequeue_ready(&self, max: usize) -> Result<Vec<QueueMessage>, QueueError> {
        let mut ready = self.ready.lock().await;
        let n = max.min(ready.len());
        Ok(ready.drain(..n).collect())
    }

    async fn promote_due(&self, now: DateTime<Utc>) -> Result<u64, QueueError> {
        let mut delayed = self.delayed.lock().await;
        let (mut due, still_waiting): (Vec<_>, Vec<_>) =
            delayed.drain(..).partition(|m| m.scheduled_at <= now);
        *delayed = still_waiting;
        // Promote in scheduled_at order, not enqueue order: two delay nodes
        // for the same conversation must fire in wake-time order even if
        // enqueued out of order (spec §5 delay ordering guarantee).
        due.sort_by_key(|m| m.scheduled_at);
        let count = due.len() as u64;
        let mut ready = self.ready.lock().await;
        for message in due {
            ready.push_back(message);
        }
        Ok(count)
    }

    async fn retry(&self, message: QueueMessage) -> Result<(), QueueError> {
        self.ready.lock().await.push_back(message);
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
