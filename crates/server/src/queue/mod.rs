// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound message queue: L3 in SPEC_FULL.md's layering.
//!
//! Two backends implement [`MessageQueue`]: [`redis::RedisQueue`] (production)
//! and [`memory::MemoryQueue`] (degraded-mode fallback when `REDIS_URL` is
//! unset). Both support immediate enqueue and delayed (scheduled) enqueue for
//! `delay` flow nodes, plus a bounded dead-letter path once a message exceeds
//! its retry budget.

pub mod memory;
pub mod redis;

use chrono::{DateTime, Utc};

use crate::domain::QueueMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    Unavailable(String),
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "queue unavailable: {msg}"),
        }
    }
}

impl std::error::Error for QueueError {}

/// Outbound/continuation message queue.
#[async_trait::async_trait]
pub trait MessageQueue: Send + Sync {
    /// Enqueue for immediate delivery.
    async fn enqueue(&self, message: QueueMessage) -> Result<(), QueueError>;

    /// Enqueue for delivery no earlier than `message.scheduled_at` (used for
    /// `delay` flow nodes — SPEC_FULL.md §3's outbound drain sweep polls this
    /// set and promotes due entries to the ready queue).
    async fn enqueue_delayed(&self, message: QueueMessage) -> Result<(), QueueError>;

    /// Pop up to `max` ready messages (immediate queue only) for a worker to
    /// process. Does not block if the queue is empty.
    async fn dequeue_ready(&self, max: usize) -> Result<Vec<QueueMessage>, QueueError>;

    /// Promote delayed messages whose `scheduled_at` is at or before `now`
    /// into the ready queue. Returns the number promoted.
    async fn promote_due(&self, now: DateTime<Utc>) -> Result<u64, QueueError>;

    /// Re-enqueue a message for retry, with `retries` already incremented by
    /// the caller.
    async fn retry(&self, message: QueueMessage) -> Result<(), QueueError>;
}
