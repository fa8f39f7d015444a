// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent store: flows, conversations, session locks, dead letters.
//!
//! Two backends implement the same [`Store`] trait: [`mysql::MySqlStore`]
//! (the production path) and [`memory::MemoryStore`] (the degraded-mode
//! fallback used when `MYSQL_URI` is unset, per spec §6).

pub mod memory;
pub mod mysql;

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::{Conversation, FailedMessage, Flow};

/// Store-layer failure. Maps to [`crate::error::ErrorKind::Degraded`] or
/// [`crate::error::ErrorKind::Invalid`] at the transport seam depending on
/// variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing database/connection is unavailable.
    Unavailable(String),
    /// A `create` call collided with an existing key.
    AlreadyExists,
    /// A lookup found no matching row.
    NotFound,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
            Self::AlreadyExists => write!(f, "key already exists"),
            Self::NotFound => write!(f, "not found"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Fields updated by [`Store::update_flow_tracking`]. Deliberately excludes
/// `conversation_log`, `stage`, `prospect_name`, `intro`, `niche`, and
/// `human_takeover` — spec §4.2 requires this split so flow-position writes
/// never clobber conversation history or admin-owned fields.
#[derive(Debug, Clone)]
pub struct FlowTrackingUpdate {
    pub flow_id: String,
    pub current_node_id: String,
    pub last_node_id: Option<String>,
    pub waiting_for_reply: bool,
    pub execution_status: crate::domain::ExecutionStatus,
    pub execution_id: String,
}

/// Persistent storage contract consumed by the core (spec §4.1, §4.2).
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn get_flow(&self, flow_id: &str) -> Result<Option<Flow>, StoreError>;

    async fn get_conversation(
        &self,
        device_id: &str,
        prospect_num: &str,
    ) -> Result<Option<Conversation>, StoreError>;

    /// Fails with [`StoreError::AlreadyExists`] if the key collides.
    async fn create_conversation(&self, conversation: Conversation) -> Result<(), StoreError>;

    /// Updates only flow-position fields. Must not touch `conversation_log`,
    /// `stage`, `prospect_name`, `intro`, `niche`, or `human_takeover`.
    async fn update_flow_tracking(
        &self,
        device_id: &str,
        prospect_num: &str,
        update: FlowTrackingUpdate,
    ) -> Result<(), StoreError>;

    /// Atomically appends `lines` to `conversation_log`. Never truncates.
    async fn append_log(
        &self,
        device_id: &str,
        prospect_num: &str,
        lines: &[String],
    ) -> Result<(), StoreError>;

    async fn update_stage(
        &self,
        device_id: &str,
        prospect_num: &str,
        stage: Option<String>,
    ) -> Result<(), StoreError>;

    async fn set_human(
        &self,
        device_id: &str,
        prospect_num: &str,
        human_takeover: bool,
    ) -> Result<(), StoreError>;

    async fn record_failed(&self, failed: FailedMessage) -> Result<(), StoreError>;

    async fn list_failed(&self) -> Result<Vec<FailedMessage>, StoreError>;

    /// Atomic `tryAcquire`: returns `true` iff no row exists for the key or
    /// the existing row's `acquired_at` is older than `ttl`. On `true`,
    /// upserts the row with `now`. Implementations must make this atomic
    /// with respect to concurrent callers on the same key (spec §4.1).
    async fn try_acquire_lock(
        &self,
        device_id: &str,
        prospect_num: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Unconditional delete.
    async fn release_lock(&self, device_id: &str, prospect_num: &str) -> Result<(), StoreError>;

    /// Deletes locks whose `acquired_at` predates `older_than`. Returns the
    /// number removed. Used by the scheduler's opportunistic GC sweep
    /// (SPEC_FULL.md §3).
    async fn gc_stale_locks(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError>;
}
