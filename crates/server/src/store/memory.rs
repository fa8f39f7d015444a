// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory store used for the degraded (no `MYSQL_URI`) fallback mode.
//!
//! Shape follows `MuxState`'s `sessions: RwLock<HashMap<...>>` field: a
//! handful of `RwLock`-guarded maps, one per table, with no cross-table
//! transactions (none are required — callers only ever touch one table per
//! call in this store's contract).

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::{Conversation, FailedMessage, Flow, SessionLockRow};
use crate::store::{FlowTrackingUpdate, Store, StoreError};

type ConvKey = (String, String);

/// Non-persistent store: data does not survive a process restart, matching
/// spec §6's description of the `MYSQL_URI`-unset fallback.
#[derive(Default)]
pub struct MemoryStore {
    flows: RwLock<HashMap<String, Flow>>,
    conversations: RwLock<HashMap<ConvKey, Conversation>>,
    locks: RwLock<HashMap<ConvKey, SessionLockRow>>,
    failed: RwLock<Vec<FailedMessage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a flow for tests and for the degraded-mode bootstrap path.
    pub async fn put_flow(&self, flow: Flow) {
        self.flows.write().await.insert(flow.id.clone(), flow);
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn get_flow(&self, flow_id: &str) -> Result<Option<Flow>, StoreError> {
        Ok(self.flows.read().await.get(flow_id).cloned())
    }

    async fn get_conversation(
        &self,
        device_id: &str,
        prospect_num: &str,
    ) -> Result<Option<Conversation>, StoreError> {
        let key = (device_id.to_owned(), prospect_num.to_owned());
        Ok(self.conversations.read().await.get(&key).cloned())
    }

    async fn create_conversation(&self, conversation: Conversation) -> Result<(), StoreError> {
        let key = (conversation.device_id.clone(), conversation.prospect_num.clone());
        let mut conversations = self.conversations.write().await;
        if conversations.contains_key(&key) {
            return Err(StoreError::AlreadyExists);
        }
        conversations.insert(key, conversation);
        Ok(())
    }

    async fn update_flow_tracking(
        &self,
        device_id: &str,
        prospect_num: &str,
        update: FlowTrackingUpdate,
    ) -> Result<(), StoreError> {
        let key = (device_id.to_owned(), prospect_num.to_owned());
        let mut conversations = self.conversations.write().await;
        let conv = conversations.get_mut(&key).ok_or(StoreError::NotFound)?;
        conv.flow_id = update.flow_id;
        conv.current_node_id = update.current_node_id;
        conv.last_node_id = update.last_node_id;
        conv.waiting_for_reply = update.waiting_for_reply;
        conv.execution_status = update.execution_status;
        conv.execution_id = update.execution_id;
        conv.updated_at = Utc::now();
        Ok(())
    }

    async fn append_log(
        &self,
        device_id: &str,
        prospect_num: &str,
        lines: &[String],
    ) -> Result<(), StoreError> {
        let key = (device_id.to_owned(), prospect_num.to_owned());
        let mut conversations = self.conversations.write().await;
        let conv = conversations.get_mut(&key).ok_or(StoreError::NotFound)?;
        for line in lines {
            if !conv.conversation_log.is_empty() {
                conv.conversation_log.push('\n');
            }
            conv.conversation_log.push_str(line);
        }
        Ok(())
    }

    async fn update_stage(
        &self,
        device_id: &str,
        prospect_num: &str,
        stage: Option<String>,
    ) -> Result<(), StoreError> {
        let key = (device_id.to_owned(), prospect_num.to_owned());
        let mut conversations = self.conversations.write().await;
        let conv = conversations.get_mut(&key).ok_or(StoreError::NotFound)?;
        conv.stage = stage;
        Ok(())
    }

    async fn set_human(
        &self,
        device_id: &str,
        prospect_num: &str,
        human_takeover: bool,
    ) -> Result<(), StoreError> {
        let key = (device_id.to_owned(), prospect_num.to_owned());
        let mut conversations = self.conversations.write().await;
        let conv = conversations.get_mut(&key).ok_or(StoreError::NotFound)?;
        conv.human_takeover = human_takeover;
        Ok(())
    }

    async fn record_failed(&self, failed: FailedMessage) -> Result<(), StoreError> {
        self.failed.write().await.push(failed);
        Ok(())
    }

    async fn list_failed(&self) -> Result<Vec<FailedMessage>, StoreError> {
        Ok(self.failed.read().await.clone())
    }

    async fn try_acquire_lock(
        &self,
        device_id: &str,
        prospect_num: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let key = (device_id.to_owned(), prospect_num.to_owned());
        let mut locks = self.locks.write().await;
        let stale = match locks.get(&key) {
            None => true,
            Some(row) => now.signed_duration_since(row.acquired_at) >= chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()),
        };
        if !stale {
            return Ok(false);
        }
        locks.insert(
            key,
            SessionLockRow {
                device_id: device_id.to_owned(),
                prospect_num: prospect_num.to_owned(),
                acquired_at: now,
            },
        );
        Ok(true)
    }

    async fn release_lock(&self, device_id: &str, prospect_num: &str) -> Result<(), StoreError> {
        let key = (device_id.to_owned(), prospect_num.to_owned());
        self.locks.write().await.remove(&key);
        Ok(())
    }

    async fn gc_stale_locks(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut locks = self.locks.write().await;
        let before = locks.len();
        locks.retain(|_, row| row.acquired_at >= older_than);
        Ok((before - locks.len()) as u64)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
