// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conversation Store (C2): CRUD over the per-(device, prospect) record,
//! with the `updateFlowTracking`/`appendLog` split spec §4.2 requires so
//! flow-position writes never clobber `conversation_log` or admin-owned
//! fields.
//!
//! Grounded on `crates/mux/src/credential/broker.rs`'s narrow, single-purpose
//! mutation methods (`set_token`, `add_account`) that never touch unrelated
//! fields — the same discipline applied here to keep `append_log` and
//! `update_flow_tracking` from sharing a write path.

use std::sync::Arc;

use crate::ai_parser::{CoalescedItem, ItemType};
use crate::domain::{Conversation, Flow};
use crate::store::{FlowTrackingUpdate, Store, StoreError};

pub struct ConversationRepository {
    store: Arc<dyn Store>,
}

impl ConversationRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn get(&self, device_id: &str, prospect_num: &str) -> Result<Option<Conversation>, StoreError> {
        self.store.get_conversation(device_id, prospect_num).await
    }

    /// Fetch the existing conversation, or create one with spec §4.2's
    /// creation defaults if none exists.
    pub async fn get_or_create(
        &self,
        device_id: &str,
        prospect_num: &str,
        prospect_name: Option<String>,
        flow: &Flow,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Conversation, StoreError> {
        if let Some(existing) = self.store.get_conversation(device_id, prospect_num).await? {
            return Ok(existing);
        }
        let conversation =
            Conversation::new_default(device_id.to_owned(), prospect_num.to_owned(), prospect_name, flow, now);
        match self.store.create_conversation(conversation.clone()).await {
            Ok(()) => Ok(conversation),
            Err(StoreError::AlreadyExists) => {
                // Lost a create race to another worker; the session lock
                // should make this impossible in practice, but fall back to
                // reading the winner's row rather than erroring.
                self.store
                    .get_conversation(device_id, prospect_num)
                    .await?
                    .ok_or(StoreError::NotFound)
            }
            Err(err) => Err(err),
        }
    }

    /// Updates only flow-position fields; never touches `conversation_log`,
    /// `stage`, `prospect_name`, `intro`, `niche`, or `human_takeover`.
    pub async fn update_flow_tracking(
        &self,
        device_id: &str,
        prospect_num: &str,
        update: FlowTrackingUpdate,
    ) -> Result<(), StoreError> {
        self.store.update_flow_tracking(device_id, prospect_num, update).await
    }

    /// Append one `USER: <quoted>` line.
    pub async fn append_user_line(
        &self,
        device_id: &str,
        prospect_num: &str,
        user_input: &str,
    ) -> Result<(), StoreError> {
        let line = format!("USER: {}", quote(user_input));
        self.store.append_log(device_id, prospect_num, std::slice::from_ref(&line)).await
    }

    /// Append `BOT`/`BOT_COMBINED` lines for a batch of coalesced response
    /// items, in order, in one atomic append. Text content is JSON-quoted;
    /// media items log the bare URL (spec §4.2).
    pub async fn append_response_items(
        &self,
        device_id: &str,
        prospect_num: &str,
        items: &[CoalescedItem],
    ) -> Result<(), StoreError> {
        if items.is_empty() {
            return Ok(());
        }
        let lines: Vec<String> = items
            .iter()
            .map(|item| {
                let prefix = if item.combined { "BOT_COMBINED" } else { "BOT" };
                match item.item_type {
                    ItemType::Text => format!("{prefix}: {}", quote(&item.content)),
                    ItemType::Image | ItemType::Audio | ItemType::Video => {
                        format!("{prefix}: {}", item.content)
                    }
                }
            })
            .collect();
        self.store.append_log(device_id, prospect_num, &lines).await
    }

    /// Append a single bare-text `BOT:` line (non-AI flow nodes: message,
    /// image, audio, video).
    pub async fn append_bot_line(
        &self,
        device_id: &str,
        prospect_num: &str,
        content: &str,
        quoted: bool,
    ) -> Result<(), StoreError> {
        let line = if quoted { format!("BOT: {}", quote(content)) } else { format!("BOT: {content}") };
        self.store.append_log(device_id, prospect_num, std::slice::from_ref(&line)).await
    }

    pub async fn update_stage(
        &self,
        device_id: &str,
        prospect_num: &str,
        stage: Option<String>,
    ) -> Result<(), StoreError> {
        self.store.update_stage(device_id, prospect_num, stage).await
    }

    pub async fn set_human(
        &self,
        device_id: &str,
        prospect_num: &str,
        human_takeover: bool,
    ) -> Result<(), StoreError> {
        // Deliberately does not acquire the session lock — spec §9 documents
        // this as an open race with an in-flight inbound worker.
        self.store.set_human(device_id, prospect_num, human_takeover).await
    }
}

/// JSON-encode a string for a log line, preserving embedded newlines.
/// `serde_json` always succeeds encoding a `&str`.
fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("{s:?}"))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
