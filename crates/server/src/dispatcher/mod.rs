// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound Dispatcher (C5): takes one normalized inbound webhook message,
//! acquires the session lock, selects the AI-only or flow-driven path, and
//! routes the result to the outbound queue (spec §4's control-flow summary:
//! "Dispatcher → Session Lock → (Flow Engine ↔ AI Response Parser → LLM
//! Client) → Conversation Store update → Message Queue enqueue → Provider
//! Gateway send").
//!
//! Grounded on `crates/mux/src/transport/http.rs::register_session`'s shape:
//! validate, then take the contention-sensitive lock, then react to the
//! outcome — generalized from session registration to per-message dispatch,
//! with the lock always released on every exit path rather than held for a
//! session's lifetime.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use uuid::Uuid;

use crate::ai_parser::{self, CoalescedItem, ItemType};
use crate::conversation::ConversationRepository;
use crate::domain::{Flow, Node, NodeKind, QueueMessage, QueueMessageKind};
use crate::error::AppError;
use crate::flow_engine::{self, EngineState, FlowEngine, FlowEngineError};
use crate::llm::{CompletionRequest, LlmClient};
use crate::locks::SessionLockManager;
use crate::queue::{MessageQueue, QueueError};
use crate::store::StoreError;

const AI_ONLY_HISTORY_LIMIT: usize = 10;

/// One normalized inbound message, after provider-specific decoding (spec
/// §6). The core never sees a provider's wire format.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub device_id: String,
    pub prospect_num: String,
    pub prospect_name: Option<String>,
    pub message_text: String,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
    pub media_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    Audio,
    Video,
}

/// Outcome of dispatching one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Processed to completion, by whichever of the two paths.
    Processed(EngineState),
    /// A concurrent delivery for the same (device, prospect) already held
    /// the session lock; this one was dropped (spec §7 `Conflict`).
    Dropped,
}

/// Resolves which flow, if any, drives a given device's conversations.
/// `None` routes the device down the AI-only path. Device/flow assignment
/// storage is out of scope for the core (spec §1); the core is handed a
/// resolver.
pub trait DeviceFlowConfig: Send + Sync {
    fn resolve_flow(&self, device_id: &str) -> Option<String>;
}

const AI_ONLY_SYSTEM_PROMPT: &str =
    "You are a helpful assistant responding to a WhatsApp conversation. Keep replies short.";

pub struct Dispatcher {
    locks: Arc<SessionLockManager>,
    store: Arc<dyn crate::store::Store>,
    conversations: Arc<ConversationRepository>,
    flow_engine: Arc<FlowEngine>,
    flow_config: Arc<dyn DeviceFlowConfig>,
    llm: Arc<dyn LlmClient>,
    queue: Arc<dyn MessageQueue>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        locks: Arc<SessionLockManager>,
        store: Arc<dyn crate::store::Store>,
        conversations: Arc<ConversationRepository>,
        flow_engine: Arc<FlowEngine>,
        flow_config: Arc<dyn DeviceFlowConfig>,
        llm: Arc<dyn LlmClient>,
        queue: Arc<dyn MessageQueue>,
    ) -> Self {
        Self { locks, store, conversations, flow_engine, flow_config, llm, queue }
    }

    /// Handle one inbound message end to end. Always releases the session
    /// lock before returning, on every path (success, error, or drop).
    pub async fn dispatch(&self, message: InboundMessage) -> Result<DispatchOutcome, AppError> {
        let handle = match self.locks.try_acquire(&message.device_id, &message.prospect_num).await {
            Some(handle) => handle,
            None => return Ok(DispatchOutcome::Dropped),
        };

        let result = self.process(&message).await;
        self.locks.release(handle).await;
        result.map(DispatchOutcome::Processed)
    }

    async fn process(&self, message: &InboundMessage) -> Result<EngineState, AppError> {
        match self.flow_config.resolve_flow(&message.device_id) {
            Some(flow_id) => self.process_flow_driven(message, &flow_id).await,
            None => self.process_ai_only(message).await,
        }
    }

    async fn process_flow_driven(&self, message: &InboundMessage, flow_id: &str) -> Result<EngineState, AppError> {
        let flow = self
            .store
            .get_flow(flow_id)
            .await
            .map_err(map_store_error)?
            .ok_or_else(|| AppError::invalid(format!("device {} has no such flow: {flow_id}", message.device_id)))?;

        self.conversations
            .get_or_create(
                &message.device_id,
                &message.prospect_num,
                message.prospect_name.clone(),
                &flow,
                message.timestamp,
            )
            .await
            .map_err(map_store_error)?;

        self.flow_engine
            .handle_inbound(&message.device_id, &message.prospect_num, &message.message_text)
            .await
            .map_err(map_engine_error)
    }

    /// Devices with no configured flow get a single-turn LLM reply with no
    /// graph traversal: conversation history still round-trips through the
    /// Conversation Store (under a synthetic single-node flow) so later
    /// turns see prior context, but there is no `current_node_id` to advance.
    async fn process_ai_only(&self, message: &InboundMessage) -> Result<EngineState, AppError> {
        let flow = ai_only_flow(&message.device_id);
        let conversation = self
            .conversations
            .get_or_create(
                &message.device_id,
                &message.prospect_num,
                message.prospect_name.clone(),
                &flow,
                message.timestamp,
            )
            .await
            .map_err(map_store_error)?;

        self.conversations
            .append_user_line(&message.device_id, &message.prospect_num, &message.message_text)
            .await
            .map_err(map_store_error)?;

        let history = flow_engine::history_from_log(&conversation.conversation_log, AI_ONLY_HISTORY_LIMIT);
        let request = CompletionRequest {
            device_id: message.device_id.clone(),
            model: String::new(),
            system_prompt: AI_ONLY_SYSTEM_PROMPT.to_owned(),
            history,
            user_input: message.message_text.clone(),
            cacheable: true,
        };

        match self.llm.complete(request).await {
            Ok(raw) => {
                let parsed = ai_parser::parse(&raw);
                let coalesced = ai_parser::coalesce_onemessage(parsed.items);
                self.dispatch_response_items(&message.device_id, &message.prospect_num, &flow.id, &coalesced).await;
                self.conversations
                    .append_response_items(&message.device_id, &message.prospect_num, &coalesced)
                    .await
                    .map_err(map_store_error)?;
            }
            Err(err) => {
                tracing::warn!(device_id = %message.device_id, %err, "ai-only llm call failed");
            }
        }

        Ok(EngineState::Completed)
    }

    /// Enqueue the parser's coalesced items via [`MessageQueue`], same as the
    /// flow engine's `ai_prompt`/`advanced_ai_prompt` handling — the AI-only
    /// path has no flow graph to advance but still owes the prospect a reply
    /// (spec §2 control-flow, §8 S6).
    async fn dispatch_response_items(
        &self,
        device_id: &str,
        prospect_num: &str,
        flow_id: &str,
        items: &[CoalescedItem],
    ) {
        for item in items {
            let result = match item.item_type {
                ItemType::Text => self.enqueue_text(device_id, prospect_num, flow_id, &item.content).await,
                ItemType::Image | ItemType::Audio | ItemType::Video => {
                    self.enqueue_media(device_id, prospect_num, flow_id, &item.content).await
                }
            };
            if let Err(err) = result {
                tracing::warn!(device_id = %device_id, %err, "failed to enqueue ai-only outbound message");
            }
        }
    }

    async fn enqueue_text(&self, device_id: &str, prospect_num: &str, flow_id: &str, text: &str) -> Result<(), QueueError> {
        self.queue
            .enqueue(QueueMessage {
                id: Uuid::new_v4().to_string(),
                kind: QueueMessageKind::OutboundText,
                device_id: device_id.to_owned(),
                prospect_num: prospect_num.to_owned(),
                content: Some(text.to_owned()),
                media_url: None,
                media_type: None,
                flow_id: Some(flow_id.to_owned()),
                node_id: None,
                execution_id: None,
                retries: 0,
                max_retries: 3,
                created_at: Utc::now(),
                scheduled_at: Utc::now(),
            })
            .await
    }

    async fn enqueue_media(&self, device_id: &str, prospect_num: &str, flow_id: &str, url: &str) -> Result<(), QueueError> {
        self.queue
            .enqueue(QueueMessage {
                id: Uuid::new_v4().to_string(),
                kind: QueueMessageKind::OutboundMedia,
                device_id: device_id.to_owned(),
                prospect_num: prospect_num.to_owned(),
                content: None,
                media_url: Some(url.to_owned()),
                media_type: None,
                flow_id: Some(flow_id.to_owned()),
                node_id: None,
                execution_id: None,
                retries: 0,
                max_retries: 3,
                created_at: Utc::now(),
                scheduled_at: Utc::now(),
            })
            .await
    }
}

/// A minimal, non-persisted single-node flow used as the Conversation
/// Store's blueprint for AI-only devices.
fn ai_only_flow(device_id: &str) -> Flow {
    let mut nodes = IndexMap::new();
    nodes.insert("start".to_owned(), Node { id: "start".to_owned(), kind: NodeKind::Start });
    Flow {
        id: format!("ai-only:{device_id}"),
        device_id: device_id.to_owned(),
        name: "AI Only".to_owned(),
        niche: None,
        nodes,
        edges: vec![],
    }
}

fn map_store_error(err: StoreError) -> AppError {
    match err {
        StoreError::Unavailable(msg) => AppError::degraded(msg),
        StoreError::AlreadyExists | StoreError::NotFound => AppError::invalid(err.to_string()),
    }
}

fn map_engine_error(err: FlowEngineError) -> AppError {
    match err {
        FlowEngineError::Store(store_err) => map_store_error(store_err),
        FlowEngineError::ConversationNotFound | FlowEngineError::FlowNotFound(_) | FlowEngineError::NodeNotFound(_) => {
            AppError::invalid(err.to_string())
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
