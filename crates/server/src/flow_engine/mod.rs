// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow Execution Engine (C4): dispatches on `current_node_id`'s type,
//! suspends at `user_reply` nodes, resolves `delay` nodes to a scheduled
//! continuation, and evaluates `condition` nodes via [`condition::route`]
//! (spec §4.4).
//!
//! Grounded on `crates/mux/src/events.rs`'s `parse_upstream_message` tagged
//! dispatch (`match`-on-variant with per-arm side effects), generalized from
//! a single parse step to a loop that keeps dispatching until it reaches a
//! node that must suspend (`user_reply`, `delay`) or the graph runs out of
//! outgoing edges.

pub mod condition;

use std::sync::Arc;

use uuid::Uuid;

use crate::ai_parser::{self, CoalescedItem, ItemType};
use crate::clock::Clock;
use crate::conversation::ConversationRepository;
use crate::domain::{
    Conversation, ExecutionStatus, Flow, FlowVariables, Node, NodeKind, QueueMessage, QueueMessageKind,
};
use crate::llm::{CompletionRequest, LlmClient, Message, Role};
use crate::queue::{MessageQueue, QueueError};
use crate::store::{FlowTrackingUpdate, StoreError};

/// Terminal or suspending state a dispatch tick ends in. `Running` is never
/// returned to a caller; it only appears inside the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Running,
    AwaitingUser,
    Delayed,
    Completed,
    Failed,
}

#[derive(Debug)]
pub enum FlowEngineError {
    ConversationNotFound,
    FlowNotFound(String),
    NodeNotFound(String),
    Store(StoreError),
}

impl std::fmt::Display for FlowEngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConversationNotFound => write!(f, "conversation not found"),
            Self::FlowNotFound(id) => write!(f, "flow not found: {id}"),
            Self::NodeNotFound(id) => write!(f, "node not found: {id}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for FlowEngineError {}

impl From<StoreError> for FlowEngineError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// History entries carried into an LLM call, capped per spec §4.4.
const HISTORY_LIMIT: usize = 10;

pub struct FlowEngine {
    store: Arc<dyn crate::store::Store>,
    conversations: Arc<ConversationRepository>,
    queue: Arc<dyn MessageQueue>,
    llm: Arc<dyn LlmClient>,
    clock: Arc<dyn Clock>,
    fallback_text: String,
}

impl FlowEngine {
    pub fn new(
        store: Arc<dyn crate::store::Store>,
        conversations: Arc<ConversationRepository>,
        queue: Arc<dyn MessageQueue>,
        llm: Arc<dyn LlmClient>,
        clock: Arc<dyn Clock>,
        fallback_text: impl Into<String>,
    ) -> Self {
        Self { store, conversations, queue, llm, clock, fallback_text: fallback_text.into() }
    }

    /// Process one inbound message for `(device_id, prospect_num)`. Caller
    /// (the dispatcher) is responsible for holding the session lock for the
    /// duration of this call.
    pub async fn handle_inbound(
        &self,
        device_id: &str,
        prospect_num: &str,
        user_input: &str,
    ) -> Result<EngineState, FlowEngineError> {
        let conversation = self
            .conversations
            .get(device_id, prospect_num)
            .await?
            .ok_or(FlowEngineError::ConversationNotFound)?;

        if conversation.execution_status == ExecutionStatus::Completed {
            return Ok(EngineState::Completed);
        }
        if conversation.execution_status == ExecutionStatus::Failed {
            return Ok(EngineState::Failed);
        }

        let flow = self
            .store
            .get_flow(&conversation.flow_id)
            .await?
            .ok_or_else(|| FlowEngineError::FlowNotFound(conversation.flow_id.clone()))?;

        let consume_reply = conversation.waiting_for_reply;
        if !consume_reply {
            self.conversations.append_user_line(device_id, prospect_num, user_input).await?;
        }

        self.run(conversation, &flow, user_input, consume_reply).await
    }

    /// Resume a conversation parked at a `delay` node once the Scheduler
    /// observes `scheduled_at <= now`. `node_id` is the node the delay
    /// persisted as the resume point.
    pub async fn resume_delayed(
        &self,
        device_id: &str,
        prospect_num: &str,
        node_id: &str,
    ) -> Result<EngineState, FlowEngineError> {
        let mut conversation = self
            .conversations
            .get(device_id, prospect_num)
            .await?
            .ok_or(FlowEngineError::ConversationNotFound)?;

        if conversation.execution_status != ExecutionStatus::Active {
            return Ok(EngineState::Completed);
        }

        let flow = self
            .store
            .get_flow(&conversation.flow_id)
            .await?
            .ok_or_else(|| FlowEngineError::FlowNotFound(conversation.flow_id.clone()))?;

        conversation.current_node_id = node_id.to_owned();
        self.run(conversation, &flow, "", false).await
    }

    async fn run(
        &self,
        conversation: Conversation,
        flow: &Flow,
        user_input: &str,
        mut consume_reply: bool,
    ) -> Result<EngineState, FlowEngineError> {
        let device_id = conversation.device_id.clone();
        let prospect_num = conversation.prospect_num.clone();
        let execution_id = conversation.execution_id.clone();
        let flow_id = conversation.flow_id.clone();
        let mut last_node_id = conversation.last_node_id.clone();
        let mut current_node_id = conversation.current_node_id.clone();
        let mut stage = conversation.stage.clone();

        loop {
            let node = flow
                .nodes
                .get(&current_node_id)
                .ok_or_else(|| FlowEngineError::NodeNotFound(current_node_id.clone()))?
                .clone();

            let variables = FlowVariables {
                phone_number: prospect_num.clone(),
                name: conversation.prospect_name.clone(),
                stage: stage.clone().unwrap_or_default(),
                device_id: device_id.clone(),
                flow_id: flow_id.clone(),
                timestamp: self.clock.now_utc().to_rfc3339(),
            };

            match &node.kind {
                NodeKind::Start => {
                    match self.advance(flow, &node) {
                        Some(target) => {
                            last_node_id = Some(node.id.clone());
                            current_node_id = target;
                            continue;
                        }
                        None => {
                            return self
                                .complete(&device_id, &prospect_num, &flow_id, &node.id, &execution_id)
                                .await;
                        }
                    }
                }

                NodeKind::Message { content } => {
                    let text = variables.substitute(content);
                    self.enqueue_text(&device_id, &prospect_num, &flow_id, &text).await;
                    self.conversations.append_bot_line(&device_id, &prospect_num, &text, true).await?;
                    last_node_id = Some(node.id.clone());
                    match self.advance(flow, &node) {
                        Some(target) => {
                            current_node_id = target;
                            continue;
                        }
                        None => {
                            return self
                                .complete(&device_id, &prospect_num, &flow_id, &node.id, &execution_id)
                                .await;
                        }
                    }
                }

                NodeKind::Image { content } | NodeKind::Audio { content } | NodeKind::Video { content } => {
                    let url = variables.substitute(content);
                    self.enqueue_media(&device_id, &prospect_num, &flow_id, &url).await;
                    self.conversations.append_bot_line(&device_id, &prospect_num, &url, false).await?;
                    last_node_id = Some(node.id.clone());
                    match self.advance(flow, &node) {
                        Some(target) => {
                            current_node_id = target;
                            continue;
                        }
                        None => {
                            return self
                                .complete(&device_id, &prospect_num, &flow_id, &node.id, &execution_id)
                                .await;
                        }
                    }
                }

                NodeKind::Delay { seconds } => {
                    let target = self.advance(flow, &node);
                    let wake_at = self.clock.now_utc() + chrono::Duration::seconds(*seconds as i64);
                    let resume_node = target.clone().unwrap_or_else(|| node.id.clone());

                    let continuation = QueueMessage {
                        id: Uuid::new_v4().to_string(),
                        kind: QueueMessageKind::FlowContinuation,
                        device_id: device_id.clone(),
                        prospect_num: prospect_num.clone(),
                        content: None,
                        media_url: None,
                        media_type: None,
                        flow_id: Some(flow_id.clone()),
                        node_id: Some(resume_node.clone()),
                        execution_id: Some(execution_id.clone()),
                        retries: 0,
                        max_retries: 3,
                        created_at: self.clock.now_utc(),
                        scheduled_at: wake_at,
                    };
                    if let Err(err) = self.queue.enqueue_delayed(continuation).await {
                        tracing::warn!(device_id = %device_id, %err, "failed to enqueue delay continuation");
                    }

                    self.conversations
                        .update_flow_tracking(
                            &device_id,
                            &prospect_num,
                            FlowTrackingUpdate {
                                flow_id: flow_id.clone(),
                                current_node_id: resume_node,
                                last_node_id: Some(node.id.clone()),
                                waiting_for_reply: false,
                                execution_status: ExecutionStatus::Active,
                                execution_id: execution_id.clone(),
                            },
                        )
                        .await?;
                    return Ok(EngineState::Delayed);
                }

                NodeKind::UserReply => {
                    if consume_reply {
                        consume_reply = false;
                        last_node_id = Some(node.id.clone());
                        match self.advance(flow, &node) {
                            Some(target) => {
                                current_node_id = target;
                                continue;
                            }
                            None => {
                                return self
                                    .complete(&device_id, &prospect_num, &flow_id, &node.id, &execution_id)
                                    .await;
                            }
                        }
                    }

                    self.conversations
                        .update_flow_tracking(
                            &device_id,
                            &prospect_num,
                            FlowTrackingUpdate {
                                flow_id: flow_id.clone(),
                                current_node_id: node.id.clone(),
                                last_node_id: last_node_id.clone(),
                                waiting_for_reply: true,
                                execution_status: ExecutionStatus::Active,
                                execution_id: execution_id.clone(),
                            },
                        )
                        .await?;
                    return Ok(EngineState::AwaitingUser);
                }

                NodeKind::Condition { conditions } => {
                    let edges = flow.outgoing_edges(&node.id);
                    match condition::route(user_input, &edges, conditions) {
                        Some(result) => {
                            if result.used_fallback {
                                tracing::warn!(
                                    node_id = %node.id, device_id = %device_id,
                                    "condition node matched no rule, falling back to edges[0]"
                                );
                            }
                            last_node_id = Some(node.id.clone());
                            current_node_id = result.target;
                            continue;
                        }
                        None => {
                            return self
                                .complete(&device_id, &prospect_num, &flow_id, &node.id, &execution_id)
                                .await;
                        }
                    }
                }

                NodeKind::Stage { stage_name } => {
                    self.conversations.update_stage(&device_id, &prospect_num, Some(stage_name.clone())).await?;
                    stage = Some(stage_name.clone());
                    last_node_id = Some(node.id.clone());
                    match self.advance(flow, &node) {
                        Some(target) => {
                            current_node_id = target;
                            continue;
                        }
                        None => {
                            return self
                                .complete(&device_id, &prospect_num, &flow_id, &node.id, &execution_id)
                                .await;
                        }
                    }
                }

                NodeKind::AiPrompt { system_prompt, closing_prompt, model }
                | NodeKind::AdvancedAiPrompt { system_prompt, closing_prompt, model } => {
                    let cacheable = matches!(&node.kind, NodeKind::AiPrompt { .. });
                    let conversation_now = self
                        .conversations
                        .get(&device_id, &prospect_num)
                        .await?
                        .ok_or(FlowEngineError::ConversationNotFound)?;
                    let history = history_from_log(&conversation_now.conversation_log, HISTORY_LIMIT);

                    let mut prompt = system_prompt.clone();
                    if let Some(closing) = closing_prompt {
                        if !closing.is_empty() {
                            prompt.push('\n');
                            prompt.push_str(closing);
                        }
                    }

                    let request = CompletionRequest {
                        device_id: device_id.clone(),
                        model: model.clone().unwrap_or_default(),
                        system_prompt: prompt,
                        history,
                        user_input: user_input.to_owned(),
                        cacheable,
                    };

                    match self.llm.complete(request).await {
                        Ok(raw) => {
                            let parsed = ai_parser::parse(&raw);
                            let coalesced = ai_parser::coalesce_onemessage(parsed.items);
                            self.dispatch_response_items(&device_id, &prospect_num, &flow_id, &coalesced).await;
                            self.conversations.append_response_items(&device_id, &prospect_num, &coalesced).await?;
                            if !parsed.stage.is_empty() {
                                self.conversations
                                    .update_stage(&device_id, &prospect_num, Some(parsed.stage.clone()))
                                    .await?;
                                stage = Some(parsed.stage);
                            }
                        }
                        Err(err) => {
                            tracing::warn!(device_id = %device_id, %err, "llm call failed, using fallback text");
                            self.enqueue_text(&device_id, &prospect_num, &flow_id, &self.fallback_text).await;
                            self.conversations
                                .append_bot_line(&device_id, &prospect_num, &self.fallback_text, true)
                                .await?;
                        }
                    }

                    last_node_id = Some(node.id.clone());
                    match self.advance(flow, &node) {
                        Some(target) => {
                            current_node_id = target;
                            continue;
                        }
                        None => {
                            return self
                                .complete(&device_id, &prospect_num, &flow_id, &node.id, &execution_id)
                                .await;
                        }
                    }
                }
            }
        }
    }

    /// First outgoing edge's target, in declared order. Non-condition nodes
    /// have at most one meaningful outgoing edge.
    fn advance(&self, flow: &Flow, node: &Node) -> Option<String> {
        flow.outgoing_edges(&node.id).first().map(|e| e.target.clone())
    }

    async fn enqueue_text(&self, device_id: &str, prospect_num: &str, flow_id: &str, text: &str) {
        let message = QueueMessage {
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
            created_at: self.clock.now_utc(),
            scheduled_at: self.clock.now_utc(),
        };
        if let Err(err) = self.queue.enqueue(message).await {
            self.log_enqueue_failure(device_id, err).await;
        }
    }

    async fn enqueue_media(&self, device_id: &str, prospect_num: &str, flow_id: &str, url: &str) {
        let message = QueueMessage {
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
            created_at: self.clock.now_utc(),
            scheduled_at: self.clock.now_utc(),
        };
        if let Err(err) = self.queue.enqueue(message).await {
            self.log_enqueue_failure(device_id, err).await;
        }
    }

    async fn dispatch_response_items(
        &self,
        device_id: &str,
        prospect_num: &str,
        flow_id: &str,
        items: &[CoalescedItem],
    ) {
        for item in items {
            match item.item_type {
                ItemType::Text => self.enqueue_text(device_id, prospect_num, flow_id, &item.content).await,
                ItemType::Image | ItemType::Audio | ItemType::Video => {
                    self.enqueue_media(device_id, prospect_num, flow_id, &item.content).await
                }
            }
        }
    }

    async fn log_enqueue_failure(&self, device_id: &str, err: QueueError) {
        tracing::warn!(device_id = %device_id, %err, "failed to enqueue outbound message");
    }

    async fn complete(
        &self,
        device_id: &str,
        prospect_num: &str,
        flow_id: &str,
        node_id: &str,
        execution_id: &str,
    ) -> Result<EngineState, FlowEngineError> {
        self.conversations
            .update_flow_tracking(
                device_id,
                prospect_num,
                FlowTrackingUpdate {
                    flow_id: flow_id.to_owned(),
                    current_node_id: node_id.to_owned(),
                    last_node_id: Some(node_id.to_owned()),
                    waiting_for_reply: false,
                    execution_status: ExecutionStatus::Completed,
                    execution_id: execution_id.to_owned(),
                },
            )
            .await?;
        Ok(EngineState::Completed)
    }
}

/// Reconstruct the last `limit` chat turns from the formatted log, for
/// history passed to the LLM client (spec §4.4). Shared with the dispatcher's
/// AI-only path, which carries no flow graph but still needs log-derived
/// history.
pub(crate) fn history_from_log(log: &str, limit: usize) -> Vec<Message> {
    let messages: Vec<Message> = log.lines().filter_map(parse_log_line).collect();
    let start = messages.len().saturating_sub(limit);
    messages[start..].to_vec()
}

fn parse_log_line(line: &str) -> Option<Message> {
    if let Some(rest) = line.strip_prefix("USER: ") {
        Some(Message { role: Role::User, content: unquote(rest) })
    } else if let Some(rest) = line.strip_prefix("BOT_COMBINED: ") {
        Some(Message { role: Role::Assistant, content: unquote(rest) })
    } else if let Some(rest) = line.strip_prefix("BOT: ") {
        Some(Message { role: Role::Assistant, content: unquote(rest) })
    } else {
        None
    }
}

fn unquote(s: &str) -> String {
    serde_json::from_str::<String>(s).unwrap_or_else(|_| s.to_owned())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
