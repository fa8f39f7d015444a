// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core data model: flows, conversations, session locks, and queue messages.
//!
//! Flows are not trees — nodes may cycle back to earlier nodes — so a flow
//! owns its nodes as a flat, order-preserving map keyed by id and its edges
//! as a flat ordered list of `(source, target)` pairs. No node owns another.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Unique identifier for a registered messaging device (a provider channel).
pub type DeviceId = String;
/// Remote messaging user identifier (phone-number-like string).
pub type ProspectNum = String;

/// Immutable per-device conversation blueprint.
///
/// Invariant: exactly one node of type `start`; every edge's `source`/`target`
/// references an existing node id (enforced by [`Flow::validate`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub id: String,
    pub device_id: DeviceId,
    pub name: String,
    pub niche: Option<String>,
    /// Ordered set of nodes, keyed by id. Order reflects declaration order,
    /// not traversal order — the graph is not a tree.
    pub nodes: IndexMap<String, Node>,
    /// Ordered sequence of directed edges. Order is significant: it
    /// determines outgoing-edge priority for condition nodes.
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowValidationError {
    NoStartNode,
    MultipleStartNodes(usize),
    DanglingEdge { edge_id: String, node_id: String },
}

impl std::fmt::Display for FlowValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoStartNode => write!(f, "flow has no start node"),
            Self::MultipleStartNodes(n) => {
                write!(f, "flow has {n} start nodes, expected exactly one")
            }
            Self::DanglingEdge { edge_id, node_id } => {
                write!(f, "edge {edge_id} references unknown node {node_id}")
            }
        }
    }
}

impl std::error::Error for FlowValidationError {}

impl Flow {
    /// Validate the structural invariants spec.md §3 requires of a flow.
    pub fn validate(&self) -> Result<(), FlowValidationError> {
        let start_count = self.nodes.values().filter(|n| matches!(n.kind, NodeKind::Start)).count();
        match start_count {
            0 => return Err(FlowValidationError::NoStartNode),
            1 => {}
            n => return Err(FlowValidationError::MultipleStartNodes(n)),
        }

        for edge in &self.edges {
            if !self.nodes.contains_key(&edge.source) {
                return Err(FlowValidationError::DanglingEdge {
                    edge_id: edge.id.clone(),
                    node_id: edge.source.clone(),
                });
            }
            if !self.nodes.contains_key(&edge.target) {
                return Err(FlowValidationError::DanglingEdge {
                    edge_id: edge.id.clone(),
                    node_id: edge.target.clone(),
                });
            }
        }
        Ok(())
    }

    /// Outgoing edges from `node_id`, in declared order.
    pub fn outgoing_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.source == node_id).collect()
    }

    /// The unique start node, if present.
    pub fn start_node(&self) -> Option<&Node> {
        self.nodes.values().find(|n| matches!(n.kind, NodeKind::Start))
    }
}

/// A directed edge between two nodes in a flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
}

/// A single node in a flow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

/// Tagged union of node types and their type-specific data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    Message { content: String },
    Image { content: String },
    Audio { content: String },
    Video { content: String },
    Delay { seconds: u64 },
    Condition { conditions: Vec<Condition> },
    Stage { stage_name: String },
    UserReply,
    AiPrompt {
        system_prompt: String,
        #[serde(default)]
        closing_prompt: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    AdvancedAiPrompt {
        system_prompt: String,
        #[serde(default)]
        closing_prompt: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
}

/// One branch of a `condition` node, matched in declared order against the
/// ordered outgoing edges of the same node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    Equals,
    Contains,
    Default,
}

/// Coarse execution status of a conversation's flow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Active,
    Completed,
    Failed,
}

/// Which physical table a conversation's row lives in.
///
/// spec.md §9 permits collapsing the historical `ai_whatsapp`/`wasapBot`
/// dual-table split into one table with a kind column; this is that column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Primary,
    WasapBot,
}

/// The per-(device, prospect) conversation record.
///
/// Invariants (spec.md §3): if `waiting_for_reply` then `current_node_id`
/// names a `user_reply` node; `current_node_id` always resolves within
/// `flow_id`; `conversation_log` is never truncated by flow-tracking writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub device_id: DeviceId,
    pub prospect_num: ProspectNum,
    pub prospect_name: String,
    pub stage: Option<String>,
    pub flow_id: String,
    pub current_node_id: String,
    pub last_node_id: Option<String>,
    pub waiting_for_reply: bool,
    pub execution_status: ExecutionStatus,
    pub execution_id: String,
    pub conversation_log: String,
    pub human_takeover: bool,
    pub niche: Option<String>,
    pub intro: String,
    pub table_kind: TableKind,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Conversation {
    /// Build a fresh conversation row with the creation defaults spec.md §4.2
    /// specifies: `prospect_name="Sis"` unless supplied, `stage=NULL`,
    /// `intro` derived from the flow name, `human_takeover=false`,
    /// `waiting_for_reply=false`.
    pub fn new_default(
        device_id: DeviceId,
        prospect_num: ProspectNum,
        prospect_name: Option<String>,
        flow: &Flow,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        let table_kind =
            if flow.name == "WasapBot Exama" { TableKind::WasapBot } else { TableKind::Primary };
        let start_id = flow.start_node().map(|n| n.id.clone()).unwrap_or_default();
        Self {
            device_id,
            prospect_num,
            prospect_name: prospect_name.unwrap_or_else(|| "Sis".to_owned()),
            stage: None,
            flow_id: flow.id.clone(),
            current_node_id: start_id,
            last_node_id: None,
            waiting_for_reply: false,
            execution_status: ExecutionStatus::Active,
            execution_id: uuid::Uuid::new_v4().to_string(),
            conversation_log: String::new(),
            human_takeover: false,
            niche: flow.niche.clone(),
            intro: format!("Welcome to {} flow", flow.name),
            table_kind,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A short-TTL distributed mutex row, keyed by (device, prospect).
#[derive(Debug, Clone)]
pub struct SessionLockRow {
    pub device_id: DeviceId,
    pub prospect_num: ProspectNum,
    pub acquired_at: chrono::DateTime<chrono::Utc>,
}

/// Kind of queued message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueMessageKind {
    OutboundText,
    OutboundMedia,
    FlowContinuation,
}

/// A message awaiting send, or a scheduled flow continuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: String,
    pub kind: QueueMessageKind,
    pub device_id: DeviceId,
    pub prospect_num: ProspectNum,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub flow_id: Option<String>,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub execution_id: Option<String>,
    pub retries: u32,
    pub max_retries: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub scheduled_at: chrono::DateTime<chrono::Utc>,
}

/// A queue message that exceeded `max_retries`, parked for operator review.
///
/// Supplemental to spec.md's distillation (see SPEC_FULL.md §3): the spec
/// mentions a "dead-letter stream" but doesn't give it a shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedMessage {
    pub message: QueueMessage,
    pub error: String,
    pub failed_at: chrono::DateTime<chrono::Utc>,
}

/// Variables available for `{{var}}` substitution in message/media node content.
#[derive(Debug, Clone, Default)]
pub struct FlowVariables {
    pub phone_number: String,
    pub name: String,
    pub stage: String,
    pub device_id: String,
    pub flow_id: String,
    pub timestamp: String,
}

impl FlowVariables {
    /// Substitute `{{name}}`-style placeholders in `content`. Unknown
    /// placeholders are left untouched.
    pub fn substitute(&self, content: &str) -> String {
        content
            .replace("{{phone_number}}", &self.phone_number)
            .replace("{{name}}", &self.name)
            .replace("{{stage}}", &self.stage)
            .replace("{{device_id}}", &self.device_id)
            .replace("{{flow_id}}", &self.flow_id)
            .replace("{{timestamp}}", &self.timestamp)
    }
}

#[cfg(test)]
#[path = "domain_tests.rs"]
mod tests;
