// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn node(id: &str, kind: NodeKind) -> Node {
    Node { id: id.to_owned(), kind }
}

fn edge(id: &str, source: &str, target: &str) -> Edge {
    Edge { id: id.to_owned(), source: source.to_owned(), target: target.to_owned() }
}

fn sample_flow() -> Flow {
    let mut nodes = IndexMap::new();
    nodes.insert("n1".to_owned(), node("n1", NodeKind::Start));
    nodes.insert(
        "n2".to_owned(),
        node("n2", NodeKind::Message { content: "hi {{name}}".to_owned() }),
    );
    Flow {
        id: "f1".to_owned(),
        device_id: "D1".to_owned(),
        name: "Demo".to_owned(),
        niche: None,
        nodes,
        edges: vec![edge("e1", "n1", "n2")],
    }
}

#[test]
fn validate_accepts_well_formed_flow() {
    assert!(sample_flow().validate().is_ok());
}

#[test]
fn validate_rejects_missing_start() {
    let mut flow = sample_flow();
    flow.nodes.shift_remove("n1");
    flow.edges.clear();
    assert_eq!(flow.validate(), Err(FlowValidationError::NoStartNode));
}

#[test]
fn validate_rejects_multiple_start_nodes() {
    let mut flow = sample_flow();
    flow.nodes.insert("n3".to_owned(), node("n3", NodeKind::Start));
    assert_eq!(flow.validate(), Err(FlowValidationError::MultipleStartNodes(2)));
}

#[test]
fn validate_rejects_dangling_edge() {
    let mut flow = sample_flow();
    flow.edges.push(edge("e2", "n2", "missing"));
    assert_eq!(
        flow.validate(),
        Err(FlowValidationError::DanglingEdge {
            edge_id: "e2".to_owned(),
            node_id: "missing".to_owned()
        })
    );
}

#[test]
fn outgoing_edges_preserves_declared_order() {
    let mut flow = sample_flow();
    flow.edges = vec![edge("e1", "n1", "n2"), edge("e2", "n1", "n1"), edge("e3", "n2", "n1")];
    let out = flow.outgoing_edges("n1");
    assert_eq!(out.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), vec!["e1", "e2"]);
}

#[test]
fn new_default_conversation_sets_expected_defaults() {
    let flow = sample_flow();
    let now = chrono::Utc::now();
    let conv = Conversation::new_default("D1".to_owned(), "6281".to_owned(), None, &flow, now);
    assert_eq!(conv.prospect_name, "Sis");
    assert_eq!(conv.stage, None);
    assert_eq!(conv.intro, "Welcome to Demo flow");
    assert!(!conv.human_takeover);
    assert!(!conv.waiting_for_reply);
    assert_eq!(conv.current_node_id, "n1");
    assert_eq!(conv.table_kind, TableKind::Primary);
}

#[test]
fn new_default_conversation_routes_wasapbot_table() {
    let mut flow = sample_flow();
    flow.name = "WasapBot Exama".to_owned();
    let conv =
        Conversation::new_default("D1".to_owned(), "6281".to_owned(), None, &flow, chrono::Utc::now());
    assert_eq!(conv.table_kind, TableKind::WasapBot);
}

#[test]
fn flow_variables_substitute_known_placeholders_only() {
    let vars = FlowVariables {
        phone_number: "6281".to_owned(),
        name: "Budi".to_owned(),
        stage: "Intro".to_owned(),
        device_id: "D1".to_owned(),
        flow_id: "f1".to_owned(),
        timestamp: "2026-01-01".to_owned(),
    };
    let out = vars.substitute("Hi {{name}}, unknown {{widget}} stays, stage={{stage}}");
    assert_eq!(out, "Hi Budi, unknown {{widget}} stays, stage=Intro");
}
