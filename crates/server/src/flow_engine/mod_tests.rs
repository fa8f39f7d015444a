// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use indexmap::IndexMap;

use super::*;
use crate::clock::FakeClock;
use crate::domain::{Condition, ConditionKind, Edge};
use crate::queue::memory::MemoryQueue;
use crate::store::memory::MemoryStore;

struct FakeLlmClient {
    response: Result<String, crate::llm::LlmError>,
}

#[async_trait::async_trait]
impl LlmClient for FakeLlmClient {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, crate::llm::LlmError> {
        self.response.clone()
    }
}

fn node(id: &str, kind: NodeKind) -> Node {
    Node { id: id.to_owned(), kind }
}

fn edge(source: &str, target: &str) -> Edge {
    Edge { id: format!("{source}->{target}"), source: source.to_owned(), target: target.to_owned() }
}

async fn setup(
    flow: Flow,
    llm_response: Result<String, crate::llm::LlmError>,
) -> (FlowEngine, std::sync::Arc<MemoryStore>, std::sync::Arc<ConversationRepository>, std::sync::Arc<MemoryQueue>) {
    let store = std::sync::Arc::new(MemoryStore::new());
    store.put_flow(flow.clone()).await;
    let conversations = std::sync::Arc::new(ConversationRepository::new(store.clone()));
    conversations
        .get_or_create("D1", "60123", None, &flow, chrono::Utc::now())
        .await
        .unwrap();
    let queue = std::sync::Arc::new(MemoryQueue::new());
    let clock = FakeClock::new(chrono::Utc::now());
    let llm = std::sync::Arc::new(FakeLlmClient { response: llm_response });
    let engine =
        FlowEngine::new(store.clone(), conversations.clone(), queue.clone(), llm, clock, "sorry, try again");
    (engine, store, conversations, queue)
}

#[tokio::test]
async fn numeric_menu_routes_directly_and_completes() {
    let mut nodes = IndexMap::new();
    nodes.insert("start".to_owned(), node("start", NodeKind::Start));
    nodes.insert("cond".to_owned(), node("cond", NodeKind::Condition {
        conditions: ["1", "2", "3", "4"]
            .into_iter()
            .map(|l| Condition { kind: ConditionKind::Equals, value: String::new(), label: Some(l.to_owned()) })
            .collect(),
    }));
    for label in ["a", "b", "c", "d"] {
        nodes.insert(label.to_owned(), node(label, NodeKind::Message { content: format!("reached {label}") }));
    }
    let flow = Flow {
        id: "f1".to_owned(),
        device_id: "D1".to_owned(),
        name: "Menu".to_owned(),
        niche: None,
        nodes,
        edges: vec![
            edge("start", "cond"),
            edge("cond", "a"),
            edge("cond", "b"),
            edge("cond", "c"),
            edge("cond", "d"),
        ],
    };

    let (engine, _store, conversations, queue) = setup(flow, Ok(String::new())).await;
    let state = engine.handle_inbound("D1", "60123", "3").await.unwrap();
    assert_eq!(state, EngineState::Completed);

    let conv = conversations.get("D1", "60123").await.unwrap().unwrap();
    assert_eq!(conv.current_node_id, "c");
    assert_eq!(conv.execution_status, ExecutionStatus::Completed);

    let sent = queue.dequeue_ready(10).await.unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].content.as_deref(), Some("reached c"));
}

#[tokio::test]
async fn user_reply_suspends_then_continues_in_one_tick() {
    let mut nodes = IndexMap::new();
    nodes.insert("start".to_owned(), node("start", NodeKind::Start));
    nodes.insert("welcome".to_owned(), node("welcome", NodeKind::Message { content: "Welcome".to_owned() }));
    nodes.insert("reply".to_owned(), node("reply", NodeKind::UserReply));
    nodes.insert("thanks".to_owned(), node("thanks", NodeKind::Message { content: "Thanks".to_owned() }));
    let flow = Flow {
        id: "f1".to_owned(),
        device_id: "D1".to_owned(),
        name: "Greeting".to_owned(),
        niche: None,
        nodes,
        edges: vec![edge("start", "welcome"), edge("welcome", "reply"), edge("reply", "thanks")],
    };

    let (engine, _store, conversations, queue) = setup(flow, Ok(String::new())).await;

    let first = engine.handle_inbound("D1", "60123", "hi").await.unwrap();
    assert_eq!(first, EngineState::AwaitingUser);
    let conv = conversations.get("D1", "60123").await.unwrap().unwrap();
    assert!(conv.waiting_for_reply);
    assert_eq!(conv.current_node_id, "reply");

    let second = engine.handle_inbound("D1", "60123", "anything").await.unwrap();
    assert_eq!(second, EngineState::Completed);
    let conv = conversations.get("D1", "60123").await.unwrap().unwrap();
    assert!(!conv.waiting_for_reply);
    assert_eq!(conv.current_node_id, "thanks");

    let sent = queue.dequeue_ready(10).await.unwrap();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].content.as_deref(), Some("Welcome"));
    assert_eq!(sent[1].content.as_deref(), Some("Thanks"));
}

#[tokio::test]
async fn delay_node_schedules_continuation_and_resume_advances_past_it() {
    let mut nodes = IndexMap::new();
    nodes.insert("start".to_owned(), node("start", NodeKind::Start));
    nodes.insert("wait".to_owned(), node("wait", NodeKind::Delay { seconds: 2 }));
    nodes.insert("hello".to_owned(), node("hello", NodeKind::Message { content: "Hello".to_owned() }));
    let flow = Flow {
        id: "f1".to_owned(),
        device_id: "D1".to_owned(),
        name: "Delayed".to_owned(),
        niche: None,
        nodes,
        edges: vec![edge("start", "wait"), edge("wait", "hello")],
    };

    let (engine, _store, conversations, queue) = setup(flow, Ok(String::new())).await;

    let state = engine.handle_inbound("D1", "60123", "hi").await.unwrap();
    assert_eq!(state, EngineState::Delayed);
    let conv = conversations.get("D1", "60123").await.unwrap().unwrap();
    assert_eq!(conv.current_node_id, "hello");
    assert!(queue.dequeue_ready(10).await.unwrap().is_empty());

    let resumed = engine.resume_delayed("D1", "60123", "hello").await.unwrap();
    assert_eq!(resumed, EngineState::Completed);
    let sent = queue.dequeue_ready(10).await.unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].content.as_deref(), Some("Hello"));
}

#[tokio::test]
async fn ai_prompt_node_dispatches_coalesced_items_and_updates_stage() {
    let mut nodes = IndexMap::new();
    nodes.insert("start".to_owned(), node("start", NodeKind::Start));
    nodes.insert(
        "ask".to_owned(),
        node(
            "ask",
            NodeKind::AiPrompt {
                system_prompt: "You are a helper.".to_owned(),
                closing_prompt: None,
                model: None,
            },
        ),
    );
    let flow = Flow {
        id: "f1".to_owned(),
        device_id: "D1".to_owned(),
        name: "Ai".to_owned(),
        niche: None,
        nodes,
        edges: vec![edge("start", "ask")],
    };

    let raw = r#"{"Stage":"Qualifying","Response":[
        {"type":"text","Jenis":"onemessage","content":"hi"},
        {"type":"text","Jenis":"onemessage","content":"how"},
        {"type":"image","content":"https://x/y.jpg"}
    ]}"#;

    let (engine, _store, conversations, queue) = setup(flow, Ok(raw.to_owned())).await;
    let state = engine.handle_inbound("D1", "60123", "hello there").await.unwrap();
    assert_eq!(state, EngineState::Completed);

    let conv = conversations.get("D1", "60123").await.unwrap().unwrap();
    assert_eq!(conv.stage, Some("Qualifying".to_owned()));
    assert!(conv.conversation_log.contains("USER: \"hello there\""));
    assert!(conv.conversation_log.contains("BOT_COMBINED: \"hi\\nhow\""));
    assert!(conv.conversation_log.contains("BOT: https://x/y.jpg"));

    let sent = queue.dequeue_ready(10).await.unwrap();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].content.as_deref(), Some("hi\nhow"));
    assert_eq!(sent[1].media_url.as_deref(), Some("https://x/y.jpg"));
}

#[tokio::test]
async fn llm_failure_falls_back_to_configured_text_and_flow_continues() {
    let mut nodes = IndexMap::new();
    nodes.insert("start".to_owned(), node("start", NodeKind::Start));
    nodes.insert(
        "ask".to_owned(),
        node("ask", NodeKind::AiPrompt { system_prompt: "Hi".to_owned(), closing_prompt: None, model: None }),
    );
    let flow = Flow {
        id: "f1".to_owned(),
        device_id: "D1".to_owned(),
        name: "Ai".to_owned(),
        niche: None,
        nodes,
        edges: vec![edge("start", "ask")],
    };

    let (engine, _store, conversations, queue) =
        setup(flow, Err(crate::llm::LlmError::Upstream("boom".to_owned()))).await;
    let state = engine.handle_inbound("D1", "60123", "hello").await.unwrap();
    assert_eq!(state, EngineState::Completed);

    let conv = conversations.get("D1", "60123").await.unwrap().unwrap();
    assert!(conv.conversation_log.contains("BOT: \"sorry, try again\""));

    let sent = queue.dequeue_ready(10).await.unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].content.as_deref(), Some("sorry, try again"));
}

#[tokio::test]
async fn condition_fallback_logs_warning_and_still_advances() {
    let mut nodes = IndexMap::new();
    nodes.insert("start".to_owned(), node("start", NodeKind::Start));
    nodes.insert("cond".to_owned(), node("cond", NodeKind::Condition { conditions: vec![] }));
    nodes.insert("a".to_owned(), node("a", NodeKind::Message { content: "a".to_owned() }));
    nodes.insert("b".to_owned(), node("b", NodeKind::Message { content: "b".to_owned() }));
    let flow = Flow {
        id: "f1".to_owned(),
        device_id: "D1".to_owned(),
        name: "Fallback".to_owned(),
        niche: None,
        nodes,
        edges: vec![edge("start", "cond"), edge("cond", "a"), edge("cond", "b")],
    };

    let (engine, _store, conversations, _queue) = setup(flow, Ok(String::new())).await;
    let state = engine.handle_inbound("D1", "60123", "xyz").await.unwrap();
    assert_eq!(state, EngineState::Completed);
    let conv = conversations.get("D1", "60123").await.unwrap().unwrap();
    assert_eq!(conv.current_node_id, "a");
}
