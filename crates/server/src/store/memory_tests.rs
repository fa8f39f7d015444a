// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;

use super::*;
use crate::domain::{ExecutionStatus, NodeKind, TableKind};

fn sample_flow() -> Flow {
    let mut nodes = IndexMap::new();
    nodes.insert("n1".to_owned(), crate::domain::Node { id: "n1".to_owned(), kind: NodeKind::Start });
    Flow {
        id: "f1".to_owned(),
        device_id: "D1".to_owned(),
        name: "Demo".to_owned(),
        niche: None,
        nodes,
        edges: vec![],
    }
}

fn sample_conversation() -> Conversation {
    let now = Utc::now();
    Conversation {
        device_id: "D1".to_owned(),
        prospect_num: "6281".to_owned(),
        prospect_name: "Sis".to_owned(),
        stage: None,
        flow_id: "f1".to_owned(),
        current_node_id: "n1".to_owned(),
        last_node_id: None,
        waiting_for_reply: false,
        execution_status: ExecutionStatus::Active,
        execution_id: "exec-1".to_owned(),
        conversation_log: String::new(),
        human_takeover: false,
        niche: None,
        intro: "Welcome to Demo flow".to_owned(),
        table_kind: TableKind::Primary,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn create_conversation_rejects_duplicate_key() {
    let store = MemoryStore::new();
    store.create_conversation(sample_conversation()).await.expect("first create succeeds");
    let err = store.create_conversation(sample_conversation()).await.unwrap_err();
    assert_eq!(err, StoreError::AlreadyExists);
}

#[tokio::test]
async fn update_flow_tracking_never_touches_log_or_admin_fields() {
    let store = MemoryStore::new();
    store.create_conversation(sample_conversation()).await.unwrap();
    store
        .append_log("D1", "6281", &["USER: \"hi\"".to_owned()])
        .await
        .unwrap();
    store.update_stage("D1", "6281", Some("Greeting".to_owned())).await.unwrap();
    store.set_human("D1", "6281", true).await.unwrap();

    store
        .update_flow_tracking(
            "D1",
            "6281",
            FlowTrackingUpdate {
                flow_id: "f1".to_owned(),
                current_node_id: "n2".to_owned(),
                last_node_id: Some("n1".to_owned()),
                waiting_for_reply: true,
                execution_status: ExecutionStatus::Active,
                execution_id: "exec-2".to_owned(),
            },
        )
        .await
        .unwrap();

    let conv = store.get_conversation("D1", "6281").await.unwrap().unwrap();
    assert_eq!(conv.current_node_id, "n2");
    assert_eq!(conv.conversation_log, "USER: \"hi\"");
    assert_eq!(conv.stage.as_deref(), Some("Greeting"));
    assert!(conv.human_takeover);
}

#[tokio::test]
async fn append_log_concatenates_in_order_across_interleaved_updates() {
    let store = MemoryStore::new();
    store.create_conversation(sample_conversation()).await.unwrap();

    store.append_log("D1", "6281", &["USER: \"a\"".to_owned()]).await.unwrap();
    store
        .update_flow_tracking(
            "D1",
            "6281",
            FlowTrackingUpdate {
                flow_id: "f1".to_owned(),
                current_node_id: "n1".to_owned(),
                last_node_id: None,
                waiting_for_reply: false,
                execution_status: ExecutionStatus::Active,
                execution_id: "exec-1".to_owned(),
            },
        )
        .await
        .unwrap();
    store.append_log("D1", "6281", &["BOT: \"b\"".to_owned(), "BOT: \"c\"".to_owned()]).await.unwrap();

    let conv = store.get_conversation("D1", "6281").await.unwrap().unwrap();
    assert_eq!(conv.conversation_log, "USER: \"a\"\nBOT: \"b\"\nBOT: \"c\"");
}

#[tokio::test]
async fn lock_mutual_exclusion_second_acquirer_fails_within_ttl() {
    let store = MemoryStore::new();
    let now = Utc::now();
    let ttl = Duration::from_secs(30);
    assert!(store.try_acquire_lock("D1", "60123", now, ttl).await.unwrap());
    assert!(!store.try_acquire_lock("D1", "60123", now, ttl).await.unwrap());
}

#[tokio::test]
async fn lock_staleness_recovery_after_ttl_elapses() {
    let store = MemoryStore::new();
    let now = Utc::now();
    let ttl = Duration::from_secs(30);
    assert!(store.try_acquire_lock("D1", "60123", now, ttl).await.unwrap());

    let later = now + chrono::Duration::seconds(31);
    assert!(store.try_acquire_lock("D1", "60123", later, ttl).await.unwrap());
}

#[tokio::test]
async fn release_then_acquire_succeeds_immediately() {
    let store = MemoryStore::new();
    let now = Utc::now();
    let ttl = Duration::from_secs(30);
    assert!(store.try_acquire_lock("D1", "60123", now, ttl).await.unwrap());
    store.release_lock("D1", "60123").await.unwrap();
    assert!(store.try_acquire_lock("D1", "60123", now, ttl).await.unwrap());
}

#[tokio::test]
async fn gc_stale_locks_removes_only_old_rows() {
    let store = MemoryStore::new();
    let now = Utc::now();
    let ttl = Duration::from_secs(30);
    store.try_acquire_lock("D1", "60123", now, ttl).await.unwrap();
    store.try_acquire_lock("D1", "60124", now + chrono::Duration::seconds(100), ttl).await.unwrap();

    let removed = store.gc_stale_locks(now + chrono::Duration::seconds(50)).await.unwrap();
    assert_eq!(removed, 1);
    assert!(store.locks.read().await.contains_key(&("D1".to_owned(), "60124".to_owned())));
}

#[tokio::test]
async fn get_flow_returns_seeded_flow() {
    let store = MemoryStore::new();
    store.put_flow(sample_flow()).await;
    let flow = store.get_flow("f1").await.unwrap();
    assert!(flow.is_some());
}
