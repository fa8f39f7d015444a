// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;

#[tokio::test]
async fn get_then_insert_round_trips() {
    let cache = ResponseCache::new(Duration::from_secs(300));
    let key = ResponseCache::key("sys", "hi", &[]);
    assert!(cache.get(&key).await.is_none());
    cache.insert(key.clone(), "reply".to_owned()).await;
    assert_eq!(cache.get(&key).await, Some("reply".to_owned()));
}

#[test]
fn key_is_stable_for_identical_inputs() {
    let history = vec!["a".to_owned(), "b".to_owned()];
    let k1 = ResponseCache::key("sys", "hi", &history);
    let k2 = ResponseCache::key("sys", "hi", &history);
    assert_eq!(k1, k2);
}

#[test]
fn key_differs_when_history_differs() {
    let k1 = ResponseCache::key("sys", "hi", &["a".to_owned()]);
    let k2 = ResponseCache::key("sys", "hi", &["b".to_owned()]);
    assert_ne!(k1, k2);
}

#[test]
fn key_only_considers_last_three_history_entries() {
    let long = vec!["x".to_owned(), "a".to_owned(), "b".to_owned(), "c".to_owned()];
    let short = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];
    assert_eq!(ResponseCache::key("sys", "hi", &long), ResponseCache::key("sys", "hi", &short));
}
