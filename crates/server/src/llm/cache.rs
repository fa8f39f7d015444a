// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LLM response cache (spec §4.5): keyed by a hash of `(system_prompt,
//! user_input, last 3 history items)`, 5-minute TTL. Only consulted on the
//! regular `complete` path — `advanced_ai_prompt` calls opt out since their
//! JSON-format responses are expected to drift call to call.
//!
//! Crate grounded on `querymt`'s agent crate's `moka` dependency for the same
//! concern (an in-process response cache in front of a remote LLM call).

use std::time::Duration;

use moka::future::Cache;
use sha2::{Digest, Sha256};

pub struct ResponseCache {
    cache: Cache<String, String>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self { cache: Cache::builder().time_to_live(ttl).max_capacity(10_000).build() }
    }

    /// Build the cache key from the system prompt, the current user input,
    /// and the last 3 history entries (spec §4.5).
    pub fn key(system_prompt: &str, user_input: &str, history: &[String]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(system_prompt.as_bytes());
        hasher.update(b"\0");
        hasher.update(user_input.as_bytes());
        for entry in history.iter().rev().take(3).rev() {
            hasher.update(b"\0");
            hasher.update(entry.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: String, value: String) {
        self.cache.insert(key, value).await;
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
