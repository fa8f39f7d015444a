// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Condition-node edge routing (spec §4.4): the ordered, numeric-menu-first
//! algorithm that replaces the historical by-index walk which misrouted
//! numeric input like `"3"` to `edges[1]`.

use crate::domain::{Condition, ConditionKind, Edge};

/// Outcome of evaluating a condition node against one `user_input`.
pub struct RouteResult {
    pub target: String,
    /// Set when no rule matched and the fallback `edges[0]` was taken.
    pub used_fallback: bool,
}

/// Route `user_input` to one of `edges` given the node's `conditions`, in the
/// priority order spec §4.4 mandates: numeric menu, then label match, then
/// value equals/contains (case-insensitive), then a `default` condition,
/// then `edges[0]` as a last-resort fallback.
///
/// `conditions[i]` corresponds to `edges[i]`; a condition list shorter than
/// `edges` is valid (trailing edges have no matching rule, just priority 5).
pub fn route(user_input: &str, edges: &[&Edge], conditions: &[Condition]) -> Option<RouteResult> {
    let first = edges.first()?;

    if let Ok(n) = user_input.trim().parse::<usize>() {
        if n >= 1 && n <= edges.len() {
            return Some(RouteResult { target: edges[n - 1].target.clone(), used_fallback: false });
        }
    }

    for (i, condition) in conditions.iter().enumerate() {
        if let Some(label) = &condition.label {
            if !label.is_empty() && user_input == label {
                if let Some(edge) = edges.get(i) {
                    return Some(RouteResult { target: edge.target.clone(), used_fallback: false });
                }
            }
        }
    }

    let trimmed = user_input.trim().to_lowercase();
    for (i, condition) in conditions.iter().enumerate() {
        if condition.value.is_empty() {
            continue;
        }
        let matches = match condition.kind {
            ConditionKind::Equals => trimmed == condition.value.to_lowercase(),
            ConditionKind::Contains => trimmed.contains(&condition.value.to_lowercase()),
            ConditionKind::Default => false,
        };
        if matches {
            if let Some(edge) = edges.get(i) {
                return Some(RouteResult { target: edge.target.clone(), used_fallback: false });
            }
        }
    }

    if let Some(j) = conditions.iter().position(|c| c.kind == ConditionKind::Default) {
        if let Some(edge) = edges.get(j) {
            return Some(RouteResult { target: edge.target.clone(), used_fallback: false });
        }
    }

    Some(RouteResult { target: first.target.clone(), used_fallback: true })
}

#[cfg(test)]
#[path = "condition_tests.rs"]
mod tests;
