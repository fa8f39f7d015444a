// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::domain::ConditionKind;

fn edges() -> Vec<Edge> {
    vec![
        Edge { id: "e0".to_owned(), source: "cond".to_owned(), target: "A".to_owned() },
        Edge { id: "e1".to_owned(), source: "cond".to_owned(), target: "B".to_owned() },
        Edge { id: "e2".to_owned(), source: "cond".to_owned(), target: "C".to_owned() },
        Edge { id: "e3".to_owned(), source: "cond".to_owned(), target: "D".to_owned() },
    ]
}

fn refs(edges: &[Edge]) -> Vec<&Edge> {
    edges.iter().collect()
}

fn labeled_conditions() -> Vec<Condition> {
    ["1", "2", "3", "4"]
        .into_iter()
        .map(|label| Condition { kind: ConditionKind::Equals, value: String::new(), label: Some(label.to_owned()) })
        .collect()
}

#[test]
fn numeric_menu_takes_priority_over_label_match() {
    let edges = edges();
    let result = route("3", &refs(&edges), &labeled_conditions()).unwrap();
    assert_eq!(result.target, "C");
    assert!(!result.used_fallback);
}

#[test]
fn numeric_input_does_not_fall_through_to_string_match_out_of_range() {
    // "3" is in range [1,4] so it must take edges[2] even though no
    // condition's label or value happens to equal "3" literally elsewhere.
    let edges = edges();
    let conditions = vec![Condition { kind: ConditionKind::Equals, value: "3".to_owned(), label: None }];
    let result = route("3", &refs(&edges), &conditions).unwrap();
    assert_eq!(result.target, "C");
}

#[test]
fn label_match_wins_when_input_is_not_numeric() {
    let edges = edges();
    let result = route("2", &refs(&edges), &labeled_conditions()).unwrap();
    assert_eq!(result.target, "B");
}

#[test]
fn contains_condition_matches_case_insensitively() {
    let edges = edges();
    let conditions = vec![
        Condition { kind: ConditionKind::Default, value: String::new(), label: None },
        Condition { kind: ConditionKind::Contains, value: "contact".to_owned(), label: None },
    ];
    let result = route("please CONTACT us", &refs(&edges), &conditions).unwrap();
    assert_eq!(result.target, "B");
}

#[test]
fn equals_condition_matches_trimmed_case_insensitive_value() {
    let edges = edges();
    let conditions = vec![Condition { kind: ConditionKind::Equals, value: "Yes".to_owned(), label: None }];
    let result = route("  yes  ", &refs(&edges), &conditions).unwrap();
    assert_eq!(result.target, "A");
}

#[test]
fn default_condition_is_used_when_nothing_else_matches() {
    let edges = edges();
    let conditions = vec![
        Condition { kind: ConditionKind::Equals, value: "a".to_owned(), label: None },
        Condition { kind: ConditionKind::Equals, value: "b".to_owned(), label: None },
        Condition { kind: ConditionKind::Equals, value: "c".to_owned(), label: None },
        Condition { kind: ConditionKind::Default, value: String::new(), label: None },
    ];
    let result = route("xyz", &refs(&edges), &conditions).unwrap();
    assert_eq!(result.target, "D");
    assert!(!result.used_fallback);
}

#[test]
fn falls_back_to_first_edge_and_flags_fallback_when_nothing_matches() {
    let edges = edges();
    let result = route("xyz", &refs(&edges), &[]).unwrap();
    assert_eq!(result.target, "A");
    assert!(result.used_fallback);
}

#[test]
fn no_edges_yields_no_route() {
    let edges: Vec<Edge> = vec![];
    assert!(route("1", &refs(&edges), &[]).is_none());
}

proptest::proptest! {
    /// Any in-range numeric input routes to `edges[n-1]` regardless of what
    /// the conditions say, since the numeric menu is priority 1.
    #[test]
    fn numeric_in_range_always_wins_over_conditions(n in 1usize..=4, edge_count in 1usize..=4) {
        let edges = edges();
        let edges = &edges[..edge_count];
        let conditions = labeled_conditions();
        let conditions = &conditions[..edge_count.min(conditions.len())];
        let result = route(&n.to_string(), &refs(edges), conditions);
        if n <= edge_count {
            let result = result.unwrap();
            proptest::prop_assert_eq!(&result.target, &edges[n - 1].target);
            proptest::prop_assert!(!result.used_fallback);
        }
    }

    /// Routing never panics and always yields a result whose target is one
    /// of `edges`' targets (or `None` when `edges` is empty), for any input.
    #[test]
    fn routing_never_panics_and_stays_within_edge_targets(input in ".*") {
        let edges = edges();
        let conditions = labeled_conditions();
        let result = route(&input, &refs(&edges), &conditions);
        let result = result.unwrap();
        proptest::prop_assert!(edges.iter().any(|e| e.target == result.target));
    }
}
