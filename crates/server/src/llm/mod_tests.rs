// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn pinned_devices_route_to_openai() {
    assert_eq!(select_endpoint("SCHQ-S94"), Endpoint::OpenAi);
    assert_eq!(select_endpoint("SCHQ-S12"), Endpoint::OpenAi);
}

#[test]
fn other_devices_route_to_openrouter() {
    assert_eq!(select_endpoint("D1"), Endpoint::OpenRouter);
}

#[test]
fn default_completion_options_match_spec() {
    let opts = CompletionOptions::default();
    assert_eq!(opts.temperature, 0.67);
    assert_eq!(opts.top_p, 1.0);
    assert_eq!(opts.repetition_penalty, 1.0);
}
