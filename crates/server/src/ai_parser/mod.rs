// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AI Response Parser (C3): normalizes five tolerated LLM response shapes
//! into an ordered item list and applies the `onemessage` coalescing rule.
//!
//! Format tolerance, tried in order (spec §4.3), accepting the first that
//! yields a non-empty stage and a non-empty item list:
//! 1. direct JSON object `{"Stage":..., "Response":[...]}`
//! 2. the same JSON fenced in ` ```json ... ``` `
//! 3. legacy plain text `Stage: <s>\nResponse: [<json array>]`
//! 4. a JSON object extracted via regex from surrounding prose
//! 5. plain text fallback: `stage="Problem Identification"`, one text item

use std::sync::OnceLock;

use serde::Deserialize;

/// Media/text kind of a parsed response item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    Text,
    Image,
    Audio,
    Video,
}

/// One item of an LLM response, after format normalization but before
/// `onemessage` coalescing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedItem {
    pub item_type: ItemType,
    pub content: String,
    /// `true` when this item carries the `onemessage` marker (spec §4.3,
    /// GLOSSARY). Only meaningful for `Text` items.
    pub onemessage: bool,
}

/// The normalized result of parsing one raw LLM response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub stage: String,
    pub items: Vec<ParsedItem>,
}

const FALLBACK_STAGE: &str = "Problem Identification";

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "Stage", alias = "stage", default)]
    stage: String,
    #[serde(rename = "Response", alias = "response", default)]
    response: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(rename = "type", default)]
    item_type: String,
    #[serde(default)]
    content: String,
    #[serde(rename = "Jenis", alias = "jenis", default)]
    jenis: Option<String>,
}

/// Parse a raw LLM response into `(stage, items)`, trying each tolerated
/// format in order and falling back to a single plain-text item.
pub fn parse(raw: &str) -> ParsedResponse {
    let attempts: [fn(&str) -> Option<ParsedResponse>; 4] =
        [try_direct_json, try_fenced_json, try_legacy_text, try_regex_extract];

    for attempt in attempts {
        if let Some(response) = attempt(raw) {
            if !response.stage.is_empty() && !response.items.is_empty() {
                return response;
            }
        }
    }

    ParsedResponse {
        stage: FALLBACK_STAGE.to_owned(),
        items: vec![ParsedItem { item_type: ItemType::Text, content: raw.trim().to_owned(), onemessage: false }],
    }
}

fn envelope_to_response(envelope: RawEnvelope) -> ParsedResponse {
    let items = envelope
        .response
        .into_iter()
        .filter(|item| !item.item_type.is_empty() && !item.content.trim().is_empty())
        .filter_map(|item| {
            let item_type = match item.item_type.to_ascii_lowercase().as_str() {
                "text" => ItemType::Text,
                "image" => ItemType::Image,
                "audio" => ItemType::Audio,
                "video" => ItemType::Video,
                _ => return None,
            };
            let onemessage = item.jenis.as_deref().map(|j| j.eq_ignore_ascii_case("onemessage")).unwrap_or(false);
            let content = match item_type {
                ItemType::Text => item.content,
                ItemType::Image | ItemType::Audio | ItemType::Video => normalize_media_content(&item.content),
            };
            Some(ParsedItem { item_type, content, onemessage })
        })
        .collect();
    ParsedResponse { stage: envelope.stage, items }
}

fn try_direct_json(raw: &str) -> Option<ParsedResponse> {
    let envelope: RawEnvelope = serde_json::from_str(raw.trim()).ok()?;
    Some(envelope_to_response(envelope))
}

/// Builds and caches a regex the first time it's needed. Returns `None`
/// (rather than panicking) if the pattern fails to compile, so a broken
/// pattern degrades an optional format attempt instead of taking down the
/// parser.
fn cached_regex(cell: &'static OnceLock<Option<regex::Regex>>, pattern: &str) -> Option<&'static regex::Regex> {
    cell.get_or_init(|| match regex::Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(err) => {
            tracing::warn!(%err, pattern, "failed to compile ai_parser regex");
            None
        }
    })
    .as_ref()
}

fn fence_re() -> Option<&'static regex::Regex> {
    static RE: OnceLock<Option<regex::Regex>> = OnceLock::new();
    cached_regex(&RE, r"(?s)```(?:json)?\s*(\{.*?\})\s*```")
}

fn try_fenced_json(raw: &str) -> Option<ParsedResponse> {
    let captures = fence_re()?.captures(raw)?;
    let body = captures.get(1)?.as_str();
    let envelope: RawEnvelope = serde_json::from_str(body).ok()?;
    Some(envelope_to_response(envelope))
}

fn legacy_re() -> Option<&'static regex::Regex> {
    static RE: OnceLock<Option<regex::Regex>> = OnceLock::new();
    cached_regex(&RE, r"(?s)Stage:\s*(?P<stage>[^\n]+)\s*Response:\s*(?P<array>\[.*\])")
}

fn try_legacy_text(raw: &str) -> Option<ParsedResponse> {
    let captures = legacy_re()?.captures(raw)?;
    let stage = captures.name("stage")?.as_str().trim().to_owned();
    let array = captures.name("array")?.as_str();
    let raw_items: Vec<RawItem> = serde_json::from_str(array).ok()?;
    Some(envelope_to_response(RawEnvelope { stage, response: raw_items }))
}

fn prose_json_re() -> Option<&'static regex::Regex> {
    static RE: OnceLock<Option<regex::Regex>> = OnceLock::new();
    cached_regex(&RE, r#"(?s)\{.*"Response"\s*:\s*\[.*\].*\}"#)
}

fn try_regex_extract(raw: &str) -> Option<ParsedResponse> {
    let matched = prose_json_re()?.find(raw)?;
    let envelope: RawEnvelope = serde_json::from_str(matched.as_str()).ok()?;
    Some(envelope_to_response(envelope))
}

fn bracket_media_re() -> Option<&'static regex::Regex> {
    static RE: OnceLock<Option<regex::Regex>> = OnceLock::new();
    cached_regex(&RE, r"(?i)^\[(?:image|audio|video)\s*:\s*(?P<url>[^\]]+)\]$")
}

/// Extract a bracket-form `[IMAGE: url]` URL if present, percent-decode, and
/// strip surrounding backticks (spec §4.3 edge case).
fn normalize_media_content(content: &str) -> String {
    let trimmed = content.trim().trim_matches('`');
    let extracted = match bracket_media_re().and_then(|re| re.captures(trimmed)) {
        Some(captures) => captures.name("url").map(|m| m.as_str()).unwrap_or(trimmed),
        None => trimmed,
    };
    urlencoding::decode(extracted).map(|s| s.into_owned()).unwrap_or_else(|_| extracted.to_owned())
}

/// An item after `onemessage` coalescing, tagged with whether it came out of
/// the buffer (and so logs as `BOT_COMBINED`) or passed through untouched
/// (logs as `BOT`). A run of exactly one buffered item still counts as
/// combined — spec §4.3 says the buffer is flushed and logged as
/// `BOT_COMBINED` regardless of run length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoalescedItem {
    pub item_type: ItemType,
    pub content: String,
    pub combined: bool,
}

/// Apply the `onemessage` coalescing rule (spec §4.3, GLOSSARY): consecutive
/// text items carrying the marker are joined with `"\n"` into one combined
/// item; everything else flushes the run and passes through unchanged.
pub fn coalesce_onemessage(items: Vec<ParsedItem>) -> Vec<CoalescedItem> {
    let mut out = Vec::with_capacity(items.len());
    let mut buffer: Vec<String> = Vec::new();

    let flush = |buffer: &mut Vec<String>, out: &mut Vec<CoalescedItem>| {
        if !buffer.is_empty() {
            out.push(CoalescedItem {
                item_type: ItemType::Text,
                content: buffer.join("\n"),
                combined: true,
            });
            buffer.clear();
        }
    };

    for item in items {
        if item.item_type == ItemType::Text && item.onemessage {
            buffer.push(item.content);
        } else {
            flush(&mut buffer, &mut out);
            out.push(CoalescedItem { item_type: item.item_type, content: item.content, combined: false });
        }
    }
    flush(&mut buffer, &mut out);
    out
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
