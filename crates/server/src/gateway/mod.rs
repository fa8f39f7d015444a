// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider Gateway (L4): uniform send interface over the three supported
//! messaging providers. Per-provider request/payload shape is a thin adapter
//! at the edge — the core only ever calls [`ProviderGateway::send`] and
//! [`ProviderGateway::send_media`].

pub mod http;

use serde::{Deserialize, Serialize};

/// Which provider a device is registered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Wablas,
    Whacenter,
    Waha,
}

/// Per-device settings needed to reach a provider (device-settings CRUD and
/// storage are out of scope here; the core is handed a populated value).
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    pub device_id: String,
    pub provider: ProviderKind,
    pub base_url: String,
    pub api_token: String,
}

/// Media kind inferred from a URL's file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Video,
    Audio,
    Image,
}

/// Classify a media URL by extension: `.mp4`→video, `.mp3`→audio, otherwise
/// image (spec §6).
pub fn classify_media(url: &str) -> MediaType {
    let lower = url.to_ascii_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or(&lower);
    if path.ends_with(".mp4") || path.ends_with(".mov") || path.ends_with(".webm") {
        MediaType::Video
    } else if path.ends_with(".mp3") || path.ends_with(".ogg") || path.ends_with(".wav") {
        MediaType::Audio
    } else {
        MediaType::Image
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The provider's endpoint rejected or timed out the request.
    SendFailed(String),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SendFailed(msg) => write!(f, "provider send failed: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}

/// Resolves which provider and credentials a device sends through.
/// Device-settings CRUD is out of scope for the core (spec §1); the core is
/// handed a resolver, same pattern as [`crate::llm::DeviceLlmConfig`] and
/// [`crate::dispatcher::DeviceFlowConfig`].
pub trait DeviceGatewayConfig: Send + Sync {
    fn resolve(&self, device_id: &str) -> Option<DeviceSettings>;
}

#[async_trait::async_trait]
pub trait ProviderGateway: Send + Sync {
    async fn send(
        &self,
        device: &DeviceSettings,
        prospect_num: &str,
        text: &str,
    ) -> Result<(), GatewayError>;

    async fn send_media(
        &self,
        device: &DeviceSettings,
        prospect_num: &str,
        url: &str,
    ) -> Result<(), GatewayError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
