// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP-backed [`ProviderGateway`]. Each provider's actual wire format is an
//! external collaborator's concern (spec §6 scopes it out of the core); this
//! picks endpoint path and auth header per provider and otherwise stays thin.

use reqwest::Client;
use std::time::Duration;

use crate::gateway::{classify_media, DeviceSettings, GatewayError, MediaType, ProviderGateway, ProviderKind};

pub struct HttpProviderGateway {
    client: Client,
}

impl HttpProviderGateway {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { client }
    }

    fn apply_auth(&self, device: &DeviceSettings, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match device.provider {
            ProviderKind::Wablas => req.header("Authorization", &device.api_token),
            ProviderKind::Whacenter | ProviderKind::Waha => req.bearer_auth(&device.api_token),
        }
    }

    async fn post(&self, device: &DeviceSettings, path: &str, body: serde_json::Value) -> Result<(), GatewayError> {
        let url = format!("{}{}", device.base_url, path);
        let req = self.client.post(url).json(&body);
        self.apply_auth(device, req)
            .send()
            .await
            .map_err(|e| GatewayError::SendFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| GatewayError::SendFailed(e.to_string()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProviderGateway for HttpProviderGateway {
    async fn send(&self, device: &DeviceSettings, prospect_num: &str, text: &str) -> Result<(), GatewayError> {
        let (path, body) = match device.provider {
            ProviderKind::Wablas => (
                "/api/send-message",
                serde_json::json!({ "phone": prospect_num, "message": text }),
            ),
            ProviderKind::Whacenter => (
                "/api/send",
                serde_json::json!({ "number": prospect_num, "message": text }),
            ),
            ProviderKind::Waha => (
                "/api/sendText",
                serde_json::json!({ "chatId": format!("{prospect_num}@c.us"), "text": text }),
            ),
        };
        self.post(device, path, body).await
    }

    async fn send_media(&self, device: &DeviceSettings, prospect_num: &str, url: &str) -> Result<(), GatewayError> {
        let media_type = classify_media(url);
        let (path, body) = match device.provider {
            ProviderKind::Wablas => {
                let field = match media_type {
                    MediaType::Video => "video",
                    MediaType::Audio => "audio",
                    MediaType::Image => "image",
                };
                ("/api/send-media", serde_json::json!({ "phone": prospect_num, field: url }))
            }
            ProviderKind::Whacenter => (
                "/api/send",
                serde_json::json!({ "number": prospect_num, "media_url": url }),
            ),
            ProviderKind::Waha => {
                let endpoint = match media_type {
                    MediaType::Video => "/api/sendVideo",
                    MediaType::Audio => "/api/sendVoice",
                    MediaType::Image => "/api/sendImage",
                };
                (
                    endpoint,
                    serde_json::json!({ "chatId": format!("{prospect_num}@c.us"), "file": { "url": url } }),
                )
            }
        };
        self.post(device, path, body).await
    }
}
