// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Default device-config resolvers.
//!
//! Device-settings CRUD (which flow a device runs, which LLM key/model it
//! uses, which provider it sends through) is out of scope for the core
//! (spec §1, §6) — in production these resolvers are supplied by the
//! surrounding deployment, backed by whatever store holds device
//! configuration. [`run`](crate::run) wires these no-op stand-ins so the
//! server is runnable standalone: every device falls back to the AI-only
//! path with the configured default OpenRouter key and no outbound
//! provider (sends are logged and dropped until a real resolver is wired
//! in).

use crate::dispatcher::DeviceFlowConfig;
use crate::gateway::{DeviceGatewayConfig, DeviceSettings};
use crate::llm::{DeviceLlmConfig, DeviceLlmSettings};

/// No device has a configured flow; every device takes the AI-only path.
pub struct NullDeviceFlowConfig;

impl DeviceFlowConfig for NullDeviceFlowConfig {
    fn resolve_flow(&self, _device_id: &str) -> Option<String> {
        None
    }
}

/// No device has a per-device key/model override; every call falls back to
/// the configured default OpenRouter key.
pub struct NullDeviceLlmConfig;

impl DeviceLlmConfig for NullDeviceLlmConfig {
    fn resolve(&self, _device_id: &str) -> Option<DeviceLlmSettings> {
        None
    }
}

/// No device has provider credentials configured.
pub struct NullDeviceGatewayConfig;

impl DeviceGatewayConfig for NullDeviceGatewayConfig {
    fn resolve(&self, _device_id: &str) -> Option<DeviceSettings> {
        None
    }
}
