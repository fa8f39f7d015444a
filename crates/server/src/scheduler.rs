// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler (C6): periodic sweep that promotes due delayed messages,
//! resumes `delay`-suspended flows, drains the outbound queue through a
//! bounded worker pool, and opportunistically garbage-collects stale session
//! locks (spec §4.6, §5).
//!
//! Loop shape grounded almost verbatim on
//! `crates/mux/src/upstream/health.rs::spawn_health_checker`: a
//! `tokio::interval` ticking against a `CancellationToken` via
//! `tokio::select!`, snapshot-then-iterate over the batch each tick pulls.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::domain::{FailedMessage, QueueMessage, QueueMessageKind};
use crate::flow_engine::{FlowEngine, FlowEngineError};
use crate::gateway::{DeviceGatewayConfig, GatewayError, ProviderGateway};
use crate::locks::SessionLockManager;
use crate::queue::MessageQueue;
use crate::store::Store;

/// Which `ProviderGateway` method an outbound send uses, decided once in
/// `process_message` so `process_outbound` never has to re-match the
/// impossible `FlowContinuation` case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendKind {
    Text,
    Media,
}

pub struct Scheduler {
    queue: Arc<dyn MessageQueue>,
    gateway: Arc<dyn ProviderGateway>,
    gateway_config: Arc<dyn DeviceGatewayConfig>,
    flow_engine: Arc<FlowEngine>,
    locks: Arc<SessionLockManager>,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    worker_pool_size: usize,
    period: Duration,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        gateway: Arc<dyn ProviderGateway>,
        gateway_config: Arc<dyn DeviceGatewayConfig>,
        flow_engine: Arc<FlowEngine>,
        locks: Arc<SessionLockManager>,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        worker_pool_size: usize,
        period: Duration,
    ) -> Self {
        Self { queue, gateway, gateway_config, flow_engine, locks, store, clock, worker_pool_size, period }
    }

    /// Spawn the sweep loop as a background task. Runs until `shutdown` is
    /// cancelled; a sweep already in flight is allowed to finish (spec §5:
    /// graceful shutdown drains outbound workers but aborts in-flight
    /// delayed-message dispatch is the caller's call to make by how long it
    /// waits before dropping this task).
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(self.period);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = timer.tick() => {}
                }
                self.sweep().await;
            }
        });
    }

    /// One sweep: promote due delayed messages, GC stale locks, then drain up
    /// to `worker_pool_size` ready messages concurrently.
    pub async fn sweep(&self) {
        let now = self.clock.now_utc();

        if let Err(err) = self.queue.promote_due(now).await {
            tracing::warn!(%err, "failed to promote due delayed messages");
        }

        self.locks.gc_stale().await;

        let batch = match self.queue.dequeue_ready(self.worker_pool_size).await {
            Ok(batch) => batch,
            Err(err) => {
                tracing::warn!(%err, "failed to dequeue ready messages");
                return;
            }
        };
        if batch.is_empty() {
            return;
        }

        let tasks = batch.into_iter().map(|message| self.process_message(message));
        futures_util::future::join_all(tasks).await;
    }

    async fn process_message(&self, message: QueueMessage) {
        match message.kind {
            QueueMessageKind::FlowContinuation => self.process_continuation(message).await,
            QueueMessageKind::OutboundText => self.process_outbound(message, SendKind::Text).await,
            QueueMessageKind::OutboundMedia => self.process_outbound(message, SendKind::Media).await,
        }
    }

    /// Resume a `delay`-suspended flow at its persisted node. "Execution not
    /// found" is swallowed (the conversation was cleaned up since this
    /// continuation was scheduled) per spec §4.6.
    async fn process_continuation(&self, message: QueueMessage) {
        let Some(node_id) = message.node_id.clone() else {
            tracing::warn!(device_id = %message.device_id, "flow continuation missing node_id, dropping");
            return;
        };

        match self.flow_engine.resume_delayed(&message.device_id, &message.prospect_num, &node_id).await {
            Ok(_) => {}
            Err(FlowEngineError::ConversationNotFound) => {
                tracing::debug!(
                    device_id = %message.device_id,
                    prospect_num = %message.prospect_num,
                    "flow continuation for a cleaned-up conversation, ignoring"
                );
            }
            Err(err) => {
                tracing::warn!(device_id = %message.device_id, %err, "flow continuation failed");
            }
        }
    }

    async fn process_outbound(&self, message: QueueMessage, kind: SendKind) {
        let Some(settings) = self.gateway_config.resolve(&message.device_id) else {
            tracing::warn!(device_id = %message.device_id, "no gateway settings for device, dropping send");
            return;
        };

        let result = match kind {
            SendKind::Text => {
                self.gateway.send(&settings, &message.prospect_num, message.content.as_deref().unwrap_or_default()).await
            }
            SendKind::Media => {
                self.gateway
                    .send_media(&settings, &message.prospect_num, message.media_url.as_deref().unwrap_or_default())
                    .await
            }
        };

        if let Err(err) = result {
            self.requeue_failed(message, err).await;
        }
    }

    /// Increment `retries`, compute `delay = retries^2 minutes`, and either
    /// park the message in the delayed set or, past `max_retries`, move it to
    /// the dead-letter stream (spec §4.6).
    async fn requeue_failed(&self, mut message: QueueMessage, err: GatewayError) {
        message.retries += 1;

        if message.retries > message.max_retries {
            tracing::warn!(
                device_id = %message.device_id,
                retries = message.retries,
                %err,
                "message exceeded max_retries, moving to dead letters"
            );
            let failed = FailedMessage { message, error: err.to_string(), failed_at: self.clock.now_utc() };
            if let Err(store_err) = self.store.record_failed(failed).await {
                tracing::warn!(%store_err, "failed to record dead letter");
            }
            return;
        }

        let backoff_minutes = i64::from(message.retries).pow(2);
        message.scheduled_at = self.clock.now_utc() + chrono::Duration::minutes(backoff_minutes);
        tracing::debug!(
            device_id = %message.device_id,
            retries = message.retries,
            backoff_minutes,
            %err,
            "requeueing failed send with backoff"
        );
        if let Err(queue_err) = self.queue.enqueue_delayed(message).await {
            tracing::warn!(%queue_err, "failed to requeue failed send");
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
