// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis-backed queue. `ready` is a list (`RPUSH`/`LPOP`); `delayed` is a
//! sorted set scored by the message's due timestamp, so `promote_due` is a
//! single `ZRANGEBYSCORE` + `ZREM` + `RPUSH` pipeline.

use chrono::{DateTime, Utc};
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Config, Pool, Runtime};

use crate::domain::QueueMessage;
use crate::queue::{MessageQueue, QueueError};

const READY_KEY: &str = "flowbot:queue:ready";
const DELAYED_KEY: &str = "flowbot:queue:delayed";

pub struct RedisQueue {
    pool: Pool,
}

impl RedisQueue {
    pub fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1))?;
        Ok(Self { pool })
    }

    fn map_err(err: impl std::fmt::Display) -> QueueError {
        QueueError::Unavailable(err.to_string())
    }

    fn encode(message: &QueueMessage) -> Result<String, QueueError> {
        serde_json::to_string(message)
            .map_err(|e| QueueError::Unavailable(format!("encode message: {e}")))
    }

    fn decode(payload: &str) -> Result<QueueMessage, QueueError> {
        serde_json::from_str(payload)
            .map_err(|e| QueueError::Unavailable(format!("corrupt queue payload: {e}")))
    }
}

#[async_trait::async_trait]
impl MessageQueue for RedisQueue {
    async fn enqueue(&self, message: QueueMessage) -> Result<(), QueueError> {
        let mut conn = self.pool.get().await.map_err(Self::map_err)?;
        let payload = Self::encode(&message)?;
        let _: () = conn.rpush(READY_KEY, payload).await.map_err(Self::map_err)?;
        Ok(())
    }

    async fn enqueue_delayed(&self, message: QueueMessage) -> Result<(), QueueError> {
        let mut conn = self.pool.get().await.map_err(Self::map_err)?;
        let score = message.scheduled_at.timestamp_millis();
        let payload = Self::encode(&message)?;
        let _: () = conn.zadd(DELAYED_KEY, payload, score).await.map_err(Self::map_err)?;
        Ok(())
    }

    async fn dequeue_ready(&self, max: usize) -> Result<Vec<QueueMessage>, QueueError> {
        if max == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.pool.get().await.map_err(Self::map_err)?;
        let payloads: Vec<String> =
            conn.lpop(READY_KEY, std::num::NonZeroUsize::new(max)).await.map_err(Self::map_err)?;
        payloads.iter().map(|p| Self::decode(p)).collect()
    }

    async fn promote_due(&self, now: DateTime<Utc>) -> Result<u64, QueueError> {
        let mut conn = self.pool.get().await.map_err(Self::map_err)?;
        let due: Vec<String> = conn
            .zrangebyscore(DELAYED_KEY, "-inf", now.timestamp_millis())
            .await
            .map_err(Self::map_err)?;
        if due.is_empty() {
            return Ok(0);
        }
        let _: () = conn.zrem(DELAYED_KEY, &due).await.map_err(Self::map_err)?;
        let _: () = conn.rpush(READY_KEY, &due).await.map_err(Self::map_err)?;
        Ok(due.len() as u64)
    }

    async fn retry(&self, message: QueueMessage) -> Result<(), QueueError> {
        self.enqueue(message).await
    }
}
