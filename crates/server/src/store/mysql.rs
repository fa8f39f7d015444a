// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! MySQL-backed store. Tables assumed to exist (spec §6):
//! `chatbot_flows`, `ai_whatsapp` (carrying a `table_kind` column in place of
//! the historical parallel `wasapBot` table, per DESIGN.md), and
//! `ai_whatsapp_session_nodepath` for session locks.

use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySql, MySqlPool, Row, Transaction};
use std::time::Duration;

use crate::domain::{
    Conversation, ExecutionStatus, FailedMessage, Flow, Node, QueueMessage, TableKind,
};
use crate::store::{FlowTrackingUpdate, Store, StoreError};

pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    /// Connect to `uri`, with the store round-trip timeout applied to the
    /// pool's per-connection acquire timeout.
    pub async fn connect(uri: &str, connect_timeout: Duration) -> anyhow::Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(20)
            .acquire_timeout(connect_timeout)
            .connect(uri)
            .await?;
        Ok(Self { pool })
    }

    fn map_sqlx_err(err: sqlx::Error) -> StoreError {
        StoreError::Unavailable(err.to_string())
    }
}

fn row_to_conversation(row: &sqlx::mysql::MySqlRow) -> Result<Conversation, StoreError> {
    let table_kind_str: String = row.try_get("table_kind").map_err(MySqlStore::map_sqlx_err)?;
    let execution_status_str: String =
        row.try_get("execution_status").map_err(MySqlStore::map_sqlx_err)?;
    Ok(Conversation {
        device_id: row.try_get("device_id").map_err(MySqlStore::map_sqlx_err)?,
        prospect_num: row.try_get("prospect_num").map_err(MySqlStore::map_sqlx_err)?,
        prospect_name: row.try_get("prospect_name").map_err(MySqlStore::map_sqlx_err)?,
        stage: row.try_get("stage").map_err(MySqlStore::map_sqlx_err)?,
        flow_id: row.try_get("flow_id").map_err(MySqlStore::map_sqlx_err)?,
        current_node_id: row.try_get("current_node_id").map_err(MySqlStore::map_sqlx_err)?,
        last_node_id: row.try_get("last_node_id").map_err(MySqlStore::map_sqlx_err)?,
        waiting_for_reply: row.try_get::<i8, _>("waiting_for_reply").map_err(MySqlStore::map_sqlx_err)? != 0,
        execution_status: match execution_status_str.as_str() {
            "completed" => ExecutionStatus::Completed,
            "failed" => ExecutionStatus::Failed,
            _ => ExecutionStatus::Active,
        },
        execution_id: row.try_get("execution_id").map_err(MySqlStore::map_sqlx_err)?,
        conversation_log: row.try_get("conversation_log").map_err(MySqlStore::map_sqlx_err)?,
        human_takeover: row.try_get::<i8, _>("human_takeover").map_err(MySqlStore::map_sqlx_err)? != 0,
        niche: row.try_get("niche").map_err(MySqlStore::map_sqlx_err)?,
        intro: row.try_get("intro").map_err(MySqlStore::map_sqlx_err)?,
        table_kind: if table_kind_str == "wasap_bot" { TableKind::WasapBot } else { TableKind::Primary },
        created_at: row.try_get("created_at").map_err(MySqlStore::map_sqlx_err)?,
        updated_at: row.try_get("updated_at").map_err(MySqlStore::map_sqlx_err)?,
    })
}

#[async_trait::async_trait]
impl Store for MySqlStore {
    async fn get_flow(&self, flow_id: &str) -> Result<Option<Flow>, StoreError> {
        let row = sqlx::query(
            "SELECT id, device_id, name, niche, nodes_json, edges_json FROM chatbot_flows WHERE id = ?",
        )
        .bind(flow_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;

        let Some(row) = row else { return Ok(None) };
        let nodes_json: String = row.try_get("nodes_json").map_err(Self::map_sqlx_err)?;
        let edges_json: String = row.try_get("edges_json").map_err(Self::map_sqlx_err)?;
        let node_list: Vec<Node> = serde_json::from_str(&nodes_json)
            .map_err(|e| StoreError::Unavailable(format!("corrupt nodes_json: {e}")))?;
        let edges = serde_json::from_str(&edges_json)
            .map_err(|e| StoreError::Unavailable(format!("corrupt edges_json: {e}")))?;
        let mut nodes = indexmap::IndexMap::new();
        for node in node_list {
            nodes.insert(node.id.clone(), node);
        }

        Ok(Some(Flow {
            id: row.try_get("id").map_err(Self::map_sqlx_err)?,
            device_id: row.try_get("device_id").map_err(Self::map_sqlx_err)?,
            name: row.try_get("name").map_err(Self::map_sqlx_err)?,
            niche: row.try_get("niche").map_err(Self::map_sqlx_err)?,
            nodes,
            edges,
        }))
    }

    async fn get_conversation(
        &self,
        device_id: &str,
        prospect_num: &str,
    ) -> Result<Option<Conversation>, StoreError> {
        let row = sqlx::query("SELECT * FROM ai_whatsapp WHERE device_id = ? AND prospect_num = ?")
            .bind(device_id)
            .bind(prospect_num)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        row.as_ref().map(row_to_conversation).transpose()
    }

    async fn create_conversation(&self, conversation: Conversation) -> Result<(), StoreError> {
        let table_kind = match conversation.table_kind {
            TableKind::Primary => "primary",
            TableKind::WasapBot => "wasap_bot",
        };
        let execution_status = match conversation.execution_status {
            ExecutionStatus::Active => "active",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        };
        let result = sqlx::query(
            "INSERT INTO ai_whatsapp (
                device_id, prospect_num, prospect_name, stage, flow_id, current_node_id,
                last_node_id, waiting_for_reply, execution_status, execution_id,
                conversation_log, human_takeover, niche, intro, table_kind, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&conversation.device_id)
        .bind(&conversation.prospect_num)
        .bind(&conversation.prospect_name)
        .bind(&conversation.stage)
        .bind(&conversation.flow_id)
        .bind(&conversation.current_node_id)
        .bind(&conversation.last_node_id)
        .bind(conversation.waiting_for_reply as i8)
        .bind(execution_status)
        .bind(&conversation.execution_id)
        .bind(&conversation.conversation_log)
        .bind(conversation.human_takeover as i8)
        .bind(&conversation.niche)
        .bind(&conversation.intro)
        .bind(table_kind)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::AlreadyExists)
            }
            Err(e) => Err(Self::map_sqlx_err(e)),
        }
    }

    async fn update_flow_tracking(
        &self,
        device_id: &str,
        prospect_num: &str,
        update: FlowTrackingUpdate,
    ) -> Result<(), StoreError> {
        let execution_status = match update.execution_status {
            ExecutionStatus::Active => "active",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        };
        // Deliberately omits conversation_log, stage, prospect_name, intro,
        // niche, human_takeover — see FlowTrackingUpdate doc comment.
        let result = sqlx::query(
            "UPDATE ai_whatsapp SET
                flow_id = ?, current_node_id = ?, last_node_id = ?, waiting_for_reply = ?,
                execution_status = ?, execution_id = ?, updated_at = ?
             WHERE device_id = ? AND prospect_num = ?",
        )
        .bind(&update.flow_id)
        .bind(&update.current_node_id)
        .bind(&update.last_node_id)
        .bind(update.waiting_for_reply as i8)
        .bind(execution_status)
        .bind(&update.execution_id)
        .bind(Utc::now())
        .bind(device_id)
        .bind(prospect_num)
        .execute(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn append_log(
        &self,
        device_id: &str,
        prospect_num: &str,
        lines: &[String],
    ) -> Result<(), StoreError> {
        if lines.is_empty() {
            return Ok(());
        }
        let joined = lines.join("\n");
        // CONCAT_WS keeps this a single atomic statement so concurrent
        // appenders (inbound worker + admin takeover path) never interleave
        // partial writes.
        let result = sqlx::query(
            "UPDATE ai_whatsapp SET conversation_log = CASE
                WHEN conversation_log = '' THEN ?
                ELSE CONCAT_WS('\n', conversation_log, ?)
             END
             WHERE device_id = ? AND prospect_num = ?",
        )
        .bind(&joined)
        .bind(&joined)
        .bind(device_id)
        .bind(prospect_num)
        .execute(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn update_stage(
        &self,
        device_id: &str,
        prospect_num: &str,
        stage: Option<String>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE ai_whatsapp SET stage = ? WHERE device_id = ? AND prospect_num = ?")
            .bind(stage)
            .bind(device_id)
            .bind(prospect_num)
            .execute(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_human(
        &self,
        device_id: &str,
        prospect_num: &str,
        human_takeover: bool,
    ) -> Result<(), StoreError> {
        // Note: deliberately does not acquire the session lock. spec §9
        // documents this as an open race between an admin takeover and an
        // inbound worker mid-flow; left unresolved per DESIGN.md.
        let result = sqlx::query(
            "UPDATE ai_whatsapp SET human_takeover = ? WHERE device_id = ? AND prospect_num = ?",
        )
        .bind(human_takeover as i8)
        .bind(device_id)
        .bind(prospect_num)
        .execute(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn record_failed(&self, failed: FailedMessage) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&failed.message)
            .map_err(|e| StoreError::Unavailable(format!("encode failed message: {e}")))?;
        sqlx::query(
            "INSERT INTO flow_dead_letters (message_json, error, failed_at) VALUES (?, ?, ?)",
        )
        .bind(payload)
        .bind(&failed.error)
        .bind(failed.failed_at)
        .execute(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        Ok(())
    }

    async fn list_failed(&self) -> Result<Vec<FailedMessage>, StoreError> {
        let rows = sqlx::query("SELECT message_json, error, failed_at FROM flow_dead_letters ORDER BY failed_at DESC LIMIT 500")
            .fetch_all(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let message_json: String = row.try_get("message_json").map_err(Self::map_sqlx_err)?;
            let message: QueueMessage = serde_json::from_str(&message_json)
                .map_err(|e| StoreError::Unavailable(format!("corrupt message_json: {e}")))?;
            out.push(FailedMessage {
                message,
                error: row.try_get("error").map_err(Self::map_sqlx_err)?,
                failed_at: row.try_get("failed_at").map_err(Self::map_sqlx_err)?,
            });
        }
        Ok(out)
    }

    async fn try_acquire_lock(
        &self,
        device_id: &str,
        prospect_num: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut tx: Transaction<'_, MySql> =
            self.pool.begin().await.map_err(Self::map_sqlx_err)?;

        let existing = sqlx::query(
            "SELECT timestamp FROM ai_whatsapp_session_nodepath
             WHERE id_device = ? AND id_prospect = ? FOR UPDATE",
        )
        .bind(device_id)
        .bind(prospect_num)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Self::map_sqlx_err)?;

        let stale = match existing {
            None => true,
            Some(ref row) => {
                let acquired_at: DateTime<Utc> =
                    row.try_get("timestamp").map_err(Self::map_sqlx_err)?;
                now.signed_duration_since(acquired_at)
                    >= chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero())
            }
        };

        if !stale {
            tx.rollback().await.map_err(Self::map_sqlx_err)?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO ai_whatsapp_session_nodepath (id_device, id_prospect, timestamp)
             VALUES (?, ?, ?)
             ON DUPLICATE KEY UPDATE timestamp = VALUES(timestamp)",
        )
        .bind(device_id)
        .bind(prospect_num)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Self::map_sqlx_err)?;

        tx.commit().await.map_err(Self::map_sqlx_err)?;
        Ok(true)
    }

    async fn release_lock(&self, device_id: &str, prospect_num: &str) -> Result<(), StoreError> {
        sqlx::query(
            "DELETE FROM ai_whatsapp_session_nodepath WHERE id_device = ? AND id_prospect = ?",
        )
        .bind(device_id)
        .bind(prospect_num)
        .execute(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        Ok(())
    }

    async fn gc_stale_locks(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM ai_whatsapp_session_nodepath WHERE timestamp < ?")
            .bind(older_than)
            .execute(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        Ok(result.rows_affected())
    }
}
