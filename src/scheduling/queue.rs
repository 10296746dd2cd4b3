//! Work queue port: an abstraction over a durable, SQS-shaped FIFO-ish
//! queue with visibility-timeout redelivery and dead-letter routing.
//! Treated as an external collaborator in the component design; this
//! module's `PostgresWorkQueue` is the in-repo implementation, grounded
//! on `SeesawJobQueueAdapter` in the job-queue kernel this crate started
//! from, generalized from "insert a job row" to "enqueue a message with
//! a visibility timeout and a dead-letter threshold" — a concern kept
//! distinct from the event store's own `claim_ready_events` so that
//! recovery stays a read-only detector (see `scheduling::recovery`).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::scheduling::error::SchedulingError;
use crate::scheduling::event::EventType;

/// Shape of a message passed between the scheduler/recovery and the
/// worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkQueueMessage {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub idempotency_key: String,
    pub metadata: WorkQueueMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkQueueMetadata {
    pub user_id: Uuid,
    pub delivery_payload: serde_json::Value,
}

/// A message handed to the worker, plus the receipt handle it must
/// present to `delete`/`dead_letter`.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub receipt: Uuid,
    pub receive_count: i32,
    pub message: WorkQueueMessage,
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn send(&self, message: WorkQueueMessage) -> Result<(), SchedulingError>;

    /// Long-polls up to `wait` (bounded to 5s per the concurrency model)
    /// for up to `max_messages` visible messages.
    async fn receive(
        &self,
        max_messages: i64,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, SchedulingError>;

    async fn delete(&self, receipt: Uuid) -> Result<(), SchedulingError>;

    async fn dead_letter(&self, receipt: Uuid, reason: &str) -> Result<(), SchedulingError>;
}

pub struct PostgresWorkQueue {
    pool: PgPool,
    visibility_timeout: Duration,
}

impl PostgresWorkQueue {
    pub fn new(pool: PgPool, visibility_timeout: Duration) -> Self {
        Self {
            pool,
            visibility_timeout,
        }
    }
}

#[async_trait]
impl WorkQueue for PostgresWorkQueue {
    async fn send(&self, message: WorkQueueMessage) -> Result<(), SchedulingError> {
        let payload = serde_json::to_value(&message)
            .map_err(|e| SchedulingError::InfrastructureError(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO work_queue_messages (id, payload, visible_at, receive_count, created_at)
            VALUES ($1, $2, NOW(), 0, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn receive(
        &self,
        max_messages: i64,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, SchedulingError> {
        let deadline = tokio::time::Instant::now() + wait.min(Duration::from_secs(5));
        loop {
            let visibility_secs = self.visibility_timeout.as_secs() as f64;
            let rows: Vec<(Uuid, serde_json::Value, i32)> = sqlx::query_as(
                r#"
                WITH next_messages AS (
                    SELECT id
                    FROM work_queue_messages
                    WHERE visible_at <= NOW() AND dead_letter_at IS NULL
                    ORDER BY created_at ASC
                    LIMIT $1
                    FOR UPDATE SKIP LOCKED
                )
                UPDATE work_queue_messages
                SET visible_at = NOW() + ($2 || ' seconds')::INTERVAL,
                    receive_count = receive_count + 1
                WHERE id IN (SELECT id FROM next_messages)
                RETURNING id, payload, receive_count
                "#,
            )
            .bind(max_messages)
            .bind(visibility_secs)
            .fetch_all(&self.pool)
            .await?;

            if !rows.is_empty() || tokio::time::Instant::now() >= deadline {
                return rows
                    .into_iter()
                    .map(|(receipt, payload, receive_count)| {
                        serde_json::from_value(payload)
                            .map(|message| ReceivedMessage {
                                receipt,
                                receive_count,
                                message,
                            })
                            .map_err(|e| SchedulingError::InfrastructureError(e.to_string()))
                    })
                    .collect();
            }

            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn delete(&self, receipt: Uuid) -> Result<(), SchedulingError> {
        sqlx::query("DELETE FROM work_queue_messages WHERE id = $1")
            .bind(receipt)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn dead_letter(&self, receipt: Uuid, reason: &str) -> Result<(), SchedulingError> {
        sqlx::query(
            "UPDATE work_queue_messages SET dead_letter_at = NOW(), dead_letter_reason = $2 WHERE id = $1",
        )
        .bind(receipt)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
