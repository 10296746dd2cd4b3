//! Durable persistence for [`Event`]. `claim_ready_events` is the core
//! concurrency primitive: a single `FOR UPDATE SKIP LOCKED` CTE that lets
//! N concurrent claimers partition the ready set with no coordination
//! beyond the store, grounded on `Job::claim_jobs` in the job-queue
//! kernel this crate started from.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::scheduling::error::SchedulingError;
use crate::scheduling::event::Event;

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn create(&self, event: Event) -> Result<Event, SchedulingError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Event>, SchedulingError>;
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Event>, SchedulingError>;

    /// Conditional on matching `version`; fails atomically with
    /// `OptimisticLockConflict` and mutates nothing on mismatch.
    async fn update(&self, event: Event) -> Result<Event, SchedulingError>;

    /// Atomically claims up to `limit` ready PENDING rows, oldest first,
    /// transitioning each to PROCESSING with `version += 1`.
    async fn claim_ready_events(&self, limit: i64) -> Result<Vec<Event>, SchedulingError>;

    /// Read-only: PENDING rows already overdue. Never mutates.
    async fn find_missed_events(&self, limit: i64) -> Result<Vec<Event>, SchedulingError>;

    async fn delete_by_user_id(&self, user_id: Uuid) -> Result<u64, SchedulingError>;
}

pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str = "id, user_id, event_type, status, target_timestamp_utc, \
    target_timestamp_local, target_timezone, executed_at, failure_reason, retry_count, \
    version, idempotency_key, delivery_payload, created_at, updated_at";

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn create(&self, event: Event) -> Result<Event, SchedulingError> {
        let row = sqlx::query_as::<_, Event>(&format!(
            r#"
            INSERT INTO scheduled_events
                (id, user_id, event_type, status, target_timestamp_utc, target_timestamp_local,
                 target_timezone, executed_at, failure_reason, retry_count, version,
                 idempotency_key, delivery_payload, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (idempotency_key) DO UPDATE SET idempotency_key = scheduled_events.idempotency_key
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(event.id)
        .bind(event.user_id)
        .bind(event.event_type)
        .bind(event.status)
        .bind(event.target_timestamp_utc)
        .bind(event.target_timestamp_local)
        .bind(&event.target_timezone)
        .bind(event.executed_at)
        .bind(&event.failure_reason)
        .bind(event.retry_count)
        .bind(event.version)
        .bind(&event.idempotency_key)
        .bind(&event.delivery_payload)
        .bind(event.created_at)
        .bind(event.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Event>, SchedulingError> {
        let row = sqlx::query_as::<_, Event>(&format!(
            "SELECT {SELECT_COLUMNS} FROM scheduled_events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Event>, SchedulingError> {
        let rows = sqlx::query_as::<_, Event>(&format!(
            "SELECT {SELECT_COLUMNS} FROM scheduled_events WHERE user_id = $1 ORDER BY created_at ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update(&self, event: Event) -> Result<Event, SchedulingError> {
        let expected_version = event.version - 1;
        let row = sqlx::query_as::<_, Event>(&format!(
            r#"
            UPDATE scheduled_events
            SET status = $1, target_timestamp_utc = $2, target_timestamp_local = $3,
                target_timezone = $4, executed_at = $5, failure_reason = $6,
                retry_count = $7, version = $8, delivery_payload = $9, updated_at = $10
            WHERE id = $11 AND version = $12
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(event.status)
        .bind(event.target_timestamp_utc)
        .bind(event.target_timestamp_local)
        .bind(&event.target_timezone)
        .bind(event.executed_at)
        .bind(&event.failure_reason)
        .bind(event.retry_count)
        .bind(event.version)
        .bind(&event.delivery_payload)
        .bind(event.updated_at)
        .bind(event.id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(SchedulingError::OptimisticLockConflict {
            id: event.id,
            expected: expected_version,
        })
    }

    async fn claim_ready_events(&self, limit: i64) -> Result<Vec<Event>, SchedulingError> {
        let rows = sqlx::query_as::<_, Event>(&format!(
            r#"
            WITH next_events AS (
                SELECT id
                FROM scheduled_events
                WHERE status = 'pending' AND target_timestamp_utc <= NOW()
                ORDER BY target_timestamp_utc ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE scheduled_events
            SET status = 'processing', version = version + 1, updated_at = NOW()
            WHERE id IN (SELECT id FROM next_events)
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_missed_events(&self, limit: i64) -> Result<Vec<Event>, SchedulingError> {
        let rows = sqlx::query_as::<_, Event>(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM scheduled_events
            WHERE status = 'pending' AND target_timestamp_utc < NOW()
            ORDER BY target_timestamp_utc ASC
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_by_user_id(&self, user_id: Uuid) -> Result<u64, SchedulingError> {
        let result = sqlx::query("DELETE FROM scheduled_events WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
