use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::scheduling::error::SchedulingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_type", rename_all = "snake_case")]
pub enum EventType {
    Birthday,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Birthday => "BIRTHDAY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "event_status", rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

/// The maximum number of delivery failures this occurrence will accrue
/// before `canRetry()` stops reporting eligibility. Unused by the worker
/// today (§9 open question: FAILED is terminal, redrive is the work
/// queue's job); retained for a future operator-driven requeue.
const MAX_RETRY_COUNT: i32 = 3;

/// The central aggregate: a single scheduled occurrence for one user and
/// event type.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, sqlx::FromRow)]
pub struct Event {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    pub user_id: Uuid,
    pub event_type: EventType,

    #[builder(default)]
    pub status: EventStatus,

    pub target_timestamp_utc: DateTime<Utc>,
    pub target_timestamp_local: DateTime<Utc>,
    pub target_timezone: String,

    #[builder(default, setter(strip_option))]
    pub executed_at: Option<DateTime<Utc>>,

    #[builder(default, setter(strip_option))]
    pub failure_reason: Option<String>,

    #[builder(default = 0)]
    pub retry_count: i32,

    #[builder(default = 1)]
    pub version: i64,

    pub idempotency_key: String,

    #[builder(default = serde_json::Value::Object(Default::default()))]
    pub delivery_payload: serde_json::Value,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,

    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// `"event-" + first 16 hex chars of SHA-256(userId-ISO8601(targetTimestampUTC)-eventType)`.
    pub fn derive_idempotency_key(
        user_id: Uuid,
        target_timestamp_utc: DateTime<Utc>,
        event_type: EventType,
    ) -> String {
        let material = format!(
            "{}-{}-{}",
            user_id,
            target_timestamp_utc.to_rfc3339(),
            event_type.as_str()
        );
        let digest = Sha256::digest(material.as_bytes());
        let hex = hex::encode(digest);
        format!("event-{}", &hex[..16])
    }

    /// true iff `status = FAILED && retryCount < 3`. Not consulted by the
    /// worker today; see the module doc on `MAX_RETRY_COUNT`.
    pub fn can_retry(&self) -> bool {
        self.status == EventStatus::Failed && self.retry_count < MAX_RETRY_COUNT
    }

    /// PENDING -> PROCESSING, performed by the scheduler's claim. Store
    /// implementations apply this transition inside the claim SQL
    /// directly; this method exists for in-memory/test stores and for
    /// documenting the legal transition.
    pub fn claim(&self) -> Result<Event, SchedulingError> {
        self.transition_to(EventStatus::Processing, |e| {
            e.status = EventStatus::Processing;
        })
    }

    /// PROCESSING -> COMPLETED.
    pub fn mark_completed(&self, now: DateTime<Utc>) -> Result<Event, SchedulingError> {
        self.transition_to(EventStatus::Completed, |e| {
            e.status = EventStatus::Completed;
            e.executed_at = Some(now);
        })
    }

    /// PROCESSING -> FAILED.
    pub fn mark_failed(&self, now: DateTime<Utc>, reason: impl Into<String>) -> Result<Event, SchedulingError> {
        self.transition_to(EventStatus::Failed, |e| {
            e.status = EventStatus::Failed;
            e.executed_at = Some(now);
            e.failure_reason = Some(reason.into());
            e.retry_count += 1;
        })
    }

    /// PENDING -> PENDING: reschedule to a new occurrence, bumping the
    /// version. Only legal while still PENDING.
    pub fn reschedule(
        &self,
        new_utc: DateTime<Utc>,
        new_local: DateTime<Utc>,
        new_zone: impl Into<String>,
    ) -> Result<Event, SchedulingError> {
        self.transition_to(EventStatus::Pending, |e| {
            e.target_timestamp_utc = new_utc;
            e.target_timestamp_local = new_local;
            e.target_timezone = new_zone.into();
        })
    }

    fn transition_to(
        &self,
        to: EventStatus,
        mutate: impl FnOnce(&mut Event),
    ) -> Result<Event, SchedulingError> {
        let legal = match (self.status, to) {
            (EventStatus::Pending, EventStatus::Processing) => true,
            (EventStatus::Processing, EventStatus::Completed) => true,
            (EventStatus::Processing, EventStatus::Failed) => true,
            (EventStatus::Pending, EventStatus::Pending) => true,
            _ => false,
        };
        if !legal {
            return Err(SchedulingError::InvalidStateTransition {
                id: self.id,
                from: status_name(self.status),
                to: status_name(to),
            });
        }
        let mut next = self.clone();
        mutate(&mut next);
        next.version += 1;
        next.updated_at = Utc::now();
        Ok(next)
    }
}

fn status_name(status: EventStatus) -> &'static str {
    match status {
        EventStatus::Pending => "PENDING",
        EventStatus::Processing => "PROCESSING",
        EventStatus::Completed => "COMPLETED",
        EventStatus::Failed => "FAILED",
    }
}
