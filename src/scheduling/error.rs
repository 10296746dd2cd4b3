use uuid::Uuid;

/// Behavioral error kinds for the scheduling core.
///
/// Every caller inside the core pattern-matches on this rather than on
/// `anyhow::Error` strings: reactors decide retry/skip/log, the worker
/// decides ack/no-op/mark-failed, and the scheduler/recovery loops decide
/// whether to swallow-and-log or propagate.
#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("event {0} not found")]
    NotFound(Uuid),

    #[error("optimistic lock conflict on event {id} (expected version {expected})")]
    OptimisticLockConflict { id: Uuid, expected: i64 },

    #[error("invalid state transition on event {id}: {from} -> {to}")]
    InvalidStateTransition {
        id: Uuid,
        from: &'static str,
        to: &'static str,
    },

    #[error("permanent delivery error: status {status_code}")]
    PermanentDeliveryError { status_code: u16 },

    #[error("infrastructure error: {0}")]
    InfrastructureError(String),
}

impl SchedulingError {
    /// Whether this error kind represents a transient, retry-eligible condition.
    pub fn is_transient(&self) -> bool {
        matches!(self, SchedulingError::InfrastructureError(_))
    }
}

impl From<sqlx::Error> for SchedulingError {
    fn from(err: sqlx::Error) -> Self {
        SchedulingError::InfrastructureError(err.to_string())
    }
}
