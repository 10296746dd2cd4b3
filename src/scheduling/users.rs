//! The User bounded context, as seen from the scheduling core: a source
//! of four domain events and nothing else. No use case in the user
//! context may invoke scheduling operations directly; the bus in
//! [`crate::scheduling::bus`] is the only permitted conduit.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Projection of a user into the scheduling core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreated {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBirthdayChanged {
    pub user_id: Uuid,
    pub new_date_of_birth: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTimezoneChanged {
    pub user_id: Uuid,
    pub new_timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDeleted {
    pub user_id: Uuid,
}

/// Report returned by `UserBirthdayChanged`/`UserTimezoneChanged`
/// reactors per the component design.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RescheduleReport {
    pub rescheduled_count: usize,
    pub skipped_count: usize,
    pub skipped_event_ids: Vec<Uuid>,
    pub total_pending_count: usize,
}
