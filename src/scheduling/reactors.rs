//! Reactors: subscribers the scheduler registers against the domain
//! event bus, translating User-context facts into Event store mutations.

use std::sync::Arc;

use chrono::{Datelike, Utc};

use crate::scheduling::bus::Handler;
use crate::scheduling::error::SchedulingError;
use crate::scheduling::event::{Event, EventStatus, EventType};
use crate::scheduling::store::EventStore;
use crate::scheduling::timezone::TimezoneService;
use crate::scheduling::users::{
    RescheduleReport, UserBirthdayChanged, UserCreated, UserDeleted, UserTimezoneChanged,
};

/// Renders the per-event-type delivery payload. The system's Non-goals
/// exclude message body generation beyond per-type templating, so this
/// is the entire templating surface.
fn render_payload(event_type: EventType, first_name: &str, last_name: &str, webhook_url: &str) -> serde_json::Value {
    let message = match event_type {
        EventType::Birthday => format!("Hey, {first_name} {last_name} it's your birthday"),
    };
    serde_json::json!({ "message": message, "webhookUrl": webhook_url })
}

fn parse_zone(tz: &str) -> Result<chrono_tz::Tz, SchedulingError> {
    tz.parse()
        .map_err(|_| SchedulingError::Validation(format!("invalid IANA timezone: {tz}")))
}

pub struct Reactors {
    store: Arc<dyn EventStore>,
    timezone: TimezoneService,
    webhook_url: String,
}

impl Reactors {
    pub fn new(store: Arc<dyn EventStore>, timezone: TimezoneService, webhook_url: String) -> Self {
        Self {
            store,
            timezone,
            webhook_url,
        }
    }

    pub async fn on_user_created(&self, event: &UserCreated) -> Result<(), SchedulingError> {
        let zone = parse_zone(&event.timezone)?;
        let target_utc = self.timezone.next_occurrence(
            event.date_of_birth.month(),
            event.date_of_birth.day(),
            zone,
            Utc::now(),
            EventType::Birthday,
        );
        let target_local = target_utc.with_timezone(&zone).naive_local().and_utc();
        let idempotency_key =
            Event::derive_idempotency_key(event.user_id, target_utc, EventType::Birthday);
        let payload = render_payload(
            EventType::Birthday,
            &event.first_name,
            &event.last_name,
            &self.webhook_url,
        );

        let new_event = Event::builder()
            .user_id(event.user_id)
            .event_type(EventType::Birthday)
            .target_timestamp_utc(target_utc)
            .target_timestamp_local(target_local)
            .target_timezone(event.timezone.clone())
            .idempotency_key(idempotency_key)
            .delivery_payload(payload)
            .build();

        // Idempotent create: the store's ON CONFLICT(idempotency_key)
        // returns the existing row rather than erroring.
        self.store.create(new_event).await?;
        Ok(())
    }

    pub async fn on_user_birthday_changed(
        &self,
        event: &UserBirthdayChanged,
    ) -> Result<RescheduleReport, SchedulingError> {
        let pending = self.store.find_by_user_id(event.user_id).await?;
        let mut report = RescheduleReport::default();

        for existing in pending.iter() {
            if existing.status != EventStatus::Pending {
                report.skipped_count += 1;
                report.skipped_event_ids.push(existing.id);
                continue;
            }
            report.total_pending_count += 1;
            let zone = match parse_zone(&existing.target_timezone) {
                Ok(z) => z,
                Err(_) => {
                    report.skipped_count += 1;
                    report.skipped_event_ids.push(existing.id);
                    continue;
                }
            };
            let month = event.new_date_of_birth.month();
            let day = event.new_date_of_birth.day();
            let new_utc =
                self.timezone
                    .next_occurrence(month, day, zone, Utc::now(), existing.event_type);
            let new_local = new_utc.with_timezone(&zone).naive_local().and_utc();

            match existing.reschedule(new_utc, new_local, existing.target_timezone.clone()) {
                Ok(rescheduled) => match self.store.update(rescheduled).await {
                    Ok(_) => report.rescheduled_count += 1,
                    Err(SchedulingError::OptimisticLockConflict { .. }) => {
                        report.skipped_count += 1;
                        report.skipped_event_ids.push(existing.id);
                    }
                    Err(err) => return Err(err),
                },
                Err(_) => {
                    report.skipped_count += 1;
                    report.skipped_event_ids.push(existing.id);
                }
            }
        }

        Ok(report)
    }

    pub async fn on_user_timezone_changed(
        &self,
        event: &UserTimezoneChanged,
    ) -> Result<RescheduleReport, SchedulingError> {
        let pending = self.store.find_by_user_id(event.user_id).await?;
        let mut report = RescheduleReport::default();
        let new_zone = parse_zone(&event.new_timezone)?;

        for existing in pending.iter() {
            if existing.status != EventStatus::Pending {
                report.skipped_count += 1;
                report.skipped_event_ids.push(existing.id);
                continue;
            }
            report.total_pending_count += 1;

            // Recompute using the original month/day (read back off the
            // previously-stored local timestamp) but the new zone —
            // recompute, not preserve-UTC (see the open-question record
            // in DESIGN.md).
            let old_local_in_old_zone = existing.target_timestamp_local;
            let month = old_local_in_old_zone.month();
            let day = old_local_in_old_zone.day();

            let new_utc = self.timezone.next_occurrence(
                month,
                day,
                new_zone,
                Utc::now(),
                existing.event_type,
            );
            let new_local = new_utc.with_timezone(&new_zone).naive_local().and_utc();

            match existing.reschedule(new_utc, new_local, event.new_timezone.clone()) {
                Ok(rescheduled) => match self.store.update(rescheduled).await {
                    Ok(_) => report.rescheduled_count += 1,
                    Err(SchedulingError::OptimisticLockConflict { .. }) => {
                        report.skipped_count += 1;
                        report.skipped_event_ids.push(existing.id);
                    }
                    Err(err) => return Err(err),
                },
                Err(_) => {
                    report.skipped_count += 1;
                    report.skipped_event_ids.push(existing.id);
                }
            }
        }

        Ok(report)
    }

    pub async fn on_user_deleted(&self, event: &UserDeleted) -> Result<u64, SchedulingError> {
        self.store.delete_by_user_id(event.user_id).await
    }
}
pub struct UserCreatedHandler(pub Arc<Reactors>);
pub struct UserBirthdayChangedHandler(pub Arc<Reactors>);
pub struct UserTimezoneChangedHandler(pub Arc<Reactors>);
pub struct UserDeletedHandler(pub Arc<Reactors>);

#[async_trait::async_trait]
impl Handler<UserCreated> for UserCreatedHandler {
    async fn handle(&self, event: &UserCreated) {
        if let Err(err) = self.0.on_user_created(event).await {
            tracing::error!(user_id = %event.user_id, error = %err, "UserCreated reactor failed");
        }
    }
}

#[async_trait::async_trait]
impl Handler<UserBirthdayChanged> for UserBirthdayChangedHandler {
    async fn handle(&self, event: &UserBirthdayChanged) {
        match self.0.on_user_birthday_changed(event).await {
            Ok(report) => tracing::info!(
                user_id = %event.user_id,
                rescheduled = report.rescheduled_count,
                skipped = report.skipped_count,
                "UserBirthdayChanged handled"
            ),
            Err(err) => {
                tracing::error!(user_id = %event.user_id, error = %err, "UserBirthdayChanged reactor failed")
            }
        }
    }
}

#[async_trait::async_trait]
impl Handler<UserTimezoneChanged> for UserTimezoneChangedHandler {
    async fn handle(&self, event: &UserTimezoneChanged) {
        match self.0.on_user_timezone_changed(event).await {
            Ok(report) => tracing::info!(
                user_id = %event.user_id,
                rescheduled = report.rescheduled_count,
                skipped = report.skipped_count,
                "UserTimezoneChanged handled"
            ),
            Err(err) => {
                tracing::error!(user_id = %event.user_id, error = %err, "UserTimezoneChanged reactor failed")
            }
        }
    }
}

#[async_trait::async_trait]
impl Handler<UserDeleted> for UserDeletedHandler {
    async fn handle(&self, event: &UserDeleted) {
        if let Err(err) = self.0.on_user_deleted(event).await {
            tracing::error!(user_id = %event.user_id, error = %err, "UserDeleted reactor failed");
        }
    }
}
