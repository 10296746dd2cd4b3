//! Worker (executor): consumes work-queue messages, invokes the webhook
//! client, transitions the event to COMPLETED or FAILED, and seeds the
//! next occurrence. Grounded on `JobWorker` in `kernel/jobs/worker.rs`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::scheduling::error::SchedulingError;
use crate::scheduling::event::{Event, EventStatus};
use crate::scheduling::queue::{ReceivedMessage, WorkQueue};
use crate::scheduling::store::EventStore;
use crate::scheduling::timezone::TimezoneService;
use crate::scheduling::webhook::WebhookClient;

pub struct WorkerConfig {
    pub worker_id: String,
    pub batch_size: i64,
    pub poll_wait: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::new_v4()),
            batch_size: 10,
            poll_wait: Duration::from_secs(5),
        }
    }
}

pub struct Worker {
    store: Arc<dyn EventStore>,
    queue: Arc<dyn WorkQueue>,
    webhook: WebhookClient,
    timezone: TimezoneService,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        store: Arc<dyn EventStore>,
        queue: Arc<dyn WorkQueue>,
        webhook: WebhookClient,
        timezone: TimezoneService,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            queue,
            webhook,
            timezone,
            config,
        }
    }

    /// The seven-step processing procedure from the component design.
    pub async fn process(&self, received: ReceivedMessage) {
        let event_id = received.message.event_id;

        // Step 1: load the event. Not found => ack and stop.
        let event = match self.store.find_by_id(event_id).await {
            Ok(Some(event)) => event,
            Ok(None) => {
                tracing::info!(event_id = %event_id, "event not found, user deleted mid-flight");
                let _ = self.queue.delete(received.receipt).await;
                return;
            }
            Err(err) => {
                tracing::error!(event_id = %event_id, error = %err, "failed to load event, leaving message for redelivery");
                return;
            }
        };

        // Step 2: a status other than PROCESSING means this message is a
        // duplicate or recovery residue; ack and stop without re-delivering.
        if event.status != EventStatus::Processing {
            tracing::info!(event_id = %event_id, status = ?event.status, "event not PROCESSING, treating message as duplicate");
            let _ = self.queue.delete(received.receipt).await;
            return;
        }

        let webhook_url = event
            .delivery_payload
            .get("webhookUrl")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let Some(webhook_url) = webhook_url else {
            self.finish_failed(&event, "deliveryPayload missing webhookUrl").await;
            let _ = self.queue.delete(received.receipt).await;
            return;
        };

        // Step 3: invoke the webhook client.
        let delivery = self
            .webhook
            .deliver(&webhook_url, &event.delivery_payload, &event.idempotency_key)
            .await;

        match delivery {
            Ok(()) => self.finish_completed(&event).await,
            Err(SchedulingError::PermanentDeliveryError { status_code }) => {
                self.finish_failed(&event, format!("permanent delivery error: {status_code}")).await;
            }
            Err(err) => {
                self.finish_failed(&event, err.to_string()).await;
            }
        }

        // Step 7: acknowledge only after the store update above committed.
        let _ = self.queue.delete(received.receipt).await;
    }

    async fn finish_completed(&self, event: &Event) {
        let now = Utc::now();
        let completed = match event.mark_completed(now) {
            Ok(e) => e,
            Err(err) => {
                tracing::error!(event_id = %event.id, error = %err, "markCompleted rejected by state machine");
                return;
            }
        };
        if let Err(err) = self.store.update(completed).await {
            tracing::warn!(event_id = %event.id, error = %err, "completing event failed, tolerating concurrent mutation");
            return;
        }
        self.seed_next_occurrence(event).await;
    }

    async fn finish_failed(&self, event: &Event, reason: impl Into<String>) {
        let now = Utc::now();
        let failed = match event.mark_failed(now, reason) {
            Ok(e) => e,
            Err(err) => {
                tracing::error!(event_id = %event.id, error = %err, "markFailed rejected by state machine");
                return;
            }
        };
        if let Err(err) = self.store.update(failed).await {
            tracing::warn!(event_id = %event.id, error = %err, "failing event failed, tolerating concurrent mutation");
        }
    }

    /// Seeds the next PENDING occurrence from the just-completed
    /// timestamp, per step 4 of the component design.
    async fn seed_next_occurrence(&self, completed: &Event) {
        let Ok(zone) = completed.target_timezone.parse::<chrono_tz::Tz>() else {
            tracing::error!(event_id = %completed.id, zone = %completed.target_timezone, "cannot seed next occurrence: invalid zone");
            return;
        };
        let month = completed.target_timestamp_local.month();
        let day = completed.target_timestamp_local.day();
        // Advance past the instant just completed: it is itself a valid
        // occurrence, so handing it to `next_occurrence` as the reference
        // would return the same instant back (next_occurrence_raw picks the
        // smallest candidate >= reference) and the seeded event would collide
        // on idempotency_key with the row we just completed.
        let next_utc = self.timezone.next_occurrence(
            month,
            day,
            zone,
            completed.target_timestamp_utc + chrono::Duration::days(1),
            completed.event_type,
        );
        let next_local = next_utc.with_timezone(&zone).naive_local().and_utc();
        let idempotency_key =
            Event::derive_idempotency_key(completed.user_id, next_utc, completed.event_type);

        let next_event = Event::builder()
            .user_id(completed.user_id)
            .event_type(completed.event_type)
            .target_timestamp_utc(next_utc)
            .target_timestamp_local(next_local)
            .target_timezone(completed.target_timezone.clone())
            .idempotency_key(idempotency_key)
            .delivery_payload(completed.delivery_payload.clone())
            .build();

        if let Err(err) = self.store.create(next_event).await {
            tracing::error!(event_id = %completed.id, error = %err, "failed to seed next occurrence");
        }
    }

    /// Long-running poll loop: receive, process, repeat until cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                received = self.queue.receive(self.config.batch_size, self.config.poll_wait) => {
                    match received {
                        Ok(messages) => {
                            for message in messages {
                                self.process(message).await;
                            }
                        }
                        Err(err) => {
                            tracing::error!(worker_id = %self.config.worker_id, error = %err, "receive failed");
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!(worker_id = %self.config.worker_id, "worker shutting down");
                    return;
                }
            }
        }
    }
}
