//! Scheduler (claimer): a periodic tick that claims a bounded batch of
//! ready events and enqueues a work-queue message per event. Grounded on
//! the `Service::run` poll loop in `kernel/jobs/worker.rs` and the
//! periodic-task wiring in `kernel/scheduled_tasks.rs`.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::scheduling::event::Event;
use crate::scheduling::queue::{WorkQueue, WorkQueueMessage, WorkQueueMetadata};
use crate::scheduling::store::EventStore;

pub struct SchedulerConfig {
    pub tick: Duration,
    pub batch_limit: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(60),
            batch_limit: 100,
        }
    }
}

pub struct Scheduler {
    store: Arc<dyn EventStore>,
    queue: Arc<dyn WorkQueue>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(store: Arc<dyn EventStore>, queue: Arc<dyn WorkQueue>, config: SchedulerConfig) -> Self {
        Self {
            store,
            queue,
            config,
        }
    }

    /// Runs one tick: claim ready events, enqueue a message per claimed
    /// event. If enqueue fails for an event, the scheduler does NOT roll
    /// back the claim — the event stays PROCESSING and relies on the
    /// visibility-timeout/recovery path for liveness.
    pub async fn tick(&self) {
        let claimed = match self.store.claim_ready_events(self.config.batch_limit).await {
            Ok(events) => events,
            Err(err) => {
                tracing::error!(error = %err, "scheduler tick: claim_ready_events failed");
                return;
            }
        };

        let mut enqueued = 0;
        let mut enqueue_failed = 0;
        for event in &claimed {
            match self.queue.send(to_message(event)).await {
                Ok(()) => enqueued += 1,
                Err(err) => {
                    enqueue_failed += 1;
                    tracing::error!(event_id = %event.id, error = %err, "scheduler tick: enqueue failed, claim retained");
                }
            }
        }

        tracing::info!(
            claimed = claimed.len(),
            enqueued,
            enqueue_failed,
            "scheduler tick complete"
        );
    }

    /// Runs ticks every `config.tick` until `shutdown` is cancelled.
    /// Multiple scheduler instances may run this concurrently; all
    /// correctness comes from the store's lock semantics.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.tick);
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                _ = shutdown.cancelled() => {
                    tracing::info!("scheduler shutting down");
                    return;
                }
            }
        }
    }
}

pub(crate) fn to_message(event: &Event) -> WorkQueueMessage {
    WorkQueueMessage {
        event_id: event.id,
        event_type: event.event_type,
        idempotency_key: event.idempotency_key.clone(),
        metadata: WorkQueueMetadata {
            user_id: event.user_id,
            delivery_payload: event.delivery_payload.clone(),
        },
    }
}
