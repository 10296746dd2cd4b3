//! Recovery: a read-only detector with enqueue side effects, invoked once
//! per process start before the scheduler tick begins. Deliberately
//! avoids claiming rows itself — see the design note in §9 — to stay
//! idempotent and safe to re-run. Grounded on the read-only query shape
//! of `Job::find_next_run_time` in `kernel/jobs/job.rs`.

use std::sync::Arc;

use crate::scheduling::queue::WorkQueue;
use crate::scheduling::scheduler::to_message;
use crate::scheduling::store::EventStore;

#[derive(Debug, Default, Clone, Copy)]
pub struct RecoveryReport {
    pub missed_count: usize,
    pub events_queued: usize,
    pub events_failed: usize,
}

pub async fn run_recovery(
    store: &Arc<dyn EventStore>,
    queue: &Arc<dyn WorkQueue>,
    recovery_batch_limit: i64,
) -> RecoveryReport {
    let missed = match store.find_missed_events(recovery_batch_limit).await {
        Ok(events) => events,
        Err(err) => {
            tracing::error!(error = %err, "recovery: find_missed_events failed");
            return RecoveryReport::default();
        }
    };

    if missed.is_empty() {
        tracing::info!("recovery: no missed events");
        return RecoveryReport::default();
    }

    let oldest = missed.first().map(|e| e.target_timestamp_utc);
    let newest = missed.last().map(|e| e.target_timestamp_utc);

    let mut report = RecoveryReport {
        missed_count: missed.len(),
        ..Default::default()
    };

    for event in &missed {
        match queue.send(to_message(event)).await {
            Ok(()) => report.events_queued += 1,
            Err(err) => {
                report.events_failed += 1;
                tracing::error!(event_id = %event.id, error = %err, "recovery: enqueue failed");
            }
        }
    }

    tracing::info!(
        oldest_missed = ?oldest,
        newest_missed = ?newest,
        missed_count = report.missed_count,
        events_queued = report.events_queued,
        events_failed = report.events_failed,
        "recovery complete"
    );

    report
}
