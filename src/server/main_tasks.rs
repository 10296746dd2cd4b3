//! Process bootstrap for the scheduling core: wires the store, work
//! queue, bus, reactors, scheduler, and worker together, runs recovery
//! once, then spawns the scheduler and worker as long-running tasks.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::scheduling::{
    run_recovery, DeliveryTimeOverride, EventBus, EventStore, PostgresEventStore,
    PostgresWorkQueue, Reactors, Scheduler, SchedulerConfig, TimezoneService, UserBirthdayChanged,
    UserCreated, UserDeleted, UserTimezoneChanged, WebhookClient, WorkQueue, Worker, WorkerConfig,
};

pub struct SchedulingHandles {
    pub bus: Arc<EventBus>,
    pub shutdown: CancellationToken,
    scheduler_task: tokio::task::JoinHandle<()>,
    worker_task: tokio::task::JoinHandle<()>,
}

impl SchedulingHandles {
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.scheduler_task.await;
        let _ = self.worker_task.await;
    }
}

/// Runs recovery once, registers reactors on a fresh bus, then spawns the
/// scheduler and worker. Normal scheduler ticks resume automatically once
/// this returns.
pub async fn bootstrap(pool: PgPool, config: &Config) -> SchedulingHandles {
    let store: Arc<dyn EventStore> = Arc::new(PostgresEventStore::new(pool.clone()));
    let queue: Arc<dyn WorkQueue> = Arc::new(PostgresWorkQueue::new(
        pool.clone(),
        Duration::from_secs(config.work_queue_visibility_timeout_secs),
    ));

    tracing::info!("running startup recovery");
    let report = run_recovery(&store, &queue, config.recovery_batch_limit).await;
    tracing::info!(
        missed = report.missed_count,
        queued = report.events_queued,
        failed = report.events_failed,
        "recovery finished"
    );

    let bus = Arc::new(EventBus::new());
    let reactors = Arc::new(Reactors::new(
        store.clone(),
        TimezoneService::new(config.delivery_time_override),
        config.webhook_url.clone(),
    ));

    bus.subscribe::<UserCreated, _>(crate::scheduling::reactors::UserCreatedHandler(reactors.clone()))
        .await;
    bus.subscribe::<UserBirthdayChanged, _>(
        crate::scheduling::reactors::UserBirthdayChangedHandler(reactors.clone()),
    )
    .await;
    bus.subscribe::<UserTimezoneChanged, _>(
        crate::scheduling::reactors::UserTimezoneChangedHandler(reactors.clone()),
    )
    .await;
    bus.subscribe::<UserDeleted, _>(crate::scheduling::reactors::UserDeletedHandler(reactors.clone()))
        .await;

    let shutdown = CancellationToken::new();

    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        queue.clone(),
        SchedulerConfig {
            tick: Duration::from_secs(config.scheduler_tick_seconds),
            batch_limit: config.scheduler_batch_limit,
        },
    ));
    let scheduler_task = tokio::spawn(scheduler.run(shutdown.clone()));

    let worker = Arc::new(Worker::new(
        store,
        queue,
        WebhookClient::new(),
        TimezoneService::new(config.delivery_time_override),
        WorkerConfig::default(),
    ));
    let worker_task = tokio::spawn(worker.run(shutdown.clone()));

    SchedulingHandles {
        bus,
        shutdown,
        scheduler_task,
        worker_task,
    }
}
