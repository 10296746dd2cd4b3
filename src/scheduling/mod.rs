//! Event scheduling engine: durable event store, timezone-aware
//! occurrence computation, distributed claim-and-dispatch scheduler,
//! durable worker hand-off, webhook delivery with retry/idempotency, and
//! startup recovery.
//!
//! # Architecture
//!
//! ```text
//! User mutations -> user-context events -> bus -> reactors -> event store
//!
//! Scheduler tick -> claim_ready_events -> work queue -> Worker -> webhook
//!                                                           |
//!                                                           v
//!                                                  seed next occurrence
//! ```

pub mod bus;
pub mod error;
pub mod event;
pub mod queue;
pub mod reactors;
pub mod recovery;
pub mod scheduler;
pub mod store;
pub mod timezone;
pub mod users;
pub mod webhook;
pub mod worker;

pub use bus::EventBus;
pub use error::SchedulingError;
pub use event::{Event, EventStatus, EventType};
pub use queue::{PostgresWorkQueue, WorkQueue, WorkQueueMessage};
pub use reactors::Reactors;
pub use recovery::{run_recovery, RecoveryReport};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use store::{EventStore, PostgresEventStore};
pub use timezone::{DeliveryTimeOverride, TimezoneService};
pub use users::{UserBirthdayChanged, UserCreated, UserDeleted, UserInfo, UserTimezoneChanged};
pub use webhook::WebhookClient;
pub use worker::{Worker, WorkerConfig};
