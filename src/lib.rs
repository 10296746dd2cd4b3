// Event Scheduling Engine
//
// Durable event store, timezone-aware occurrence computation, a
// distributed claim-and-dispatch scheduler, durable worker hand-off,
// webhook delivery with retry/idempotency, and startup recovery.

pub mod config;
pub mod scheduling;
pub mod server;

pub use config::Config;
