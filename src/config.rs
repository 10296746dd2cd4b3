use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

use crate::scheduling::DeliveryTimeOverride;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,

    /// Recipient URL stamped into each event's `deliveryPayload.webhookUrl`.
    pub webhook_url: String,

    pub scheduler_tick_seconds: u64,
    pub scheduler_batch_limit: i64,
    pub recovery_batch_limit: i64,
    pub work_queue_visibility_timeout_secs: u64,

    /// Parsed once at startup; malformed values are logged and treated
    /// as `None` rather than erroring the process.
    pub delivery_time_override: DeliveryTimeOverride,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let delivery_time_override = match env::var("DELIVERY_TIME_OVERRIDE") {
            Ok(raw) => match DeliveryTimeOverride::parse(&raw) {
                Some(parsed) => parsed,
                None => {
                    tracing::warn!(raw = %raw, "DELIVERY_TIME_OVERRIDE is malformed, ignoring");
                    DeliveryTimeOverride::None
                }
            },
            Err(_) => DeliveryTimeOverride::None,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            webhook_url: env::var("WEBHOOK_URL").context("WEBHOOK_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            scheduler_tick_seconds: env::var("SCHEDULER_TICK_SECONDS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("SCHEDULER_TICK_SECONDS must be a valid number")?,
            scheduler_batch_limit: env::var("SCHEDULER_BATCH_LIMIT")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .context("SCHEDULER_BATCH_LIMIT must be a valid number")?,
            recovery_batch_limit: env::var("RECOVERY_BATCH_LIMIT")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .context("RECOVERY_BATCH_LIMIT must be a valid number")?,
            work_queue_visibility_timeout_secs: env::var("WORK_QUEUE_VISIBILITY_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("WORK_QUEUE_VISIBILITY_TIMEOUT_SECS must be a valid number")?,
            delivery_time_override,
        })
    }
}
