//! Standalone CLI for applying database migrations outside of server
//! startup (e.g. in a deploy step before the service is scaled up).

use anyhow::{Context, Result};
use clap::Parser;
use event_scheduler::Config;
use sqlx::postgres::PgPoolOptions;

#[derive(Parser)]
#[command(name = "migrate_cli")]
#[command(about = "Apply pending database migrations")]
struct Cli {}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = Cli::parse();

    let config = Config::from_env().context("failed to load configuration")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    println!("{{\"success\":true,\"message\":\"migrations applied\"}}");
    Ok(())
}
