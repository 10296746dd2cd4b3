// Main entry point for the event scheduling engine.

use anyhow::{Context, Result};
use event_scheduler::server::build_app;
use event_scheduler::Config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,event_scheduler=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting event scheduling engine");

    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!("configuration loaded");

    tracing::info!("connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    tracing::info!("database connected");

    tracing::info!("running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;
    tracing::info!("migrations complete");

    let _handles = event_scheduler::server::main_tasks::bootstrap(pool.clone(), &config).await;

    let app = build_app(pool);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(%addr, "starting health server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("failed to bind to address")?;

    axum::serve(listener, app.into_make_service())
        .await
        .context("server error")?;

    Ok(())
}
