//! Minimal HTTP surface: a health endpoint only. The REST façade for user
//! CRUD is an external collaborator (spec §1) and is not part of this
//! crate; this router exists only so operators have something to probe.

use axum::{routing::get, Router};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use crate::server::routes::health_handler;

/// Shared application state for the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
}

pub fn build_app(db_pool: PgPool) -> Router {
    let state = AppState { db_pool };

    Router::new()
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
