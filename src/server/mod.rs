// Process wiring: bootstrap, minimal health-check HTTP surface.
pub mod app;
pub mod main_tasks;
pub mod routes;

pub use app::{build_app, AppState};
