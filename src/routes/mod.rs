//! HTTP gateway: merges the per-resource sub-routers and attaches state.

use std::sync::Arc;

use axum::Router;

use crate::IngestionPipeline;

mod alerts;
mod health;
mod measurements;
mod sensors;
mod ws;

// ---

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestionPipeline>,
}

pub fn router(pipeline: Arc<IngestionPipeline>) -> Router {
    // ---
    Router::new()
        .merge(sensors::router())
        .merge(measurements::router())
        .merge(alerts::router())
        .merge(ws::router())
        .merge(health::router())
        .with_state(AppState { pipeline })
}
