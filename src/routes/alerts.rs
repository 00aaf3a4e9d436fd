use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::ApiError;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/alerts/active", get(active))
        .route("/alerts/{id}/acknowledge", post(acknowledge))
        .route("/alerts/{id}/deactivate", post(deactivate))
}

#[derive(Debug, Deserialize)]
pub struct ActiveQuery {
    location_id: Option<Uuid>,
}

/// Handle `GET /alerts/active`: active, unacknowledged alerts, newest first.
async fn active(
    State(state): State<AppState>,
    Query(params): Query<ActiveQuery>,
) -> Result<impl IntoResponse, ApiError> {
    // ---
    let alerts = state
        .pipeline
        .store()
        .list_active_alerts(params.location_id)
        .await?;
    Ok(Json(alerts))
}

async fn acknowledge(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    // ---
    let alert = state.pipeline.acknowledge_alert(id).await?;
    Ok(Json(alert))
}

async fn deactivate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    // ---
    let alert = state.pipeline.deactivate_alert(id).await?;
    Ok(Json(alert))
}
