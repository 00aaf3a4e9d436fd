use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use super::AppState;
use crate::{ApiError, NewSensor, StoreError, ValidationError};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/sensors", post(register))
        .route("/sensors/{sensor_id}", get(fetch))
}

async fn register(
    State(state): State<AppState>,
    Json(mut body): Json<NewSensor>,
) -> Result<impl IntoResponse, ApiError> {
    // ---
    body.sensor_id = body.sensor_id.trim().to_string();
    body.location_name = body.location_name.trim().to_string();
    if body.sensor_id.is_empty() {
        return Err(ValidationError::MissingField("sensor_id").into());
    }
    if body.location_name.is_empty() {
        return Err(ValidationError::MissingField("location_name").into());
    }

    let sensor = state.pipeline.store().register_sensor(&body).await?;
    info!(
        sensor_id = %sensor.sensor_id,
        location = %sensor.location_name,
        "POST /sensors - registered"
    );
    Ok((StatusCode::CREATED, Json(sensor)))
}

async fn fetch(
    State(state): State<AppState>,
    Path(sensor_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // ---
    let sensor = state
        .pipeline
        .store()
        .get_sensor(&sensor_id)
        .await?
        .ok_or_else(|| StoreError::sensor_not_found(&sensor_id))?;
    Ok(Json(sensor))
}
