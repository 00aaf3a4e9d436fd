use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::AppState;
use crate::{ApiError, IndexResult, RawMeasurement, StoreError};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/measurements", post(ingest))
        .route("/measurements/{id}/index", get(index))
}

/// Handle `POST /measurements`.
///
/// Responds `201` as soon as the measurement is stored, whether or not the
/// index calculation succeeded; `run` is `null` in the body when it did not.
async fn ingest(
    State(state): State<AppState>,
    Json(raw): Json<RawMeasurement>,
) -> Result<impl IntoResponse, ApiError> {
    // ---
    debug!(sensor_id = %raw.sensor_id, "POST /measurements");

    let measurement = raw.into_measurement()?;
    let report = state.pipeline.ingest(measurement).await?;

    info!(
        measurement_id = %report.measurement.id,
        calculated = report.run.is_some(),
        "POST /measurements - accepted"
    );
    Ok((StatusCode::CREATED, Json(report)))
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum IndexStatus {
    Calculated { result: IndexResult },
    NotYetCalculated { measurement_id: Uuid },
}

/// Handle `GET /measurements/{id}/index`.
async fn index(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    // ---
    let store = state.pipeline.store();
    if store.get_measurement(id).await?.is_none() {
        return Err(StoreError::NotFound {
            entity: "measurement",
            id: id.to_string(),
        }
        .into());
    }

    let status = match store.get_index_result(id).await? {
        Some(result) => IndexStatus::Calculated { result },
        None => IndexStatus::NotYetCalculated { measurement_id: id },
    };
    Ok(Json(status))
}
