//! Typed error seams.
//!
//! Pure calculation code never fails. These types cover the boundaries:
//! inbound measurement validation, the storage collaborator and the HTTP
//! surface.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

// ---

/// Rejection reasons for an inbound measurement.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("{field} value {value} exceeds sanity bound {max}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        max: f64,
    },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Failures reported by a [`Store`](crate::store::Store) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness rule rejected the write (duplicate active alert,
    /// duplicate index result, duplicate sensor).
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    // ---
    pub fn alert_not_found(id: Uuid) -> Self {
        StoreError::NotFound {
            entity: "alert",
            id: id.to_string(),
        }
    }

    pub fn sensor_not_found(sensor_id: &str) -> Self {
        StoreError::NotFound {
            entity: "sensor",
            id: sensor_id.to_string(),
        }
    }
}

/// Errors surfaced by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        // ---
        let status = match &self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
