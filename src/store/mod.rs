//! Storage collaborator.
//!
//! The pipeline only talks to the [`Store`] trait. Two implementations ship
//! with the crate: [`PgStore`] for PostgreSQL (used when `DATABASE_URL` is
//! set) and [`MemoryStore`] for tests and database-less runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{AlertKind, AlertRecord, IndexResult, Measurement, NewSensor, Sensor};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

// ---

#[async_trait]
pub trait Store: Send + Sync {
    // ---
    /// Register a sensor, creating its location by name if needed.
    ///
    /// Returns [`StoreError::Conflict`] if the sensor id is already taken.
    async fn register_sensor(&self, new: &NewSensor) -> Result<Sensor, StoreError>;

    async fn get_sensor(&self, sensor_id: &str) -> Result<Option<Sensor>, StoreError>;

    /// Mark the sensor ACTIVE and deactivate its active `SENSOR_OFFLINE`
    /// alerts. Returns the number of alerts cleared.
    async fn mark_sensor_active(&self, sensor_id: &str) -> Result<u64, StoreError>;

    async fn insert_measurement(&self, measurement: &Measurement) -> Result<(), StoreError>;

    async fn get_measurement(&self, id: Uuid) -> Result<Option<Measurement>, StoreError>;

    /// Oldest-first measurements that have no index result yet.
    async fn measurements_without_index(&self, limit: u32)
        -> Result<Vec<Measurement>, StoreError>;

    async fn get_index_result(
        &self,
        measurement_id: Uuid,
    ) -> Result<Option<IndexResult>, StoreError>;

    /// Timestamp of the sensor's newest measurement that has an index result.
    async fn latest_calculated_at(
        &self,
        sensor_id: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Insert unless a result already exists for the measurement.
    ///
    /// Returns `true` when the row was created and `false` when an existing
    /// result was left untouched.
    async fn insert_index_result(&self, result: &IndexResult) -> Result<bool, StoreError>;

    async fn find_active_alert(
        &self,
        sensor_id: &str,
        kind: AlertKind,
    ) -> Result<Option<AlertRecord>, StoreError>;

    /// Insert a new alert.
    ///
    /// Returns [`StoreError::Conflict`] if the record would be a second
    /// active `AQI_THRESHOLD` alert for the sensor.
    async fn insert_alert(&self, alert: &AlertRecord) -> Result<(), StoreError>;

    /// Overwrite the mutable fields of an existing alert.
    async fn update_alert(&self, alert: &AlertRecord) -> Result<(), StoreError>;

    async fn get_alert(&self, id: Uuid) -> Result<Option<AlertRecord>, StoreError>;

    /// Active, unacknowledged alerts, newest first, optionally restricted to
    /// one location.
    async fn list_active_alerts(
        &self,
        location_id: Option<Uuid>,
    ) -> Result<Vec<AlertRecord>, StoreError>;
}
