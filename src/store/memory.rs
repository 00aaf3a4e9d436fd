//! In-process [`Store`] backed by hash maps behind a single `RwLock`.
//!
//! Enforces the same uniqueness rules as the PostgreSQL schema so ledger
//! behaviour is identical with either backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::Store;
use crate::error::StoreError;
use crate::models::{
    AlertKind, AlertRecord, IndexResult, Measurement, NewSensor, Sensor, SensorStatus,
};

// ---

#[derive(Default)]
struct Inner {
    // ---
    locations: HashMap<String, Uuid>,
    sensors: HashMap<String, Sensor>,
    measurements: HashMap<Uuid, Measurement>,
    index_results: HashMap<Uuid, IndexResult>,
    alerts: HashMap<Uuid, AlertRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of alerts held, active or not.
    pub async fn alert_count(&self) -> usize {
        self.inner.read().await.alerts.len()
    }

    /// Number of index results held.
    pub async fn index_result_count(&self) -> usize {
        self.inner.read().await.index_results.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    // ---
    async fn register_sensor(&self, new: &NewSensor) -> Result<Sensor, StoreError> {
        // ---
        let mut inner = self.inner.write().await;
        if inner.sensors.contains_key(&new.sensor_id) {
            return Err(StoreError::Conflict(format!(
                "sensor {} already registered",
                new.sensor_id
            )));
        }

        let location_id = *inner
            .locations
            .entry(new.location_name.clone())
            .or_insert_with(Uuid::new_v4);

        let sensor = Sensor {
            sensor_id: new.sensor_id.clone(),
            location_id,
            location_name: new.location_name.clone(),
            status: SensorStatus::Active,
        };
        inner.sensors.insert(sensor.sensor_id.clone(), sensor.clone());
        Ok(sensor)
    }

    async fn get_sensor(&self, sensor_id: &str) -> Result<Option<Sensor>, StoreError> {
        Ok(self.inner.read().await.sensors.get(sensor_id).cloned())
    }

    async fn mark_sensor_active(&self, sensor_id: &str) -> Result<u64, StoreError> {
        // ---
        let mut inner = self.inner.write().await;
        let sensor = inner
            .sensors
            .get_mut(sensor_id)
            .ok_or_else(|| StoreError::sensor_not_found(sensor_id))?;
        sensor.status = SensorStatus::Active;

        let mut cleared = 0;
        for alert in inner.alerts.values_mut() {
            if alert.sensor_id == sensor_id
                && alert.kind == AlertKind::SensorOffline
                && alert.is_active
            {
                alert.is_active = false;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn insert_measurement(&self, measurement: &Measurement) -> Result<(), StoreError> {
        // ---
        let mut inner = self.inner.write().await;
        if !inner.sensors.contains_key(&measurement.sensor_id) {
            return Err(StoreError::sensor_not_found(&measurement.sensor_id));
        }
        inner
            .measurements
            .insert(measurement.id, measurement.clone());
        Ok(())
    }

    async fn get_measurement(&self, id: Uuid) -> Result<Option<Measurement>, StoreError> {
        Ok(self.inner.read().await.measurements.get(&id).cloned())
    }

    async fn measurements_without_index(
        &self,
        limit: u32,
    ) -> Result<Vec<Measurement>, StoreError> {
        // ---
        let inner = self.inner.read().await;
        let mut pending: Vec<Measurement> = inner
            .measurements
            .values()
            .filter(|m| !inner.index_results.contains_key(&m.id))
            .cloned()
            .collect();
        pending.sort_by_key(|m| m.timestamp);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn get_index_result(
        &self,
        measurement_id: Uuid,
    ) -> Result<Option<IndexResult>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .index_results
            .get(&measurement_id)
            .cloned())
    }

    async fn latest_calculated_at(
        &self,
        sensor_id: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        // ---
        let inner = self.inner.read().await;
        Ok(inner
            .index_results
            .keys()
            .filter_map(|id| inner.measurements.get(id))
            .filter(|m| m.sensor_id == sensor_id)
            .map(|m| m.timestamp)
            .max())
    }

    async fn insert_index_result(&self, result: &IndexResult) -> Result<bool, StoreError> {
        // ---
        let mut inner = self.inner.write().await;
        if inner.index_results.contains_key(&result.measurement_id) {
            return Ok(false);
        }
        inner
            .index_results
            .insert(result.measurement_id, result.clone());
        Ok(true)
    }

    async fn find_active_alert(
        &self,
        sensor_id: &str,
        kind: AlertKind,
    ) -> Result<Option<AlertRecord>, StoreError> {
        // ---
        let inner = self.inner.read().await;
        Ok(inner
            .alerts
            .values()
            .filter(|a| a.sensor_id == sensor_id && a.kind == kind && a.is_active)
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    async fn insert_alert(&self, alert: &AlertRecord) -> Result<(), StoreError> {
        // ---
        let mut inner = self.inner.write().await;
        let duplicate = alert.kind == AlertKind::AqiThreshold
            && alert.is_active
            && inner.alerts.values().any(|a| {
                a.sensor_id == alert.sensor_id && a.kind == AlertKind::AqiThreshold && a.is_active
            });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "sensor {} already has an active {} alert",
                alert.sensor_id,
                alert.kind.code()
            )));
        }
        inner.alerts.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn update_alert(&self, alert: &AlertRecord) -> Result<(), StoreError> {
        // ---
        let mut inner = self.inner.write().await;
        match inner.alerts.get_mut(&alert.id) {
            Some(existing) => {
                *existing = alert.clone();
                Ok(())
            }
            None => Err(StoreError::alert_not_found(alert.id)),
        }
    }

    async fn get_alert(&self, id: Uuid) -> Result<Option<AlertRecord>, StoreError> {
        Ok(self.inner.read().await.alerts.get(&id).cloned())
    }

    async fn list_active_alerts(
        &self,
        location_id: Option<Uuid>,
    ) -> Result<Vec<AlertRecord>, StoreError> {
        // ---
        let inner = self.inner.read().await;
        let mut alerts: Vec<AlertRecord> = inner
            .alerts
            .values()
            .filter(|a| a.is_active && !a.acknowledged)
            .filter(|a| {
                location_id.map_or(true, |loc| {
                    inner
                        .sensors
                        .get(&a.sensor_id)
                        .is_some_and(|s| s.location_id == loc)
                })
            })
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }
}
