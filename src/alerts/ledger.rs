//! Alert ledger: create-or-update of the single active threshold alert per
//! sensor.
//!
//! Every mutation runs while holding that sensor's [`SensorGuard`]. The guard
//! is a plain async mutex from a lock table keyed by sensor id, so two
//! measurements for the same sensor cannot both observe "no active alert" and
//! both create one. Writers in other processes are caught by the store's
//! uniqueness rule instead; a create that loses that race is retried as an
//! update.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::policy::{AlertDecision, ALERT_THRESHOLD};
use crate::error::StoreError;
use crate::models::{AlertKind, AlertRecord, IndexResult, Sensor};
use crate::store::Store;

// ---

/// What [`AlertLedger::apply`] did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "alert", rename_all = "snake_case")]
pub enum LedgerOutcome {
    NoChange,
    Created(AlertRecord),
    Updated(AlertRecord),
}

impl LedgerOutcome {
    // ---
    pub fn alert(&self) -> Option<&AlertRecord> {
        match self {
            LedgerOutcome::NoChange => None,
            LedgerOutcome::Created(a) | LedgerOutcome::Updated(a) => Some(a),
        }
    }
}

/// Proof that the caller holds the per-sensor lock.
pub struct SensorGuard {
    sensor_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl SensorGuard {
    // ---
    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }
}

pub struct AlertLedger {
    store: Arc<dyn Store>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl AlertLedger {
    // ---
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for and take the lock for `sensor_id`.
    pub async fn lock(&self, sensor_id: &str) -> SensorGuard {
        // ---
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(sensor_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        SensorGuard {
            sensor_id: sensor_id.to_string(),
            _guard: mutex.lock_owned().await,
        }
    }

    /// Record `decision` for `sensor`.
    ///
    /// Non-alerting decisions leave any existing alert untouched.
    pub async fn apply(
        &self,
        guard: &SensorGuard,
        sensor: &Sensor,
        decision: &AlertDecision,
        result: &IndexResult,
    ) -> Result<LedgerOutcome, StoreError> {
        // ---
        debug_assert_eq!(guard.sensor_id(), sensor.sensor_id);

        if !decision.should_alert {
            return Ok(LedgerOutcome::NoChange);
        }

        let existing = self
            .store
            .find_active_alert(&sensor.sensor_id, AlertKind::AqiThreshold)
            .await?;

        if let Some(alert) = existing {
            return self.overwrite(alert, decision, result).await;
        }

        let record = new_threshold_alert(sensor, decision, result);
        match self.store.insert_alert(&record).await {
            Ok(()) => {
                info!(
                    sensor_id = %sensor.sensor_id,
                    alert_id = %record.id,
                    severity = record.severity.code(),
                    "Alert created"
                );
                Ok(LedgerOutcome::Created(record))
            }
            Err(StoreError::Conflict(reason)) => {
                warn!(
                    sensor_id = %sensor.sensor_id,
                    %reason,
                    "Concurrent alert create detected, updating instead"
                );
                let alert = self
                    .store
                    .find_active_alert(&sensor.sensor_id, AlertKind::AqiThreshold)
                    .await?
                    .ok_or(StoreError::Conflict(reason))?;
                self.overwrite(alert, decision, result).await
            }
            Err(e) => Err(e),
        }
    }

    async fn overwrite(
        &self,
        mut alert: AlertRecord,
        decision: &AlertDecision,
        result: &IndexResult,
    ) -> Result<LedgerOutcome, StoreError> {
        // ---
        alert.message = decision.messages.join(" ");
        alert.severity = decision.severity;
        alert.actual_value = Some(result.aggregate_index);
        alert.measurement_id = Some(result.measurement_id);
        alert.updated_at = Utc::now();
        self.store.update_alert(&alert).await?;

        debug!(
            sensor_id = %alert.sensor_id,
            alert_id = %alert.id,
            actual = result.aggregate_index,
            "Alert updated"
        );
        Ok(LedgerOutcome::Updated(alert))
    }

    /// Mark an alert acknowledged. It stays active.
    pub async fn acknowledge(
        &self,
        guard: &SensorGuard,
        alert_id: Uuid,
    ) -> Result<AlertRecord, StoreError> {
        // ---
        self.mutate(guard, alert_id, |alert| {
            let now = Utc::now();
            alert.acknowledged = true;
            alert.acknowledged_at = Some(now);
            alert.updated_at = now;
        })
        .await
    }

    /// Deactivate an alert so the next qualifying measurement opens a new one.
    pub async fn deactivate(
        &self,
        guard: &SensorGuard,
        alert_id: Uuid,
    ) -> Result<AlertRecord, StoreError> {
        // ---
        self.mutate(guard, alert_id, |alert| {
            alert.is_active = false;
            alert.updated_at = Utc::now();
        })
        .await
    }

    async fn mutate(
        &self,
        guard: &SensorGuard,
        alert_id: Uuid,
        change: impl FnOnce(&mut AlertRecord),
    ) -> Result<AlertRecord, StoreError> {
        // ---
        let mut alert = self
            .store
            .get_alert(alert_id)
            .await?
            .ok_or_else(|| StoreError::alert_not_found(alert_id))?;
        if alert.sensor_id != guard.sensor_id() {
            return Err(StoreError::Conflict(format!(
                "alert {} belongs to sensor {}, not {}",
                alert_id,
                alert.sensor_id,
                guard.sensor_id()
            )));
        }

        change(&mut alert);
        self.store.update_alert(&alert).await?;

        info!(
            alert_id = %alert.id,
            sensor_id = %alert.sensor_id,
            is_active = alert.is_active,
            acknowledged = alert.acknowledged,
            "Alert state changed"
        );
        Ok(alert)
    }
}

fn new_threshold_alert(
    sensor: &Sensor,
    decision: &AlertDecision,
    result: &IndexResult,
) -> AlertRecord {
    // ---
    let now = Utc::now();
    AlertRecord {
        id: Uuid::new_v4(),
        sensor_id: sensor.sensor_id.clone(),
        measurement_id: Some(result.measurement_id),
        kind: AlertKind::AqiThreshold,
        severity: decision.severity,
        title: format!("Air Quality Alert - {}", sensor.location_name),
        message: decision.messages.join(" "),
        threshold_value: Some(ALERT_THRESHOLD),
        actual_value: Some(result.aggregate_index),
        pollutant: Some(result.dominant_pollutant),
        is_active: true,
        acknowledged: false,
        acknowledged_at: None,
        created_at: now,
        updated_at: now,
    }
}
