//! Ingestion pipeline.
//!
//! One run per accepted measurement:
//! derive → persist index result → evaluate policy → apply to ledger →
//! publish. Acceptance and the whole run hold the sensor's ledger lock, so
//! runs for one sensor are serialized and publish in acceptance order while
//! different sensors proceed in parallel.
//!
//! The measurement itself is committed before the run starts. A failing run
//! is logged and leaves the measurement without an index result; the
//! recovery sweep picks it up later. A recovered measurement that is older
//! than the sensor's newest calculated one only gets its index result.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::alerts::{evaluate, AlertDecision, AlertLedger, LedgerOutcome, SensorGuard};
use crate::aqi::derive;
use crate::error::StoreError;
use crate::models::{AlertRecord, IndexResult, Measurement, Sensor};
use crate::notify::{Envelope, IndexUpdate, Notifier};
use crate::store::Store;

// ---

/// Everything one pipeline run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub result: IndexResult,
    /// `false` when an index result already existed and was reused.
    pub newly_calculated: bool,
    pub decision: AlertDecision,
    pub outcome: LedgerOutcome,
    /// A newer measurement of the same sensor was already calculated; the
    /// ledger was left alone and nothing was published.
    pub superseded: bool,
}

/// Reply to an accepted measurement. `run` is `None` when processing failed.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub measurement: Measurement,
    pub run: Option<PipelineRun>,
}

pub struct IngestionPipeline {
    store: Arc<dyn Store>,
    ledger: AlertLedger,
    notifier: Arc<Notifier>,
}

impl IngestionPipeline {
    // ---
    pub fn new(store: Arc<dyn Store>, notifier: Arc<Notifier>) -> Self {
        Self {
            ledger: AlertLedger::new(store.clone()),
            store,
            notifier,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn ledger(&self) -> &AlertLedger {
        &self.ledger
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Accept and process a measurement.
    ///
    /// Only failures to accept (unknown sensor, storage error on the
    /// measurement insert) are returned. Anything after that is logged.
    pub async fn ingest(&self, measurement: Measurement) -> Result<IngestReport, StoreError> {
        // ---
        let sensor = self
            .store
            .get_sensor(&measurement.sensor_id)
            .await?
            .ok_or_else(|| StoreError::sensor_not_found(&measurement.sensor_id))?;

        let guard = self.ledger.lock(&sensor.sensor_id).await;

        self.store.insert_measurement(&measurement).await?;
        debug!(
            measurement_id = %measurement.id,
            sensor_id = %sensor.sensor_id,
            "Measurement accepted"
        );

        match self.store.mark_sensor_active(&sensor.sensor_id).await {
            Ok(0) => {}
            Ok(cleared) => info!(sensor_id = %sensor.sensor_id, cleared, "Sensor back online"),
            Err(e) => warn!(sensor_id = %sensor.sensor_id, error = %e, "Failed to update sensor status"),
        }

        let run = match self.process(&guard, &sensor, &measurement).await {
            Ok(run) => Some(run),
            Err(e) => {
                error!(
                    measurement_id = %measurement.id,
                    sensor_id = %sensor.sensor_id,
                    error = ?e,
                    "Index calculation failed, measurement left uncalculated"
                );
                None
            }
        };

        Ok(IngestReport { measurement, run })
    }

    /// Re-run the pipeline for an already stored measurement.
    ///
    /// When a newer measurement of the sensor already has an index result,
    /// only this measurement's index result is stored.
    pub async fn reprocess(&self, measurement: &Measurement) -> Result<PipelineRun> {
        // ---
        let sensor = self
            .store
            .get_sensor(&measurement.sensor_id)
            .await?
            .ok_or_else(|| StoreError::sensor_not_found(&measurement.sensor_id))?;

        let guard = self.ledger.lock(&sensor.sensor_id).await;

        let newest = self
            .store
            .latest_calculated_at(&sensor.sensor_id)
            .await
            .context("loading newest calculated measurement")?;
        if newest.is_some_and(|at| at > measurement.timestamp) {
            let (result, newly_calculated) = self.persist_result(measurement).await?;
            debug!(
                measurement_id = %measurement.id,
                sensor_id = %sensor.sensor_id,
                "Superseded by a newer measurement, ledger untouched"
            );
            return Ok(PipelineRun {
                decision: evaluate(measurement, &result),
                result,
                newly_calculated,
                outcome: LedgerOutcome::NoChange,
                superseded: true,
            });
        }

        self.process(&guard, &sensor, measurement).await
    }

    /// Acknowledge an alert and announce the change to its location.
    pub async fn acknowledge_alert(&self, alert_id: Uuid) -> Result<AlertRecord, StoreError> {
        // ---
        let (guard, sensor) = self.lock_alert_sensor(alert_id).await?;
        let alert = self.ledger.acknowledge(&guard, alert_id).await?;
        self.publish_alert(&sensor, &alert);
        Ok(alert)
    }

    /// Deactivate an alert and announce the change to its location.
    pub async fn deactivate_alert(&self, alert_id: Uuid) -> Result<AlertRecord, StoreError> {
        // ---
        let (guard, sensor) = self.lock_alert_sensor(alert_id).await?;
        let alert = self.ledger.deactivate(&guard, alert_id).await?;
        self.publish_alert(&sensor, &alert);
        Ok(alert)
    }

    async fn lock_alert_sensor(
        &self,
        alert_id: Uuid,
    ) -> Result<(SensorGuard, Sensor), StoreError> {
        // ---
        let sensor_id = self
            .store
            .get_alert(alert_id)
            .await?
            .ok_or_else(|| StoreError::alert_not_found(alert_id))?
            .sensor_id;
        let sensor = self
            .store
            .get_sensor(&sensor_id)
            .await?
            .ok_or_else(|| StoreError::sensor_not_found(&sensor_id))?;

        let guard = self.ledger.lock(&sensor.sensor_id).await;
        Ok((guard, sensor))
    }

    fn publish_alert(&self, sensor: &Sensor, alert: &AlertRecord) {
        self.notifier
            .publish(sensor.location_id, Envelope::Alert(alert.clone()));
    }

    /// Steps derive → publish for a stored measurement. Idempotent: an
    /// existing index result is reused and the ledger converges.
    async fn process(
        &self,
        guard: &SensorGuard,
        sensor: &Sensor,
        measurement: &Measurement,
    ) -> Result<PipelineRun> {
        // ---
        let (result, newly_calculated) = self.persist_result(measurement).await?;
        let decision = evaluate(measurement, &result);
        let outcome = self
            .ledger
            .apply(guard, sensor, &decision, &result)
            .await
            .context("applying alert decision")?;

        self.notifier.publish(
            sensor.location_id,
            Envelope::IndexUpdate(IndexUpdate {
                sensor_id: sensor.sensor_id.clone(),
                location_id: sensor.location_id,
                result: result.clone(),
            }),
        );
        if let Some(alert) = outcome.alert() {
            self.publish_alert(sensor, alert);
        }

        info!(
            measurement_id = %measurement.id,
            sensor_id = %sensor.sensor_id,
            aqi = result.aggregate_index,
            band = result.status_band.code(),
            dominant = result.dominant_pollutant.code(),
            "AQI calculated"
        );

        Ok(PipelineRun {
            result,
            newly_calculated,
            decision,
            outcome,
            superseded: false,
        })
    }

    /// Store the index result exactly once per measurement.
    async fn persist_result(&self, measurement: &Measurement) -> Result<(IndexResult, bool)> {
        // ---
        if let Some(existing) = self
            .store
            .get_index_result(measurement.id)
            .await
            .context("loading index result")?
        {
            debug!(measurement_id = %measurement.id, "Reusing stored index result");
            return Ok((existing, false));
        }

        let result = derive(measurement);
        if self
            .store
            .insert_index_result(&result)
            .await
            .context("storing index result")?
        {
            return Ok((result, true));
        }

        // Lost a race with another writer; theirs is authoritative.
        let existing = self
            .store
            .get_index_result(measurement.id)
            .await
            .context("loading index result")?
            .context("index result vanished after insert conflict")?;
        Ok((existing, false))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{
        AlertKind, AlertRecord, AlertSeverity, Concentrations, NewSensor, Pollutant, StatusBand,
    };
    use crate::store::MemoryStore;
    use chrono::Utc;
    use std::time::Duration;

    async fn setup() -> (Arc<MemoryStore>, IngestionPipeline, Sensor) {
        // ---
        let store = Arc::new(MemoryStore::new());
        let sensor = store
            .register_sensor(&NewSensor {
                sensor_id: "S1".to_string(),
                location_name: "Harbor".to_string(),
            })
            .await
            .unwrap();
        let pipeline = IngestionPipeline::new(store.clone(), Arc::new(Notifier::default()));
        (store, pipeline, sensor)
    }

    fn measurement(sensor_id: &str, pm25: f64) -> Measurement {
        // ---
        Measurement {
            id: Uuid::new_v4(),
            sensor_id: sensor_id.to_string(),
            timestamp: Utc::now(),
            concentrations: Concentrations {
                pm25,
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_scenario_good_air() {
        // ---
        let (store, pipeline, _) = setup().await;
        let report = pipeline.ingest(measurement("S1", 10.0)).await.unwrap();
        let run = report.run.unwrap();

        assert_eq!(run.result.aggregate_index, 41.7);
        assert_eq!(run.result.status_band, StatusBand::Good);
        assert_eq!(run.result.dominant_pollutant, Pollutant::Pm25);
        assert_eq!(run.outcome, LedgerOutcome::NoChange);
        assert_eq!(store.alert_count().await, 0);
    }

    #[tokio::test]
    async fn test_scenario_unhealthy_creates_alert() {
        // ---
        let (_, pipeline, _) = setup().await;
        let run = pipeline
            .ingest(measurement("S1", 150.4))
            .await
            .unwrap()
            .run
            .unwrap();

        assert_eq!(run.result.pm25_index, 200.0);
        assert_eq!(run.result.status_band, StatusBand::Unhealthy);
        match run.outcome {
            LedgerOutcome::Created(a) => {
                assert_eq!(a.severity, AlertSeverity::Warning);
                assert_eq!(a.threshold_value, Some(100.0));
            }
            other => panic!("expected Created, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scenario_hazardous() {
        // ---
        let (_, pipeline, _) = setup().await;
        let run = pipeline
            .ingest(measurement("S1", 600.0))
            .await
            .unwrap()
            .run
            .unwrap();

        assert_eq!(run.result.aggregate_index, 500.0);
        assert_eq!(run.result.status_band, StatusBand::Hazardous);
        assert_eq!(run.decision.severity, AlertSeverity::Emergency);
    }

    #[tokio::test]
    async fn test_scenario_repeat_alert_updates() {
        // ---
        let (store, pipeline, _) = setup().await;

        let first = pipeline.ingest(measurement("S1", 150.4)).await.unwrap();
        let second = pipeline.ingest(measurement("S1", 200.0)).await.unwrap();

        assert!(matches!(first.run.unwrap().outcome, LedgerOutcome::Created(_)));
        let second = second.run.unwrap();
        assert!(matches!(second.outcome, LedgerOutcome::Updated(_)));

        let active = store
            .find_active_alert("S1", AlertKind::AqiThreshold)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.actual_value, Some(second.result.aggregate_index));
        assert_eq!(store.alert_count().await, 1);
    }

    #[tokio::test]
    async fn test_reprocess_does_not_duplicate() {
        // ---
        let (store, pipeline, _) = setup().await;
        let m = measurement("S1", 150.4);

        let first = pipeline.ingest(m.clone()).await.unwrap().run.unwrap();
        let again = pipeline.reprocess(&m).await.unwrap();

        assert!(first.newly_calculated);
        assert!(!again.newly_calculated);
        assert_eq!(first.result, again.result);
        assert!(matches!(again.outcome, LedgerOutcome::Updated(_)));
        assert_eq!(store.index_result_count().await, 1);
        assert_eq!(store.alert_count().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_sensor_rejected() {
        // ---
        let (_, pipeline, _) = setup().await;
        let err = pipeline.ingest(measurement("nope", 1.0)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "sensor", .. }));
    }

    #[tokio::test]
    async fn test_notifications_in_order() {
        // ---
        let (_, pipeline, sensor) = setup().await;
        let mut sub = pipeline.notifier().subscribe(Some(sensor.location_id));

        pipeline.ingest(measurement("S1", 10.0)).await.unwrap();
        pipeline.ingest(measurement("S1", 150.4)).await.unwrap();

        match sub.recv().await.unwrap() {
            Envelope::IndexUpdate(u) => assert_eq!(u.result.aggregate_index, 41.7),
            other => panic!("unexpected {:?}", other),
        }
        match sub.recv().await.unwrap() {
            Envelope::IndexUpdate(u) => assert_eq!(u.result.aggregate_index, 200.0),
            other => panic!("unexpected {:?}", other),
        }
        match sub.recv().await.unwrap() {
            Envelope::Alert(a) => assert_eq!(a.actual_value, Some(200.0)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_offline_alert_cleared_on_reading() {
        // ---
        let (store, pipeline, _) = setup().await;
        let now = Utc::now();
        let offline = AlertRecord {
            id: Uuid::new_v4(),
            sensor_id: "S1".to_string(),
            measurement_id: None,
            kind: AlertKind::SensorOffline,
            severity: AlertSeverity::Warning,
            title: "Sensor offline".to_string(),
            message: "No readings received".to_string(),
            threshold_value: None,
            actual_value: None,
            pollutant: None,
            is_active: true,
            acknowledged: false,
            acknowledged_at: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_alert(&offline).await.unwrap();

        pipeline.ingest(measurement("S1", 5.0)).await.unwrap();

        let after = store.get_alert(offline.id).await.unwrap().unwrap();
        assert!(!after.is_active);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ingest_single_alert() {
        // ---
        let (store, pipeline, _) = setup().await;
        let pipeline = Arc::new(pipeline);

        let handles: Vec<_> = (0..12)
            .map(|i| {
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    pipeline
                        .ingest(measurement("S1", 100.0 + i as f64))
                        .await
                        .unwrap()
                })
            })
            .collect();

        for h in handles {
            assert!(h.await.unwrap().run.is_some());
        }

        let active = store.list_active_alerts(None).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(store.alert_count().await, 1);
        assert_eq!(store.index_result_count().await, 12);
    }

    #[tokio::test]
    async fn test_acceptance_waits_for_sensor_lock() {
        // ---
        let (store, pipeline, _) = setup().await;
        let pipeline = Arc::new(pipeline);
        let m = measurement("S1", 150.4);
        let id = m.id;

        let guard = pipeline.ledger().lock("S1").await;
        let handle = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.ingest(m).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.get_measurement(id).await.unwrap().is_none());

        drop(guard);
        let report = handle.await.unwrap().unwrap();
        assert!(report.run.is_some());
        assert!(store.get_measurement(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reprocess_of_older_measurement_leaves_ledger() {
        // ---
        let (store, pipeline, sensor) = setup().await;
        let mut sub = pipeline.notifier().subscribe(Some(sensor.location_id));

        let mut older = measurement("S1", 300.0);
        older.timestamp = Utc::now() - chrono::Duration::hours(1);
        store.insert_measurement(&older).await.unwrap();

        let latest = pipeline.ingest(measurement("S1", 150.4)).await.unwrap();
        let alert_id = latest.run.unwrap().outcome.alert().unwrap().id;
        sub.recv().await.unwrap();
        sub.recv().await.unwrap();

        let run = pipeline.reprocess(&older).await.unwrap();
        assert!(run.superseded);
        assert!(run.newly_calculated);
        assert!(run.decision.should_alert);
        assert_eq!(run.outcome, LedgerOutcome::NoChange);
        assert!(store.get_index_result(older.id).await.unwrap().is_some());

        let active = store.get_alert(alert_id).await.unwrap().unwrap();
        assert_eq!(active.actual_value, Some(200.0));
        assert_eq!(active.severity, AlertSeverity::Warning);

        // Nothing was announced for the older measurement
        let next = tokio::time::timeout(Duration::from_millis(50), sub.recv()).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn test_alert_changes_publish_under_sensor_lock() {
        // ---
        let (_, pipeline, sensor) = setup().await;
        let pipeline = Arc::new(pipeline);
        let alert_id = pipeline
            .ingest(measurement("S1", 150.4))
            .await
            .unwrap()
            .run
            .unwrap()
            .outcome
            .alert()
            .unwrap()
            .id;
        let mut sub = pipeline.notifier().subscribe(Some(sensor.location_id));

        let guard = pipeline.ledger().lock("S1").await;
        let handle = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.acknowledge_alert(alert_id).await })
        };
        let early = tokio::time::timeout(Duration::from_millis(50), sub.recv()).await;
        assert!(early.is_err());

        drop(guard);
        let acked = handle.await.unwrap().unwrap();
        assert!(acked.acknowledged);
        match sub.recv().await.unwrap() {
            Envelope::Alert(a) => {
                assert_eq!(a.id, alert_id);
                assert!(a.acknowledged);
            }
            other => panic!("unexpected {:?}", other),
        }

        let off = pipeline.deactivate_alert(alert_id).await.unwrap();
        assert!(!off.is_active);
        assert!(matches!(
            pipeline.acknowledge_alert(Uuid::new_v4()).await,
            Err(StoreError::NotFound { entity: "alert", .. })
        ));
    }
}
