//! Recovery sweep for measurements that never got an index result.
//!
//! Runs on a fixed interval and re-enters the pipeline for each pending
//! measurement, oldest first. Measurements that a newer calculated reading
//! has overtaken only get their index result; alerts and subscribers are
//! left alone.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::pipeline::IngestionPipeline;

// ---

/// Maximum measurements recovered per pass.
const BATCH_SIZE: u32 = 200;

/// One sweep pass. Returns how many measurements were recovered.
pub async fn sweep_once(pipeline: &IngestionPipeline) -> Result<usize> {
    // ---
    let pending = pipeline
        .store()
        .measurements_without_index(BATCH_SIZE)
        .await?;
    if pending.is_empty() {
        return Ok(0);
    }

    debug!(pending = pending.len(), "Sweep found uncalculated measurements");

    let mut recovered = 0;
    for m in &pending {
        match pipeline.reprocess(m).await {
            Ok(_) => recovered += 1,
            Err(e) => warn!(measurement_id = %m.id, error = ?e, "Sweep could not recover measurement"),
        }
    }

    info!(recovered, pending = pending.len(), "Sweep pass complete");
    Ok(recovered)
}

/// Run [`sweep_once`] forever at `interval`.
pub async fn run(pipeline: Arc<IngestionPipeline>, interval: Duration) {
    // ---
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(e) = sweep_once(&pipeline).await {
            warn!(error = ?e, "Sweep pass failed");
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{AlertKind, AlertSeverity, Concentrations, Measurement, NewSensor};
    use crate::notify::Notifier;
    use crate::store::{MemoryStore, Store};
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_sweep_recovers_missing_results() {
        // ---
        let store = Arc::new(MemoryStore::new());
        store
            .register_sensor(&NewSensor {
                sensor_id: "S1".to_string(),
                location_name: "Harbor".to_string(),
            })
            .await
            .unwrap();

        // Stored directly, as if the pipeline had crashed before deriving
        let m = Measurement {
            id: Uuid::new_v4(),
            sensor_id: "S1".to_string(),
            timestamp: Utc::now(),
            concentrations: Concentrations {
                pm25: 10.0,
                ..Default::default()
            },
        };
        store.insert_measurement(&m).await.unwrap();

        let pipeline = IngestionPipeline::new(store.clone(), Arc::new(Notifier::default()));
        assert_eq!(sweep_once(&pipeline).await.unwrap(), 1);

        let result = store.get_index_result(m.id).await.unwrap().unwrap();
        assert_eq!(result.aggregate_index, 41.7);

        // Nothing left on the next pass
        assert_eq!(sweep_once(&pipeline).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_keeps_alert_on_latest_measurement() {
        // ---
        let store = Arc::new(MemoryStore::new());
        store
            .register_sensor(&NewSensor {
                sensor_id: "S1".to_string(),
                location_name: "Harbor".to_string(),
            })
            .await
            .unwrap();
        let pipeline = IngestionPipeline::new(store.clone(), Arc::new(Notifier::default()));

        // An hour-old reading that never got processed
        let stale = Measurement {
            id: Uuid::new_v4(),
            sensor_id: "S1".to_string(),
            timestamp: Utc::now() - chrono::Duration::hours(1),
            concentrations: Concentrations {
                pm25: 300.0,
                ..Default::default()
            },
        };
        store.insert_measurement(&stale).await.unwrap();

        let current = Measurement {
            id: Uuid::new_v4(),
            sensor_id: "S1".to_string(),
            timestamp: Utc::now(),
            concentrations: Concentrations {
                pm25: 150.4,
                ..Default::default()
            },
        };
        pipeline.ingest(current).await.unwrap();

        assert_eq!(sweep_once(&pipeline).await.unwrap(), 1);
        assert!(store.get_index_result(stale.id).await.unwrap().is_some());

        let active = store
            .find_active_alert("S1", AlertKind::AqiThreshold)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.actual_value, Some(200.0));
        assert_eq!(active.severity, AlertSeverity::Warning);
        assert_eq!(store.alert_count().await, 1);
    }
}
