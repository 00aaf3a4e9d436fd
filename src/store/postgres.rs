//! PostgreSQL [`Store`] using runtime-checked `sqlx` queries.
//!
//! Enum columns are stored as their wire codes and parsed back on read; a row
//! with an unknown code surfaces as [`StoreError::Corrupt`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::Store;
use crate::error::StoreError;
use crate::models::{
    AlertKind, AlertRecord, AlertSeverity, Concentrations, IndexResult, Measurement, NewSensor,
    Pollutant, Sensor, SensorStatus, StatusBand,
};

// ---

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    // ---
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn corrupt(column: &str, value: &str) -> StoreError {
    StoreError::Corrupt(format!("unknown {} code '{}'", column, value))
}

/// Map unique-key violations onto [`StoreError::Conflict`].
fn conflict_or(e: sqlx::Error, what: impl FnOnce() -> String) -> StoreError {
    // ---
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(what()),
        _ => StoreError::Database(e),
    }
}

#[derive(sqlx::FromRow)]
struct SensorRow {
    sensor_id: String,
    location_id: Uuid,
    location_name: String,
    status: String,
}

impl TryFrom<SensorRow> for Sensor {
    type Error = StoreError;

    fn try_from(row: SensorRow) -> Result<Self, Self::Error> {
        Ok(Sensor {
            status: SensorStatus::from_code(&row.status)
                .ok_or_else(|| corrupt("status", &row.status))?,
            sensor_id: row.sensor_id,
            location_id: row.location_id,
            location_name: row.location_name,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReadingRow {
    id: Uuid,
    sensor_id: String,
    timestamp: DateTime<Utc>,
    pm25: f64,
    pm10: f64,
    co: f64,
    no2: f64,
    so2: f64,
    o3: f64,
}

impl From<ReadingRow> for Measurement {
    fn from(row: ReadingRow) -> Self {
        Measurement {
            id: row.id,
            sensor_id: row.sensor_id,
            timestamp: row.timestamp,
            concentrations: Concentrations {
                pm25: row.pm25,
                pm10: row.pm10,
                co: row.co,
                no2: row.no2,
                so2: row.so2,
                o3: row.o3,
            },
        }
    }
}

#[derive(sqlx::FromRow)]
struct CalculationRow {
    reading_id: Uuid,
    aqi_pm25: f64,
    aqi_pm10: f64,
    aqi_co: f64,
    aqi_no2: f64,
    aqi_so2: f64,
    aqi_o3: f64,
    overall_aqi: f64,
    aqi_status: String,
    dominant_pollutant: String,
}

impl TryFrom<CalculationRow> for IndexResult {
    type Error = StoreError;

    fn try_from(row: CalculationRow) -> Result<Self, Self::Error> {
        Ok(IndexResult {
            measurement_id: row.reading_id,
            pm25_index: row.aqi_pm25,
            pm10_index: row.aqi_pm10,
            co_index: row.aqi_co,
            no2_index: row.aqi_no2,
            so2_index: row.aqi_so2,
            o3_index: row.aqi_o3,
            aggregate_index: row.overall_aqi,
            status_band: StatusBand::from_code(&row.aqi_status)
                .ok_or_else(|| corrupt("aqi_status", &row.aqi_status))?,
            dominant_pollutant: Pollutant::from_code(&row.dominant_pollutant)
                .ok_or_else(|| corrupt("dominant_pollutant", &row.dominant_pollutant))?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: Uuid,
    sensor_id: String,
    reading_id: Option<Uuid>,
    alert_type: String,
    severity: String,
    title: String,
    message: String,
    threshold_value: Option<f64>,
    actual_value: Option<f64>,
    pollutant: Option<String>,
    is_active: bool,
    acknowledged: bool,
    acknowledged_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AlertRow> for AlertRecord {
    type Error = StoreError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        // ---
        let pollutant = match row.pollutant.as_deref() {
            Some(code) => Some(Pollutant::from_code(code).ok_or_else(|| corrupt("pollutant", code))?),
            None => None,
        };

        Ok(AlertRecord {
            id: row.id,
            sensor_id: row.sensor_id,
            measurement_id: row.reading_id,
            kind: AlertKind::from_code(&row.alert_type)
                .ok_or_else(|| corrupt("alert_type", &row.alert_type))?,
            severity: AlertSeverity::from_code(&row.severity)
                .ok_or_else(|| corrupt("severity", &row.severity))?,
            title: row.title,
            message: row.message,
            threshold_value: row.threshold_value,
            actual_value: row.actual_value,
            pollutant,
            is_active: row.is_active,
            acknowledged: row.acknowledged,
            acknowledged_at: row.acknowledged_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_SENSOR: &str = r#"
    SELECT s.sensor_id, s.location_id, l.name AS location_name, s.status
    FROM sensors s
    JOIN locations l ON l.id = s.location_id
    WHERE s.sensor_id = $1
"#;

const SELECT_ALERT: &str = r#"
    SELECT id, sensor_id, reading_id, alert_type, severity, title, message,
           threshold_value, actual_value, pollutant, is_active, acknowledged,
           acknowledged_at, created_at, updated_at
    FROM alerts
"#;

#[async_trait]
impl Store for PgStore {
    // ---
    async fn register_sensor(&self, new: &NewSensor) -> Result<Sensor, StoreError> {
        // ---
        let mut tx = self.pool.begin().await?;

        let (location_id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO locations (id, name) VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.location_name)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO sensors (sensor_id, location_id, status) VALUES ($1, $2, $3)")
            .bind(&new.sensor_id)
            .bind(location_id)
            .bind(SensorStatus::Active.code())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                conflict_or(e, || format!("sensor {} already registered", new.sensor_id))
            })?;

        tx.commit().await?;

        Ok(Sensor {
            sensor_id: new.sensor_id.clone(),
            location_id,
            location_name: new.location_name.clone(),
            status: SensorStatus::Active,
        })
    }

    async fn get_sensor(&self, sensor_id: &str) -> Result<Option<Sensor>, StoreError> {
        // ---
        sqlx::query_as::<_, SensorRow>(SELECT_SENSOR)
            .bind(sensor_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Sensor::try_from)
            .transpose()
    }

    async fn mark_sensor_active(&self, sensor_id: &str) -> Result<u64, StoreError> {
        // ---
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE sensors SET status = $2, updated_at = now() WHERE sensor_id = $1",
        )
        .bind(sensor_id)
        .bind(SensorStatus::Active.code())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::sensor_not_found(sensor_id));
        }

        let cleared = sqlx::query(
            r#"
            UPDATE alerts SET is_active = FALSE, updated_at = now()
            WHERE sensor_id = $1 AND alert_type = $2 AND is_active
            "#,
        )
        .bind(sensor_id)
        .bind(AlertKind::SensorOffline.code())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(cleared.rows_affected())
    }

    async fn insert_measurement(&self, m: &Measurement) -> Result<(), StoreError> {
        // ---
        let c = &m.concentrations;
        sqlx::query(
            r#"
            INSERT INTO sensor_readings (id, sensor_id, timestamp, pm25, pm10, co, no2, so2, o3)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(m.id)
        .bind(&m.sensor_id)
        .bind(m.timestamp)
        .bind(c.pm25)
        .bind(c.pm10)
        .bind(c.co)
        .bind(c.no2)
        .bind(c.so2)
        .bind(c.o3)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                StoreError::sensor_not_found(&m.sensor_id)
            }
            _ => conflict_or(e, || format!("measurement {} already stored", m.id)),
        })?;

        Ok(())
    }

    async fn get_measurement(&self, id: Uuid) -> Result<Option<Measurement>, StoreError> {
        // ---
        let row = sqlx::query_as::<_, ReadingRow>(
            r#"
            SELECT id, sensor_id, timestamp, pm25, pm10, co, no2, so2, o3
            FROM sensor_readings WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Measurement::from))
    }

    async fn measurements_without_index(
        &self,
        limit: u32,
    ) -> Result<Vec<Measurement>, StoreError> {
        // ---
        let rows = sqlx::query_as::<_, ReadingRow>(
            r#"
            SELECT r.id, r.sensor_id, r.timestamp, r.pm25, r.pm10, r.co, r.no2, r.so2, r.o3
            FROM sensor_readings r
            LEFT JOIN aqi_calculations c ON c.reading_id = r.id
            WHERE c.reading_id IS NULL
            ORDER BY r.timestamp ASC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Measurement::from).collect())
    }

    async fn get_index_result(
        &self,
        measurement_id: Uuid,
    ) -> Result<Option<IndexResult>, StoreError> {
        // ---
        sqlx::query_as::<_, CalculationRow>(
            r#"
            SELECT reading_id, aqi_pm25, aqi_pm10, aqi_co, aqi_no2, aqi_so2, aqi_o3,
                   overall_aqi, aqi_status, dominant_pollutant
            FROM aqi_calculations WHERE reading_id = $1
            "#,
        )
        .bind(measurement_id)
        .fetch_optional(&self.pool)
        .await?
        .map(IndexResult::try_from)
        .transpose()
    }

    async fn latest_calculated_at(
        &self,
        sensor_id: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        // ---
        let (latest,): (Option<DateTime<Utc>>,) = sqlx::query_as(
            r#"
            SELECT MAX(r.timestamp)
            FROM sensor_readings r
            JOIN aqi_calculations c ON c.reading_id = r.id
            WHERE r.sensor_id = $1
            "#,
        )
        .bind(sensor_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(latest)
    }

    async fn insert_index_result(&self, r: &IndexResult) -> Result<bool, StoreError> {
        // ---
        let done = sqlx::query(
            r#"
            INSERT INTO aqi_calculations (
                reading_id, aqi_pm25, aqi_pm10, aqi_co, aqi_no2, aqi_so2, aqi_o3,
                overall_aqi, aqi_status, dominant_pollutant
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (reading_id) DO NOTHING
            "#,
        )
        .bind(r.measurement_id)
        .bind(r.pm25_index)
        .bind(r.pm10_index)
        .bind(r.co_index)
        .bind(r.no2_index)
        .bind(r.so2_index)
        .bind(r.o3_index)
        .bind(r.aggregate_index)
        .bind(r.status_band.code())
        .bind(r.dominant_pollutant.code())
        .execute(&self.pool)
        .await?;

        Ok(done.rows_affected() == 1)
    }

    async fn find_active_alert(
        &self,
        sensor_id: &str,
        kind: AlertKind,
    ) -> Result<Option<AlertRecord>, StoreError> {
        // ---
        let sql = format!(
            "{} WHERE sensor_id = $1 AND alert_type = $2 AND is_active \
             ORDER BY created_at DESC LIMIT 1",
            SELECT_ALERT
        );
        sqlx::query_as::<_, AlertRow>(&sql)
            .bind(sensor_id)
            .bind(kind.code())
            .fetch_optional(&self.pool)
            .await?
            .map(AlertRecord::try_from)
            .transpose()
    }

    async fn insert_alert(&self, a: &AlertRecord) -> Result<(), StoreError> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO alerts (
                id, sensor_id, reading_id, alert_type, severity, title, message,
                threshold_value, actual_value, pollutant, is_active, acknowledged,
                acknowledged_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(a.id)
        .bind(&a.sensor_id)
        .bind(a.measurement_id)
        .bind(a.kind.code())
        .bind(a.severity.code())
        .bind(&a.title)
        .bind(&a.message)
        .bind(a.threshold_value)
        .bind(a.actual_value)
        .bind(a.pollutant.map(Pollutant::code))
        .bind(a.is_active)
        .bind(a.acknowledged)
        .bind(a.acknowledged_at)
        .bind(a.created_at)
        .bind(a.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_or(e, || {
                format!(
                    "sensor {} already has an active {} alert",
                    a.sensor_id,
                    a.kind.code()
                )
            })
        })?;

        Ok(())
    }

    async fn update_alert(&self, a: &AlertRecord) -> Result<(), StoreError> {
        // ---
        let done = sqlx::query(
            r#"
            UPDATE alerts SET
                severity = $2, message = $3, actual_value = $4, is_active = $5,
                acknowledged = $6, acknowledged_at = $7, updated_at = $8, reading_id = $9
            WHERE id = $1
            "#,
        )
        .bind(a.id)
        .bind(a.severity.code())
        .bind(&a.message)
        .bind(a.actual_value)
        .bind(a.is_active)
        .bind(a.acknowledged)
        .bind(a.acknowledged_at)
        .bind(a.updated_at)
        .bind(a.measurement_id)
        .execute(&self.pool)
        .await?;

        if done.rows_affected() == 0 {
            return Err(StoreError::alert_not_found(a.id));
        }
        Ok(())
    }

    async fn get_alert(&self, id: Uuid) -> Result<Option<AlertRecord>, StoreError> {
        // ---
        let sql = format!("{} WHERE id = $1", SELECT_ALERT);
        sqlx::query_as::<_, AlertRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(AlertRecord::try_from)
            .transpose()
    }

    async fn list_active_alerts(
        &self,
        location_id: Option<Uuid>,
    ) -> Result<Vec<AlertRecord>, StoreError> {
        // ---
        let rows = sqlx::query_as::<_, AlertRow>(
            r#"
            SELECT a.id, a.sensor_id, a.reading_id, a.alert_type, a.severity, a.title,
                   a.message, a.threshold_value, a.actual_value, a.pollutant, a.is_active,
                   a.acknowledged, a.acknowledged_at, a.created_at, a.updated_at
            FROM alerts a
            JOIN sensors s ON s.sensor_id = a.sensor_id
            WHERE a.is_active AND NOT a.acknowledged
              AND ($1::uuid IS NULL OR s.location_id = $1)
            ORDER BY a.created_at DESC
            "#,
        )
        .bind(location_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AlertRecord::try_from).collect()
    }
}
