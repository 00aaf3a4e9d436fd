//! Database schema management for `aqi-sensorflow`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` when a database is configured.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Safe to call on every startup; no-op if objects already exist. The partial
/// unique index on `alerts` is what upholds "one active threshold alert per
/// sensor" across processes sharing the database.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS locations (
            id                UUID PRIMARY KEY,
            name              TEXT        NOT NULL UNIQUE,
            created_at        TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS sensors (
            sensor_id         TEXT PRIMARY KEY,
            location_id       UUID        NOT NULL REFERENCES locations (id),
            status            TEXT        NOT NULL DEFAULT 'ACTIVE',
            created_at        TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at        TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS sensor_readings (
            id                UUID PRIMARY KEY,
            sensor_id         TEXT        NOT NULL REFERENCES sensors (sensor_id),
            timestamp         TIMESTAMPTZ NOT NULL,
            pm25              DOUBLE PRECISION NOT NULL,
            pm10              DOUBLE PRECISION NOT NULL,
            co                DOUBLE PRECISION NOT NULL,
            no2               DOUBLE PRECISION NOT NULL,
            so2               DOUBLE PRECISION NOT NULL,
            o3                DOUBLE PRECISION NOT NULL,
            created_at        TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS aqi_calculations (
            id                  BIGSERIAL PRIMARY KEY,
            reading_id          UUID        NOT NULL UNIQUE REFERENCES sensor_readings (id),
            aqi_pm25            DOUBLE PRECISION NOT NULL,
            aqi_pm10            DOUBLE PRECISION NOT NULL,
            aqi_co              DOUBLE PRECISION NOT NULL,
            aqi_no2             DOUBLE PRECISION NOT NULL,
            aqi_so2             DOUBLE PRECISION NOT NULL,
            aqi_o3              DOUBLE PRECISION NOT NULL,
            overall_aqi         DOUBLE PRECISION NOT NULL,
            aqi_status          TEXT        NOT NULL,
            dominant_pollutant  TEXT        NOT NULL,
            calculated_at       TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS alerts (
            id                UUID PRIMARY KEY,
            sensor_id         TEXT        NOT NULL REFERENCES sensors (sensor_id),
            reading_id        UUID        REFERENCES sensor_readings (id),
            alert_type        TEXT        NOT NULL,
            severity          TEXT        NOT NULL,
            title             TEXT        NOT NULL,
            message           TEXT        NOT NULL,
            threshold_value   DOUBLE PRECISION,
            actual_value      DOUBLE PRECISION,
            pollutant         TEXT,
            is_active         BOOLEAN     NOT NULL DEFAULT TRUE,
            acknowledged      BOOLEAN     NOT NULL DEFAULT FALSE,
            acknowledged_at   TIMESTAMPTZ,
            created_at        TIMESTAMPTZ NOT NULL,
            updated_at        TIMESTAMPTZ NOT NULL
        );
        "#,
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS uq_alerts_active_threshold
            ON alerts (sensor_id)
            WHERE is_active AND alert_type = 'AQI_THRESHOLD';
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_sensor_readings_sensor_ts
            ON sensor_readings (sensor_id, timestamp DESC);
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_alerts_sensor_created
            ON alerts (sensor_id, created_at DESC);
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_alerts_severity_active
            ON alerts (severity, is_active);
        "#,
    ];

    for sql in statements {
        sqlx::query(sql).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(())
}
