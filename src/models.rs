//! Data models for the air-quality pipeline.
//!
//! Everything that crosses a boundary (HTTP, storage, subscribers) lives here:
//! the inbound measurement shape, the derived index record, alert records and
//! the sensor registry types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

// ---

/// The six pollutants tracked per measurement, in canonical order.
///
/// The declaration order is significant: it is the tie-break order used when
/// picking the dominant pollutant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Pollutant {
    Pm25,
    Pm10,
    Co,
    No2,
    So2,
    O3,
}

impl Pollutant {
    // ---
    pub const ALL: [Pollutant; 6] = [
        Pollutant::Pm25,
        Pollutant::Pm10,
        Pollutant::Co,
        Pollutant::No2,
        Pollutant::So2,
        Pollutant::O3,
    ];

    /// Storage / wire code, e.g. `"PM25"`.
    pub fn code(self) -> &'static str {
        match self {
            Pollutant::Pm25 => "PM25",
            Pollutant::Pm10 => "PM10",
            Pollutant::Co => "CO",
            Pollutant::No2 => "NO2",
            Pollutant::So2 => "SO2",
            Pollutant::O3 => "O3",
        }
    }

    pub fn from_code(code: &str) -> Option<Pollutant> {
        Pollutant::ALL.into_iter().find(|p| p.code() == code)
    }

    /// Human readable name used in alert messages.
    pub fn display_name(self) -> &'static str {
        match self {
            Pollutant::Pm25 => "PM2.5",
            Pollutant::Pm10 => "PM10",
            Pollutant::Co => "CO",
            Pollutant::No2 => "NO2",
            Pollutant::So2 => "SO2",
            Pollutant::O3 => "O3",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Pollutant::Pm25 | Pollutant::Pm10 => "µg/m³",
            Pollutant::Co => "ppm",
            Pollutant::No2 | Pollutant::So2 | Pollutant::O3 => "ppb",
        }
    }

    /// Largest concentration a healthy sensor can plausibly report.
    pub fn sanity_bound(self) -> f64 {
        match self {
            Pollutant::Pm25 | Pollutant::Pm10 => 1000.0,
            Pollutant::Co => 100.0,
            Pollutant::No2 | Pollutant::So2 => 1000.0,
            Pollutant::O3 => 500.0,
        }
    }
}

/// Pollutant concentrations of a single measurement.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Concentrations {
    // ---
    pub pm25: f64,
    pub pm10: f64,
    pub co: f64,
    pub no2: f64,
    pub so2: f64,
    pub o3: f64,
}

impl Concentrations {
    // ---
    pub fn get(&self, pollutant: Pollutant) -> f64 {
        match pollutant {
            Pollutant::Pm25 => self.pm25,
            Pollutant::Pm10 => self.pm10,
            Pollutant::Co => self.co,
            Pollutant::No2 => self.no2,
            Pollutant::So2 => self.so2,
            Pollutant::O3 => self.o3,
        }
    }

    fn slot(&mut self, pollutant: Pollutant) -> &mut f64 {
        match pollutant {
            Pollutant::Pm25 => &mut self.pm25,
            Pollutant::Pm10 => &mut self.pm10,
            Pollutant::Co => &mut self.co,
            Pollutant::No2 => &mut self.no2,
            Pollutant::So2 => &mut self.so2,
            Pollutant::O3 => &mut self.o3,
        }
    }
}

/// Measurement as delivered by a sensor upload.
///
/// Every pollutant is optional on the wire; absent and negative values are
/// normalized to zero when the measurement is accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMeasurement {
    // ---
    #[serde(alias = "sensorId")]
    pub sensor_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub co: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
    pub o3: Option<f64>,
}

impl RawMeasurement {
    // ---
    /// Normalize and validate into an immutable [`Measurement`].
    ///
    /// Missing timestamps default to the time of acceptance.
    pub fn into_measurement(self) -> Result<Measurement, ValidationError> {
        // ---
        let sensor_id = self.sensor_id.trim().to_string();
        if sensor_id.is_empty() {
            return Err(ValidationError::MissingField("sensor_id"));
        }

        let raw = [
            (Pollutant::Pm25, self.pm25),
            (Pollutant::Pm10, self.pm10),
            (Pollutant::Co, self.co),
            (Pollutant::No2, self.no2),
            (Pollutant::So2, self.so2),
            (Pollutant::O3, self.o3),
        ];

        let mut concentrations = Concentrations::default();
        for (pollutant, value) in raw {
            let value = normalize_concentration(value);
            if value > pollutant.sanity_bound() {
                return Err(ValidationError::OutOfRange {
                    field: pollutant.code(),
                    value,
                    max: pollutant.sanity_bound(),
                });
            }
            *concentrations.slot(pollutant) = value;
        }

        Ok(Measurement {
            id: Uuid::new_v4(),
            sensor_id,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            concentrations,
        })
    }
}

/// Absent, negative and NaN readings all count as zero.
pub fn normalize_concentration(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v >= 0.0 => v,
        _ => 0.0,
    }
}

/// An accepted measurement. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    // ---
    pub id: Uuid,
    pub sensor_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub concentrations: Concentrations,
}

/// Named severity tier on the 0–500 index scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusBand {
    Good,
    Moderate,
    UnhealthySg,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl StatusBand {
    // ---
    pub fn code(self) -> &'static str {
        match self {
            StatusBand::Good => "GOOD",
            StatusBand::Moderate => "MODERATE",
            StatusBand::UnhealthySg => "UNHEALTHY_SG",
            StatusBand::Unhealthy => "UNHEALTHY",
            StatusBand::VeryUnhealthy => "VERY_UNHEALTHY",
            StatusBand::Hazardous => "HAZARDOUS",
        }
    }

    pub fn from_code(code: &str) -> Option<StatusBand> {
        use StatusBand::*;
        [Good, Moderate, UnhealthySg, Unhealthy, VeryUnhealthy, Hazardous]
            .into_iter()
            .find(|b| b.code() == code)
    }

    pub fn title(self) -> &'static str {
        match self {
            StatusBand::Good => "Good",
            StatusBand::Moderate => "Moderate",
            StatusBand::UnhealthySg => "Unhealthy for Sensitive Groups",
            StatusBand::Unhealthy => "Unhealthy",
            StatusBand::VeryUnhealthy => "Very Unhealthy",
            StatusBand::Hazardous => "Hazardous",
        }
    }
}

/// Derived index annotation of exactly one measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexResult {
    // ---
    pub measurement_id: Uuid,
    pub pm25_index: f64,
    pub pm10_index: f64,
    pub co_index: f64,
    pub no2_index: f64,
    pub so2_index: f64,
    pub o3_index: f64,
    pub aggregate_index: f64,
    pub status_band: StatusBand,
    pub dominant_pollutant: Pollutant,
}

impl IndexResult {
    // ---
    pub fn index_for(&self, pollutant: Pollutant) -> f64 {
        match pollutant {
            Pollutant::Pm25 => self.pm25_index,
            Pollutant::Pm10 => self.pm10_index,
            Pollutant::Co => self.co_index,
            Pollutant::No2 => self.no2_index,
            Pollutant::So2 => self.so2_index,
            Pollutant::O3 => self.o3_index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
    Emergency,
}

impl AlertSeverity {
    // ---
    pub fn code(self) -> &'static str {
        match self {
            AlertSeverity::Info => "INFO",
            AlertSeverity::Warning => "WARNING",
            AlertSeverity::Critical => "CRITICAL",
            AlertSeverity::Emergency => "EMERGENCY",
        }
    }

    pub fn from_code(code: &str) -> Option<AlertSeverity> {
        use AlertSeverity::*;
        [Info, Warning, Critical, Emergency]
            .into_iter()
            .find(|s| s.code() == code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    /// Aggregate index crossed the alert threshold.
    AqiThreshold,
    PollutantSpike,
    SensorOffline,
    DataAnomaly,
}

impl AlertKind {
    // ---
    pub fn code(self) -> &'static str {
        match self {
            AlertKind::AqiThreshold => "AQI_THRESHOLD",
            AlertKind::PollutantSpike => "POLLUTANT_SPIKE",
            AlertKind::SensorOffline => "SENSOR_OFFLINE",
            AlertKind::DataAnomaly => "DATA_ANOMALY",
        }
    }

    pub fn from_code(code: &str) -> Option<AlertKind> {
        use AlertKind::*;
        [AqiThreshold, PollutantSpike, SensorOffline, DataAnomaly]
            .into_iter()
            .find(|k| k.code() == code)
    }
}

/// Persistent alert state for one sensor condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    // ---
    pub id: Uuid,
    pub sensor_id: String,
    pub measurement_id: Option<Uuid>,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub threshold_value: Option<f64>,
    pub actual_value: Option<f64>,
    pub pollutant: Option<Pollutant>,
    pub is_active: bool,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SensorStatus {
    Active,
    Inactive,
    Maintenance,
    Error,
}

impl SensorStatus {
    // ---
    pub fn code(self) -> &'static str {
        match self {
            SensorStatus::Active => "ACTIVE",
            SensorStatus::Inactive => "INACTIVE",
            SensorStatus::Maintenance => "MAINTENANCE",
            SensorStatus::Error => "ERROR",
        }
    }

    pub fn from_code(code: &str) -> Option<SensorStatus> {
        use SensorStatus::*;
        [Active, Inactive, Maintenance, Error]
            .into_iter()
            .find(|s| s.code() == code)
    }
}

/// A registered sensor and the location it reports for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    // ---
    pub sensor_id: String,
    pub location_id: Uuid,
    pub location_name: String,
    pub status: SensorStatus,
}

/// Body of `POST /sensors`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSensor {
    // ---
    pub sensor_id: String,
    pub location_name: String,
}
