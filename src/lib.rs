//! Air-quality index derivation and alerting service.
//!
//! Sensors upload pollutant concentrations; every accepted measurement is
//! turned into an EPA-style index result, checked against the alert policy,
//! folded into the per-sensor alert ledger and pushed to subscribers.
//!
//! Module layout follows an explicit gateway pattern: each module exposes a
//! narrow surface, and this file re-exports what `routes/*.rs` and the binary
//! need so they never reach into sibling internals.

pub mod alerts;
pub mod aqi;
pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod routes;
pub mod schema;
pub mod store;
pub mod sweep;

pub use alerts::{AlertDecision, AlertLedger, LedgerOutcome};
pub use config::Config;
pub use error::{ApiError, StoreError, ValidationError};
pub use models::{
    AlertKind, AlertRecord, AlertSeverity, IndexResult, Measurement, NewSensor, Pollutant,
    RawMeasurement, Sensor, StatusBand,
};
pub use notify::{Envelope, Notifier};
pub use pipeline::{IngestReport, IngestionPipeline, PipelineRun};
pub use store::{MemoryStore, PgStore, Store};
