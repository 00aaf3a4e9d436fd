//! Alert policy and the per-sensor alert ledger.

mod ledger;
mod policy;

pub use ledger::{AlertLedger, LedgerOutcome, SensorGuard};
pub use policy::{
    evaluate, recommendations_for, safe_threshold, severity_for, AlertDecision, ALERT_THRESHOLD,
};
