//! Aggregate index to status band.

use crate::models::StatusBand;

// ---

/// Upper edge (inclusive) of each band, in ascending order.
const BANDS: [(f64, StatusBand); 5] = [
    (50.0, StatusBand::Good),
    (100.0, StatusBand::Moderate),
    (150.0, StatusBand::UnhealthySg),
    (200.0, StatusBand::Unhealthy),
    (300.0, StatusBand::VeryUnhealthy),
];

/// Band for an aggregate index. Everything above 300, including values past
/// the 500 ceiling, is hazardous.
pub fn classify(aggregate_index: f64) -> StatusBand {
    // ---
    BANDS
        .iter()
        .find(|(upper, _)| aggregate_index <= *upper)
        .map(|(_, band)| *band)
        .unwrap_or(StatusBand::Hazardous)
}
