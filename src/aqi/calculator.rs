//! Piecewise-linear index interpolation and per-measurement derivation.

use crate::models::{Concentrations, IndexResult, Measurement, Pollutant};

use super::breakpoints::{table, INDEX_CEILING};
use super::classifier::classify;

// ---

/// Index (0–500, one decimal) for a single pollutant concentration.
///
/// Negative and NaN concentrations yield 0. The first segment whose upper
/// bound is at or above the concentration is used, so a value sitting exactly
/// on a segment's upper bound maps to that segment's `index_high`. Values in
/// the sub-resolution gap between two segments snap to the next segment's
/// `index_low`. Anything past the last segment clamps to 500.
pub fn compute_index(pollutant: Pollutant, concentration: f64) -> f64 {
    // ---
    if !(concentration >= 0.0) {
        return 0.0;
    }

    for s in table(pollutant) {
        if concentration <= s.conc_high {
            let c = concentration.max(s.conc_low);
            let index = (s.index_high - s.index_low) / (s.conc_high - s.conc_low)
                * (c - s.conc_low)
                + s.index_low;
            return round1(index);
        }
    }

    INDEX_CEILING
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Derive the full index annotation for a measurement.
///
/// The aggregate is the maximum per-pollutant index. Ties for the maximum go
/// to the pollutant that comes first in [`Pollutant::ALL`].
pub fn derive(measurement: &Measurement) -> IndexResult {
    // ---
    let c: &Concentrations = &measurement.concentrations;
    let indices = Pollutant::ALL.map(|p| (p, compute_index(p, c.get(p))));

    let (dominant, aggregate) = indices
        .iter()
        .copied()
        .fold((Pollutant::Pm25, f64::MIN), |best, cur| {
            if cur.1 > best.1 {
                cur
            } else {
                best
            }
        });

    IndexResult {
        measurement_id: measurement.id,
        pm25_index: indices[0].1,
        pm10_index: indices[1].1,
        co_index: indices[2].1,
        no2_index: indices[3].1,
        so2_index: indices[4].1,
        o3_index: indices[5].1,
        aggregate_index: aggregate,
        status_band: classify(aggregate),
        dominant_pollutant: dominant,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::StatusBand;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn measurement(c: Concentrations) -> Measurement {
        // ---
        Measurement {
            id: Uuid::new_v4(),
            sensor_id: "S1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 0).unwrap(),
            concentrations: c,
        }
    }

    #[test]
    fn test_pm25_boundaries() {
        // ---
        assert_eq!(compute_index(Pollutant::Pm25, 35.4), 100.0);
        assert_eq!(compute_index(Pollutant::Pm25, 35.5), 101.0);
        assert_eq!(compute_index(Pollutant::Pm25, 12.0), 50.0);
        assert_eq!(compute_index(Pollutant::Pm25, 12.1), 51.0);
        assert_eq!(compute_index(Pollutant::Pm25, 10.0), 41.7);
    }

    #[test]
    fn test_every_segment_boundary_is_exact() {
        // ---
        for p in Pollutant::ALL {
            for s in table(p) {
                assert_eq!(compute_index(p, s.conc_low), s.index_low, "{:?} low {:?}", p, s);
                assert_eq!(compute_index(p, s.conc_high), s.index_high, "{:?} high {:?}", p, s);
            }
        }
    }

    #[test]
    fn test_gap_between_segments_snaps_up() {
        // ---
        assert_eq!(compute_index(Pollutant::Pm25, 35.45), 101.0);
        assert_eq!(compute_index(Pollutant::Pm10, 54.5), 51.0);
    }

    #[test]
    fn test_invalid_concentration_is_zero() {
        // ---
        assert_eq!(compute_index(Pollutant::Co, -1.0), 0.0);
        assert_eq!(compute_index(Pollutant::Co, f64::NAN), 0.0);
    }

    #[test]
    fn test_above_table_clamps() {
        // ---
        // 400 still sits inside the 250.5-500.0 segment
        assert_eq!(compute_index(Pollutant::Pm25, 400.0), 420.2);
        assert_eq!(compute_index(Pollutant::Pm25, 500.1), 500.0);
        assert_eq!(compute_index(Pollutant::Pm25, 900.0), 500.0);
        assert_eq!(compute_index(Pollutant::O3, 200.0), 300.0);
        assert_eq!(compute_index(Pollutant::O3, 201.0), 500.0);
        assert_eq!(compute_index(Pollutant::Co, f64::INFINITY), 500.0);
    }

    #[test]
    fn test_scenario_good() {
        // ---
        let m = measurement(Concentrations {
            pm25: 10.0,
            ..Default::default()
        });
        let r = derive(&m);

        assert_eq!(r.measurement_id, m.id);
        assert_eq!(r.aggregate_index, 41.7);
        assert_eq!(r.status_band, StatusBand::Good);
        assert_eq!(r.dominant_pollutant, Pollutant::Pm25);
    }

    #[test]
    fn test_scenario_unhealthy() {
        // ---
        let r = derive(&measurement(Concentrations {
            pm25: 150.4,
            ..Default::default()
        }));
        assert_eq!(r.pm25_index, 200.0);
        assert_eq!(r.status_band, StatusBand::Unhealthy);
    }

    #[test]
    fn test_dominant_pollutant() {
        // ---
        let r = derive(&measurement(Concentrations {
            pm25: 10.0,
            no2: 500.0,
            o3: 60.0,
            ..Default::default()
        }));
        assert_eq!(r.dominant_pollutant, Pollutant::No2);
        assert_eq!(r.aggregate_index, r.no2_index);
    }

    #[test]
    fn test_all_zero_tie_goes_to_pm25() {
        // ---
        let r = derive(&measurement(Concentrations::default()));
        assert_eq!(r.aggregate_index, 0.0);
        assert_eq!(r.dominant_pollutant, Pollutant::Pm25);
        assert_eq!(r.status_band, StatusBand::Good);
    }

    #[test]
    fn test_tie_prefers_canonical_order() {
        // ---
        // PM10 and SO2 both hit their 50.0 boundary
        let r = derive(&measurement(Concentrations {
            pm10: 54.0,
            so2: 35.0,
            ..Default::default()
        }));
        assert_eq!(r.aggregate_index, 50.0);
        assert_eq!(r.dominant_pollutant, Pollutant::Pm10);
    }

    #[test]
    fn test_derive_is_deterministic() {
        // ---
        let m = measurement(Concentrations {
            pm25: 33.3,
            pm10: 120.0,
            co: 7.0,
            no2: 80.0,
            so2: 20.0,
            o3: 66.0,
        });
        assert_eq!(derive(&m), derive(&m));
    }

    fn pollutant() -> impl Strategy<Value = Pollutant> {
        prop::sample::select(Pollutant::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_index_is_monotone(p in pollutant(), a in 0.0f64..2500.0, b in 0.0f64..2500.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(compute_index(p, lo) <= compute_index(p, hi));
        }

        #[test]
        fn prop_index_in_range(p in pollutant(), c in -100.0f64..5000.0) {
            let i = compute_index(p, c);
            prop_assert!((0.0..=500.0).contains(&i));
        }

        #[test]
        fn prop_aggregate_is_max(
            pm25 in 0.0f64..600.0,
            pm10 in 0.0f64..700.0,
            co in 0.0f64..60.0,
            no2 in 0.0f64..2100.0,
            so2 in 0.0f64..1100.0,
            o3 in 0.0f64..250.0,
        ) {
            let r = derive(&measurement(Concentrations { pm25, pm10, co, no2, so2, o3 }));
            let max = Pollutant::ALL
                .iter()
                .map(|p| r.index_for(*p))
                .fold(f64::MIN, f64::max);
            prop_assert_eq!(r.aggregate_index, max);
            prop_assert_eq!(r.index_for(r.dominant_pollutant), max);
            prop_assert_eq!(r.status_band, classify(max));
        }
    }
}
