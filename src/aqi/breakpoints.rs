//! EPA-style breakpoint tables.
//!
//! Each pollutant maps to an ascending, contiguous sequence of segments. The
//! tables are constants; their shape is checked by the tests below rather than
//! at runtime.

use crate::models::Pollutant;

// ---

/// Closed concentration interval mapped onto a closed index interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakpointSegment {
    pub conc_low: f64,
    pub conc_high: f64,
    pub index_low: f64,
    pub index_high: f64,
}

const fn seg(conc_low: f64, conc_high: f64, index_low: f64, index_high: f64) -> BreakpointSegment {
    BreakpointSegment {
        conc_low,
        conc_high,
        index_low,
        index_high,
    }
}

/// Index ceiling; concentrations above the last segment clamp here.
pub const INDEX_CEILING: f64 = 500.0;

const PM25: [BreakpointSegment; 6] = [
    seg(0.0, 12.0, 0.0, 50.0),
    seg(12.1, 35.4, 51.0, 100.0),
    seg(35.5, 55.4, 101.0, 150.0),
    seg(55.5, 150.4, 151.0, 200.0),
    seg(150.5, 250.4, 201.0, 300.0),
    seg(250.5, 500.0, 301.0, 500.0),
];

const PM10: [BreakpointSegment; 6] = [
    seg(0.0, 54.0, 0.0, 50.0),
    seg(55.0, 154.0, 51.0, 100.0),
    seg(155.0, 254.0, 101.0, 150.0),
    seg(255.0, 354.0, 151.0, 200.0),
    seg(355.0, 424.0, 201.0, 300.0),
    seg(425.0, 604.0, 301.0, 500.0),
];

const CO: [BreakpointSegment; 6] = [
    seg(0.0, 4.4, 0.0, 50.0),
    seg(4.5, 9.4, 51.0, 100.0),
    seg(9.5, 12.4, 101.0, 150.0),
    seg(12.5, 15.4, 151.0, 200.0),
    seg(15.5, 30.4, 201.0, 300.0),
    seg(30.5, 50.0, 301.0, 500.0),
];

const NO2: [BreakpointSegment; 6] = [
    seg(0.0, 53.0, 0.0, 50.0),
    seg(54.0, 100.0, 51.0, 100.0),
    seg(101.0, 360.0, 101.0, 150.0),
    seg(361.0, 649.0, 151.0, 200.0),
    seg(650.0, 1249.0, 201.0, 300.0),
    seg(1250.0, 2049.0, 301.0, 500.0),
];

const SO2: [BreakpointSegment; 6] = [
    seg(0.0, 35.0, 0.0, 50.0),
    seg(36.0, 75.0, 51.0, 100.0),
    seg(76.0, 185.0, 101.0, 150.0),
    seg(186.0, 304.0, 151.0, 200.0),
    seg(305.0, 604.0, 201.0, 300.0),
    seg(605.0, 1004.0, 301.0, 500.0),
];

// Ozone has no 301-500 segment; anything above 200 ppb clamps to the ceiling.
const O3: [BreakpointSegment; 5] = [
    seg(0.0, 54.0, 0.0, 50.0),
    seg(55.0, 70.0, 51.0, 100.0),
    seg(71.0, 85.0, 101.0, 150.0),
    seg(86.0, 105.0, 151.0, 200.0),
    seg(106.0, 200.0, 201.0, 300.0),
];

/// Ordered segments for `pollutant`.
pub fn table(pollutant: Pollutant) -> &'static [BreakpointSegment] {
    // ---
    match pollutant {
        Pollutant::Pm25 => &PM25,
        Pollutant::Pm10 => &PM10,
        Pollutant::Co => &CO,
        Pollutant::No2 => &NO2,
        Pollutant::So2 => &SO2,
        Pollutant::O3 => &O3,
    }
}
