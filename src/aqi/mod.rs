//! Index derivation: breakpoint tables, interpolation and band classification.
//!
//! Gateway for the `aqi` module tree; callers only see the functions
//! re-exported here.

mod breakpoints;
mod calculator;
mod classifier;

pub use breakpoints::{table, BreakpointSegment, INDEX_CEILING};
pub use calculator::{compute_index, derive};
pub use classifier::classify;
