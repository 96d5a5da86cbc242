//! Analysis modules.
//!
//! Post-run aggregation of per-repository results.

pub mod aggregator;

pub use aggregator::*;
