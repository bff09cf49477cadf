//! portknock tracker - concurrent knock state
//!
//! This crate provides:
//! - `StateTracker`: the address -> progress map, serialized per address
//! - `AccessGranter`: the sink fired once per completed sequence
//! - `TrackerStats`: lock-free outcome counters for metrics export

mod granter;
mod stats;
mod tracker;

pub use granter::*;
pub use stats::*;
pub use tracker::*;
