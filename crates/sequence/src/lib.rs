//! portknock sequence - knock sequence definition and matching
//!
//! This crate defines the data the whole engine operates on:
//! - `KnockStep`/`KnockSequence`: the ordered, validated knock sequence
//! - `ClientState`: per-address progress through the sequence
//! - `evaluate`: the pure matcher deciding the outcome of a single knock
//!
//! Nothing here performs I/O or holds shared state.

mod matcher;
mod sequence;
mod state;

pub use matcher::*;
pub use sequence::*;
pub use state::*;
