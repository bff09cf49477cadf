//! portknock client library
//!
//! Sends the configured knock sequence to a target host. The client never
//! learns whether a knock was accepted; every attempt is fire-and-forget.

pub mod config;
pub mod knock;

pub use knock::{KnockError, Knocker, KnockerConfig};
