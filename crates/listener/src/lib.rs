//! portknock listener - the network side of the engine
//!
//! This crate provides:
//! - `ListenerManager`: one TCP listener per distinct sequence port
//! - `KnockServer`: the running engine (accept loops + sweeper) and its shutdown

mod manager;
mod server;

pub use manager::*;
pub use server::*;
