// src/core/state/mod.rs

//! Defines the central `ServerState` struct and related state components.

mod core;
mod stats;

pub use core::{ServerInit, ServerState};
pub use stats::StatsState;
