// src/core/state/stats.rs

use std::sync::atomic::{AtomicU64, Ordering};

/// Server-wide counters, surfaced by `CLUSTER INFO` and logging.
#[derive(Debug, Default)]
pub struct StatsState {
    pub total_connections: AtomicU64,
    pub total_commands: AtomicU64,
}

impl StatsState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_total_connections(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_total_commands(&self) {
        self.total_commands.fetch_add(1, Ordering::Relaxed);
    }
}
