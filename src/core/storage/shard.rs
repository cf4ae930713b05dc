// src/core/storage/shard.rs

use bytes::Bytes;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::Mutex;

/// The number of shards the keyspace is split into.
pub const NUM_SHARDS: usize = 16;

/// A single stored entry: the raw value plus an optional absolute expiry.
#[derive(Debug, Clone)]
pub struct StoredValue {
    pub data: Bytes,
    pub expires_at: Option<Instant>,
}

impl StoredValue {
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            expires_at: None,
        }
    }

    pub fn with_expiry(data: Bytes, expires_at: Instant) -> Self {
        Self {
            data,
            expires_at: Some(expires_at),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    /// Remaining TTL in milliseconds, or `None` for a persistent entry.
    pub fn remaining_ttl_ms(&self) -> Option<u64> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()).as_millis() as u64)
    }
}

/// One shard of the keyspace, guarded by its own async mutex so writers to
/// different shards never contend.
#[derive(Debug, Default)]
pub struct StoreShard {
    pub entries: Mutex<HashMap<Bytes, StoredValue>>,
}

impl StoreShard {
    pub fn new() -> Self {
        Self::default()
    }
}
