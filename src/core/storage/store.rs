// src/core/storage/store.rs

use super::shard::{NUM_SHARDS, StoreShard, StoredValue};
use crate::core::ZirconError;
use crate::core::cluster::slot::get_slot;
use bytes::Bytes;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wildmatch::WildMatch;

/// `Store` is the process-wide keyspace, composed of multiple `StoreShard`s.
#[derive(Debug)]
pub struct Store {
    shards: Vec<Arc<StoreShard>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Arc::new(StoreShard::new())).collect();
        Self { shards }
    }

    /// Calculates the shard index for a given key using hashing.
    fn shard_index(&self, key: &Bytes) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }

    /// Returns the value for a key, treating an expired entry as absent.
    pub async fn get(&self, key: &Bytes) -> Option<Bytes> {
        let mut guard = self.shards[self.shard_index(key)].entries.lock().await;
        match guard.get(key) {
            Some(v) if v.is_expired() => {
                guard.remove(key);
                None
            }
            Some(v) => Some(v.data.clone()),
            None => None,
        }
    }

    /// Stores a value, overwriting any previous entry for the key.
    pub async fn set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) {
        let stored = match ttl {
            Some(ttl) => StoredValue::with_expiry(value, Instant::now() + ttl),
            None => StoredValue::new(value),
        };
        let mut guard = self.shards[self.shard_index(&key)].entries.lock().await;
        guard.insert(key, stored);
    }

    /// Deletes the given keys, returning how many were actually removed.
    pub async fn delete(&self, keys: &[Bytes]) -> usize {
        let mut removed = 0;
        for key in keys {
            let mut guard = self.shards[self.shard_index(key)].entries.lock().await;
            if guard.remove(key).is_some() {
                removed += 1;
            }
        }
        removed
    }

    pub async fn exists(&self, key: &Bytes) -> bool {
        let guard = self.shards[self.shard_index(key)].entries.lock().await;
        guard.get(key).is_some_and(|v| !v.is_expired())
    }

    /// Returns the total number of live keys.
    pub async fn key_count(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            let guard = shard.entries.lock().await;
            total += guard.values().filter(|v| !v.is_expired()).count();
        }
        total
    }

    /// Returns all keys matching a glob-style pattern.
    pub async fn keys_matching(&self, pattern: &str) -> Vec<Bytes> {
        let matcher = WildMatch::new(pattern);
        let mut keys = Vec::new();
        for shard in &self.shards {
            let guard = shard.entries.lock().await;
            for (key, value) in guard.iter() {
                if !value.is_expired() && matcher.matches(&String::from_utf8_lossy(key)) {
                    keys.push(key.clone());
                }
            }
        }
        keys
    }

    /// Returns up to `count` keys whose hash slot equals `slot`.
    /// This is the key-iteration interface the slot migrator transfers from.
    pub async fn keys_in_slot(&self, slot: u16, count: usize) -> Vec<Bytes> {
        let mut keys = Vec::new();
        for shard in &self.shards {
            let guard = shard.entries.lock().await;
            for (key, value) in guard.iter() {
                if keys.len() >= count {
                    return keys;
                }
                if !value.is_expired() && get_slot(key) == slot {
                    keys.push(key.clone());
                }
            }
        }
        keys
    }

    /// Counts the live keys in a given hash slot.
    pub async fn count_keys_in_slot(&self, slot: u16) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            let guard = shard.entries.lock().await;
            total += guard
                .iter()
                .filter(|(k, v)| !v.is_expired() && get_slot(k) == slot)
                .count();
        }
        total
    }

    /// Serializes a key's value for transfer, returning the payload and the
    /// remaining TTL in milliseconds (0 for persistent keys).
    pub async fn dump(&self, key: &Bytes) -> Option<(Bytes, u64)> {
        let guard = self.shards[self.shard_index(key)].entries.lock().await;
        let value = guard.get(key).filter(|v| !v.is_expired())?;
        Some((value.data.clone(), value.remaining_ttl_ms().unwrap_or(0)))
    }

    /// Applies a serialized value received from another node.
    ///
    /// The apply is idempotent by key with overwrite semantics when `replace`
    /// is set, which is what makes the migrator's at-least-once transfer safe.
    pub async fn restore(
        &self,
        key: Bytes,
        payload: Bytes,
        ttl_ms: u64,
        replace: bool,
    ) -> Result<(), ZirconError> {
        let mut guard = self.shards[self.shard_index(&key)].entries.lock().await;
        if !replace && guard.get(&key).is_some_and(|v| !v.is_expired()) {
            return Err(ZirconError::InvalidState(
                "BUSYKEY Target key name already exists".to_string(),
            ));
        }
        let stored = if ttl_ms > 0 {
            StoredValue::with_expiry(payload, Instant::now() + Duration::from_millis(ttl_ms))
        } else {
            StoredValue::new(payload)
        };
        guard.insert(key, stored);
        Ok(())
    }
}
