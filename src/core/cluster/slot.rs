// src/core/cluster/slot.rs

//! Implements the cluster hash slot algorithm.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// The total number of hash slots in the cluster.
pub const NUM_SLOTS: usize = 16384;

/// The CRC16 algorithm used for calculating hash slots.
const CRC16_ALGO: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_USB);

/// An inclusive range of hash slots, used for bulk assignment commands.
/// Ownership is always tracked per individual slot internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16,
}

impl SlotRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + use<> {
        self.start..=self.end
    }
}

/// Calculates the hash slot for a given key.
///
/// If the key contains a non-empty "hash tag" (a substring enclosed in
/// `{...}`), only the tag content is hashed, which lets clients force related
/// keys into the same slot. Otherwise the entire key is hashed.
///
/// The final slot is `CRC16(key) % NUM_SLOTS`.
pub fn get_slot(key: &Bytes) -> u16 {
    if let Some(start) = key.iter().position(|&b| b == b'{')
        && let Some(end_offset) = key[start + 1..].iter().position(|&b| b == b'}')
    {
        let end = start + 1 + end_offset;
        // An empty tag ("{}") falls through to whole-key hashing.
        if end > start + 1 {
            return CRC16_ALGO.checksum(&key[start + 1..end]) % (NUM_SLOTS as u16);
        }
    }
    CRC16_ALGO.checksum(key) % (NUM_SLOTS as u16)
}
