//! Deterministic partition selection.
//!
//! The hash partitioner reproduces the murmur2-based assignment used by the
//! broker ecosystem's own client libraries bit for bit, so that records keyed
//! with the same bytes land on the same partition regardless of which client
//! produced them.

use crate::{Error, Result};
use std::collections::HashMap;

/// Sentinel meaning "any partition"; the broker picks one.
pub const PARTITION_ANY: i32 = -1;

/// Immutable snapshot of partition counts per topic, fetched once at
/// producer construction. Not refreshed on broker rebalancing.
pub type TopicPartitionMap = HashMap<String, i32>;

const SEED: u32 = 0x9747_b28c;
const M: u32 = 0x5bd1_e995;
const R: u32 = 24;

/// 32-bit murmur2 over the key bytes, matching the reference client:
/// 4-byte little-endian chunks, tail-byte mix, final 13/15 shift-xor rounds.
pub fn murmur2(data: &[u8]) -> u32 {
    let len = data.len();
    let mut h: u32 = SEED ^ (len as u32);

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if tail.len() == 3 {
        h ^= (tail[2] as u32) << 16;
    }
    if tail.len() >= 2 {
        h ^= (tail[1] as u32) << 8;
    }
    if !tail.is_empty() {
        h ^= tail[0] as u32;
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h
}

/// Murmur2 with the sign bit masked off, the non-negative form used for
/// partition assignment.
pub fn murmur2_positive(data: &[u8]) -> i32 {
    (murmur2(data) & 0x7fff_ffff) as i32
}

/// Maps a record's key bytes to a partition for a topic.
#[derive(Debug, Clone)]
pub enum Partitioner {
    /// `murmur2_positive(key) % partition_count[topic]`. Built without a
    /// partition map it degrades to the unconstrained behavior.
    Hash(Option<TopicPartitionMap>),
    /// Always [`PARTITION_ANY`]; used when ordering-by-key is not required.
    Unconstrained,
}

impl Partitioner {
    pub fn hash(partitions: Option<TopicPartitionMap>) -> Self {
        Partitioner::Hash(partitions)
    }

    pub fn unconstrained() -> Self {
        Partitioner::Unconstrained
    }

    pub fn partition(&self, topic: &str, key_bytes: &[u8]) -> Result<i32> {
        match self {
            Partitioner::Unconstrained | Partitioner::Hash(None) => Ok(PARTITION_ANY),
            Partitioner::Hash(Some(partitions)) => {
                let count = partitions
                    .get(topic)
                    .copied()
                    .ok_or_else(|| Error::UnknownTopic(topic.to_string()))?;
                if count <= 0 {
                    return Err(Error::UnknownTopic(topic.to_string()));
                }
                Ok(murmur2_positive(key_bytes) % count)
            }
        }
    }
}
