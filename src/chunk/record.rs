//! Physical record definitions

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// What a hashed key holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    /// The whole packed value
    Single(Vec<u8>),

    /// Directory of a chunk set
    Head(ChunkHead),
}

/// Describes the fragments of a chunked value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkHead {
    /// Number of fragment keys `#0 .. #(chunk_count - 1)`
    pub chunk_count: u32,

    /// Length of the joined fragments
    pub total_len: u64,

    /// CRC32 of the joined fragments
    pub checksum: u32,
}

impl ChunkHead {
    /// Describe `bytes` split into `chunk_count` fragments
    pub fn describe(bytes: &[u8], chunk_count: usize) -> Self {
        Self {
            chunk_count: chunk_count as u32,
            total_len: bytes.len() as u64,
            checksum: crc32fast::hash(bytes),
        }
    }

    pub fn count(&self) -> usize {
        self.chunk_count as usize
    }
}

impl Record {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| CacheError::Encode(format!("record: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| CacheError::decode("record", e))
    }

    /// Encoded size of a single record holding `payload_len` bytes
    pub fn single_len(payload_len: usize) -> usize {
        // variant tag (u32) + length prefix (u64)
        4 + 8 + payload_len
    }
}
