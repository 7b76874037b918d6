//! Envelope definitions
//!
//! The on-wire record for one packed value.

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// How an envelope's payload is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    /// Serialized bytes as-is
    Plain,

    /// zstd frame of the serialized bytes
    Compressed,
}

/// A tagged, packed value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub encoding: Encoding,
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Serialize to the bytes stored in (or split across) physical records
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| CacheError::Encode(format!("envelope: {}", e)))
    }

    /// Parse bytes produced by [`Envelope::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| CacheError::decode("envelope", e))
    }

    pub fn is_compressed(&self) -> bool {
        self.encoding == Encoding::Compressed
    }
}
