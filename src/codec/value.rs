//! Value packing
//!
//! Serialize, stamp and (above the threshold) compress a value.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{Encoding, Envelope};
use crate::error::{CacheError, Result};

/// A value together with the time it was written
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Stamped<T> {
    pub value: T,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct StampedRef<'a, T: ?Sized> {
    value: &'a T,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
}

/// Packs values into envelopes
#[derive(Debug, Clone)]
pub struct ValueCodec {
    compress_threshold: usize,
    compression_level: i32,
}

impl ValueCodec {
    pub fn new(compress_threshold: usize, compression_level: i32) -> Self {
        Self {
            compress_threshold,
            compression_level,
        }
    }

    pub fn compress_threshold(&self) -> usize {
        self.compress_threshold
    }

    /// Pack a value stamped with the current time
    pub fn pack<T: Serialize + ?Sized>(&self, value: &T) -> Result<Envelope> {
        self.pack_at(value, Utc::now())
    }

    /// Pack a value with an explicit timestamp
    ///
    /// Compression is only attempted when the serialized form is longer
    /// than the threshold.
    pub fn pack_at<T: Serialize + ?Sized>(
        &self,
        value: &T,
        timestamp: DateTime<Utc>,
    ) -> Result<Envelope> {
        let serialized = serde_json::to_vec(&StampedRef { value, timestamp })
            .map_err(|e| CacheError::Encode(format!("value: {}", e)))?;

        if serialized.len() <= self.compress_threshold {
            return Ok(Envelope {
                encoding: Encoding::Plain,
                payload: serialized,
            });
        }

        let compressed = zstd::encode_all(serialized.as_slice(), self.compression_level)
            .map_err(|e| CacheError::Encode(format!("compression: {}", e)))?;

        tracing::trace!(
            "Compressed value from {} to {} bytes",
            serialized.len(),
            compressed.len()
        );

        Ok(Envelope {
            encoding: Encoding::Compressed,
            payload: compressed,
        })
    }

    /// Inverse of [`ValueCodec::pack`]
    pub fn unpack<T: DeserializeOwned>(&self, envelope: &Envelope) -> Result<Stamped<T>> {
        let serialized = match envelope.encoding {
            Encoding::Plain => std::borrow::Cow::Borrowed(envelope.payload.as_slice()),
            Encoding::Compressed => std::borrow::Cow::Owned(
                zstd::decode_all(envelope.payload.as_slice())
                    .map_err(|e| CacheError::decode("compressed payload", e))?,
            ),
        };

        serde_json::from_slice(&serialized).map_err(|e| CacheError::decode("value", e))
    }
}
