//! Error types for cacheproxy
//!
//! Provides a unified error type for all operations.
//!
//! Read paths downgrade [`CacheError::Decode`],
//! [`CacheError::ChunkIntegrity`] and per-key [`CacheError::Store`] errors
//! to misses; everything else reaching a caller is fatal for that call.

use thiserror::Error;

/// Result type alias using CacheError
pub type Result<T> = std::result::Result<T, CacheError>;

/// Unified error type for cacheproxy operations
#[derive(Debug, Error)]
pub enum CacheError {
    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("Store connectivity error: {0}")]
    Connectivity(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Store rejected command: {0}")]
    Store(String),

    // -------------------------------------------------------------------------
    // Value Errors
    // -------------------------------------------------------------------------
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Chunk integrity error for {key}: expected {expected} fragments, found {found}")]
    ChunkIntegrity {
        key: String,
        expected: usize,
        found: usize,
    },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // -------------------------------------------------------------------------
    // Command Errors
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl CacheError {
    /// Errors a read path reports as "not found"
    pub fn is_soft_miss(&self) -> bool {
        matches!(
            self,
            Self::Decode(_) | Self::ChunkIntegrity { .. } | Self::Store(_)
        )
    }

    /// Errors caused by the store being unreachable
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_) | Self::Io(_))
    }

    pub(crate) fn decode(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Decode(format!("{}: {}", context, err))
    }
}
