//! # cacheproxy
//!
//! A transparent caching layer in front of a Redis-compatible store:
//! - Structured keys hashed into fixed-length physical keys
//! - Values stamped with their write time and compressed above a threshold
//! - Oversized values split across fragment keys and joined on read
//! - Default expiry applied to every write
//! - Pipelined batch reads with per-item failure isolation
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              CacheProxy / BatchReader / CachePolicy          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   Command Table                              │
//! │           (write / read / delete / passthrough)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┼────────────┐
//!          │            │            │
//!          ▼            ▼            ▼
//!   ┌───────────┐ ┌───────────┐ ┌───────────┐
//!   │ KeyHasher │ │ValueCodec │ │  Chunk    │
//!   │ (SHA-256) │ │  (zstd)   │ │  Manager  │
//!   └───────────┘ └───────────┘ └─────┬─────┘
//!                                     │
//!                                     ▼
//!                           ┌───────────────────┐
//!                           │       Store       │
//!                           │ (RESP / in-memory)│
//!                           └───────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use cacheproxy::{CacheConfig, CacheProxy, KeyDescriptor, Profile};
//! use serde_json::json;
//!
//! # async fn run() -> cacheproxy::Result<()> {
//! let proxy = CacheProxy::connect(CacheConfig::for_profile(Profile::Production)).await?;
//!
//! let key = KeyDescriptor::fields([("url", json!("https://example.com")), ("page", json!(2))]);
//! proxy.set(key.clone(), &json!({"title": "Example"})).await?;
//!
//! if let Some(record) = proxy.get::<serde_json::Value>(key).await? {
//!     println!("cached {} ago: {}", record.age(), record.value);
//! }
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod key;
pub mod codec;
pub mod chunk;
pub mod protocol;
pub mod store;
pub mod router;
pub mod batch;
pub mod policy;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CacheError, Result};
pub use config::{CacheConfig, ConnectionConfig, Profile};
pub use key::{HashedKey, KeyDescriptor, KeyHasher};
pub use protocol::{Expiry, Reply};
pub use store::{MemoryStore, RespStore, Store};
pub use router::{CacheProxy, CacheRecord, CommandRole, ProxyReply};
pub use batch::{multi_get, BatchReader, BatchResult};
pub use policy::{CachePolicy, Fetched};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of cacheproxy
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
