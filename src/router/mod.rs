//! Router Module
//!
//! The proxy surface callers use in place of a store client.
//!
//! ## Command Roles
//! - **write**: hash key, pack (and chunk) value, apply default expiry
//! - **read**: hash key, fetch (following chunks), unpack; misses never error
//! - **delete**: hash key, discover chunks, delete head and fragments
//! - **passthrough**: forward, hashing the key argument when configured
//!
//! Roles are resolved from a table built once from [`crate::CacheConfig`].

mod proxy;
mod table;

pub use proxy::{CacheProxy, CacheRecord, ProxyReply, Unpacked};
pub use table::{CommandRole, CommandTable, Route};
