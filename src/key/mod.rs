//! Key Module
//!
//! Turns logical key descriptors into deterministic physical keys.
//!
//! ## Key Layout
//! ```text
//! <prefix>:<sha256(canonical(descriptor)) as hex>       head / single record
//! <prefix>:<sha256(canonical(descriptor)) as hex>#<i>   fragment i of a chunk set
//! ```
//!
//! The digest is the full 256-bit SHA-256, so collisions between
//! distinct descriptors are negligible.

mod descriptor;
mod hasher;

pub use descriptor::KeyDescriptor;
pub use hasher::{hash_with_prefix, HashedKey, KeyHasher};
