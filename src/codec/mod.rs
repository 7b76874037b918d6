//! Codec Module
//!
//! Packs values into tagged envelopes and back.
//!
//! ## Envelope Format (bincode)
//! ```text
//! ┌──────────────┬──────────────────────────────────────────┐
//! │ Encoding (4) │ Payload (len-prefixed bytes)             │
//! └──────────────┴──────────────────────────────────────────┘
//! ```
//!
//! The payload is the JSON form of `{ "value": .., "timestamp": millis }`,
//! zstd-compressed when it is longer than the configured threshold.

mod envelope;
mod value;

pub use envelope::{Encoding, Envelope};
pub use value::{Stamped, ValueCodec};
