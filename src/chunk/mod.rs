//! Chunk Module
//!
//! Splits records too large for one physical value across several keys
//! and puts them back together.
//!
//! ## Physical Layout
//! ```text
//! <hashed key>      Record::Single(bytes)                       small value
//! <hashed key>      Record::Head { count, total_len, crc32 }     chunked value
//! <hashed key>#0    raw bytes [0, max_chunk)
//! <hashed key>#1    raw bytes [max_chunk, 2 * max_chunk)
//! ...
//! ```
//!
//! A chunk set is only valid when every fragment is present and the
//! joined bytes match the head's length and checksum. Anything else reads
//! as a miss.
//!
//! ## Concurrency
//! Deletes (and overwrites of chunked keys) read the head before removing
//! fragments. A concurrent writer of the same key between those two steps
//! can orphan fragments or lose its own; callers that mutate one chunked
//! key from several tasks must serialize those writes themselves.

mod manager;
mod record;

pub use manager::{assemble, ChunkManager};
pub use record::{ChunkHead, Record};
