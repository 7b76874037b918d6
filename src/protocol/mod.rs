//! Protocol Module
//!
//! Commands sent to the remote store and the replies it returns, plus the
//! RESP2 wire codec used by [`crate::store::RespStore`].
//!
//! ## Request Format
//! ```text
//! *<argc>\r\n  $<len>\r\n<arg>\r\n  ...
//! ```
//!
//! ## Reply Types
//! - `+` status line
//! - `-` error line
//! - `:` integer
//! - `$` bulk string (`$-1` is nil)
//! - `*` array (`*-1` is nil)

mod command;
mod reply;
mod codec;

pub use command::{Command, Expiry};
pub use reply::Reply;
pub use codec::{
    decode_reply, encode_command, encode_reply, read_command, read_reply, MAX_BULK_SIZE,
};
