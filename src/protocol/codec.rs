//! Protocol codec
//!
//! Encoding and decoding functions for the RESP2 wire protocol.
//!
//! ### Request (Command) Format
//! ```text
//! ┌──────────┬──────────────────────┬──────────────────────┐
//! │ *<argc>  │ $<len> <arg 0>       │ $<len> <arg n>  ...  │
//! └──────────┴──────────────────────┴──────────────────────┘
//! ```
//! Every line ends with `\r\n`.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{Command, Reply};
use crate::error::{CacheError, Result};

/// Maximum bulk string size (512 MB, the Redis limit)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

const CRLF: &[u8] = b"\r\n";

// =============================================================================
// Command Encoding
// =============================================================================

/// Encode a command as an array of bulk strings
pub fn encode_command(command: &Command) -> Vec<u8> {
    let args = command.to_args();
    let payload_len: usize = args.iter().map(|a| a.len() + 16).sum();

    let mut message = Vec::with_capacity(16 + payload_len);
    message.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in &args {
        write_bulk(&mut message, arg);
    }
    message
}

fn write_bulk(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(format!("${}\r\n", bytes.len()).as_bytes());
    out.extend_from_slice(bytes);
    out.extend_from_slice(CRLF);
}

// =============================================================================
// Reply Encoding/Decoding
// =============================================================================

/// Encode a reply (used by test servers and tooling)
pub fn encode_reply(reply: &Reply) -> Vec<u8> {
    let mut out = Vec::new();
    write_reply(&mut out, reply);
    out
}

fn write_reply(out: &mut Vec<u8>, reply: &Reply) {
    match reply {
        Reply::Status(s) => out.extend_from_slice(format!("+{}\r\n", s).as_bytes()),
        Reply::Error(e) => out.extend_from_slice(format!("-{}\r\n", e).as_bytes()),
        Reply::Integer(n) => out.extend_from_slice(format!(":{}\r\n", n).as_bytes()),
        Reply::Nil => out.extend_from_slice(b"$-1\r\n"),
        Reply::Bulk(bytes) => write_bulk(out, bytes),
        Reply::Array(items) => {
            out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
            for item in items {
                write_reply(out, item);
            }
        }
    }
}

/// Decode one reply from the front of `bytes`
///
/// Returns the reply and the number of bytes consumed, or `None` when
/// more input is needed.
pub fn decode_reply(bytes: &[u8]) -> Result<Option<(Reply, usize)>> {
    decode_at(bytes, 0)
}

fn decode_at(bytes: &[u8], pos: usize) -> Result<Option<(Reply, usize)>> {
    if pos >= bytes.len() {
        return Ok(None);
    }

    let line_end = match find_crlf(bytes, pos + 1) {
        Some(end) => end,
        None => return Ok(None),
    };
    let line = &bytes[pos + 1..line_end];
    let next = line_end + CRLF.len();

    match bytes[pos] {
        b'+' => Ok(Some((Reply::Status(text(line)), next))),
        b'-' => Ok(Some((Reply::Error(text(line)), next))),
        b':' => Ok(Some((Reply::Integer(parse_int(line)?), next))),
        b'$' => {
            let len = parse_int(line)?;
            if len < 0 {
                return Ok(Some((Reply::Nil, next)));
            }
            let len = len as usize;
            if len > MAX_BULK_SIZE {
                return Err(CacheError::Protocol(format!(
                    "Bulk string too large: {} bytes (max {})",
                    len, MAX_BULK_SIZE
                )));
            }

            let end = next + len;
            if bytes.len() < end + CRLF.len() {
                return Ok(None);
            }
            if &bytes[end..end + CRLF.len()] != CRLF {
                return Err(CacheError::Protocol(
                    "Bulk string not terminated by CRLF".to_string(),
                ));
            }
            Ok(Some((Reply::Bulk(bytes[next..end].to_vec()), end + CRLF.len())))
        }
        b'*' => {
            let count = parse_int(line)?;
            if count < 0 {
                return Ok(Some((Reply::Nil, next)));
            }

            let mut items = Vec::with_capacity((count as usize).min(1024));
            let mut cursor = next;
            for _ in 0..count {
                match decode_at(bytes, cursor)? {
                    Some((item, after)) => {
                        items.push(item);
                        cursor = after;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((Reply::Array(items), cursor)))
        }
        other => Err(CacheError::Protocol(format!(
            "Unknown reply type: 0x{:02x}",
            other
        ))),
    }
}

fn find_crlf(bytes: &[u8], from: usize) -> Option<usize> {
    if from >= bytes.len() {
        return None;
    }
    bytes[from..]
        .windows(CRLF.len())
        .position(|w| w == CRLF)
        .map(|i| from + i)
}

fn text(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}

fn parse_int(line: &[u8]) -> Result<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| CacheError::Protocol(format!("Invalid integer: {:?}", text(line))))
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one complete reply from a stream
///
/// Bytes after the reply stay in `buf` for the next call.
pub async fn read_reply<R>(reader: &mut R, buf: &mut BytesMut) -> Result<Reply>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some((reply, used)) = decode_reply(buf)? {
            buf.advance(used);
            return Ok(reply);
        }

        let read = reader
            .read_buf(buf)
            .await
            .map_err(|e| CacheError::Connectivity(format!("read failed: {}", e)))?;
        if read == 0 {
            return Err(CacheError::Connectivity(
                "connection closed by store".to_string(),
            ));
        }
    }
}

/// Read one command (an array of bulk strings) from a stream
///
/// Returns `None` when the peer closes the connection between commands.
pub async fn read_command<R>(reader: &mut R, buf: &mut BytesMut) -> Result<Option<Command>>
where
    R: AsyncRead + Unpin,
{
    let reply = match read_reply(reader, buf).await {
        Ok(reply) => reply,
        Err(CacheError::Connectivity(_)) if buf.is_empty() => return Ok(None),
        Err(e) => return Err(e),
    };

    let args = match reply {
        Reply::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Reply::Bulk(bytes) => Ok(bytes),
                other => Err(CacheError::Protocol(format!(
                    "Command argument is not a bulk string: {:?}",
                    other
                ))),
            })
            .collect::<Result<Vec<_>>>()?,
        other => {
            return Err(CacheError::Protocol(format!(
                "Command is not an array: {:?}",
                other
            )))
        }
    };

    Command::from_args(args).map(Some)
}
