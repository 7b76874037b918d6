//! Reply definitions
//!
//! Represents replies from the store.

/// A reply from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Simple status line such as `OK` or `PONG`
    Status(String),

    /// Absent value
    Nil,

    Integer(i64),

    /// Binary-safe payload
    Bulk(Vec<u8>),

    Array(Vec<Reply>),

    /// Error line reported by the store for this command
    Error(String),
}

impl Reply {
    /// The `OK` acknowledgement
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Status(s) if s == "OK")
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Payload of a bulk reply, `None` for nil or any other shape
    pub fn into_bulk(self) -> Option<Vec<u8>> {
        match self {
            Reply::Bulk(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Split an error reply from a successful one
    pub fn into_result(self) -> std::result::Result<Reply, String> {
        match self {
            Reply::Error(message) => Err(message),
            other => Ok(other),
        }
    }
}
