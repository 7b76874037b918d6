//! Store Module
//!
//! The contract this crate consumes from a remote key-value store, and
//! two implementations of it.
//!
//! ## Implementations
//! - [`RespStore`]: TCP client for Redis-compatible servers
//! - [`MemoryStore`]: in-process store with the same command semantics,
//!   used for tests and local runs
//!
//! Pipelines are sent as one round trip and are not transactional: a
//! failing item leaves the items before it applied.

mod memory;
mod resp;

pub use memory::MemoryStore;
pub use resp::RespStore;

use async_trait::async_trait;

use crate::error::{CacheError, Result};
use crate::protocol::{Command, Expiry, Reply};

/// Outcome of one pipelined command: the reply, or the store's error line
pub type ItemResult = std::result::Result<Reply, String>;

/// A remote key-value store
///
/// `execute` and `pipeline` fail only for connection-level problems;
/// command-level errors come back as [`Reply::Error`] or as an `Err`
/// item inside the pipeline result.
#[async_trait]
pub trait Store: Send + Sync {
    /// Run one command
    async fn execute(&self, command: Command) -> Result<Reply>;

    /// Run many commands in one round trip, replies in issue order
    async fn pipeline(&self, commands: Vec<Command>) -> Result<Vec<ItemResult>>;

    /// Fetch a raw value
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let reply = self
            .execute(Command::Get {
                key: key.to_string(),
            })
            .await?;
        match reply {
            Reply::Bulk(bytes) => Ok(Some(bytes)),
            Reply::Nil => Ok(None),
            Reply::Error(e) => Err(CacheError::Store(e)),
            other => Err(CacheError::Protocol(format!(
                "GET returned unexpected reply: {:?}",
                other
            ))),
        }
    }

    /// Store a raw value, returning the native acknowledgement
    async fn set(&self, key: &str, value: Vec<u8>, expiry: Option<Expiry>) -> Result<Reply> {
        let reply = self
            .execute(Command::Set {
                key: key.to_string(),
                value,
                expiry,
            })
            .await?;
        reply.into_result().map_err(CacheError::Store)
    }

    /// Delete keys, returning how many existed
    async fn del(&self, keys: Vec<String>) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        match self.execute(Command::Del { keys }).await? {
            Reply::Integer(n) => Ok(n.max(0) as u64),
            Reply::Error(e) => Err(CacheError::Store(e)),
            other => Err(CacheError::Protocol(format!(
                "DEL returned unexpected reply: {:?}",
                other
            ))),
        }
    }
}

/// Queues commands for one pipelined round trip
pub struct Pipeline<'a> {
    store: &'a dyn Store,
    commands: Vec<Command>,
}

impl<'a> Pipeline<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            commands: Vec::new(),
        }
    }

    /// Queue a GET
    pub fn get(&mut self, key: impl Into<String>) -> &mut Self {
        self.commands.push(Command::Get { key: key.into() });
        self
    }

    /// Queue a SET
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: Vec<u8>,
        expiry: Option<Expiry>,
    ) -> &mut Self {
        self.commands.push(Command::Set {
            key: key.into(),
            value,
            expiry,
        });
        self
    }

    /// Queue a DEL
    pub fn del(&mut self, keys: Vec<String>) -> &mut Self {
        self.commands.push(Command::Del { keys });
        self
    }

    /// Queue any command
    pub fn push(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Send the queued commands; an empty pipeline makes no round trip
    pub async fn exec(self) -> Result<Vec<ItemResult>> {
        if self.commands.is_empty() {
            return Ok(Vec::new());
        }
        self.store.pipeline(self.commands).await
    }
}
