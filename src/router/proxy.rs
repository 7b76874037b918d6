//! Cache Proxy
//!
//! Presents a store's command surface with hashed keys, packed values,
//! chunking and a default expiry applied transparently.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::{CommandRole, CommandTable};
use crate::chunk::{ChunkHead, ChunkManager, Record};
use crate::codec::{Envelope, Stamped, ValueCodec};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::key::{HashedKey, KeyDescriptor, KeyHasher};
use crate::protocol::{Command, Expiry, Reply};
use crate::store::{Pipeline, RespStore, Store};

/// A value read back from the cache
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord<T> {
    pub value: T,

    /// When the value was written
    pub timestamp: DateTime<Utc>,

    /// Physical key the value lives under
    pub hashed_key: HashedKey,
}

impl<T> CacheRecord<T> {
    /// Time elapsed since the value was written
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.timestamp
    }
}

/// Result of unpacking one raw record
#[derive(Debug, Clone, PartialEq)]
pub enum Unpacked<T> {
    Value(CacheRecord<T>),

    /// The record heads a chunk set; fragments must be fetched
    Chunked(ChunkHead),
}

/// Reply to a dynamically routed call
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyReply {
    /// Store acknowledgement of a write
    Ack(Reply),

    /// Outcome of a read (`None` is a miss)
    Record(Option<CacheRecord<Value>>),

    /// Physical records removed by a delete
    Deleted(u64),

    /// Reply to a forwarded command
    Forwarded(Reply),
}

/// Transparent caching proxy in front of a [`Store`]
pub struct CacheProxy {
    store: Arc<dyn Store>,
    config: CacheConfig,
    hasher: KeyHasher,
    codec: ValueCodec,
    chunks: ChunkManager,
    table: CommandTable,
}

impl CacheProxy {
    /// Wrap a store; fails with a configuration error before any I/O
    pub fn new(store: Arc<dyn Store>, config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let table = CommandTable::from_config(&config);

        Ok(Self {
            store,
            hasher: KeyHasher::new(config.prefix.clone()),
            codec: ValueCodec::new(config.compress_threshold, config.compression_level),
            chunks: ChunkManager::new(config.max_chunk),
            table,
            config,
        })
    }

    /// Connect to the configured Redis-compatible store
    pub async fn connect(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let store = RespStore::connect(&config.connection).await?;
        Self::new(Arc::new(store), config)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    pub fn codec(&self) -> &ValueCodec {
        &self.codec
    }

    pub fn chunks(&self) -> &ChunkManager {
        &self.chunks
    }

    /// The physical key this proxy uses for `key`
    pub fn hash_key(&self, key: &KeyDescriptor) -> HashedKey {
        self.hasher.hash(key)
    }

    /// Pack a value into envelope bytes (the payload a write stores or chunks)
    pub fn pack<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        self.codec.pack(value)?.to_bytes()
    }

    /// Unpack a raw record read from `hashed_key`
    pub fn unpack<T: DeserializeOwned>(
        &self,
        hashed_key: &HashedKey,
        raw: &[u8],
    ) -> Result<Unpacked<T>> {
        match Record::from_bytes(raw)? {
            Record::Single(payload) => self
                .decode_payload(hashed_key, &payload)
                .map(Unpacked::Value),
            Record::Head(head) => Ok(Unpacked::Chunked(head)),
        }
    }

    /// Decode envelope bytes (single record payload or joined fragments)
    pub fn decode_payload<T: DeserializeOwned>(
        &self,
        hashed_key: &HashedKey,
        payload: &[u8],
    ) -> Result<CacheRecord<T>> {
        let envelope = Envelope::from_bytes(payload)?;
        let Stamped { value, timestamp } = self.codec.unpack(&envelope)?;
        Ok(CacheRecord {
            value,
            timestamp,
            hashed_key: hashed_key.clone(),
        })
    }

    /// Start a raw pipeline against the underlying store
    ///
    /// Keys are not hashed; use [`CacheProxy::hash_key`] to build them.
    pub fn multi(&self) -> Pipeline<'_> {
        Pipeline::new(self.store.as_ref())
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Store a value with the default expiry
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: impl Into<KeyDescriptor>,
        value: &T,
    ) -> Result<Reply> {
        self.set_with(key, value, None).await
    }

    /// Store a value; an explicit expiry replaces the default one
    pub async fn set_with<T: Serialize + ?Sized>(
        &self,
        key: impl Into<KeyDescriptor>,
        value: &T,
        expiry: Option<Expiry>,
    ) -> Result<Reply> {
        let hashed = self.hash_key(&key.into());
        let payload = self.pack(value)?;
        let expiry = expiry.or_else(|| self.default_expiry());

        tracing::debug!("write {} ({} bytes, expiry {:?})", hashed, payload.len(), expiry);
        self.chunks
            .write(self.store.as_ref(), &hashed, &payload, expiry)
            .await
    }

    /// Expiry applied when the caller gives none (an expiration of 0
    /// means none)
    pub fn default_expiry(&self) -> Option<Expiry> {
        self.config
            .expiration
            .filter(|secs| *secs > 0)
            .map(Expiry::Ex)
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Fetch a value; absent, corrupt or torn entries are `None`
    ///
    /// Only connection-level failures are returned as errors.
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: impl Into<KeyDescriptor>,
    ) -> Result<Option<CacheRecord<T>>> {
        let hashed = self.hash_key(&key.into());

        let result = match self.chunks.read(self.store.as_ref(), &hashed).await {
            Ok(Some(payload)) => self.decode_payload(&hashed, &payload).map(Some),
            other => other.map(|_| None),
        };

        let record = soft_miss(&hashed, result)?;
        tracing::debug!(
            "read {} ({})",
            hashed,
            if record.is_some() { "hit" } else { "miss" }
        );
        Ok(record)
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Delete a value and all of its fragments
    ///
    /// Returns the number of physical records removed: 1 for a single
    /// record, `1 + n` for a chunk set of `n` fragments, 0 if absent.
    pub async fn del(&self, key: impl Into<KeyDescriptor>) -> Result<u64> {
        let hashed = self.hash_key(&key.into());
        let removed = self.chunks.delete(self.store.as_ref(), &hashed).await?;
        tracing::debug!("delete {} removed {} records", hashed, removed);
        Ok(removed)
    }

    // =========================================================================
    // Passthrough
    // =========================================================================

    /// Forward a command, hashing its key when the table says so
    pub async fn forward(
        &self,
        name: &str,
        key: &KeyDescriptor,
        mut args: Vec<Vec<u8>>,
    ) -> Result<Reply> {
        let route = self.table.route(name);
        let physical = if route.hash_key {
            self.hash_key(key).into_string()
        } else {
            key.to_string()
        };
        args.insert(0, physical.into_bytes());

        self.store
            .execute(Command::Raw {
                name: name.to_ascii_uppercase(),
                args,
            })
            .await
    }

    pub async fn exists(&self, key: impl Into<KeyDescriptor>) -> Result<bool> {
        let reply = self.forward("exists", &key.into(), Vec::new()).await?;
        integer_reply("EXISTS", reply).map(|n| n > 0)
    }

    /// Run an expiry command on the stored value and all of its fragments
    ///
    /// Falls back to a plain forward when the command's key is not hashed.
    pub async fn retime(
        &self,
        name: &str,
        key: &KeyDescriptor,
        args: Vec<Vec<u8>>,
    ) -> Result<Reply> {
        if !self.table.route(name).hash_key {
            return self.forward(name, key, args).await;
        }
        let hashed = self.hash_key(key);
        self.chunks
            .retime(self.store.as_ref(), &hashed, name, args)
            .await
    }

    /// Set a relative expiry on a value, fragments included
    pub async fn expire(&self, key: impl Into<KeyDescriptor>, secs: u64) -> Result<bool> {
        let args = vec![secs.to_string().into_bytes()];
        let reply = self.retime("expire", &key.into(), args).await?;
        integer_reply("EXPIRE", reply).map(|n| n == 1)
    }

    /// Remaining time-to-live in seconds (-1 no expiry, -2 absent)
    pub async fn ttl(&self, key: impl Into<KeyDescriptor>) -> Result<i64> {
        let reply = self.forward("ttl", &key.into(), Vec::new()).await?;
        integer_reply("TTL", reply)
    }

    pub async fn persist(&self, key: impl Into<KeyDescriptor>) -> Result<bool> {
        let reply = self.retime("persist", &key.into(), Vec::new()).await?;
        integer_reply("PERSIST", reply).map(|n| n == 1)
    }

    /// Absolute expiry as unix seconds (-1 no expiry, -2 absent)
    pub async fn expire_time(&self, key: impl Into<KeyDescriptor>) -> Result<i64> {
        let reply = self.forward("expiretime", &key.into(), Vec::new()).await?;
        integer_reply("EXPIRETIME", reply)
    }

    // =========================================================================
    // Dynamic Dispatch
    // =========================================================================

    /// Run a command by name, routed by its role
    ///
    /// For the write role `args[0]` is the value and the rest are expiry
    /// options (`EX`, `PX`, `EXAT`, `PXAT` or `KEEPTTL`). Conditional and
    /// returning options such as `NX`, `XX` and `GET` cannot be honoured
    /// for chunked values and are rejected with
    /// [`CacheError::InvalidArgument`]. Passthrough arguments are
    /// forwarded after the key, and expiry commands reach every fragment;
    /// read and delete ignore `args`.
    pub async fn call(
        &self,
        name: &str,
        key: impl Into<KeyDescriptor>,
        args: &[Value],
    ) -> Result<ProxyReply> {
        let key = key.into();
        let route = self.table.route(name);
        tracing::trace!("call {} routed as {:?}", name, route.role);

        match route.role {
            CommandRole::Write => {
                let (value, options) = args.split_first().ok_or_else(|| {
                    CacheError::InvalidArgument(format!("{} needs a value", name))
                })?;
                let options = options
                    .iter()
                    .map(option_token)
                    .collect::<Result<Vec<String>>>()?;
                let expiry = Expiry::parse(&options)?;
                self.set_with(key, value, expiry).await.map(ProxyReply::Ack)
            }
            CommandRole::Read => self.get::<Value>(key).await.map(ProxyReply::Record),
            CommandRole::Delete => self.del(key).await.map(ProxyReply::Deleted),
            CommandRole::Passthrough => {
                let args = args.iter().map(argument_bytes).collect();
                let reply = if is_expiry_command(name) {
                    self.retime(name, &key, args).await?
                } else {
                    self.forward(name, &key, args).await?
                };
                Ok(ProxyReply::Forwarded(reply))
            }
        }
    }

    // =========================================================================
    // Health
    // =========================================================================

    /// Write, read back and delete a throwaway value
    pub async fn check_connectivity(&self) -> Result<()> {
        let key = KeyDescriptor::fields([
            ("probe", Value::from("connectivity")),
            ("at", Value::from(Utc::now().timestamp_millis())),
        ]);
        let data = serde_json::json!({ "data": "connectivity probe" });

        let ack = self.set_with(key.clone(), &data, Some(Expiry::Ex(60))).await?;
        let read = self.get::<Value>(key.clone()).await?;
        let removed = self.del(key).await?;

        let passed = ack.is_ok() && read.map(|r| r.value) == Some(data) && removed == 1;
        if !passed {
            return Err(CacheError::Connectivity(
                "connectivity probe did not round-trip".into(),
            ));
        }

        tracing::info!("Passed store connectivity probe (prefix {})", self.config.prefix);
        Ok(())
    }
}

/// Downgrade read failures to misses, keeping connection failures fatal
fn soft_miss<T>(hashed: &HashedKey, result: Result<Option<T>>) -> Result<Option<T>> {
    match result {
        Err(e) if e.is_soft_miss() => {
            tracing::warn!("Treating {} as a miss: {}", hashed, e);
            Ok(None)
        }
        other => other,
    }
}

/// Commands that change a key's expiry
fn is_expiry_command(name: &str) -> bool {
    ["expire", "pexpire", "expireat", "pexpireat", "persist"]
        .iter()
        .any(|c| name.eq_ignore_ascii_case(c))
}

fn integer_reply(command: &str, reply: Reply) -> Result<i64> {
    match reply {
        Reply::Integer(n) => Ok(n),
        Reply::Error(e) => Err(CacheError::Store(e)),
        other => Err(CacheError::Protocol(format!(
            "{} returned unexpected reply: {:?}",
            command, other
        ))),
    }
}

fn option_token(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(CacheError::InvalidArgument(format!(
            "write option must be a string or number, got {}",
            other
        ))),
    }
}

fn argument_bytes(value: &Value) -> Vec<u8> {
    match value {
        Value::String(s) => s.as_bytes().to_vec(),
        other => other.to_string().into_bytes(),
    }
}
