//! Chunk Manager
//!
//! Writes, reads and deletes a hashed key's physical records as a unit.

use super::{ChunkHead, Record};
use crate::error::{CacheError, Result};
use crate::key::HashedKey;
use crate::protocol::{Command, Expiry, Reply};
use crate::store::Store;

/// Splits and reassembles oversized records
#[derive(Debug, Clone)]
pub struct ChunkManager {
    /// Largest physical record in bytes (`None` = never chunk)
    max_chunk: Option<usize>,
}

impl ChunkManager {
    pub fn new(max_chunk: Option<usize>) -> Self {
        Self { max_chunk }
    }

    pub fn max_chunk(&self) -> Option<usize> {
        self.max_chunk
    }

    /// Whether `payload` needs a chunk set
    pub fn needs_chunking(&self, payload: &[u8]) -> bool {
        self.max_chunk
            .map_or(false, |max| Record::single_len(payload.len()) > max)
    }

    /// Split `payload` into `max_chunk`-sized fragments
    pub fn split<'a>(&self, payload: &'a [u8]) -> Vec<&'a [u8]> {
        match self.max_chunk {
            Some(max) if max > 0 => payload.chunks(max).collect(),
            _ => vec![payload],
        }
    }

    /// Physical records to write for `payload`, head (or single) last
    pub fn plan(&self, key: &HashedKey, payload: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
        if !self.needs_chunking(payload) {
            let record = Record::Single(payload.to_vec()).to_bytes()?;
            return Ok(vec![(key.as_str().to_string(), record)]);
        }

        let fragments = self.split(payload);
        let head = ChunkHead::describe(payload, fragments.len());

        let mut records: Vec<(String, Vec<u8>)> = fragments
            .iter()
            .enumerate()
            .map(|(i, fragment)| (key.fragment(i), fragment.to_vec()))
            .collect();
        records.push((key.as_str().to_string(), Record::Head(head).to_bytes()?));
        Ok(records)
    }

    // =========================================================================
    // Store Operations
    // =========================================================================

    /// Write `payload` under `key`, chunking when it is too large
    ///
    /// Every physical record gets the same expiry so a chunk set expires
    /// as a whole. Fragments left over from a larger earlier value are
    /// removed afterwards. Returns the store's acknowledgement for the
    /// head (or single) record.
    pub async fn write(
        &self,
        store: &dyn Store,
        key: &HashedKey,
        payload: &[u8],
        expiry: Option<Expiry>,
    ) -> Result<Reply> {
        let previous = match self.max_chunk {
            Some(_) => self.read_head(store, key).await?,
            None => None,
        };

        let records = self.plan(key, payload)?;
        let fragment_count = records.len() - 1;

        let reply = if records.len() == 1 {
            let (physical, bytes) = records.into_iter().next().ok_or_else(|| {
                CacheError::Encode("chunk plan produced no records".to_string())
            })?;
            store.set(&physical, bytes, expiry).await?
        } else {
            tracing::debug!(
                "Chunking {} bytes for {} into {} fragments",
                payload.len(),
                key,
                fragment_count
            );

            let commands = records
                .into_iter()
                .map(|(physical, value)| Command::Set {
                    key: physical,
                    value,
                    expiry,
                })
                .collect();

            let mut results = store.pipeline(commands).await?;
            let head_reply = results.pop();
            for result in results {
                result.map_err(CacheError::Store)?;
            }
            head_reply
                .ok_or_else(|| CacheError::Protocol("pipeline returned no replies".into()))?
                .map_err(CacheError::Store)?
        };

        if let Some(old) = previous {
            if old.count() > fragment_count {
                let stale: Vec<String> = (fragment_count..old.count())
                    .map(|i| key.fragment(i))
                    .collect();
                tracing::debug!("Removing {} stale fragments of {}", stale.len(), key);
                store.del(stale).await?;
            }
        }

        Ok(reply)
    }

    /// Read the payload stored under `key`
    ///
    /// `Ok(None)` means absent. Corrupt or torn records come back as
    /// [`CacheError::Decode`] / [`CacheError::ChunkIntegrity`] so the
    /// caller can decide how to report them.
    pub async fn read(&self, store: &dyn Store, key: &HashedKey) -> Result<Option<Vec<u8>>> {
        let Some(raw) = store.get(key.as_str()).await? else {
            return Ok(None);
        };

        match Record::from_bytes(&raw)? {
            Record::Single(payload) => Ok(Some(payload)),
            Record::Head(head) => {
                let commands = key
                    .fragments(head.count())
                    .into_iter()
                    .map(|k| Command::Get { key: k })
                    .collect();
                let fragments = store
                    .pipeline(commands)
                    .await?
                    .into_iter()
                    .map(|item| match item {
                        Ok(reply) => reply.into_bulk(),
                        Err(e) => {
                            tracing::warn!("Fragment read failed for {}: {}", key, e);
                            None
                        }
                    })
                    .collect();
                assemble(key, &head, fragments).map(Some)
            }
        }
    }

    /// Delete `key` and, when it heads a chunk set, every fragment
    ///
    /// Returns the number of physical records removed.
    pub async fn delete(&self, store: &dyn Store, key: &HashedKey) -> Result<u64> {
        let Some(raw) = store.get(key.as_str()).await? else {
            return Ok(0);
        };

        let mut keys = vec![key.as_str().to_string()];
        match Record::from_bytes(&raw) {
            Ok(Record::Head(head)) => keys.extend(key.fragments(head.count())),
            Ok(Record::Single(_)) => {}
            Err(e) => tracing::warn!("Deleting undecodable record {}: {}", key, e),
        }

        store.del(keys).await
    }

    /// Run an expiry command (EXPIRE, PERSIST, ...) on `key` and on every
    /// fragment it heads, so the set keeps one expiry
    ///
    /// `args` follow the key. Returns the reply for the head (or single)
    /// record.
    pub async fn retime(
        &self,
        store: &dyn Store,
        key: &HashedKey,
        name: &str,
        args: Vec<Vec<u8>>,
    ) -> Result<Reply> {
        let command = |physical: String| {
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(physical.into_bytes());
            full.extend(args.iter().cloned());
            Command::Raw {
                name: name.to_ascii_uppercase(),
                args: full,
            }
        };

        let Some(head) = self.read_head(store, key).await? else {
            return store.execute(command(key.as_str().to_string())).await;
        };

        let mut commands: Vec<Command> = key
            .fragments(head.count())
            .into_iter()
            .map(&command)
            .collect();
        commands.push(command(key.as_str().to_string()));
        tracing::debug!("{} on {} and {} fragments", name, key, head.count());

        let mut results = store.pipeline(commands).await?;
        let head_reply = results
            .pop()
            .ok_or_else(|| CacheError::Protocol("pipeline returned no replies".into()))?;
        for result in results {
            result.map_err(CacheError::Store)?;
        }
        Ok(head_reply.unwrap_or_else(Reply::Error))
    }

    /// The chunk head under `key`, if it holds one
    async fn read_head(&self, store: &dyn Store, key: &HashedKey) -> Result<Option<ChunkHead>> {
        let raw = store.get(key.as_str()).await?;
        Ok(match raw.map(|bytes| Record::from_bytes(&bytes)) {
            Some(Ok(Record::Head(head))) => Some(head),
            _ => None,
        })
    }
}

/// Join fragments fetched for `head`, checking the set is complete and
/// intact
pub fn assemble(
    key: &HashedKey,
    head: &ChunkHead,
    fragments: Vec<Option<Vec<u8>>>,
) -> Result<Vec<u8>> {
    let found = fragments.iter().filter(|f| f.is_some()).count();
    if found != head.count() || fragments.len() != head.count() {
        return Err(CacheError::ChunkIntegrity {
            key: key.to_string(),
            expected: head.count(),
            found,
        });
    }

    let mut payload = Vec::with_capacity(head.total_len as usize);
    for fragment in fragments.into_iter().flatten() {
        payload.extend_from_slice(&fragment);
    }

    if payload.len() as u64 != head.total_len || crc32fast::hash(&payload) != head.checksum {
        return Err(CacheError::Decode(format!(
            "chunk set {} does not match its head",
            key
        )));
    }

    Ok(payload)
}
