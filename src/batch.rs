//! Batch Reader
//!
//! Reads many keys in one pipelined round trip.
//!
//! ## Passes
//! 1. One pipeline of GETs for every hashed key
//! 2. If any reply heads a chunk set, one more pipeline fetching all
//!    fragments of all chunked entries
//!
//! Items fail independently: a store error, a corrupt record or a torn
//! chunk set turns that entry into a miss and leaves the rest alone. Only
//! a connection-level failure aborts the batch.

use serde::de::DeserializeOwned;

use crate::chunk::{assemble, ChunkHead};
use crate::error::{CacheError, Result};
use crate::key::{HashedKey, KeyDescriptor};
use crate::protocol::Reply;
use crate::router::{CacheProxy, CacheRecord, Unpacked};

/// Results of a batch read, in input order
#[derive(Debug, Clone)]
pub struct BatchResult<T> {
    entries: Vec<(KeyDescriptor, Option<CacheRecord<T>>)>,
}

impl<T> BatchResult<T> {
    /// Record for `key`, matched by canonical form
    pub fn get(&self, key: &KeyDescriptor) -> Option<&CacheRecord<T>> {
        let canonical = key.canonicalize();
        self.entries
            .iter()
            .find(|(k, _)| k.canonicalize() == canonical)
            .and_then(|(_, record)| record.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries found
    pub fn hits(&self) -> usize {
        self.entries.iter().filter(|(_, r)| r.is_some()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(KeyDescriptor, Option<CacheRecord<T>>)> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> Vec<(KeyDescriptor, Option<CacheRecord<T>>)> {
        self.entries
    }
}

impl<T> IntoIterator for BatchResult<T> {
    type Item = (KeyDescriptor, Option<CacheRecord<T>>);
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Pipelined multi-key reader bound to a proxy
pub struct BatchReader<'a> {
    proxy: &'a CacheProxy,
}

impl<'a> BatchReader<'a> {
    pub fn new(proxy: &'a CacheProxy) -> Self {
        Self { proxy }
    }

    /// Read every key, reassembling chunked values
    pub async fn read<T: DeserializeOwned>(&self, keys: &[KeyDescriptor]) -> Result<BatchResult<T>> {
        let hashed: Vec<HashedKey> = keys.iter().map(|k| self.proxy.hash_key(k)).collect();

        let mut heads = self.proxy.multi();
        for key in &hashed {
            heads.get(key.as_str());
        }
        let replies = heads.exec().await?;
        if replies.len() != keys.len() {
            return Err(CacheError::Protocol(format!(
                "batch of {} reads returned {} replies",
                keys.len(),
                replies.len()
            )));
        }

        let mut records: Vec<Option<CacheRecord<T>>> = Vec::with_capacity(keys.len());
        let mut chunked: Vec<(usize, ChunkHead)> = Vec::new();

        for (index, reply) in replies.into_iter().enumerate() {
            let key = &hashed[index];
            let record = match reply {
                Ok(Reply::Bulk(raw)) => match self.proxy.unpack::<T>(key, &raw) {
                    Ok(Unpacked::Value(record)) => Some(record),
                    Ok(Unpacked::Chunked(head)) => {
                        chunked.push((index, head));
                        None
                    }
                    Err(e) => {
                        tracing::warn!("Batch entry {} unreadable: {}", key, e);
                        None
                    }
                },
                Ok(Reply::Nil) => None,
                Ok(other) => {
                    tracing::warn!("Batch entry {} got unexpected reply {:?}", key, other);
                    None
                }
                Err(e) => {
                    tracing::warn!("Unexpected pipeline error for {}: {}", key, e);
                    None
                }
            };
            records.push(record);
        }

        if !chunked.is_empty() {
            self.read_chunked(&hashed, &chunked, &mut records).await?;
        }

        let result = BatchResult {
            entries: keys.iter().cloned().zip(records).collect(),
        };
        tracing::debug!(
            "Batch read {} keys: {} hits, {} chunked",
            result.len(),
            result.hits(),
            chunked.len()
        );
        Ok(result)
    }

    /// Second pass: fetch and join fragments for every chunked entry
    async fn read_chunked<T: DeserializeOwned>(
        &self,
        hashed: &[HashedKey],
        chunked: &[(usize, ChunkHead)],
        records: &mut [Option<CacheRecord<T>>],
    ) -> Result<()> {
        let mut fragments = self.proxy.multi();
        for (index, head) in chunked {
            for fragment in hashed[*index].fragments(head.count()) {
                fragments.get(fragment);
            }
        }

        let mut replies = fragments.exec().await?.into_iter();
        for (index, head) in chunked {
            let key = &hashed[*index];
            let parts: Vec<Option<Vec<u8>>> = replies
                .by_ref()
                .take(head.count())
                .map(|item| item.ok().and_then(Reply::into_bulk))
                .collect();

            let decoded = assemble(key, head, parts)
                .and_then(|payload| self.proxy.decode_payload(key, &payload));
            records[*index] = match decoded {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("Batch entry {} unreadable: {}", key, e);
                    None
                }
            };
        }
        Ok(())
    }
}

/// Read many keys through `proxy` in one batch
pub async fn multi_get<T: DeserializeOwned>(
    proxy: &CacheProxy,
    keys: &[KeyDescriptor],
) -> Result<BatchResult<T>> {
    BatchReader::new(proxy).read(keys).await
}
