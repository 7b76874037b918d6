//! Key hashing
//!
//! Pure and deterministic: the same descriptor and prefix always give the
//! same physical key.

use std::fmt;

use sha2::{Digest, Sha256};

use super::KeyDescriptor;

/// A physical key in the store: `<prefix>:<hex digest>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashedKey(String);

impl HashedKey {
    /// Wrap a key computed elsewhere (e.g. read back from a pipeline)
    pub fn from_raw(raw: impl Into<String>) -> Self {
        HashedKey(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of fragment `index` of a chunk set rooted at this key
    pub fn fragment(&self, index: usize) -> String {
        format!("{}#{}", self.0, index)
    }

    /// Keys of fragments `0..count`
    pub fn fragments(&self, count: usize) -> Vec<String> {
        (0..count).map(|i| self.fragment(i)).collect()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for HashedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for HashedKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives namespaced physical keys
#[derive(Debug, Clone)]
pub struct KeyHasher {
    prefix: String,
}

impl KeyHasher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Hash a descriptor under this hasher's prefix
    pub fn hash(&self, descriptor: &KeyDescriptor) -> HashedKey {
        hash_with_prefix(descriptor, &self.prefix)
    }
}

/// `prefix ++ ":" ++ hex(sha256(canonical(descriptor)))`
pub fn hash_with_prefix(descriptor: &KeyDescriptor, prefix: &str) -> HashedKey {
    let digest = Sha256::digest(descriptor.canonicalize().as_bytes());
    HashedKey(format!("{}:{}", prefix, hex::encode(digest)))
}
