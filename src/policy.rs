//! Cache Policy
//!
//! Read-through helper: consult the cache, fall back to a fetch, and
//! write the fetched value back.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;
use crate::key::KeyDescriptor;
use crate::router::CacheProxy;

/// Switches controlling how [`CachePolicy::get_or_fetch`] uses the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Look in the cache before fetching
    pub use_cache: bool,

    /// Store fetched values
    pub write_cache: bool,

    /// Rewrite a hit so its expiry starts over
    pub refresh_on_hit: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            use_cache: true,
            write_cache: true,
            refresh_on_hit: true,
        }
    }
}

/// A value plus where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    pub from_cache: bool,
}

impl CachePolicy {
    /// Bypass the cache entirely
    pub fn disabled() -> Self {
        Self {
            use_cache: false,
            write_cache: false,
            refresh_on_hit: false,
        }
    }

    /// Return the cached value for `key`, or run `fetch` and cache its result
    ///
    /// Cache errors propagate through `E`; a fetch error skips the write.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        proxy: &CacheProxy,
        key: impl Into<KeyDescriptor>,
        fetch: F,
    ) -> std::result::Result<Fetched<T>, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let key = key.into();

        if self.use_cache {
            if let Some(record) = proxy.get::<T>(key.clone()).await? {
                if self.refresh_on_hit {
                    proxy.set(key, &record.value).await?;
                }
                return Ok(Fetched {
                    value: record.value,
                    from_cache: true,
                });
            }
        }

        let value = fetch().await?;
        if self.write_cache {
            proxy.set(key, &value).await?;
        } else {
            tracing::trace!("Not caching fetched value for {}", key);
        }

        Ok(Fetched {
            value,
            from_cache: false,
        })
    }
}
