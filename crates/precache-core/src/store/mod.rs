//! Named cache stores
//!
//! A [`CacheStorage`] is the host-side collection of named stores; a
//! [`CacheStore`] maps request identity to a stored response. Both are passed
//! explicitly into the installer and interceptor.

mod disk;
mod memory;

pub use disk::{DiskCache, DiskCacheStorage};
pub use memory::{MemoryCache, MemoryCacheStorage};

use async_trait::async_trait;
use std::sync::Arc;

use crate::request::{CachedResponse, RequestKey};
use crate::{CoreError, Result};

/// A single named cache store
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Name the store was opened under
    fn name(&self) -> &str;

    /// Look up a stored response by request identity
    async fn match_request(&self, key: &RequestKey) -> Result<Option<CachedResponse>>;

    /// Store one entry, replacing any previous entry under the same key
    async fn put(&self, key: RequestKey, response: CachedResponse) -> Result<()> {
        self.put_all(vec![(key, response)]).await
    }

    /// Store a batch of entries. Either every entry is stored or none is.
    async fn put_all(&self, entries: Vec<(RequestKey, CachedResponse)>) -> Result<()>;

    /// Remove an entry, returning whether it existed
    async fn delete(&self, key: &RequestKey) -> Result<bool>;

    /// All stored keys, sorted
    async fn keys(&self) -> Result<Vec<RequestKey>>;

    async fn len(&self) -> Result<usize> {
        Ok(self.keys().await?.len())
    }

    /// Remove every entry
    async fn clear(&self) -> Result<()>;
}

/// Collection of named cache stores
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open the named store, creating it if absent
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheStore>>;

    /// Whether a store with this name exists
    async fn has(&self, name: &str) -> Result<bool>;

    /// Delete the named store and all of its entries
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Names of all existing stores, sorted
    async fn keys(&self) -> Result<Vec<String>>;
}

/// Reject names that cannot identify a store
pub(crate) fn validate_cache_name(name: &str) -> Result<()> {
    if name.trim().is_empty() || name == "." || name == ".." {
        return Err(CoreError::cache_open(
            "CACHE_OPEN_INVALID_NAME",
            format!("Invalid cache name: {:?}", name),
            name,
            "Use a stable, non-empty cache name",
        ));
    }
    Ok(())
}
