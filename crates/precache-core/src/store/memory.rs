//! In-memory cache stores backed by `DashMap`

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use super::{validate_cache_name, CacheStorage, CacheStore};
use crate::request::{CachedResponse, RequestKey};
use crate::Result;

/// A cache store living for the lifetime of the process
#[derive(Debug)]
pub struct MemoryCache {
    name: String,
    entries: DashMap<RequestKey, CachedResponse>,
}

impl MemoryCache {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_request(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
        let found = self.entries.get(key).map(|entry| entry.value().clone());
        trace!("Memory cache {} lookup {}: {}", self.name, key, found.is_some());
        Ok(found)
    }

    async fn put_all(&self, entries: Vec<(RequestKey, CachedResponse)>) -> Result<()> {
        debug!("Storing {} entries in memory cache {}", entries.len(), self.name);
        for (key, response) in entries {
            self.entries.insert(key, response);
        }
        Ok(())
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        let mut keys: Vec<RequestKey> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.len())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }
}

/// Named in-memory stores; opening the same name twice yields the same store
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: DashMap<String, Arc<MemoryCache>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheStore>> {
        validate_cache_name(name)?;

        let cache = self
            .caches
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!("Creating memory cache {}", name);
                Arc::new(MemoryCache::new(name))
            })
            .clone();

        Ok(cache)
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.caches.contains_key(name))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.caches.remove(name).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.caches.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn key(path: &str) -> RequestKey {
        RequestKey::get(&Url::parse("http://localhost:8000/").unwrap().join(path).unwrap())
    }

    #[tokio::test]
    async fn test_open_creates_and_reuses() {
        let storage = MemoryCacheStorage::new();
        assert!(!storage.has("pwa").await.unwrap());

        let first = storage.open("pwa").await.unwrap();
        first.put(key("/app.js"), CachedResponse::ok("js")).await.unwrap();

        let second = storage.open("pwa").await.unwrap();
        assert!(storage.has("pwa").await.unwrap());
        assert_eq!(
            second.match_request(&key("/app.js")).await.unwrap(),
            Some(CachedResponse::ok("js"))
        );
    }

    #[tokio::test]
    async fn test_put_overwrites_same_key() {
        let cache = MemoryCache::new("pwa");
        cache.put(key("/a"), CachedResponse::ok("one")).await.unwrap();
        cache.put(key("/a"), CachedResponse::ok("two")).await.unwrap();

        assert_eq!(cache.len().await.unwrap(), 1);
        assert_eq!(cache.match_request(&key("/a")).await.unwrap().unwrap().body, "two");
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let storage = MemoryCacheStorage::new();
        let cache = storage.open("pwa").await.unwrap();
        cache
            .put_all(vec![(key("/a"), CachedResponse::ok("a")), (key("/b"), CachedResponse::ok("b"))])
            .await
            .unwrap();

        assert!(cache.delete(&key("/a")).await.unwrap());
        assert!(!cache.delete(&key("/a")).await.unwrap());
        assert_eq!(cache.keys().await.unwrap(), vec![key("/b")]);

        cache.clear().await.unwrap();
        assert_eq!(cache.len().await.unwrap(), 0);

        assert!(storage.delete("pwa").await.unwrap());
        assert!(storage.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_empty_name() {
        let storage = MemoryCacheStorage::new();
        let err = storage.open("").await.err().unwrap();
        assert_eq!(err.code(), "CACHE_OPEN_INVALID_NAME");
    }
}
