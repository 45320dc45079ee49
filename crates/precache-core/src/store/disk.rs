//! Persistent cache stores on the local file system.
//!
//! Layout:
//! - `<root>/<encoded cache name>/index.json`: cache name plus one record per
//!   entry (key, status, headers, body file name)
//! - `<root>/<encoded cache name>/<uuid>.body`: raw response bodies
//!
//! Batches write their body files first and then replace the index with a
//! temp-file rename, so a failed batch never becomes visible.

use async_trait::async_trait;
use dashmap::DashMap;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{validate_cache_name, CacheStorage, CacheStore};
use crate::request::{CachedResponse, RequestKey};
use crate::{CoreError, Result};

const INDEX_FILE: &str = "index.json";
const INDEX_TMP_FILE: &str = "index.json.tmp";

/// One entry as recorded in the index file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    key: RequestKey,
    status: u16,
    headers: Vec<(String, String)>,
    body_file: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    name: String,
    entries: Vec<StoredEntry>,
}

/// A cache store persisted in its own directory
#[derive(Debug)]
pub struct DiskCache {
    name: String,
    dir: PathBuf,
    index: RwLock<HashMap<RequestKey, StoredEntry>>,
}

impl DiskCache {
    /// Open the store in `dir`, creating the directory and an empty index if absent
    async fn open(name: &str, dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await.map_err(|e| {
            CoreError::cache_open_io(
                "CACHE_OPEN_CREATE_DIR",
                format!("Failed to create cache directory {}", dir.display()),
                name,
                e,
            )
        })?;

        let index = read_index(name, &dir).await?;
        let fresh = index.is_none();

        let cache = Self {
            name: name.to_string(),
            dir,
            index: RwLock::new(index.unwrap_or_default()),
        };

        if fresh {
            cache.write_index(&HashMap::new()).await?;
        }

        debug!(
            "Opened disk cache {} at {} ({} entries)",
            cache.name,
            cache.dir.display(),
            cache.index.read().await.len()
        );
        Ok(cache)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn io_error(&self, code: &'static str, what: &str, err: std::io::Error) -> CoreError {
        CoreError::cache_open_io(code, what.to_string(), self.name.clone(), err)
    }

    async fn write_index(&self, entries: &HashMap<RequestKey, StoredEntry>) -> Result<()> {
        let mut records: Vec<StoredEntry> = entries.values().cloned().collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));

        let file = IndexFile {
            name: self.name.clone(),
            entries: records,
        };
        let bytes = serde_json::to_vec_pretty(&file).map_err(|e| {
            CoreError::cache_open(
                "CACHE_OPEN_ENCODE_INDEX",
                format!("Failed to encode index: {}", e),
                self.name.clone(),
                "This is a bug; please report it",
            )
        })?;

        let tmp = self.dir.join(INDEX_TMP_FILE);
        fs::write(&tmp, bytes)
            .await
            .map_err(|e| self.io_error("CACHE_OPEN_WRITE_INDEX", "Failed to write index", e))?;
        fs::rename(&tmp, self.dir.join(INDEX_FILE))
            .await
            .map_err(|e| self.io_error("CACHE_OPEN_WRITE_INDEX", "Failed to replace index", e))?;
        Ok(())
    }

    /// Pick up entries written through another handle on the same directory
    async fn reload_index(&self) -> Result<()> {
        let entries = read_index(&self.name, &self.dir).await?.unwrap_or_default();
        *self.index.write().await = entries;
        Ok(())
    }

    async fn remove_bodies(&self, files: &[String]) {
        for file in files {
            if let Err(e) = fs::remove_file(self.dir.join(file)).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove cache body {} in {}: {}", file, self.name, e);
                }
            }
        }
    }
}

/// Read `index.json` from `dir`; `None` when the directory has no index yet
async fn read_index(name: &str, dir: &Path) -> Result<Option<HashMap<RequestKey, StoredEntry>>> {
    let index_path = dir.join(INDEX_FILE);
    let bytes = match fs::read(&index_path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(CoreError::cache_open_io(
                "CACHE_OPEN_READ_INDEX",
                format!("Failed to read {}", index_path.display()),
                name,
                e,
            ))
        }
    };

    let file: IndexFile = serde_json::from_slice(&bytes).map_err(|e| {
        CoreError::cache_open(
            "CACHE_OPEN_CORRUPT_INDEX",
            format!("Failed to parse {}: {}", index_path.display(), e),
            name,
            "Delete the cache directory to rebuild it on the next install",
        )
    })?;
    Ok(Some(file.entries.into_iter().map(|e| (e.key.clone(), e)).collect()))
}

fn encode_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| match value.to_str() {
            Ok(v) => Some((name.as_str().to_string(), v.to_string())),
            Err(_) => {
                warn!("Dropping non-text header {} from cached response", name);
                None
            }
        })
        .collect()
}

fn body_files(entries: &[StoredEntry]) -> Vec<String> {
    entries.iter().map(|e| e.body_file.clone()).collect()
}

fn decode_headers(headers: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                map.append(name, value);
            }
            _ => warn!("Skipping invalid stored header {}", name),
        }
    }
    map
}

#[async_trait]
impl CacheStore for DiskCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_request(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
        let Some(entry) = self.index.read().await.get(key).cloned() else {
            return Ok(None);
        };

        let (entry, body) = match fs::read(self.dir.join(&entry.body_file)).await {
            Ok(body) => (entry, body),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Another handle may have replaced the entry and removed its old body.
                debug!("Body for {} missing in {}, reloading index", key, self.name);
                self.reload_index().await?;
                let Some(entry) = self.index.read().await.get(key).cloned() else {
                    return Ok(None);
                };
                let body = fs::read(self.dir.join(&entry.body_file)).await.map_err(|e| {
                    self.io_error("CACHE_OPEN_READ_BODY", "Failed to read cached body", e)
                })?;
                (entry, body)
            }
            Err(e) => {
                return Err(self.io_error("CACHE_OPEN_READ_BODY", "Failed to read cached body", e))
            }
        };

        let status = StatusCode::from_u16(entry.status).map_err(|_| {
            CoreError::cache_open(
                "CACHE_OPEN_CORRUPT_INDEX",
                format!("Stored status {} for {} is invalid", entry.status, key),
                self.name.clone(),
                "Delete the cache directory to rebuild it on the next install",
            )
        })?;

        Ok(Some(CachedResponse {
            status,
            headers: decode_headers(&entry.headers),
            body: body.into(),
        }))
    }

    async fn put_all(&self, entries: Vec<(RequestKey, CachedResponse)>) -> Result<()> {
        let mut index = self.index.write().await;

        let mut written: Vec<StoredEntry> = Vec::with_capacity(entries.len());
        for (key, response) in entries {
            let body_file = format!("{}.body", Uuid::new_v4());
            if let Err(e) = fs::write(self.dir.join(&body_file), &response.body).await {
                self.remove_bodies(&body_files(&written)).await;
                return Err(self.io_error("CACHE_OPEN_WRITE_BODY", "Failed to write cached body", e));
            }
            written.push(StoredEntry {
                key,
                status: response.status.as_u16(),
                headers: encode_headers(&response.headers),
                body_file,
            });
        }

        // Start from the index on disk so entries written through other handles survive.
        let mut next = match read_index(&self.name, &self.dir).await {
            Ok(on_disk) => on_disk.unwrap_or_else(|| index.clone()),
            Err(e) => {
                self.remove_bodies(&body_files(&written)).await;
                return Err(e);
            }
        };
        let mut superseded = Vec::new();
        for entry in &written {
            if let Some(old) = next.insert(entry.key.clone(), entry.clone()) {
                superseded.push(old.body_file);
            }
        }

        if let Err(e) = self.write_index(&next).await {
            self.remove_bodies(&body_files(&written)).await;
            return Err(e);
        }

        *index = next;
        self.remove_bodies(&superseded).await;

        debug!("Stored {} entries in disk cache {}", written.len(), self.name);
        Ok(())
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool> {
        let mut index = self.index.write().await;
        if !index.contains_key(key) {
            return Ok(false);
        }

        let mut next = index.clone();
        let removed = next.remove(key);
        self.write_index(&next).await?;
        *index = next;

        if let Some(entry) = removed {
            self.remove_bodies(std::slice::from_ref(&entry.body_file)).await;
        }
        Ok(true)
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        let mut keys: Vec<RequestKey> = self.index.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.index.read().await.len())
    }

    async fn clear(&self) -> Result<()> {
        let mut index = self.index.write().await;
        self.write_index(&HashMap::new()).await?;
        let old: Vec<StoredEntry> = std::mem::take(&mut *index).into_values().collect();
        self.remove_bodies(&body_files(&old)).await;
        Ok(())
    }
}

/// Named stores under a root directory, one subdirectory per store
#[derive(Debug)]
pub struct DiskCacheStorage {
    root: PathBuf,
    open_caches: DashMap<String, Arc<DiskCache>>,
}

impl DiskCacheStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            open_caches: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_dir(&self, name: &str) -> PathBuf {
        let encoded: String = url::form_urlencoded::byte_serialize(name.as_bytes()).collect();
        self.root.join(encoded)
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheStore>> {
        validate_cache_name(name)?;

        if let Some(cache) = self.open_caches.get(name) {
            let cache: Arc<dyn CacheStore> = cache.value().clone();
            return Ok(cache);
        }

        let opened = Arc::new(DiskCache::open(name, self.cache_dir(name)).await?);
        // Concurrent opens of the same name settle on the first handle stored.
        let cache: Arc<dyn CacheStore> = self
            .open_caches
            .entry(name.to_string())
            .or_insert(opened)
            .value()
            .clone();
        Ok(cache)
    }

    async fn has(&self, name: &str) -> Result<bool> {
        validate_cache_name(name)?;
        if self.open_caches.contains_key(name) {
            return Ok(true);
        }
        Ok(fs::try_exists(self.cache_dir(name).join(INDEX_FILE))
            .await
            .unwrap_or(false))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        validate_cache_name(name)?;
        self.open_caches.remove(name);

        let dir = self.cache_dir(name);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!("Deleted disk cache {}", name);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CoreError::cache_open_io(
                "CACHE_OPEN_DELETE",
                format!("Failed to delete {}", dir.display()),
                name,
                e,
            )),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut dirs = match fs::read_dir(&self.root).await {
            Ok(dirs) => dirs,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dirs.next_entry().await? {
            let Ok(bytes) = fs::read(entry.path().join(INDEX_FILE)).await else {
                continue;
            };
            match serde_json::from_slice::<IndexFile>(&bytes) {
                Ok(index) => names.push(index.name),
                Err(e) => warn!("Ignoring unreadable cache index in {}: {}", entry.path().display(), e),
            }
        }

        names.sort();
        Ok(names)
    }
}
