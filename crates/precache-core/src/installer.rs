//! Install-time precaching
//!
//! Opens the named cache store and adds every asset in the asset list. The
//! batch is all-or-nothing: every asset is fetched first, and entries are
//! only written once all fetches have succeeded.

use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::assets::AssetList;
use crate::fetch::NetworkFetch;
use crate::request::{CacheRequest, RequestKey};
use crate::store::{CacheStorage, CacheStore};
use crate::{CoreError, Result};

/// Outcome of a successful install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub cache_name: String,
    /// Keys written by this install, in asset order
    pub stored: Vec<RequestKey>,
}

/// Fetch every URL and store the responses in `cache` as one batch.
///
/// Fetches run concurrently. A transport failure or a non-2xx status on any
/// asset fails the batch and nothing is written.
pub async fn populate(
    cache: &dyn CacheStore,
    urls: Vec<Url>,
    net: &dyn NetworkFetch,
) -> Result<Vec<RequestKey>> {
    let requests: Vec<CacheRequest> = urls.into_iter().map(CacheRequest::get).collect();

    let fetches = requests.iter().map(|request| async move {
        let response = net.fetch(request).await.map_err(|e| {
            CoreError::asset_failed(
                "CACHE_POPULATE_FETCH_FAILED",
                "Failed to fetch asset",
                request.url.as_str(),
                Some(e),
            )
        })?;

        if !response.is_success() {
            return Err(CoreError::asset_failed(
                "CACHE_POPULATE_BAD_STATUS",
                format!("Asset answered with status {}", response.status),
                request.url.as_str(),
                None,
            ));
        }

        debug!("Fetched asset {} ({} bytes)", request.url, response.body.len());
        Ok::<_, CoreError>((request.key(), response))
    });

    let entries = try_join_all(fetches).await?;
    let keys: Vec<RequestKey> = entries.iter().map(|(key, _)| key.clone()).collect();

    cache.put_all(entries).await.map_err(|e| CoreError::CachePopulate {
        code: "CACHE_POPULATE_STORE_FAILED",
        message: "Failed to write precached assets".to_string(),
        context: format!("While storing {} assets in {}", keys.len(), cache.name()),
        suggestion: "Check the cache store backend".to_string(),
        asset: None,
        source: Some(Box::new(e)),
    })?;

    Ok(keys)
}

/// Open `cache_name` in `storage` and precache `assets` resolved against `origin`
pub async fn on_install(
    storage: &dyn CacheStorage,
    cache_name: &str,
    origin: &Url,
    assets: &AssetList,
    net: &dyn NetworkFetch,
) -> Result<InstallReport> {
    let cache = storage.open(cache_name).await?;
    let urls = assets.resolve(origin)?;

    info!("Precaching {} assets into {}", urls.len(), cache_name);
    let stored = populate(cache.as_ref(), urls, net).await?;
    info!("Install of {} complete: {} entries stored", cache_name, stored.len());

    Ok(InstallReport {
        cache_name: cache_name.to_string(),
        stored,
    })
}

/// Install handler with its collaborators injected at construction
pub struct CacheInstaller {
    storage: Arc<dyn CacheStorage>,
    net: Arc<dyn NetworkFetch>,
    cache_name: String,
    origin: Url,
    assets: AssetList,
}

impl CacheInstaller {
    pub fn new(
        storage: Arc<dyn CacheStorage>,
        net: Arc<dyn NetworkFetch>,
        cache_name: impl Into<String>,
        origin: Url,
        assets: AssetList,
    ) -> Self {
        Self {
            storage,
            net,
            cache_name: cache_name.into(),
            origin,
            assets,
        }
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn assets(&self) -> &AssetList {
        &self.assets
    }

    /// Run the install; completes only once every asset is stored
    pub async fn install(&self) -> Result<InstallReport> {
        on_install(
            self.storage.as_ref(),
            &self.cache_name,
            &self.origin,
            &self.assets,
            self.net.as_ref(),
        )
        .await
        .map_err(|e| {
            warn!("Install of {} failed: {}", self.cache_name, e);
            e
        })
    }

    /// Open the store this installer populates
    pub async fn open_store(&self) -> Result<Arc<dyn CacheStore>> {
        self.storage.open(&self.cache_name).await
    }
}
