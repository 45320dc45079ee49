//! Cache-first request handling
//!
//! Every request is looked up in the cache store by identity. A hit is
//! answered from the store without touching the network; a miss performs
//! exactly one network fetch whose outcome is returned unchanged. Network
//! responses are never written back to the store.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::fetch::NetworkFetch;
use crate::request::{CacheRequest, CachedResponse};
use crate::store::CacheStore;
use crate::{CoreError, Result};

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Cache,
    Network,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "hit",
            Self::Network => "miss",
        }
    }
}

/// A response together with its source
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub response: CachedResponse,
    pub source: ResponseSource,
}

/// Answer `request` from `store`, falling back to `net` on a miss
pub async fn on_fetch(
    store: &dyn CacheStore,
    request: &CacheRequest,
    net: &dyn NetworkFetch,
) -> Result<FetchOutcome> {
    let key = request.key();

    if let Some(response) = store.match_request(&key).await? {
        debug!("Cache hit in {} for {}", store.name(), key);
        return Ok(FetchOutcome {
            response,
            source: ResponseSource::Cache,
        });
    }

    debug!("Cache miss in {} for {}", store.name(), key);
    let response = net.fetch(request).await?;
    Ok(FetchOutcome {
        response,
        source: ResponseSource::Network,
    })
}

/// Counters kept by a [`FetchInterceptor`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InterceptorStats {
    pub hits: u64,
    pub misses: u64,
    /// Misses whose network fetch failed
    pub network_failures: u64,
}

/// Fetch handler with its store and network injected at construction
pub struct FetchInterceptor {
    store: Arc<dyn CacheStore>,
    net: Arc<dyn NetworkFetch>,
    hits: AtomicU64,
    misses: AtomicU64,
    network_failures: AtomicU64,
}

impl FetchInterceptor {
    pub fn new(store: Arc<dyn CacheStore>, net: Arc<dyn NetworkFetch>) -> Self {
        Self {
            store,
            net,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            network_failures: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Handle one request
    pub async fn handle(&self, request: &CacheRequest) -> Result<FetchOutcome> {
        let result = on_fetch(self.store.as_ref(), request, self.net.as_ref()).await;

        match &result {
            Ok(outcome) if outcome.source == ResponseSource::Cache => {
                self.hits.fetch_add(1, Ordering::Relaxed);
            }
            Ok(_) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                if matches!(e, CoreError::NetworkFetch { .. }) {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    self.network_failures.fetch_add(1, Ordering::Relaxed);
                }
                warn!("Request {} {} failed: {}", request.method, request.url, e);
            }
        }

        result
    }

    pub fn stats(&self) -> InterceptorStats {
        InterceptorStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            network_failures: self.network_failures.load(Ordering::Relaxed),
        }
    }
}
