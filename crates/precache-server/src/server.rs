//! Core server implementation

use crate::{
    config::ServerConfig,
    error::{ServerError, ServerResult},
    handlers,
};

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use precache_core::{
    fetch::{HttpFetcher, NetworkFetch, OfflineFetcher},
    installer::{CacheInstaller, InstallReport},
    interceptor::FetchInterceptor,
    store::{CacheStorage, DiskCacheStorage, MemoryCacheStorage},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Main server state
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<ServerConfig>,
    pub interceptor: Arc<FetchInterceptor>,
    pub install: Arc<InstallReport>,
}

/// Precache HTTP server
pub struct PrecacheServer {
    config: Arc<ServerConfig>,
    state: ServerState,
}

impl PrecacheServer {
    /// Build the configured storage and network, then run install
    pub async fn bootstrap(config: ServerConfig) -> ServerResult<Self> {
        let storage = build_storage(&config);
        let net = build_network(&config)?;
        Self::with_components(config, storage, net).await
    }

    /// Run install against the given collaborators and wire the interceptor.
    ///
    /// A failed install aborts startup.
    pub async fn with_components(
        config: ServerConfig,
        storage: Arc<dyn CacheStorage>,
        net: Arc<dyn NetworkFetch>,
    ) -> ServerResult<Self> {
        config.validate().map_err(ServerError::Config)?;
        let config = Arc::new(config);

        let installer = installer_for(&config, storage, Arc::clone(&net));
        let report = installer.install().await?;
        let store = installer.open_store().await?;

        let state = ServerState {
            config: Arc::clone(&config),
            interceptor: Arc::new(FetchInterceptor::new(store, net)),
            install: Arc::new(report),
        };

        Ok(Self { config, state })
    }

    /// Start the server
    pub async fn start(self) -> ServerResult<()> {
        let app = create_router(self.state.clone());
        let addr = self.config.bind;

        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {}", e)))?;

        info!("Server stopped");
        Ok(())
    }

    /// Get server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get server state
    pub fn state(&self) -> &ServerState {
        &self.state
    }
}

/// Build the router with all routes and middleware.
///
/// Administrative routes live under `/_precache`; everything else goes
/// through the interceptor.
pub fn create_router(state: ServerState) -> Router {
    let body_limit = state.config.upstream.max_body_size;

    Router::new()
        .route("/_precache/health", get(handlers::health::health_check))
        .route("/_precache/cache", get(handlers::cache::cache_info))
        .fallback(handlers::proxy::intercept)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Persistent storage when a cache directory is configured, in-memory otherwise
pub fn build_storage(config: &ServerConfig) -> Arc<dyn CacheStorage> {
    match &config.cache.dir {
        Some(dir) => {
            info!("Using disk cache storage at {:?}", dir);
            Arc::new(DiskCacheStorage::new(dir))
        }
        None => {
            info!("Using in-memory cache storage");
            Arc::new(MemoryCacheStorage::new())
        }
    }
}

/// HTTP fetcher for the upstream, or an always-failing one in offline mode
pub fn build_network(config: &ServerConfig) -> ServerResult<Arc<dyn NetworkFetch>> {
    if config.upstream.offline {
        info!("Offline mode: cache misses will fail");
        return Ok(Arc::new(OfflineFetcher));
    }

    let fetcher = HttpFetcher::new(Duration::from_secs(config.upstream.timeout_secs))?;
    Ok(Arc::new(fetcher))
}

fn installer_for(
    config: &ServerConfig,
    storage: Arc<dyn CacheStorage>,
    net: Arc<dyn NetworkFetch>,
) -> CacheInstaller {
    CacheInstaller::new(
        storage,
        net,
        config.cache.name.clone(),
        config.upstream.origin.clone(),
        config.cache.assets.clone(),
    )
}

/// Run install once without serving
pub async fn run_install(config: &ServerConfig) -> ServerResult<InstallReport> {
    config.validate().map_err(ServerError::Config)?;

    let installer = installer_for(config, build_storage(config), build_network(config)?);
    Ok(installer.install().await?)
}

/// Resolve once ctrl-c is received; never resolves if the signal cannot be installed
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
