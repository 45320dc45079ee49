//! Server configuration

use precache_core::{assets::AssetList, DEFAULT_CACHE_NAME};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, path::PathBuf};
use url::Url;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server binding address
    pub bind: SocketAddr,

    /// Cache store configuration
    pub cache: CacheConfig,

    /// Where assets and cache misses are fetched from
    pub upstream: UpstreamConfig,
}

/// Cache store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Name of the cache store populated at install
    pub name: String,

    /// Directory for persistent stores; in-memory when unset
    pub dir: Option<PathBuf>,

    /// Assets to precache, resolved against the upstream origin
    pub assets: AssetList,
}

/// Upstream network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Origin that asset identifiers and request paths resolve against
    pub origin: Url,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Never touch the network; serve from the cache only
    pub offline: bool,

    /// Maximum request body size forwarded upstream, in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            cache: CacheConfig::default(),
            upstream: UpstreamConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_CACHE_NAME.to_string(),
            dir: None,
            assets: AssetList::default(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse("http://127.0.0.1:8000/").expect("default origin is a valid URL"),
            timeout_secs: 30,
            offline: false,
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

impl ServerConfig {
    /// Load configuration from file, with `PRECACHE__*` environment overrides
    pub fn from_file(path: &Path) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("PRECACHE").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    /// Save configuration to file
    pub fn to_file(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.cache.name.trim().is_empty() {
            return Err("cache.name must not be empty".to_string());
        }

        if !matches!(self.upstream.origin.scheme(), "http" | "https") {
            return Err(format!(
                "upstream.origin must be an http(s) URL, got {}",
                self.upstream.origin
            ));
        }

        if self.upstream.timeout_secs == 0 {
            return Err("upstream.timeout_secs must be greater than 0".to_string());
        }

        if self.upstream.max_body_size == 0 {
            return Err("upstream.max_body_size must be greater than 0".to_string());
        }

        self.cache
            .assets
            .resolve(&self.upstream.origin)
            .map_err(|e| format!("cache.assets: {}", e))?;

        Ok(())
    }
}
