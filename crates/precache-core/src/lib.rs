//! Precache Core - cache-first request handling
//!
//! This crate provides the two lifecycle handlers of the precache layer:
//! install-time population of a named cache store from a configured asset
//! list, and per-request lookup that answers from the cache store and falls
//! back to the network on a miss.

/// Version of the precache-core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Cache name used when none is configured
pub const DEFAULT_CACHE_NAME: &str = "model_checker_ui-pwa";

// Module declarations
pub mod assets;
pub mod fetch;
pub mod installer;
pub mod interceptor;
pub mod request;
pub mod store;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// The named cache store could not be opened or read
    #[error("Cache open error [{code}]: {message}\nCache: {cache_name}\nSuggestion: {suggestion}")]
    CacheOpen {
        code: &'static str,
        message: String,
        cache_name: String,
        suggestion: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Populating the cache store from the asset list failed
    #[error("Cache populate error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    CachePopulate {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        asset: Option<String>,
        #[source]
        source: Option<Box<CoreError>>,
    },

    /// A live network fetch failed
    #[error("Network fetch error [{code}]: {message}\nURL: {url}")]
    NetworkFetch {
        code: &'static str,
        message: String,
        url: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// Configuration parsing and validation errors
    #[error("Configuration error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Configuration {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        field_name: Option<String>,
    },

    /// File system and I/O errors
    #[error("IO error [{code}]: {message}\nPath: {path:?}\nSuggestion: {suggestion}")]
    Io {
        code: &'static str,
        message: String,
        path: Option<std::path::PathBuf>,
        suggestion: String,
        #[source]
        source: std::io::Error,
    },

    /// Other unexpected errors
    #[error("Internal error [{code}]: {message}\nContext: {context}")]
    Internal {
        code: &'static str,
        message: String,
        context: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a cache open error
    pub fn cache_open<S1, S2, S3>(
        code: &'static str,
        message: S1,
        cache_name: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::CacheOpen {
            code,
            message: message.into(),
            cache_name: cache_name.into(),
            suggestion: suggestion.into(),
            source: None,
        }
    }

    /// Create a cache open error caused by a file system failure
    pub fn cache_open_io<S1, S2>(
        code: &'static str,
        message: S1,
        cache_name: S2,
        source: std::io::Error,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self::CacheOpen {
            code,
            message: message.into(),
            cache_name: cache_name.into(),
            suggestion: "Check permissions and free space in the cache directory".to_string(),
            source: Some(source),
        }
    }

    /// Create a cache populate error
    pub fn cache_populate<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::CachePopulate {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            asset: None,
            source: None,
        }
    }

    /// Create a cache populate error for a single asset, wrapping its cause
    pub fn asset_failed<S1, S2>(
        code: &'static str,
        message: S1,
        asset: S2,
        source: Option<CoreError>,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        let asset = asset.into();
        Self::CachePopulate {
            code,
            message: message.into(),
            context: format!("While precaching asset {}", asset),
            suggestion: "Check that every configured asset is reachable from the origin".to_string(),
            asset: Some(asset),
            source: source.map(Box::new),
        }
    }

    /// Create a network fetch error
    pub fn network_fetch<S1, S2>(code: &'static str, message: S1, url: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self::NetworkFetch {
            code,
            message: message.into(),
            url: url.into(),
            source: None,
        }
    }

    /// Create a configuration error
    pub fn configuration<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Configuration {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            field_name: None,
        }
    }

    /// Get the error code for programmatic handling
    pub fn code(&self) -> &'static str {
        match self {
            Self::CacheOpen { code, .. } => code,
            Self::CachePopulate { code, .. } => code,
            Self::NetworkFetch { code, .. } => code,
            Self::Configuration { code, .. } => code,
            Self::Io { code, .. } => code,
            Self::Internal { code, .. } => code,
        }
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        let code = if err.is_connect() {
            "NETWORK_FETCH_CONNECT"
        } else if err.is_timeout() {
            "NETWORK_FETCH_TIMEOUT"
        } else if err.is_body() || err.is_decode() {
            "NETWORK_FETCH_BODY"
        } else {
            "NETWORK_FETCH_FAILED"
        };

        Self::NetworkFetch {
            code,
            message: err.to_string(),
            url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            source: Some(err),
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        let (code, suggestion) = match err.kind() {
            std::io::ErrorKind::NotFound => (
                "IO_FILE_NOT_FOUND",
                "Check that the file path is correct and the file exists"
            ),
            std::io::ErrorKind::PermissionDenied => (
                "IO_PERMISSION_DENIED",
                "Check file permissions or run with appropriate privileges"
            ),
            std::io::ErrorKind::InvalidData => (
                "IO_INVALID_DATA",
                "The file may be corrupted or in an unexpected format"
            ),
            _ => (
                "IO_UNKNOWN",
                "Check the file system and try the operation again"
            ),
        };

        Self::Io {
            code,
            message: err.to_string(),
            path: None,
            suggestion: suggestion.to_string(),
            source: err,
        }
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal {
            code: "INTERNAL_UNKNOWN",
            message: err.to_string(),
            context: "An unexpected error occurred".to_string(),
            source: Some(err),
        }
    }
}

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        assets::AssetList,
        fetch::{HttpFetcher, NetworkFetch, OfflineFetcher},
        installer::{on_install, populate, CacheInstaller, InstallReport},
        interceptor::{on_fetch, FetchInterceptor, FetchOutcome, InterceptorStats, ResponseSource},
        request::{CacheRequest, CachedResponse, RequestKey},
        store::{CacheStorage, CacheStore, DiskCacheStorage, MemoryCacheStorage},
        CoreError, Result, DEFAULT_CACHE_NAME,
    };
}
