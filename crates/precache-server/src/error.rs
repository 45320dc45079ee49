//! Error types for the precache server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use precache_core::CoreError;
use serde_json::json;
use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request body too large: {0}")]
    PayloadTooLarge(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, error_type, suggestion) = match &self {
            ServerError::Core(core_err) => Self::map_core_error(core_err),
            ServerError::InvalidRequest(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request",
                "Check the request format",
            ),
            ServerError::PayloadTooLarge(_) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                "Reduce the request body size",
            ),
            ServerError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                "Contact system administrator - server configuration issue",
            ),
            ServerError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "io_error",
                "Check file system permissions and disk space",
            ),
            ServerError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_server_error",
                "Contact support if this error persists",
            ),
        };

        let mut error_response = json!({
            "error": {
                "type": error_type,
                "message": self.to_string(),
                "code": status.as_u16(),
                "suggestion": suggestion,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        });

        if let ServerError::Core(core_err) = &self {
            error_response["error"]["error_code"] = json!(core_err.code());
        }

        (status, Json(error_response)).into_response()
    }
}

impl ServerError {
    /// Map core errors to HTTP status by error code family
    fn map_core_error(core_err: &CoreError) -> (StatusCode, &'static str, &'static str) {
        match core_err.code() {
            code if code.starts_with("NETWORK_FETCH_") => (
                StatusCode::BAD_GATEWAY,
                "network_error",
                "The resource is not cached and the upstream could not be reached",
            ),
            code if code.starts_with("CACHE_") => (
                StatusCode::SERVICE_UNAVAILABLE,
                "cache_error",
                "Clear the cache directory or restart the service",
            ),
            code if code.starts_with("CONFIG_") => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                "Contact system administrator - configuration issue",
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "core_error",
                "An error occurred while handling the request",
            ),
        }
    }
}
