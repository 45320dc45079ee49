//! Health check handlers

use crate::{error::ServerResult, server::ServerState};
use axum::{extract::State, Json};
use serde_json::{json, Value};

/// Basic health check
pub async fn health_check(State(state): State<ServerState>) -> ServerResult<Json<Value>> {
    Ok(Json(json!({
        "status": "ok",
        "service": "precache-server",
        "version": crate::VERSION,
        "cache": state.install.cache_name,
        "offline": state.config.upstream.offline,
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}
