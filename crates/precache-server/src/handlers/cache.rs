//! Cache inspection handlers

use crate::{error::ServerResult, server::ServerState};
use axum::{extract::State, Json};
use serde_json::{json, Value};

/// Describe the cache store behind the interceptor
pub async fn cache_info(State(state): State<ServerState>) -> ServerResult<Json<Value>> {
    let store = state.interceptor.store();
    let keys: Vec<String> = store
        .keys()
        .await?
        .into_iter()
        .map(|key| key.to_string())
        .collect();

    Ok(Json(json!({
        "name": store.name(),
        "entries": keys.len(),
        "keys": keys,
        "installed": state.install.stored.len(),
        "stats": state.interceptor.stats(),
    })))
}
