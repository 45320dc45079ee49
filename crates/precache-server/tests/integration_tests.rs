//! Integration tests for precache-server
//!
//! These tests boot the server against an injected network, then drive the
//! router directly to verify cache hits, misses and failure pass-through.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use precache_core::{
    assets::AssetList,
    fetch::NetworkFetch,
    request::{CacheRequest, CachedResponse},
    store::{CacheStorage, DiskCacheStorage, MemoryCacheStorage},
    CoreError,
};
use precache_server::{
    config::ServerConfig,
    server::{create_router, PrecacheServer},
};

/// Upstream stand-in that records every request it receives
#[derive(Default)]
struct UpstreamSpy {
    routes: HashMap<String, &'static str>,
    refuse_all: bool,
    seen: Mutex<Vec<(Method, String)>>,
}

impl UpstreamSpy {
    fn with_routes(routes: &[(&str, &'static str)]) -> Self {
        Self {
            routes: routes.iter().map(|(p, b)| (p.to_string(), *b)).collect(),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<(Method, String)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl NetworkFetch for UpstreamSpy {
    async fn fetch(&self, request: &CacheRequest) -> precache_core::Result<CachedResponse> {
        self.seen
            .lock()
            .unwrap()
            .push((request.method.clone(), request.url.to_string()));

        if self.refuse_all {
            return Err(CoreError::network_fetch(
                "NETWORK_FETCH_CONNECT",
                "Connection refused",
                request.url.as_str(),
            ));
        }

        Ok(match self.routes.get(request.url.path()) {
            Some(body) => CachedResponse::ok(*body),
            None => CachedResponse::new(StatusCode::NOT_FOUND, "upstream 404"),
        })
    }
}

fn config_with_assets(assets: &[&str]) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.cache.assets = AssetList::new(assets.iter().copied());
    config
}

async fn boot(config: ServerConfig, storage: Arc<dyn CacheStorage>, net: Arc<UpstreamSpy>) -> Router {
    let server = PrecacheServer::with_components(config, storage, net)
        .await
        .expect("install should succeed");
    create_router(server.state().clone())
}

async fn send(router: Router, method: Method, uri: &str) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    router.oneshot(request).await.unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn test_precached_asset_served_without_upstream() {
    let spy = Arc::new(UpstreamSpy::with_routes(&[("/app.js", "console.log('app')")]));
    let router = boot(
        config_with_assets(&["/app.js"]),
        Arc::new(MemoryCacheStorage::new()),
        spy.clone(),
    )
    .await;
    let installs = spy.calls().len();
    assert_eq!(installs, 1);

    let response = send(router, Method::GET, "/app.js").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-precache"], "hit");
    assert_eq!(body_bytes(response).await, b"console.log('app')");

    assert_eq!(spy.calls().len(), installs);
}

#[tokio::test]
async fn test_miss_is_fetched_once_and_passed_through() {
    let spy = Arc::new(UpstreamSpy::with_routes(&[("/unknown.png", "png")]));
    let router = boot(ServerConfig::default(), Arc::new(MemoryCacheStorage::new()), spy.clone()).await;

    let response = send(router.clone(), Method::GET, "/unknown.png?size=2").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-precache"], "miss");
    assert_eq!(body_bytes(response).await, b"png");

    assert_eq!(
        spy.calls(),
        vec![(Method::GET, "http://127.0.0.1:8000/unknown.png?size=2".to_string())]
    );

    // Misses are not stored, so a repeat goes upstream again.
    let response = send(router, Method::GET, "/unknown.png?size=2").await;
    assert_eq!(response.headers()["x-precache"], "miss");
    assert_eq!(spy.calls().len(), 2);
}

#[tokio::test]
async fn test_upstream_error_status_is_not_rewritten() {
    let spy = Arc::new(UpstreamSpy::default());
    let router = boot(ServerConfig::default(), Arc::new(MemoryCacheStorage::new()), spy.clone()).await;

    let response = send(router, Method::GET, "/nope.html").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_bytes(response).await, b"upstream 404");
}

#[tokio::test]
async fn test_refused_connection_becomes_bad_gateway() {
    let spy = Arc::new(UpstreamSpy {
        refuse_all: true,
        ..Default::default()
    });
    let router = boot(ServerConfig::default(), Arc::new(MemoryCacheStorage::new()), spy.clone()).await;

    let response = send(router, Method::GET, "/unknown.png").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let json: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["error"]["type"], "network_error");
    assert_eq!(json["error"]["error_code"], "NETWORK_FETCH_CONNECT");
    assert_eq!(spy.calls().len(), 1);
}

#[tokio::test]
async fn test_failed_install_aborts_startup() {
    let spy = Arc::new(UpstreamSpy::with_routes(&[("/index.html", "<html>")]));
    let storage = Arc::new(MemoryCacheStorage::new());

    let result = PrecacheServer::with_components(
        config_with_assets(&["./index.html", "./model_checker_ui_bg.wasm"]),
        storage.clone(),
        spy,
    )
    .await;

    let err = result.err().expect("install must fail");
    assert!(err.to_string().contains("CACHE_POPULATE_BAD_STATUS"));

    let cache = storage.open("model_checker_ui-pwa").await.unwrap();
    assert_eq!(cache.len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_install() {
    let spy = Arc::new(UpstreamSpy::default());
    let mut config = ServerConfig::default();
    config.cache.name = String::new();

    let result = PrecacheServer::with_components(config, Arc::new(MemoryCacheStorage::new()), spy.clone()).await;
    assert!(result.is_err());
    assert!(spy.calls().is_empty());
}

#[tokio::test]
async fn test_health_and_cache_listing() {
    let spy = Arc::new(UpstreamSpy::with_routes(&[("/", "root"), ("/index.html", "<html>")]));
    let router = boot(
        config_with_assets(&["./", "./index.html"]),
        Arc::new(MemoryCacheStorage::new()),
        spy,
    )
    .await;

    let response = send(router.clone(), Method::GET, "/_precache/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["cache"], "model_checker_ui-pwa");

    send(router.clone(), Method::GET, "/index.html").await;

    let response = send(router, Method::GET, "/_precache/cache").await;
    let json: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["entries"], 2);
    assert_eq!(json["installed"], 2);
    assert_eq!(json["stats"]["hits"], 1);
    assert_eq!(
        json["keys"],
        serde_json::json!(["GET http://127.0.0.1:8000/", "GET http://127.0.0.1:8000/index.html"])
    );
}

#[tokio::test]
async fn test_disk_cache_serves_after_restart_while_offline() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config_with_assets(&["/app.js"]);
    config.cache.dir = Some(tmp.path().to_path_buf());

    let online = Arc::new(UpstreamSpy::with_routes(&[("/app.js", "js")]));
    let first = boot(config.clone(), Arc::new(DiskCacheStorage::new(tmp.path())), online.clone()).await;
    let response = send(first, Method::GET, "/app.js").await;
    assert_eq!(response.headers()["x-precache"], "hit");
    assert_eq!(online.calls().len(), 1);

    // Second start: no assets to install, upstream unreachable.
    config.cache.assets = AssetList::default();
    let offline = Arc::new(UpstreamSpy {
        refuse_all: true,
        ..Default::default()
    });
    let router = boot(config, Arc::new(DiskCacheStorage::new(tmp.path())), offline.clone()).await;

    let response = send(router.clone(), Method::GET, "/app.js").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"js");

    let response = send(router, Method::GET, "/other.js").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(offline.calls().len(), 1);
}

#[tokio::test]
async fn test_request_body_limit_and_broken_bodies() {
    let spy = Arc::new(UpstreamSpy::default());
    let mut config = ServerConfig::default();
    config.upstream.max_body_size = 4;
    let router = boot(config, Arc::new(MemoryCacheStorage::new()), spy.clone()).await;

    let post = |body: Body| {
        Request::builder()
            .method(Method::POST)
            .uri("/submit")
            .body(body)
            .unwrap()
    };

    let response = router.clone().oneshot(post(Body::from("ok"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-precache"], "miss");

    let response = router
        .clone()
        .oneshot(post(Body::from("more than four bytes")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["error"]["type"], "payload_too_large");

    let broken = futures::stream::iter(vec![
        Ok::<_, std::io::Error>(Bytes::from_static(b"ab")),
        Err(std::io::Error::other("connection reset")),
    ]);
    let response = router.oneshot(post(Body::from_stream(broken))).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["error"]["type"], "invalid_request");

    assert_eq!(
        spy.calls(),
        vec![(Method::POST, "http://127.0.0.1:8000/submit".to_string())]
    );
}
