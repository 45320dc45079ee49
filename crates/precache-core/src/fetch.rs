//! Network access used on cache misses and during install

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::request::{CacheRequest, CachedResponse};
use crate::{CoreError, Result};

/// A live network fetch.
///
/// Any HTTP status is a successful fetch; only transport failures are errors.
#[async_trait]
pub trait NetworkFetch: Send + Sync {
    async fn fetch(&self, request: &CacheRequest) -> Result<CachedResponse>;
}

/// Fetches over HTTP with `reqwest`
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                CoreError::configuration(
                    "CONFIG_HTTP_CLIENT",
                    format!("Failed to build HTTP client: {}", e),
                    "Creating the upstream HTTP client",
                    "Check the TLS setup of this host",
                )
            })?;
        Ok(Self { client })
    }

    /// Use an already configured client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NetworkFetch for HttpFetcher {
    async fn fetch(&self, request: &CacheRequest) -> Result<CachedResponse> {
        debug!("Fetching {} {}", request.method, request.url);

        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| {
                warn!("Network fetch of {} failed: {}", request.url, e);
                CoreError::from(e)
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(CachedResponse { status, headers, body })
    }
}

/// A network that is never reachable; every fetch fails
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFetcher;

#[async_trait]
impl NetworkFetch for OfflineFetcher {
    async fn fetch(&self, request: &CacheRequest) -> Result<CachedResponse> {
        Err(CoreError::network_fetch(
            "NETWORK_FETCH_OFFLINE",
            "Network unreachable: running offline",
            request.url.as_str(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderName, HeaderValue, Method, StatusCode};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::task::JoinHandle;
    use url::Url;

    /// Serve one connection with a canned reply; the handle yields the raw request
    async fn canned_upstream(reply: &'static str) -> (Url, JoinHandle<String>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                if let Some(end) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&raw[..end]).to_lowercase();
                    let len = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .map(|v| v.trim().parse::<usize>().unwrap())
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + len {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).into_owned()
        });

        (Url::parse(&format!("http://{}/", addr)).unwrap(), handle)
    }

    #[tokio::test]
    async fn test_offline_fetch_fails() {
        let request = CacheRequest::get(Url::parse("http://localhost:8000/app.js").unwrap());
        let err = OfflineFetcher.fetch(&request).await.unwrap_err();
        assert_eq!(err.code(), "NETWORK_FETCH_OFFLINE");
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Bind and release a port so nothing is listening on it.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("http://127.0.0.1:{}/unknown.png", port)).unwrap();
        let err = fetcher.fetch(&CacheRequest::get(url)).await.unwrap_err();

        assert!(matches!(err, CoreError::NetworkFetch { .. }));
        assert!(err.code().starts_with("NETWORK_FETCH_"));
    }

    #[tokio::test]
    async fn test_request_is_forwarded_and_status_passes_through() {
        let (origin, upstream) = canned_upstream(
            "HTTP/1.1 404 Not Found\r\ncontent-type: text/plain\r\ncontent-length: 7\r\nconnection: close\r\n\r\nmissing",
        )
        .await;

        let request = CacheRequest::new(Method::POST, origin.join("/submit?x=1").unwrap())
            .with_header(HeaderName::from_static("x-client"), HeaderValue::from_static("precache"))
            .with_body("payload");

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let response = fetcher.fetch(&request).await.unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.headers[http::header::CONTENT_TYPE], "text/plain");
        assert_eq!(response.body, "missing");

        let seen = upstream.await.unwrap();
        assert!(seen.starts_with("POST /submit?x=1 HTTP/1.1\r\n"), "{}", seen);
        assert!(seen.to_lowercase().contains("\r\nx-client: precache\r\n"), "{}", seen);
        assert!(seen.ends_with("\r\n\r\npayload"), "{}", seen);
    }

    #[tokio::test]
    async fn test_success_response_is_returned() {
        let (origin, upstream) = canned_upstream(
            "HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok",
        )
        .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let response = fetcher
            .fetch(&CacheRequest::get(origin.join("/app.js").unwrap()))
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(response.body, "ok");
        assert!(upstream.await.unwrap().starts_with("GET /app.js HTTP/1.1\r\n"));
    }
}
