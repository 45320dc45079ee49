//! Cache-first handling of every non-administrative request

use crate::{
    error::{ServerError, ServerResult},
    server::ServerState,
};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{
        header::{self, HeaderMap, HeaderName, HeaderValue},
        Method, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
};
use precache_core::{interceptor::FetchOutcome, request::CacheRequest};
use url::Url;

/// Response header telling whether the body came from the cache
pub const CACHE_STATUS_HEADER: &str = "x-precache";

/// Connection-level headers that must not be forwarded
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Map the incoming path and query onto the upstream origin
fn upstream_url(origin: &Url, uri: &Uri) -> Url {
    let mut url = origin.clone();
    url.set_path(uri.path());
    url.set_query(uri.query());
    url
}

/// Map a body that could not be buffered onto a server error.
///
/// The body limit is set on the router with `DefaultBodyLimit`.
fn body_error(rejection: BytesRejection, limit: usize) -> ServerError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge(format!("limit is {} bytes", limit))
    } else {
        ServerError::InvalidRequest(rejection.body_text())
    }
}

/// Fallback handler: answer from the cache store or fetch from upstream
pub async fn intercept(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    mut headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ServerResult<Response> {
    let body = body.map_err(|rejection| body_error(rejection, state.config.upstream.max_body_size))?;

    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);

    let request = CacheRequest {
        method,
        url: upstream_url(&state.config.upstream.origin, &uri),
        headers,
        body,
    };

    let outcome = state.interceptor.handle(&request).await?;
    Ok(into_http_response(outcome))
}

fn into_http_response(outcome: FetchOutcome) -> Response {
    let FetchOutcome { response, source } = outcome;

    let mut headers = response.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::CONTENT_LENGTH);
    headers.insert(
        HeaderName::from_static(CACHE_STATUS_HEADER),
        HeaderValue::from_static(source.as_str()),
    );

    (response.status, headers, response.body).into_response()
}
