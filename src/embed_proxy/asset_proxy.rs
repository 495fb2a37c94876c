//! Static asset proxy mounted at [`PROXY_MOUNT`].
//!
//! Forwards any method to the upstream with the configured bearer credential
//! and a fixed header allow-list. Response bodies are streamed through
//! untouched; non-success bodies are dropped.

use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{
    ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE,
    REFERER, USER_AGENT,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use super::error::{apply_cors, EmbedError, EmbedResult};
use super::paths::{translate_asset_path, upstream_url, PROXY_MOUNT};
use super::EmbedProxyState;

pub(crate) const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; ha-embed-proxy)";
const DEFAULT_ACCEPT: &str = "*/*";
const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
const ERROR_SNIPPET_BYTES: usize = 200;

/// Response headers never relayed to the browser.
const DROPPED_RESPONSE_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
    "content-encoding",
    "set-cookie",
];

fn apply_preflight_cors(headers: &mut HeaderMap) {
    apply_cors(headers);
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, POST, PUT, PATCH, DELETE, OPTIONS"),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    headers.insert("Access-Control-Max-Age", HeaderValue::from_static("86400"));
}

fn preflight_response() -> Response {
    let mut response = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::NO_CONTENT.into_response());
    apply_preflight_cors(response.headers_mut());
    response
}

fn header_or(inbound: &HeaderMap, name: HeaderName, default: &'static str) -> HeaderValue {
    inbound
        .get(&name)
        .filter(|value| !value.is_empty())
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(default))
}

/// The HTTP client only decodes gzip, and encodings are not relayed to the
/// browser, so anything else is narrowed to `identity`.
fn negotiated_accept_encoding(inbound: Option<&HeaderValue>) -> HeaderValue {
    let Some(value) = inbound.and_then(|value| value.to_str().ok()) else {
        return HeaderValue::from_static("gzip");
    };
    let accepts_gzip = value.split(',').any(|item| {
        let coding = item.split(';').next().unwrap_or(item).trim();
        coding.eq_ignore_ascii_case("gzip") || coding == "*"
    });
    if accepts_gzip || value.trim().is_empty() {
        HeaderValue::from_static("gzip")
    } else {
        HeaderValue::from_static("identity")
    }
}

/// Outbound request headers. Client `Authorization`, cookies and host are
/// never copied; the credential is attached separately.
pub(crate) fn outbound_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, header_or(inbound, USER_AGENT, DEFAULT_USER_AGENT));
    headers.insert(ACCEPT, header_or(inbound, ACCEPT, DEFAULT_ACCEPT));
    headers.insert(
        ACCEPT_LANGUAGE,
        header_or(inbound, ACCEPT_LANGUAGE, DEFAULT_ACCEPT_LANGUAGE),
    );
    headers.insert(
        ACCEPT_ENCODING,
        negotiated_accept_encoding(inbound.get(ACCEPT_ENCODING)),
    );
    if let Some(referer) = inbound.get(REFERER) {
        headers.insert(REFERER, referer.clone());
    }
    headers
}

fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

fn passthrough_headers(upstream: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in upstream {
        if DROPPED_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

fn error_snippet(bytes: &[u8]) -> String {
    let end = bytes.len().min(ERROR_SNIPPET_BYTES);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Proxy any method under `/api/ha/proxy/*` to the upstream.
#[utoipa::path(
    method(get, post, put, patch, delete, options, head),
    path = "/api/ha/proxy/{path}",
    params(("path" = String, Path, description = "Upstream asset path")),
    responses(
        (status = 200, description = "Upstream asset, streamed unchanged"),
        (status = 204, description = "CORS preflight ok"),
        (status = 500, description = "Upstream not configured or unreachable", body = super::error::ErrorResponse)
    ),
    tag = "proxy"
)]
pub async fn asset_proxy(
    State(state): State<EmbedProxyState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    if method == Method::OPTIONS {
        return preflight_response();
    }

    let captured = uri.path().strip_prefix(PROXY_MOUNT).unwrap_or(uri.path());
    match forward(&state, method, captured, uri.query(), &headers, body).await {
        Ok(response) => response,
        Err(error) => {
            warn!(path = %captured, error = %error, "asset proxy request failed");
            error.into_response()
        }
    }
}

async fn forward(
    state: &EmbedProxyState,
    method: Method,
    captured: &str,
    query: Option<&str>,
    headers: &HeaderMap,
    body: Body,
) -> EmbedResult<Response> {
    let upstream = state.upstream()?;
    let relative = translate_asset_path(captured);
    let target = upstream_url(upstream.base_url(), &relative, query)?;

    let mut request = state
        .client()
        .request(method.clone(), target.clone())
        .headers(outbound_headers(headers))
        .header(AUTHORIZATION, upstream.bearer_value());

    if carries_body(&method) {
        let bytes = axum::body::to_bytes(body, state.max_body_bytes())
            .await
            .map_err(|err| EmbedError::InvalidRequestBody(err.to_string()))?;
        let content_type = headers
            .get(CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("application/json"));
        request = request.header(CONTENT_TYPE, content_type).body(bytes);
    }

    debug!(method = %method, target_url = %target, "Proxying asset request");

    let start = Instant::now();
    let mut upstream_response = state.send_upstream(request).await?;
    let status = upstream_response.status();

    debug!(
        status = status.as_u16(),
        elapsed_ms = start.elapsed().as_millis(),
        "Upstream asset response received"
    );

    if !status.is_success() {
        let forwarded = passthrough_headers(upstream_response.headers());
        // Only the first chunk is read; the rest of the body is dropped.
        let snippet = match upstream_response.chunk().await {
            Ok(Some(chunk)) => error_snippet(&chunk),
            _ => String::new(),
        };
        warn!(
            status = status.as_u16(),
            target_url = %target,
            snippet = %snippet,
            "Upstream returned non-success status"
        );
        let mut response = Response::new(Body::empty());
        *response.status_mut() = status;
        response.headers_mut().extend(forwarded);
        apply_cors(response.headers_mut());
        return Ok(response);
    }

    let mut response = Response::builder().status(status);
    for name in [CONTENT_TYPE, CACHE_CONTROL] {
        if let Some(value) = upstream_response.headers().get(&name) {
            response = response.header(name, value.clone());
        }
    }
    let mut response = response
        .body(Body::from_stream(upstream_response.bytes_stream()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
    apply_cors(response.headers_mut());
    Ok(response)
}
