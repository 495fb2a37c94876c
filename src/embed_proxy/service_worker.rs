use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use super::interception::{ASSET_DESTINATIONS, RESOURCE_DESTINATIONS};
use super::paths::{API_PREFIX, AUTH_PREFIX, PROXY_MOUNT, RESOURCE_EXTENSIONS, UPSTREAM_PREFIXES};

/// Interceptor source with its classification tables left as placeholders.
const SERVICE_WORKER_TEMPLATE: &str = include_str!("../../assets/ha-embed-sw.js");

fn js_literal<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// The interceptor script with its tables filled from the server's own
/// constants, so the browser classifies fetches exactly as the rewriter does.
pub fn render_service_worker() -> String {
    let upstream_prefixes: Vec<String> = UPSTREAM_PREFIXES
        .iter()
        .map(|prefix| format!("/{prefix}"))
        .collect();
    SERVICE_WORKER_TEMPLATE
        .replace("__HA_EMBED_PROXY_PREFIX__", &js_literal(PROXY_MOUNT))
        .replace("__HA_EMBED_AUTH_PREFIX__", &js_literal(AUTH_PREFIX))
        .replace("__HA_EMBED_API_PREFIX__", &js_literal(API_PREFIX))
        .replace(
            "__HA_EMBED_RESOURCE_EXTENSIONS__",
            &js_literal(RESOURCE_EXTENSIONS),
        )
        .replace("__HA_EMBED_UPSTREAM_PREFIXES__", &js_literal(&upstream_prefixes))
        .replace(
            "__HA_EMBED_ASSET_DESTINATIONS__",
            &js_literal(ASSET_DESTINATIONS),
        )
        .replace(
            "__HA_EMBED_RESOURCE_DESTINATIONS__",
            &js_literal(RESOURCE_DESTINATIONS),
        )
}

/// Serve the interceptor with root scope allowed and caching disabled so a new
/// deploy is picked up on the next registration.
#[utoipa::path(
    get,
    path = "/ha-embed-sw.js",
    responses((status = 200, description = "Service worker script", content_type = "application/javascript")),
    tag = "dashboard"
)]
pub async fn service_worker() -> Response {
    (
        StatusCode::OK,
        [
            (
                CONTENT_TYPE,
                HeaderValue::from_static("application/javascript; charset=utf-8"),
            ),
            (
                CACHE_CONTROL,
                HeaderValue::from_static("no-cache, no-store, must-revalidate"),
            ),
        ],
        [("Service-Worker-Allowed", "/")],
        render_service_worker(),
    )
        .into_response()
}
