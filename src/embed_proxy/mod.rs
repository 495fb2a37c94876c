//! Embedding proxy for the Home Assistant dashboard.
//!
//! Architecture:
//! - Browser → `/api/ha/dashboard` → upstream HTML, rewritten + bootstrap
//! - Bootstrap → registers `/ha-embed-sw.js`, publishes `hassTokens`/`hassUrl`
//! - Browser/service worker → `/api/ha/proxy/*` → upstream asset (bearer attached)
//! - Embedded login → `/auth/authorize` → 302 to upstream
//!
//! The only shared state is the immutable [`EmbedConfig`] and one HTTP client.

mod asset_proxy;
mod auth_bridge;
mod bootstrap;
pub mod config;
mod dashboard;
pub mod error;
pub mod interception;
pub mod paths;
pub mod rewrite;
mod service_worker;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{any, get};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::warn;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

pub use asset_proxy::asset_proxy;
pub use auth_bridge::auth_bridge;
pub use bootstrap::render_bootstrap_script;
pub use config::{EmbedConfig, UpstreamTarget};
pub use dashboard::{dashboard, render_dashboard, DashboardParams};
pub use error::{EmbedError, EmbedResult, ErrorResponse};
pub use interception::{decide, Destination, InterceptionDecision};
pub use rewrite::{DocumentRewriter, RewriteStats};
pub use service_worker::{render_service_worker, service_worker};

use paths::{AUTH_AUTHORIZE_PATH, DASHBOARD_PATH, PROXY_MOUNT, SERVICE_WORKER_PATH};

struct StateInner {
    upstream: Option<UpstreamTarget>,
    client: reqwest::Client,
    rewriter: DocumentRewriter,
    max_body_bytes: usize,
    request_timeout: Duration,
}

/// Shared, read-only state for every embedding handler.
#[derive(Clone)]
pub struct EmbedProxyState {
    inner: Arc<StateInner>,
}

impl EmbedProxyState {
    pub fn new(config: EmbedConfig) -> EmbedResult<Self> {
        // No whole-exchange timeout: streamed bodies may outlive it. Body
        // stalls are bounded per read instead.
        let client = reqwest::Client::builder()
            .read_timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(EmbedError::HttpClient)?;
        if config.upstream.is_none() {
            warn!("Home Assistant upstream not configured; proxy endpoints will return 500");
        }
        Ok(Self {
            inner: Arc::new(StateInner {
                upstream: config.upstream,
                client,
                rewriter: DocumentRewriter::new(PROXY_MOUNT)?,
                max_body_bytes: config.max_body_bytes,
                request_timeout: config.request_timeout,
            }),
        })
    }

    /// The configured upstream, or [`EmbedError::ConfigurationMissing`].
    pub fn upstream(&self) -> EmbedResult<&UpstreamTarget> {
        self.inner
            .upstream
            .as_ref()
            .ok_or(EmbedError::ConfigurationMissing)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.inner.client
    }

    pub fn rewriter(&self) -> &DocumentRewriter {
        &self.inner.rewriter
    }

    pub fn max_body_bytes(&self) -> usize {
        self.inner.max_body_bytes
    }

    /// Send `request`, giving the upstream `request_timeout` to answer with
    /// a status line and headers.
    pub(crate) async fn send_upstream(
        &self,
        request: reqwest::RequestBuilder,
    ) -> EmbedResult<reqwest::Response> {
        let deadline = self.inner.request_timeout;
        match tokio::time::timeout(deadline, request.send()).await {
            Ok(response) => Ok(response?),
            Err(_) => Err(EmbedError::UpstreamTimeout(deadline)),
        }
    }
}

/// Health check endpoint response.
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    upstream_configured: bool,
}

/// Health check handler.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Server is healthy", body = HealthResponse)),
    tag = "health"
)]
async fn health(
    axum::extract::State(state): axum::extract::State<EmbedProxyState>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        upstream_configured: state.upstream().is_ok(),
    })
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ha-embed-proxy",
        description = "Same-origin proxy embedding a Home Assistant dashboard: asset proxy, \
            rewritten dashboard document, service-worker interceptor and authorize relay.",
        version = "0.0.1"
    ),
    paths(
        health,
        asset_proxy::asset_proxy,
        dashboard::dashboard,
        service_worker::service_worker,
        auth_bridge::auth_bridge,
    ),
    components(schemas(HealthResponse, ErrorResponse)),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "proxy", description = "Upstream asset proxy"),
        (name = "dashboard", description = "Rewritten dashboard and its interceptor"),
        (name = "auth", description = "Upstream authorize relay")
    )
)]
pub struct ApiDoc;

pub fn build_router(state: EmbedProxyState) -> Router {
    let body_limit = state.max_body_bytes();
    let swagger_routes: Router<EmbedProxyState> =
        SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()).into();

    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route(&format!("{PROXY_MOUNT}/{{*path}}"), any(asset_proxy))
        .route(DASHBOARD_PATH, get(dashboard))
        .route(SERVICE_WORKER_PATH, get(service_worker))
        .route(AUTH_AUTHORIZE_PATH, get(auth_bridge))
        .merge(swagger_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
