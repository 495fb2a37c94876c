//! Rewritten upstream dashboard document.

use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, USER_AGENT};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use super::asset_proxy::DEFAULT_USER_AGENT;
use super::bootstrap::render_bootstrap_script;
use super::config::UpstreamTarget;
use super::error::{EmbedError, EmbedResult};
use super::paths::SERVICE_WORKER_PATH;
use super::rewrite::{DocumentRewriter, RewriteStats};
use super::EmbedProxyState;

pub const DEFAULT_DASHBOARD: &str = "lovelace";
pub const DEFAULT_VIEW: &str = "default";

/// Query parameters for the dashboard endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct DashboardParams {
    pub dashboard: Option<String>,
    pub view: Option<String>,
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// One fetched document on its way through the rewrite pipeline.
struct RewriteContext {
    dashboard_id: String,
    view_id: String,
    html: String,
}

impl RewriteContext {
    fn rewrite(
        self,
        rewriter: &DocumentRewriter,
        upstream: &UpstreamTarget,
    ) -> (String, RewriteStats) {
        let bootstrap = render_bootstrap_script(upstream, SERVICE_WORKER_PATH);
        let (html, stats) = rewriter.rewrite_document(
            &self.html,
            upstream.websocket_scheme(),
            &upstream.authority(),
            &bootstrap,
        );
        if stats.references() == 0 {
            debug!(
                dashboard = %self.dashboard_id,
                view = %self.view_id,
                "No root-relative references found in dashboard document"
            );
        }
        if !stats.bootstrap_injected {
            warn!(
                dashboard = %self.dashboard_id,
                view = %self.view_id,
                "Dashboard document has no <head>; bootstrap prepended"
            );
        }
        info!(
            dashboard = %self.dashboard_id,
            view = %self.view_id,
            link_hrefs = stats.link_hrefs,
            hrefs = stats.hrefs,
            script_srcs = stats.script_srcs,
            srcs = stats.srcs,
            css_urls = stats.css_urls,
            websocket_hosts = stats.websocket_hosts,
            "Rewrote dashboard document"
        );
        (html, stats)
    }
}

fn dashboard_url(base: &Url, dashboard_id: &str, view_id: &str) -> EmbedResult<Url> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| EmbedError::UnsupportedUpstreamUrl(base.to_string()))?;
        segments.pop_if_empty().push(dashboard_id).push(view_id);
    }
    Ok(url)
}

/// Fetch `{base}/{dashboard}/{view}` and run it through the rewriter.
pub async fn render_dashboard(
    state: &EmbedProxyState,
    dashboard_id: String,
    view_id: String,
    user_agent: Option<&HeaderValue>,
) -> EmbedResult<(String, RewriteStats)> {
    let upstream = state.upstream()?;
    let target = dashboard_url(upstream.base_url(), &dashboard_id, &view_id)?;
    let user_agent = user_agent
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_USER_AGENT));

    debug!(target_url = %target, "Fetching dashboard document");

    let start = Instant::now();
    let request = state
        .client()
        .get(target.clone())
        .header(AUTHORIZATION, upstream.bearer_value())
        .header(USER_AGENT, user_agent);
    let response = state.send_upstream(request).await?;
    let status = response.status();
    debug!(
        status = status.as_u16(),
        elapsed_ms = start.elapsed().as_millis(),
        "Dashboard document response received"
    );
    if !status.is_success() {
        warn!(status = status.as_u16(), target_url = %target, "Dashboard fetch failed");
        return Err(EmbedError::UpstreamStatus(status));
    }

    let context = RewriteContext {
        dashboard_id,
        view_id,
        html: response.text().await?,
    };
    Ok(context.rewrite(state.rewriter(), upstream))
}

/// Serve the upstream dashboard rewritten to load through the asset proxy.
#[utoipa::path(
    get,
    path = "/api/ha/dashboard",
    params(
        ("dashboard" = Option<String>, Query, description = "Upstream dashboard id (default lovelace)"),
        ("view" = Option<String>, Query, description = "View within the dashboard (default default)")
    ),
    responses(
        (status = 200, description = "Rewritten dashboard HTML", content_type = "text/html"),
        (status = 500, description = "Upstream not configured or unreachable", body = super::error::ErrorResponse)
    ),
    tag = "dashboard"
)]
pub async fn dashboard(
    State(state): State<EmbedProxyState>,
    Query(params): Query<DashboardParams>,
    headers: HeaderMap,
) -> Response {
    let dashboard_id = non_empty_or(params.dashboard, DEFAULT_DASHBOARD);
    let view_id = non_empty_or(params.view, DEFAULT_VIEW);

    match render_dashboard(&state, dashboard_id, view_id, headers.get(USER_AGENT)).await {
        Ok((html, _stats)) => (
            StatusCode::OK,
            [
                (CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8")),
                (CACHE_CONTROL, HeaderValue::from_static("no-store")),
            ],
            html,
        )
            .into_response(),
        Err(error) => {
            warn!(error = %error, "Dashboard render failed");
            error.into_response()
        }
    }
}
