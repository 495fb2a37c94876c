//! Relays the upstream authorize hand-off so the embedded login flow works
//! unmodified.

use axum::extract::State;
use axum::http::header::LOCATION;
use axum::http::{HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use super::error::{EmbedError, EmbedResult};
use super::paths::{upstream_url, AUTH_AUTHORIZE_PATH};
use super::EmbedProxyState;

fn authorize_location(state: &EmbedProxyState, query: Option<&str>) -> EmbedResult<HeaderValue> {
    let upstream = state.upstream()?;
    let target = upstream_url(upstream.base_url(), AUTH_AUTHORIZE_PATH, query)?;
    HeaderValue::from_str(target.as_str())
        .map_err(|_| EmbedError::UnsupportedUpstreamUrl(target.to_string()))
}

/// Redirect to the upstream authorize endpoint with the original query.
#[utoipa::path(
    get,
    path = "/auth/authorize",
    responses(
        (status = 302, description = "Redirect to the upstream authorize endpoint"),
        (status = 500, description = "Upstream not configured", body = super::error::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn auth_bridge(State(state): State<EmbedProxyState>, uri: Uri) -> Response {
    match authorize_location(&state, uri.query()) {
        Ok(location) => {
            debug!(location = ?location, "Relaying authorize request upstream");
            (StatusCode::FOUND, [(LOCATION, location)]).into_response()
        }
        Err(error) => {
            warn!(error = %error, "Authorize relay failed");
            error.into_response()
        }
    }
}
