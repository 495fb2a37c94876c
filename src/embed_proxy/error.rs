use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

pub type EmbedResult<T> = Result<T, EmbedError>;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("Home Assistant upstream is not configured (set HA_URL and HA_TOKEN)")]
    ConfigurationMissing,

    #[error("invalid upstream URL: {0}")]
    InvalidUpstreamUrl(#[from] url::ParseError),

    #[error("upstream URL cannot carry a path: {0}")]
    UnsupportedUpstreamUrl(String),

    #[error("failed to reach upstream: {0}")]
    UpstreamUnavailable(#[from] reqwest::Error),

    #[error("upstream did not respond within {0:?}")]
    UpstreamTimeout(Duration),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(reqwest::Error),

    #[error("upstream responded with status {0}")]
    UpstreamStatus(StatusCode),

    #[error("failed to read request body: {0}")]
    InvalidRequestBody(String),

    #[error("failed to compile rewrite rule: {0}")]
    Rewriter(#[from] regex::Error),
}

impl EmbedError {
    pub fn status(&self) -> StatusCode {
        match self {
            EmbedError::UpstreamStatus(status) => *status,
            EmbedError::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            EmbedError::ConfigurationMissing => "configuration_missing",
            EmbedError::InvalidUpstreamUrl(_) | EmbedError::UnsupportedUpstreamUrl(_) => {
                "invalid_upstream_url"
            }
            EmbedError::UpstreamUnavailable(_) | EmbedError::UpstreamTimeout(_) => {
                "upstream_unavailable"
            }
            EmbedError::UpstreamStatus(_) => "upstream_status",
            EmbedError::InvalidRequestBody(_) => "invalid_request_body",
            EmbedError::HttpClient(_) => "http_client",
            EmbedError::Rewriter(_) => "rewriter",
        }
    }

    /// Message returned to the browser. Transport errors stay generic so
    /// upstream addresses do not leak into the page.
    fn public_message(&self) -> String {
        match self {
            EmbedError::UpstreamUnavailable(_) | EmbedError::UpstreamTimeout(_) => {
                "Failed to reach upstream".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IntoResponse for EmbedError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.public_message(),
            code: Some(self.code().to_string()),
        };
        let mut response = (self.status(), Json(body)).into_response();
        apply_cors(response.headers_mut());
        response
    }
}

pub(crate) fn apply_cors(headers: &mut HeaderMap) {
    headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
}
