//! Process-wide embedding configuration.
//!
//! Built once at startup and passed into [`EmbedProxyState`](super::EmbedProxyState).
//! Request handlers never consult the environment.

use std::fmt;
use std::time::Duration;

use url::Url;

use super::error::{EmbedError, EmbedResult};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Upstream Home Assistant base URL and the bearer credential used for it.
#[derive(Clone)]
pub struct UpstreamTarget {
    base_url: Url,
    token: String,
}

impl UpstreamTarget {
    pub fn new(base_url: &str, token: impl Into<String>) -> EmbedResult<Self> {
        let base_url = Url::parse(base_url.trim())?;
        if base_url.cannot_be_a_base() || base_url.host_str().is_none() {
            return Err(EmbedError::UnsupportedUpstreamUrl(base_url.to_string()));
        }
        Ok(Self {
            base_url,
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Base URL as the embedded frontend expects it: origin plus any path
    /// prefix, without a trailing slash.
    pub fn base_url_string(&self) -> String {
        self.base_url.as_str().trim_end_matches('/').to_string()
    }

    pub fn bearer_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// `host[:port]` of the upstream, used for WebSocket literals.
    pub fn authority(&self) -> String {
        let host = self.base_url.host_str().unwrap_or_default();
        match self.base_url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    pub fn websocket_scheme(&self) -> &'static str {
        match self.base_url.scheme() {
            "https" => "wss",
            _ => "ws",
        }
    }
}

impl fmt::Debug for UpstreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamTarget")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct EmbedConfig {
    /// `None` keeps the server running; every upstream-bound endpoint then
    /// answers with a configuration error.
    pub upstream: Option<UpstreamTarget>,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_body_bytes: usize,
}

impl EmbedConfig {
    pub fn new(upstream: Option<UpstreamTarget>) -> Self {
        Self {
            upstream,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self::new(None)
    }
}
