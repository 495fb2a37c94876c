//! Fetch classification performed by the client network interceptor.
//!
//! The service worker in `assets/ha-embed-sw.js` runs this decision in the
//! browser. The same rules live here so the tables shared with the rewriter
//! stay in one place and the classification can be exercised in tests.

use url::Url;

use super::paths::{
    has_resource_extension, has_upstream_prefix, API_PREFIX, AUTH_PREFIX, PROXY_MOUNT,
};

/// `Request.destination` values the interceptor distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Script,
    Style,
    Font,
    Image,
    Manifest,
    Worker,
    Document,
    Empty,
    Other,
}

impl Destination {
    pub fn parse(value: &str) -> Self {
        match value {
            "script" => Destination::Script,
            "style" => Destination::Style,
            "font" => Destination::Font,
            "image" => Destination::Image,
            "manifest" => Destination::Manifest,
            "worker" | "sharedworker" | "serviceworker" => Destination::Worker,
            "document" | "iframe" | "frame" => Destination::Document,
            "" => Destination::Empty,
            _ => Destination::Other,
        }
    }

    /// Destinations that keep a request under `/api/` classified as an asset.
    fn is_asset_load(self) -> bool {
        matches!(
            self,
            Destination::Script | Destination::Style | Destination::Font | Destination::Image
        )
    }

    fn is_resource(self) -> bool {
        self.is_asset_load() || matches!(self, Destination::Manifest | Destination::Worker)
    }
}

/// `Request.destination` strings treated as asset loads.
pub const ASSET_DESTINATIONS: &[&str] = &["script", "style", "font", "image"];

/// `Request.destination` strings that mark a fetch as a resource on their own.
pub const RESOURCE_DESTINATIONS: &[&str] = &[
    "script",
    "style",
    "font",
    "image",
    "manifest",
    "worker",
    "sharedworker",
    "serviceworker",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptionDecision {
    pub should_proxy: bool,
    pub proxied_url: Option<String>,
}

impl InterceptionDecision {
    fn pass() -> Self {
        Self {
            should_proxy: false,
            proxied_url: None,
        }
    }
}

/// Decide whether a fetch for `url`, issued from a page at `page_origin`,
/// should be re-routed through the asset proxy.
pub fn decide(url: &Url, page_origin: &Url, destination: Destination) -> InterceptionDecision {
    if url.origin() != page_origin.origin() {
        return InterceptionDecision::pass();
    }

    let path = url.path();
    if path == PROXY_MOUNT || path.starts_with(&format!("{PROXY_MOUNT}/")) {
        return InterceptionDecision::pass();
    }
    if path.starts_with(AUTH_PREFIX) {
        return InterceptionDecision::pass();
    }
    let has_extension = has_resource_extension(path);
    if path.starts_with(API_PREFIX) && !has_extension && !destination.is_asset_load() {
        return InterceptionDecision::pass();
    }

    // A `script` destination alone is enough: dynamically imported chunks
    // carry no other hint.
    let is_resource = has_extension || has_upstream_prefix(path) || destination.is_resource();
    if !is_resource {
        return InterceptionDecision::pass();
    }

    let query = url.query().map(|q| format!("?{q}")).unwrap_or_default();
    InterceptionDecision {
        should_proxy: true,
        proxied_url: Some(format!(
            "{}{PROXY_MOUNT}{path}{query}",
            url.origin().ascii_serialization()
        )),
    }
}
