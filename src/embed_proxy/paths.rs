//! Mapping between the embedding server's URL space and the upstream's.

use url::Url;

use super::error::{EmbedError, EmbedResult};

/// Mount of the static asset proxy.
pub const PROXY_MOUNT: &str = "/api/ha/proxy";
/// Endpoint serving the rewritten dashboard document.
pub const DASHBOARD_PATH: &str = "/api/ha/dashboard";
/// Endpoint serving the client network interceptor.
pub const SERVICE_WORKER_PATH: &str = "/ha-embed-sw.js";
/// Authorize hand-off path, identical on both sides of the bridge.
pub const AUTH_AUTHORIZE_PATH: &str = "/auth/authorize";
/// Prefix of every upstream auth route; never treated as a resource.
pub const AUTH_PREFIX: &str = "/auth/";
/// Generic API mount shared by the host application and the upstream.
pub const API_PREFIX: &str = "/api/";

const PLUGIN_FILES_PREFIX: &str = "hacsfiles/";
const COMMUNITY_SOURCE_PREFIX: &str = "homeassistant/www/community/";
const COMMUNITY_TARGET_PREFIX: &str = "local/community/";

/// Top-level upstream prefixes that already address an upstream route.
pub const UPSTREAM_PREFIXES: &[&str] = &[
    "local/",
    "static/",
    "frontend_latest/",
    "frontend_es5/",
    "homeassistant/",
    PLUGIN_FILES_PREFIX,
];

/// Bare resource families the upstream serves from under `static/`.
const BARE_RESOURCE_FAMILIES: &[&str] = &["fonts/", "icons/", "images/"];

/// Extensions that mark a path as a static resource file.
pub const RESOURCE_EXTENSIONS: &[&str] = &[
    "js", "mjs", "css", "map", "woff", "woff2", "ttf", "otf", "eot", "png", "jpg", "jpeg", "gif",
    "webp", "ico", "svg", "json", "xml", "webmanifest",
];

/// Translate a path captured after [`PROXY_MOUNT`] into the upstream-relative
/// path to request. Never fails; unknown shapes pass through unchanged.
pub fn translate_asset_path(captured: &str) -> String {
    let path = captured.strip_prefix('/').unwrap_or(captured);

    // Collapse the double prefix some upstream bundles emit.
    let path = match path.strip_prefix("static/static/") {
        Some(rest) => format!("static/{rest}"),
        None => path.to_string(),
    };

    if let Some(rest) = path.strip_prefix(COMMUNITY_SOURCE_PREFIX) {
        return format!("{COMMUNITY_TARGET_PREFIX}{rest}");
    }

    if path == "manifest.json"
        || UPSTREAM_PREFIXES
            .iter()
            .any(|prefix| path.starts_with(prefix))
    {
        return path;
    }

    if BARE_RESOURCE_FAMILIES
        .iter()
        .any(|family| path.starts_with(family))
    {
        return format!("static/{path}");
    }

    path
}

/// Whether the last path segment carries a [`RESOURCE_EXTENSIONS`] entry.
pub fn has_resource_extension(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => RESOURCE_EXTENSIONS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext)),
        _ => false,
    }
}

/// Whether a root-relative path (leading slash optional) begins with a known
/// upstream prefix.
pub fn has_upstream_prefix(path: &str) -> bool {
    let path = path.strip_prefix('/').unwrap_or(path);
    path == "manifest.json"
        || UPSTREAM_PREFIXES
            .iter()
            .any(|prefix| path.starts_with(prefix))
}

/// Append `relative_path` to the base URL's own path and set `query` verbatim.
pub fn upstream_url(base: &Url, relative_path: &str, query: Option<&str>) -> EmbedResult<Url> {
    if base.cannot_be_a_base() {
        return Err(EmbedError::UnsupportedUpstreamUrl(base.to_string()));
    }
    let mut url = base.clone();
    let base_path = base.path().trim_end_matches('/');
    let relative = relative_path.trim_start_matches('/');
    url.set_path(&format!("{base_path}/{relative}"));
    url.set_query(query.filter(|q| !q.is_empty()));
    url.set_fragment(None);
    Ok(url)
}

/// `{mount}/{path}` for a root-relative reference without its leading slash.
pub fn proxied_path(mount: &str, relative: &str) -> String {
    format!("{}/{}", mount.trim_end_matches('/'), relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_single_leading_slash() {
        assert_eq!(translate_asset_path("/frontend_latest/app.js"), "frontend_latest/app.js");
        assert_eq!(translate_asset_path("frontend_latest/app.js"), "frontend_latest/app.js");
    }

    #[test]
    fn collapses_double_static_prefix() {
        for rest in ["fonts/roboto.woff2", "icons/favicon.ico", "x", "a/b/c.js"] {
            assert_eq!(
                translate_asset_path(&format!("static/static/{rest}")),
                format!("static/{rest}")
            );
        }
        assert_eq!(
            translate_asset_path("/static/static/icons/mdi.svg"),
            "static/icons/mdi.svg"
        );
    }

    #[test]
    fn remaps_community_plugins() {
        assert_eq!(
            translate_asset_path("homeassistant/www/community/mushroom/mushroom.js"),
            "local/community/mushroom/mushroom.js"
        );
        assert_eq!(
            translate_asset_path("/homeassistant/www/community/card.js"),
            "local/community/card.js"
        );
    }

    #[test]
    fn known_prefixes_are_identity() {
        for path in [
            "local/floorplan.png",
            "static/translations/en.json",
            "frontend_latest/core.abc123.js",
            "homeassistant/icons/x.svg",
            "hacsfiles/button-card/button-card.js",
            "manifest.json",
        ] {
            assert_eq!(translate_asset_path(path), path);
        }
    }

    #[test]
    fn bare_families_gain_static_prefix() {
        assert_eq!(
            translate_asset_path("fonts/roboto/Roboto-Light.woff2"),
            "static/fonts/roboto/Roboto-Light.woff2"
        );
        assert_eq!(
            translate_asset_path("icons/favicon-192x192.png"),
            "static/icons/favicon-192x192.png"
        );
        assert_eq!(translate_asset_path("images/logo.svg"), "static/images/logo.svg");
    }

    #[test]
    fn unknown_paths_pass_through() {
        assert_eq!(translate_asset_path("something/else.txt"), "something/else.txt");
        assert_eq!(translate_asset_path("manifest.json.bak"), "manifest.json.bak");
        assert_eq!(translate_asset_path(""), "");
    }

    #[test]
    fn resource_extension_detection() {
        assert!(has_resource_extension("/frontend_latest/app.js"));
        assert!(has_resource_extension("/static/fonts/x.WOFF2?v=3"));
        assert!(has_resource_extension("/manifest.json"));
        assert!(!has_resource_extension("/api/companies"));
        assert!(!has_resource_extension("/frontend_latest/chunk"));
        assert!(!has_resource_extension("/.js"));
        assert!(!has_resource_extension("/dir.js/file"));
    }

    #[test]
    fn upstream_url_appends_to_base_path() {
        let base = Url::parse("https://ha.example.com").unwrap();
        let url = upstream_url(&base, "static/icons/x.png", Some("v=1")).unwrap();
        assert_eq!(url.as_str(), "https://ha.example.com/static/icons/x.png?v=1");

        let prefixed = Url::parse("https://example.com/ha/").unwrap();
        let url = upstream_url(&prefixed, "/auth/authorize", None).unwrap();
        assert_eq!(url.as_str(), "https://example.com/ha/auth/authorize");
    }
}
