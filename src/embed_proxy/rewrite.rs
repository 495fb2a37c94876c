//! Textual rewrite rules for the upstream dashboard document.
//!
//! Each rule is a pure `&str -> (String, usize)` function so it can be tested
//! on its own. [`DocumentRewriter::rewrite_document`] composes them in a fixed
//! order: `<link>` tags must be handled before the generic `href` pass.

use std::fmt;

use regex::{Captures, Regex};

use super::error::EmbedResult;
use super::paths::{has_resource_extension, proxied_path};

/// Matches a root-relative attribute value in either quote style. The
/// reference is captured without its leading slash.
fn attribute_pattern(attr: &str) -> String {
    format!(r#"(?i)(?P<lead>\b{attr}\s*=\s*)(?:"/(?P<dq>[^"]*)"|'/(?P<sq>[^']*)')"#)
}

/// Per-rule rewrite counts for one document.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RewriteStats {
    pub link_hrefs: usize,
    pub hrefs: usize,
    pub script_srcs: usize,
    pub srcs: usize,
    pub css_urls: usize,
    pub websocket_hosts: usize,
    pub bootstrap_injected: bool,
}

impl RewriteStats {
    pub fn references(&self) -> usize {
        self.link_hrefs + self.hrefs + self.script_srcs + self.srcs + self.css_urls
    }
}

impl fmt::Display for RewriteStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "link={} href={} script={} src={} url={} ws={} bootstrap={}",
            self.link_hrefs,
            self.hrefs,
            self.script_srcs,
            self.srcs,
            self.css_urls,
            self.websocket_hosts,
            self.bootstrap_injected
        )
    }
}

/// Compiled rewrite rules for a given proxy mount. Built once at startup.
#[derive(Debug, Clone)]
pub struct DocumentRewriter {
    mount: String,
    link_tag: Regex,
    script_tag: Regex,
    preload_rel: Regex,
    href_attr: Regex,
    src_attr: Regex,
    css_url: Regex,
    websocket_host: Regex,
    head_open: Regex,
}

impl DocumentRewriter {
    pub fn new(mount: &str) -> EmbedResult<Self> {
        Ok(Self {
            mount: mount.trim_end_matches('/').to_string(),
            link_tag: Regex::new(r"(?is)<link\b[^>]*>")?,
            script_tag: Regex::new(r"(?is)<script\b[^>]*>")?,
            preload_rel: Regex::new(
                r#"(?i)\brel\s*=\s*(?:"[^"]*\b(?:modulepreload|preload)\b[^"]*"|'[^']*\b(?:modulepreload|preload)\b[^']*'|(?:modulepreload|preload)\b)"#,
            )?,
            href_attr: Regex::new(&attribute_pattern("href"))?,
            src_attr: Regex::new(&attribute_pattern("src"))?,
            css_url: Regex::new(
                r#"(?i)\burl\(\s*(?:"/(?P<dq>[^"]*)"|'/(?P<sq>[^']*)'|/(?P<bare>[^)"'\s]*))\s*\)"#,
            )?,
            websocket_host: Regex::new(r"(?i)\b(?:wss|ws)://[a-z0-9.\-]+(?::\d+)?")?,
            head_open: Regex::new(r"(?is)<head\b[^>]*>")?,
        })
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }

    /// Whether a root-relative reference (leading slash removed) must be
    /// routed through the proxy mount.
    fn should_proxy(&self, reference: &str) -> bool {
        if reference.starts_with("api/") || reference.starts_with('/') {
            return false;
        }
        let mount = self.mount.trim_start_matches('/');
        let already_mounted = reference
            .strip_prefix(mount)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?', '#']));
        !already_mounted
    }

    fn rewrite_attribute(&self, pattern: &Regex, input: &str) -> (String, usize) {
        let mut count = 0;
        let output = pattern.replace_all(input, |caps: &Captures| {
            let (quote, reference) = match (caps.name("dq"), caps.name("sq")) {
                (Some(dq), _) => ('"', dq.as_str()),
                (None, Some(sq)) => ('\'', sq.as_str()),
                (None, None) => return caps[0].to_string(),
            };
            if !self.should_proxy(reference) {
                return caps[0].to_string();
            }
            count += 1;
            format!(
                "{}{quote}{}{quote}",
                &caps["lead"],
                proxied_path(&self.mount, reference)
            )
        });
        (output.into_owned(), count)
    }

    /// Rule 1: `href` of `<link>` tags that preload modules or point at a
    /// resource file.
    pub fn rewrite_link_hrefs(&self, html: &str) -> (String, usize) {
        let mut count = 0;
        let output = self.link_tag.replace_all(html, |caps: &Captures| {
            let tag = &caps[0];
            let is_preload = self.preload_rel.is_match(tag);
            let is_resource = self.href_attr.captures(tag).is_some_and(|attr| {
                attr.name("dq")
                    .or_else(|| attr.name("sq"))
                    .is_some_and(|reference| has_resource_extension(reference.as_str()))
            });
            if !is_preload && !is_resource {
                return tag.to_string();
            }
            let (rewritten, n) = self.rewrite_attribute(&self.href_attr, tag);
            count += n;
            rewritten
        });
        (output.into_owned(), count)
    }

    /// Rule 2: every remaining root-relative `href`.
    pub fn rewrite_hrefs(&self, html: &str) -> (String, usize) {
        self.rewrite_attribute(&self.href_attr, html)
    }

    /// Rule 3: `src` of `<script>` tags, module scripts included.
    pub fn rewrite_script_srcs(&self, html: &str) -> (String, usize) {
        let mut count = 0;
        let output = self.script_tag.replace_all(html, |caps: &Captures| {
            let (rewritten, n) = self.rewrite_attribute(&self.src_attr, &caps[0]);
            count += n;
            rewritten
        });
        (output.into_owned(), count)
    }

    /// Rule 4: every remaining root-relative `src`.
    pub fn rewrite_srcs(&self, html: &str) -> (String, usize) {
        self.rewrite_attribute(&self.src_attr, html)
    }

    /// Rule 5: root-relative CSS `url(...)`, quoting preserved.
    pub fn rewrite_css_urls(&self, html: &str) -> (String, usize) {
        let mut count = 0;
        let output = self.css_url.replace_all(html, |caps: &Captures| {
            let (quote, reference) = if let Some(dq) = caps.name("dq") {
                ("\"", dq.as_str())
            } else if let Some(sq) = caps.name("sq") {
                ("'", sq.as_str())
            } else if let Some(bare) = caps.name("bare") {
                ("", bare.as_str())
            } else {
                return caps[0].to_string();
            };
            if !self.should_proxy(reference) {
                return caps[0].to_string();
            }
            count += 1;
            format!(
                "url({quote}{}{quote})",
                proxied_path(&self.mount, reference)
            )
        });
        (output.into_owned(), count)
    }

    /// Rule 6: point `ws://` / `wss://` literals at the upstream itself. The
    /// realtime channel is not proxied.
    pub fn rewrite_websocket_hosts(
        &self,
        html: &str,
        scheme: &str,
        authority: &str,
    ) -> (String, usize) {
        let replacement = format!("{scheme}://{authority}");
        let mut count = 0;
        let output = self.websocket_host.replace_all(html, |caps: &Captures| {
            if caps[0] != replacement {
                count += 1;
            }
            replacement.clone()
        });
        (output.into_owned(), count)
    }

    /// Rule 7: insert `script` right after the opening `<head>` tag, or at the
    /// very start when the document has none. Returns whether a `<head>` was
    /// found.
    pub fn inject_bootstrap(&self, html: &str, script: &str) -> (String, bool) {
        match self.head_open.find(html) {
            Some(head) => {
                let mut output = String::with_capacity(html.len() + script.len());
                output.push_str(&html[..head.end()]);
                output.push_str(script);
                output.push_str(&html[head.end()..]);
                (output, true)
            }
            None => (format!("{script}{html}"), false),
        }
    }

    /// Rules 1-5. Idempotent: references already under the mount are kept.
    pub fn rewrite_references(&self, html: &str) -> (String, RewriteStats) {
        let mut stats = RewriteStats::default();
        let (html, n) = self.rewrite_link_hrefs(html);
        stats.link_hrefs = n;
        let (html, n) = self.rewrite_hrefs(&html);
        stats.hrefs = n;
        let (html, n) = self.rewrite_script_srcs(&html);
        stats.script_srcs = n;
        let (html, n) = self.rewrite_srcs(&html);
        stats.srcs = n;
        let (html, n) = self.rewrite_css_urls(&html);
        stats.css_urls = n;
        (html, stats)
    }

    /// Full pipeline: references, WebSocket hosts, then bootstrap injection.
    pub fn rewrite_document(
        &self,
        html: &str,
        websocket_scheme: &str,
        upstream_authority: &str,
        bootstrap: &str,
    ) -> (String, RewriteStats) {
        let (html, mut stats) = self.rewrite_references(html);
        let (html, n) = self.rewrite_websocket_hosts(&html, websocket_scheme, upstream_authority);
        stats.websocket_hosts = n;
        let (html, injected) = self.inject_bootstrap(&html, bootstrap);
        stats.bootstrap_injected = injected;
        (html, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed_proxy::paths::PROXY_MOUNT;

    fn rewriter() -> DocumentRewriter {
        DocumentRewriter::new(PROXY_MOUNT).unwrap()
    }

    const SAMPLE: &str = r##"<!DOCTYPE html><html><head>
<link rel="modulepreload" href="/frontend_latest/core.abc.js">
<link rel="icon" href="/static/icons/favicon.ico">
<link rel="manifest" href="/manifest.json" crossorigin="use-credentials">
<link rel="preload" href="/static/fonts/roboto/Roboto-Regular.woff2" as="font">
<link rel="mask-icon" href='/static/icons/mask-icon.svg' color="#18bcf2">
<link rel="alternate" href="/api/history">
<style>body{background:url(/static/images/bg.png)} .a{background:url('/local/a.png')} .b{mask:url("/api/image/x")}</style>
<script>window.hassConnection = new WebSocket("ws://homeassistant.local:8123/api/websocket");</script>
</head><body>
<a href="/config/dashboard">Config</a>
<img src="/local/floorplan.svg">
<script type="module" src="/frontend_latest/app.abc.js" crossorigin></script>
<script src="/api/template"></script>
<img src="//cdn.example.com/x.png">
<iframe src="https://external.example.com/"></iframe>
</body></html>"##;

    #[test]
    fn link_rule_covers_preloads_and_resource_extensions() {
        let (out, n) = rewriter().rewrite_link_hrefs(SAMPLE);
        assert_eq!(n, 5);
        assert!(out.contains(
            r#"<link rel="modulepreload" href="/api/ha/proxy/frontend_latest/core.abc.js">"#
        ));
        assert!(out.contains(r#"href="/api/ha/proxy/static/icons/favicon.ico""#));
        assert!(out.contains(r#"href="/api/ha/proxy/manifest.json""#));
        assert!(out.contains(r#"href="/api/ha/proxy/static/fonts/roboto/Roboto-Regular.woff2""#));
        assert!(out.contains(r#"href='/api/ha/proxy/static/icons/mask-icon.svg'"#));
        assert!(out.contains(r#"<link rel="alternate" href="/api/history">"#));
        // Anchors are left for the generic pass.
        assert!(out.contains(r#"<a href="/config/dashboard">"#));
    }

    #[test]
    fn link_rule_handles_preload_without_extension() {
        let html = r#"<link rel="modulepreload" href="/frontend_latest/chunk-abc">"#;
        let (out, n) = rewriter().rewrite_link_hrefs(html);
        assert_eq!(n, 1);
        assert_eq!(
            out,
            r#"<link rel="modulepreload" href="/api/ha/proxy/frontend_latest/chunk-abc">"#
        );

        let plain = r#"<link rel="canonical" href="/lovelace/0">"#;
        assert_eq!(rewriter().rewrite_link_hrefs(plain).1, 0);
    }

    #[test]
    fn generic_href_rule_rewrites_remaining_references() {
        let (out, n) = rewriter()
            .rewrite_hrefs(r#"<a href="/config/dashboard">x</a><a href="/api/x">y</a>"#);
        assert_eq!(n, 1);
        assert_eq!(out, r#"<a href="/api/ha/proxy/config/dashboard">x</a><a href="/api/x">y</a>"#);
    }

    #[test]
    fn script_rule_rewrites_module_scripts() {
        let html = r#"<script type="module" src="/frontend_latest/app.js" crossorigin></script><script src="/api/x"></script>"#;
        let (out, n) = rewriter().rewrite_script_srcs(html);
        assert_eq!(n, 1);
        assert!(out.contains(
            r#"<script type="module" src="/api/ha/proxy/frontend_latest/app.js" crossorigin>"#
        ));
        assert!(out.contains(r#"<script src="/api/x">"#));
    }

    #[test]
    fn generic_src_rule_skips_protocol_relative_and_absolute() {
        let html = r#"<img src="/local/a.png"><img src="//cdn.example.com/x.png"><img src="https://x/y.png">"#;
        let (out, n) = rewriter().rewrite_srcs(html);
        assert_eq!(n, 1);
        assert_eq!(
            out,
            r#"<img src="/api/ha/proxy/local/a.png"><img src="//cdn.example.com/x.png"><img src="https://x/y.png">"#
        );
    }

    #[test]
    fn css_url_rule_preserves_quoting() {
        let css = r#"a{background:url(/static/bg.png)} b{background:url('/local/a.png')} c{background:url( "/icons/i.svg" )} d{mask:url("/api/image/x")}"#;
        let (out, n) = rewriter().rewrite_css_urls(css);
        assert_eq!(n, 3);
        assert!(out.contains("url(/api/ha/proxy/static/bg.png)"));
        assert!(out.contains("url('/api/ha/proxy/local/a.png')"));
        assert!(out.contains(r#"url("/api/ha/proxy/icons/i.svg")"#));
        assert!(out.contains(r#"url("/api/image/x")"#));
    }

    #[test]
    fn websocket_literals_target_upstream() {
        let html = r#"new WebSocket("ws://homeassistant.local:8123/api/websocket"); x = "wss://other.example/api";"#;
        let (out, n) = rewriter().rewrite_websocket_hosts(html, "wss", "ha.example.com");
        assert_eq!(n, 2);
        assert!(out.contains("wss://ha.example.com/api/websocket"));
        assert!(out.contains("wss://ha.example.com/api"));
        assert!(!out.contains("homeassistant.local"));
    }

    #[test]
    fn bootstrap_lands_right_after_head() {
        let (out, found) = rewriter().inject_bootstrap(
            r#"<html><head lang="en"><title>t</title></head></html>"#,
            "<script>boot()</script>",
        );
        assert!(found);
        assert_eq!(
            out,
            r#"<html><head lang="en"><script>boot()</script><title>t</title></head></html>"#
        );

        let (out, found) = rewriter().inject_bootstrap("<body></body>", "<script>boot()</script>");
        assert!(!found);
        assert!(out.starts_with("<script>boot()</script>"));
    }

    #[test]
    fn header_tag_is_not_mistaken_for_head() {
        let (out, _) = rewriter().inject_bootstrap("<header></header><head></head>", "<s/>");
        assert_eq!(out, "<header></header><head><s/></head>");
    }

    #[test]
    fn reference_passes_are_idempotent() {
        let rewriter = rewriter();
        let (once, stats) = rewriter.rewrite_references(SAMPLE);
        assert!(stats.references() > 0);
        let (twice, again) = rewriter.rewrite_references(&once);
        assert_eq!(once, twice);
        assert_eq!(again.references(), 0);
        assert!(!twice.contains("/api/ha/proxy/api/ha/proxy"));
    }

    #[test]
    fn idempotent_for_mounts_outside_api() {
        let rewriter = DocumentRewriter::new("/embed").unwrap();
        let html = r#"<script src="/frontend_latest/a.js"></script><a href="/embed">x</a><img src="/embedded.png">"#;
        let (once, _) = rewriter.rewrite_references(html);
        assert!(once.contains(r#"src="/embed/frontend_latest/a.js""#));
        assert!(once.contains(r#"href="/embed""#));
        assert!(once.contains(r#"src="/embed/embedded.png""#));
        let (twice, stats) = rewriter.rewrite_references(&once);
        assert_eq!(once, twice);
        assert_eq!(stats.references(), 0);
    }

    #[test]
    fn api_references_are_never_rewritten() {
        let html = r#"<link rel="modulepreload" href="/api/a.js"><a href="/api/b"></a><script src="/api/c.js"></script><img src="/api/d.png"><div style="background:url(/api/e.png)"></div>"#;
        let (out, stats) = rewriter().rewrite_references(html);
        assert_eq!(out, html);
        assert_eq!(stats.references(), 0);
    }

    #[test]
    fn full_pipeline_counts_every_rule() {
        let (out, stats) =
            rewriter().rewrite_document(SAMPLE, "wss", "ha.example.com", "<script>boot()</script>");
        assert_eq!(stats.link_hrefs, 5);
        assert_eq!(stats.hrefs, 1);
        assert_eq!(stats.script_srcs, 1);
        assert_eq!(stats.srcs, 1);
        assert_eq!(stats.css_urls, 2);
        assert_eq!(stats.websocket_hosts, 1);
        assert!(stats.bootstrap_injected);
        assert!(out.starts_with("<!DOCTYPE html><html><head><script>boot()</script>"));
    }

    #[test]
    fn zero_matches_is_a_noop() {
        let html = "<p>nothing to see</p>";
        let (out, stats) = rewriter().rewrite_references(html);
        assert_eq!(out, html);
        assert_eq!(stats, RewriteStats::default());
    }
}
