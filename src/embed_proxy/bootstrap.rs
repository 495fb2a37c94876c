//! Bootstrap `<script>` injected at the top of the rewritten dashboard.
//!
//! It must run before any upstream script: it publishes the credentials the
//! embedded frontend reads on startup and registers the network interceptor.

use serde::Serialize;

use super::config::UpstreamTarget;

/// Token lifetime advertised to the embedded frontend. The frontend refreshes
/// through the auth bridge once it lapses.
const ADVERTISED_EXPIRES_IN_SECS: u64 = 1800;
const REGISTRATION_RETRY_DELAY_MS: u64 = 1500;

/// Access-token object in the shape the upstream frontend keeps in
/// `hassTokens`. `expires` is filled in by the page clock.
#[derive(Debug, Serialize)]
struct AccessTokens<'a> {
    access_token: &'a str,
    token_type: &'static str,
    expires_in: u64,
    #[serde(rename = "hassUrl")]
    hass_url: &'a str,
    #[serde(rename = "clientId")]
    client_id: String,
}

const TEMPLATE: &str = r#"<script>
(function () {
  "use strict";
  var tokens = __HA_EMBED_TOKENS__;
  var hassUrl = __HA_EMBED_HASS_URL__;
  var workerUrl = __HA_EMBED_SW_URL__;
  var retryDelayMs = __HA_EMBED_RETRY_DELAY_MS__;

  tokens.expires = Date.now() + tokens.expires_in * 1000;
  window.hassTokens = tokens;
  window.hassUrl = hassUrl;
  console.log("[ha-embed] credentials installed for", hassUrl);

  if (!("serviceWorker" in navigator)) {
    console.warn("[ha-embed] service workers unavailable; relying on static rewriting");
    return;
  }

  function activate(worker) {
    if (worker) {
      worker.postMessage({ type: "SKIP_WAITING" });
    }
  }

  function purgeCaches() {
    if (!("caches" in window)) {
      return Promise.resolve();
    }
    return caches.keys().then(function (keys) {
      return Promise.all(keys.map(function (key) { return caches.delete(key); }));
    });
  }

  function register(attempt) {
    return navigator.serviceWorker
      .register(workerUrl, { scope: "/", updateViaCache: "none" })
      .then(function (registration) {
        console.log("[ha-embed] interceptor registered, scope", registration.scope);
        activate(registration.waiting);
        registration.update().catch(function () {});
        return registration;
      })
      .catch(function (error) {
        if (attempt === 0) {
          console.warn("[ha-embed] interceptor registration failed, retrying", error);
          setTimeout(function () { register(1); }, retryDelayMs);
        } else {
          console.warn("[ha-embed] interceptor registration failed, giving up", error);
        }
      });
  }

  navigator.serviceWorker
    .getRegistration("/")
    .then(function (existing) {
      if (existing && !navigator.serviceWorker.controller) {
        console.log("[ha-embed] activating existing interceptor");
        activate(existing.waiting || existing.installing || existing.active);
      }
    })
    .catch(function () {});

  navigator.serviceWorker.addEventListener("message", function (event) {
    if (event.data && event.data.type === "HA_EMBED_SW_ACTIVATED") {
      console.log("[ha-embed] interceptor active");
    }
  });

  purgeCaches()
    .catch(function (error) {
      console.warn("[ha-embed] cache purge failed", error);
    })
    .then(function () { return register(0); });
})();
</script>"#;

/// JSON literal safe to embed inside an inline script element.
fn script_literal<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace("</", "<\\/")
        .replace("<!--", "<\\!--")
}

/// Render the bootstrap block for `upstream`, registering the worker served at
/// `worker_path`.
pub fn render_bootstrap_script(upstream: &UpstreamTarget, worker_path: &str) -> String {
    let hass_url = upstream.base_url_string();
    let tokens = AccessTokens {
        access_token: upstream.token(),
        token_type: "Bearer",
        expires_in: ADVERTISED_EXPIRES_IN_SECS,
        hass_url: &hass_url,
        client_id: format!("{hass_url}/"),
    };
    TEMPLATE
        .replace("__HA_EMBED_TOKENS__", &script_literal(&tokens))
        .replace("__HA_EMBED_HASS_URL__", &script_literal(hass_url.as_str()))
        .replace("__HA_EMBED_SW_URL__", &script_literal(worker_path))
        .replace(
            "__HA_EMBED_RETRY_DELAY_MS__",
            &REGISTRATION_RETRY_DELAY_MS.to_string(),
        )
}
