//! Same-origin embedding of a Home Assistant dashboard.
//!
//! The [`embed_proxy`] module reverse-proxies upstream assets, rewrites the
//! upstream dashboard document, serves the client-side interceptor script and
//! relays the upstream authorize hand-off.

pub mod embed_proxy;
