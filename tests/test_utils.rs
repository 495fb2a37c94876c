//! Mock Home Assistant upstream for embedding tests.
//!
//! Records every request it receives so tests can assert on what the proxy
//! actually sent.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

pub const DASHBOARD_HTML: &str =
    r#"<head></head><body><script src="/frontend_latest/app.js"></script></body>"#;
pub const APP_JS: &str = "console.log('embedded app');";
pub const LARGE_ERROR_BYTES: usize = 256 * 1024;
/// `/frontend_latest/trickle.js` sends this many chunks, `TRICKLE_GAP` apart.
pub const TRICKLE_CHUNKS: u8 = 6;
pub const TRICKLE_GAP: Duration = Duration::from_millis(100);

pub fn trickle_body() -> String {
    (0..TRICKLE_CHUNKS).map(|n| format!("chunk-{n};")).collect()
}

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Clone, Default)]
struct MockState {
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

async fn upstream(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.seen.lock().await.push(SeenRequest {
        method: method.clone(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers: headers.clone(),
        body: body.clone(),
    });

    match uri.path() {
        "/frontend_latest/app.js" => (
            StatusCode::OK,
            [
                ("content-type", "application/javascript"),
                ("cache-control", "public, max-age=31536000"),
                ("x-upstream-only", "1"),
            ],
            APP_JS,
        )
            .into_response(),
        "/frontend_latest/missing.js" => (
            StatusCode::NOT_FOUND,
            [("content-type", "text/plain"), ("x-upstream-error", "missing")],
            "x".repeat(LARGE_ERROR_BYTES),
        )
            .into_response(),
        "/lovelace/home" | "/lovelace/default" => (
            StatusCode::OK,
            [("content-type", "text/html; charset=utf-8")],
            DASHBOARD_HTML,
        )
            .into_response(),
        "/lovelace/locked" => (StatusCode::UNAUTHORIZED, "401: Unauthorized").into_response(),
        "/frontend_latest/trickle.js" => {
            let chunks = futures::stream::unfold(0u8, |n| async move {
                if n >= TRICKLE_CHUNKS {
                    return None;
                }
                if n > 0 {
                    tokio::time::sleep(TRICKLE_GAP).await;
                }
                let chunk = Bytes::from(format!("chunk-{n};"));
                Some((Ok::<_, std::io::Error>(chunk), n + 1))
            });
            (
                StatusCode::OK,
                [("content-type", "application/javascript")],
                Body::from_stream(chunks),
            )
                .into_response()
        }
        "/slow" => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            (StatusCode::OK, "late").into_response()
        }
        _ if method == Method::POST || method == Method::PUT || method == Method::PATCH => {
            let content_type = headers
                .get("content-type")
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string();
            (
                StatusCode::OK,
                [("content-type", "application/json")],
                serde_json::json!({
                    "content_type": content_type,
                    "body": String::from_utf8_lossy(&body),
                })
                .to_string(),
            )
                .into_response()
        }
        _ => (StatusCode::OK, Body::from("ok")).into_response(),
    }
}

/// Upstream server bound to an ephemeral local port.
pub struct MockUpstream {
    pub addr: SocketAddr,
    state: MockState,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MockUpstream {
    pub async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new().fallback(upstream).with_state(state.clone());

        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("bind mock upstream");
        let addr = listener.local_addr().expect("mock upstream addr");
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn requests(&self) -> Vec<SeenRequest> {
        self.state.seen.lock().await.clone()
    }

    pub async fn last_request(&self) -> SeenRequest {
        self.requests()
            .await
            .pop()
            .expect("upstream received no request")
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// An address nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("bind probe");
    let addr = listener.local_addr().expect("probe addr");
    drop(listener);
    format!("http://{addr}")
}
