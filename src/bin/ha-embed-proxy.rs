//! ha-embed-proxy binary entry point.
//!
//! Serves the embedded Home Assistant dashboard, its asset proxy, the
//! service-worker interceptor and the authorize relay on one origin.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use ha_embed_proxy::embed_proxy::{build_router, EmbedConfig, EmbedProxyState, UpstreamTarget};

/// Same-origin proxy for an embedded Home Assistant dashboard.
#[derive(Parser, Debug)]
#[command(name = "ha-embed-proxy")]
#[command(about = "Embed a Home Assistant dashboard behind a same-origin proxy")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "HA_EMBED_PORT", default_value = "39390")]
    port: u16,

    /// Address to bind
    #[arg(long, env = "HA_EMBED_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Home Assistant base URL (e.g. "https://ha.example.com")
    #[arg(long, env = "HA_URL")]
    upstream_url: Option<String>,

    /// Long-lived access token used for every upstream request.
    /// It is also handed to the embedded frontend, so scope it narrowly.
    #[arg(long, env = "HA_TOKEN", hide_env_values = true)]
    upstream_token: Option<String>,

    /// Upstream request timeout in seconds
    #[arg(long, env = "HA_EMBED_UPSTREAM_TIMEOUT_SECS", default_value = "30")]
    timeout_secs: u64,

    /// Upstream connect timeout in seconds
    #[arg(long, env = "HA_EMBED_CONNECT_TIMEOUT_SECS", default_value = "5")]
    connect_timeout_secs: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn upstream_target(args: &Args) -> anyhow::Result<Option<UpstreamTarget>> {
    match (args.upstream_url.as_deref(), args.upstream_token.as_deref()) {
        (Some(url), Some(token)) if !url.trim().is_empty() && !token.trim().is_empty() => {
            Ok(Some(UpstreamTarget::new(url, token.trim())?))
        }
        (None, None) => Ok(None),
        _ => {
            warn!("HA_URL and HA_TOKEN must both be set; running without an upstream");
            Ok(None)
        }
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "Failed to listen for shutdown signal");
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::default().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::default().add_directive(Level::INFO.into()))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let upstream = upstream_target(&args)?;
    info!(
        port = args.port,
        upstream = ?upstream.as_ref().map(|target| target.base_url_string()),
        timeout_secs = args.timeout_secs,
        "Starting ha-embed-proxy"
    );

    let config = EmbedConfig::new(upstream)
        .with_request_timeout(Duration::from_secs(args.timeout_secs))
        .with_connect_timeout(Duration::from_secs(args.connect_timeout_secs));
    let state = EmbedProxyState::new(config)?;
    let app = build_router(state);

    // Bind and serve
    let addr = SocketAddr::new(args.bind, args.port);
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
