#![forbid(unsafe_code)]

//! Outgate CLI
//!
//! Runs a reverse proxy that puts the authentik outpost protocol in front of
//! an upstream HTTP service.

mod proxy;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use url::Url;

use outgate_auth::ForwardAuthLayer;
use outgate_authentik::{AuthentikClient, build_http_client};
use outgate_core::Config;

use crate::proxy::Upstream;

/// Outgate forward-auth reverse proxy
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "OUTGATE_CONFIG")]
    config: PathBuf,

    /// Address to listen on
    #[arg(short, long, env = "OUTGATE_LISTEN", default_value = "127.0.0.1:9000")]
    listen: SocketAddr,

    /// Base URL of the protected upstream service
    #[arg(short, long, env = "OUTGATE_UPSTREAM")]
    upstream: Url,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,outgate=debug".into()),
        )
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;

    let authenticator = build_http_client(&config.http_client)?;
    let lifetime = CancellationToken::new();
    let client = Arc::new(AuthentikClient::new(
        &config.authentik,
        authenticator,
        lifetime.clone(),
    ));

    let upstream_http = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .context("failed to create upstream http client")?;
    let upstream = Arc::new(Upstream::new(args.upstream, upstream_http));

    tracing::info!(
        authenticator = %config.authentik.address,
        upstream = %upstream.base(),
        cache_ttl = ?config.authentik.cache_duration,
        "Starting Outgate"
    );

    let app = Router::new()
        .fallback(proxy::forward)
        .with_state(upstream)
        .layer(ForwardAuthLayer::new(client, config.authentik.policy.clone()));

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    tracing::info!("Listening on {}", args.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(lifetime.clone()))
        .await
        .context("server error")?;

    lifetime.cancel();
    tracing::info!("Outgate stopped");
    Ok(())
}

/// Resolve on Ctrl-C, cancelling the session cache lifetime.
async fn shutdown_signal(lifetime: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutting down gracefully"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            lifetime.cancelled().await;
        }
    }
    lifetime.cancel();
}
