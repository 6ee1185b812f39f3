//! Invite Service
//!
//! Single-binary service that:
//! 1. Loads accounts and pacing from config file and environment
//! 2. Drives the platform bridge through the invitation scheduler
//! 3. Serves the JSON control API, health and Prometheus metrics

mod api;
mod bridge;
mod config;
mod error;
mod metrics;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use invite_pool::{Controller, ControllerConfig, spawn_reactivation_task};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bridge::BridgeClient;
use crate::config::Config;

/// Upper bound on draining in-flight API requests after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs, level from LOG_LEVEL or RUST_LOG
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting invite-service");

    // Installed before the controller exists so no scheduler metric is lost
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    let config = if config_path.exists() {
        info!(path = %config_path.display(), "loading configuration");
        Config::load(&config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?
    } else {
        warn!(
            path = %config_path.display(),
            "config file not found, using defaults and environment"
        );
        Config::parse("").context("invalid configuration from environment")?
    };

    info!(
        listen_addr = %config.server.listen_addr,
        bridge_url = %config.bridge.base_url,
        delay_ms = config.campaign.delay_ms,
        accounts = config.accounts.len(),
        "configuration loaded"
    );
    if config.accounts.is_empty() {
        warn!("no accounts configured, campaigns cannot start");
    }

    let bridge = Arc::new(
        BridgeClient::new(&config.bridge, &config.accounts)
            .context("failed to build bridge HTTP client")?,
    );
    let controller = Arc::new(Controller::new(
        config.registry_accounts(),
        bridge.clone(),
        bridge,
        ControllerConfig {
            tick_delay: config.campaign.tick_delay(),
            log_capacity: config.campaign.log_capacity,
        },
    ));
    let reactivation = spawn_reactivation_task(Arc::clone(&controller));

    let app = api::build_router(
        api::AppState::new(Arc::clone(&controller), prometheus_handle),
        config.server.max_connections,
    );

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;

    // Stop scheduling new invites first; an in-flight one finishes on its own.
    if controller.stop().await {
        info!("running campaign stopped for shutdown");
    }
    let _ = shutdown_tx.send(());

    // The drain timer starts at signal receipt.
    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }
    reactivation.abort();

    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
