//! chainmond — the chainmon daemon.
//!
//! Wires the refresh engine to a daemon connection and a scrape endpoint:
//! - Connection resolution (config file, credentials, or cookie discovery)
//! - RPC gateway with retry
//! - Collection pipeline and refresh scheduler
//! - Prometheus scrape endpoint
//!
//! # Usage
//!
//! ```text
//! BITCOIN_RPC_USER=alice BITCOIN_RPC_PASSWORD=s3cret chainmond --refresh-mode scrape
//! ```

pub mod config;
pub mod server;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use chainmon_collector::{CollectionPipeline, FatalError, Refresh, RefreshScheduler};
use chainmon_metrics::MetricRegistry;
use chainmon_rpc::{HttpRpcClient, RpcGateway};

use crate::config::{Cli, RefreshMode};
use crate::server::{ServerState, build_router};

/// Run until a stop signal or a fatal refresh error.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    info!(mode = ?cli.refresh_mode, "chainmon starting");

    // ── Resolve the daemon connection ──────────────────────────

    let descriptor = cli
        .connection_settings()
        .resolve()
        .context("resolving daemon connection")?;
    let client = HttpRpcClient::new(&descriptor, cli.timeout());

    // ── Refresh engine ─────────────────────────────────────────

    let registry = MetricRegistry::new();
    let gateway = RpcGateway::new(client, cli.retry_policy(), &registry)?;
    let pipeline = CollectionPipeline::new(gateway, &registry, cli.pipeline_config())?;
    let scheduler = RefreshScheduler::new(pipeline, cli.min_interval());

    // ── Shutdown and failure signalling ────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (fatal_tx, mut fatal_rx) = mpsc::channel::<FatalError>(1);

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = signal_tx.send(true);
    });

    let state = match cli.refresh_mode {
        RefreshMode::Timer => {
            tokio::spawn(refresh_on_timer(
                scheduler,
                cli.refresh_interval(),
                fatal_tx.clone(),
                shutdown_rx.clone(),
            ));
            ServerState::passive(registry, fatal_tx)
        }
        RefreshMode::Scrape => ServerState::refreshing(registry, scheduler, fatal_tx),
    };

    // ── Scrape endpoint ────────────────────────────────────────

    let addr = cli.metrics_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding metrics endpoint {addr}"))?;
    info!(%addr, "serving metrics");

    let mut server_shutdown = shutdown_rx.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, build_router(Arc::new(state)))
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    let mut stop = shutdown_rx;
    let result = tokio::select! {
        Some(fatal) = fatal_rx.recv() => {
            error!(kind = fatal.kind(), error = %fatal, "refresh engine stopped");
            Err(anyhow::Error::new(fatal).context("fatal refresh error"))
        }
        served = &mut server => match served {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow::Error::new(e).context("metrics endpoint failed")),
            Err(e) => Err(anyhow::Error::new(e).context("metrics endpoint task failed")),
        },
        _ = stop.wait_for(|stop| *stop) => Ok(()),
    };

    let _ = shutdown_tx.send(true);
    if !server.is_finished() {
        if let Err(e) = server.await {
            warn!(error = %e, "metrics endpoint did not stop cleanly");
        }
    }

    info!("chainmon stopped");
    result
}

/// Timer mode: one pass, then sleep, until shutdown.
pub async fn refresh_on_timer<R: Refresh>(
    scheduler: RefreshScheduler<R>,
    interval: Duration,
    fatal: mpsc::Sender<FatalError>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_secs = interval.as_secs(), "timer refresh started");

    loop {
        if let Err(e) = scheduler.trigger().await {
            let _ = fatal.send(e).await;
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {
                info!("timer refresh shutting down");
                return;
            }
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("SIGINT received"),
        _ = terminate => info!("SIGTERM received"),
    }
}
