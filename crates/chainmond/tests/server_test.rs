//! Scrape endpoint tests.
//!
//! Drives the router with `oneshot` requests against stub refreshers, in
//! both passive (timer mode) and refreshing (scrape mode) configurations.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tokio::sync::{mpsc, watch};
use tower::ServiceExt;

use chainmon_collector::{FatalError, PassOutcome, Refresh, RefreshScheduler};
use chainmon_metrics::{Gauge, MetricRegistry, PROMETHEUS_CONTENT_TYPE};
use chainmon_rpc::RpcError;
use chainmond::refresh_on_timer;
use chainmond::server::{ServerState, build_router};

/// Bumps a gauge on every pass so scrapes can tell passes apart.
struct BumpingRefresh {
    passes: AtomicU32,
    gauge: Gauge,
}

impl BumpingRefresh {
    fn new(registry: &MetricRegistry) -> Self {
        Self {
            passes: AtomicU32::new(0),
            gauge: registry.gauge("bitcoin_blocks", "Block height").unwrap(),
        }
    }
}

impl Refresh for BumpingRefresh {
    async fn refresh(&self) -> Result<PassOutcome, FatalError> {
        let n = self.passes.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.set(f64::from(n));
        Ok(PassOutcome::Completed)
    }
}

struct BrokenCredentials;

impl Refresh for BrokenCredentials {
    async fn refresh(&self) -> Result<PassOutcome, FatalError> {
        Err(FatalError::Rpc {
            method: "uptime".to_string(),
            source: RpcError::MalformedResponse("HTTP 401 Unauthorized: EOF".to_string()),
        })
    }
}

async fn scrape(router: axum::Router, uri: &str) -> (StatusCode, String, String) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = router.oneshot(req).await.unwrap();
    let status = resp.status();
    let content_type = resp
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn passive_metrics_serves_registry() {
    let registry = MetricRegistry::new();
    registry.gauge("bitcoin_uptime", "Uptime").unwrap().set(3600.0);
    let (fatal_tx, _fatal_rx) = mpsc::channel(1);
    let state = ServerState::<BumpingRefresh>::passive(registry, fatal_tx);
    let router = build_router(Arc::new(state));

    let (status, content_type, body) = scrape(router, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, PROMETHEUS_CONTENT_TYPE);
    assert!(body.contains("bitcoin_uptime 3600"));
}

#[tokio::test]
async fn index_links_to_metrics() {
    let (fatal_tx, _fatal_rx) = mpsc::channel(1);
    let state = ServerState::<BumpingRefresh>::passive(MetricRegistry::new(), fatal_tx);
    let router = build_router(Arc::new(state));

    let (status, content_type, body) = scrape(router, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("text/html"));
    assert!(body.contains("href=\"/metrics\""));
}

#[tokio::test(start_paused = true)]
async fn scrapes_within_interval_share_one_pass() {
    let registry = MetricRegistry::new();
    let scheduler =
        RefreshScheduler::new(BumpingRefresh::new(&registry), Duration::from_secs(5));
    let (fatal_tx, _fatal_rx) = mpsc::channel(1);
    let router = build_router(Arc::new(ServerState::refreshing(
        registry,
        scheduler.clone(),
        fatal_tx,
    )));

    let (status, _, body) = scrape(router.clone(), "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("bitcoin_blocks 1"));

    let (_, _, body) = scrape(router.clone(), "/metrics").await;
    assert!(body.contains("bitcoin_blocks 1"));
    assert_eq!(scheduler.refresher().passes.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(5)).await;
    let (_, _, body) = scrape(router, "/metrics").await;
    assert!(body.contains("bitcoin_blocks 2"));
}

#[tokio::test]
async fn fatal_refresh_fails_scrape_and_reports() {
    let scheduler = RefreshScheduler::new(BrokenCredentials, Duration::from_secs(5));
    let (fatal_tx, mut fatal_rx) = mpsc::channel(1);
    let router = build_router(Arc::new(ServerState::refreshing(
        MetricRegistry::new(),
        scheduler,
        fatal_tx,
    )));

    let (status, _, _) = scrape(router, "/metrics").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let fatal = fatal_rx.recv().await.unwrap();
    assert_eq!(fatal.kind(), "malformed_response");
}

#[tokio::test(start_paused = true)]
async fn timer_refreshes_until_shutdown() {
    let registry = MetricRegistry::new();
    let scheduler = RefreshScheduler::new(BumpingRefresh::new(&registry), Duration::ZERO);
    let (fatal_tx, _fatal_rx) = mpsc::channel(1);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let timer = tokio::spawn(refresh_on_timer(
        scheduler.clone(),
        Duration::from_secs(300),
        fatal_tx,
        shutdown_rx,
    ));

    tokio::time::sleep(Duration::from_secs(650)).await;
    assert_eq!(scheduler.refresher().passes.load(Ordering::SeqCst), 3);

    shutdown_tx.send(true).unwrap();
    timer.await.unwrap();
}

#[tokio::test]
async fn timer_stops_on_fatal_error() {
    let scheduler = RefreshScheduler::new(BrokenCredentials, Duration::ZERO);
    let (fatal_tx, mut fatal_rx) = mpsc::channel(1);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    refresh_on_timer(scheduler, Duration::from_secs(300), fatal_tx, shutdown_rx).await;
    assert_eq!(fatal_rx.recv().await.unwrap().kind(), "malformed_response");
}
