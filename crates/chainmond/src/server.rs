//! The scrape endpoint.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` | Prometheus exposition, refreshing first in scrape mode |
//! | GET | `/` | Pointer to `/metrics` |

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tokio::sync::mpsc;
use tracing::error;

use chainmon_collector::{FatalError, Refresh, RefreshScheduler};
use chainmon_metrics::{MetricRegistry, PROMETHEUS_CONTENT_TYPE};

const INDEX: &str = "<html>\
<head><title>Bitcoin Exporter</title></head>\
<body><h1>Bitcoin Exporter</h1><p><a href=\"/metrics\">Metrics</a></p></body>\
</html>";

/// Shared state for the scrape handlers.
pub struct ServerState<R> {
    registry: MetricRegistry,
    scheduler: Option<RefreshScheduler<R>>,
    fatal: mpsc::Sender<FatalError>,
}

impl<R: Refresh> ServerState<R> {
    /// Serve the registry as-is; something else keeps it fresh.
    pub fn passive(registry: MetricRegistry, fatal: mpsc::Sender<FatalError>) -> Self {
        Self {
            registry,
            scheduler: None,
            fatal,
        }
    }

    /// Trigger `scheduler` on every scrape before serving.
    pub fn refreshing(
        registry: MetricRegistry,
        scheduler: RefreshScheduler<R>,
        fatal: mpsc::Sender<FatalError>,
    ) -> Self {
        Self {
            registry,
            scheduler: Some(scheduler),
            fatal,
        }
    }
}

/// Build the scrape router.
pub fn build_router<R: Refresh>(state: Arc<ServerState<R>>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/metrics", get(metrics::<R>))
        .with_state(state)
}

/// GET /
async fn index() -> Html<&'static str> {
    Html(INDEX)
}

/// GET /metrics
async fn metrics<R: Refresh>(State(state): State<Arc<ServerState<R>>>) -> Response {
    if let Some(scheduler) = &state.scheduler {
        if let Err(e) = scheduler.trigger().await {
            let _ = state.fatal.try_send(e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "refresh failed\n").into_response();
        }
    }

    match state.registry.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
