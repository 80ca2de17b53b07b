//! Prometheus text exposition format.
//!
//! Renders everything in a [`MetricRegistry`] for scraping by a
//! Prometheus server or compatible agent.

use prometheus::{Encoder, TextEncoder};

use crate::error::{MetricsError, MetricsResult};
use crate::registry::MetricRegistry;

/// Content type of [`render_prometheus`] output.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render every registered instrument into Prometheus text format.
///
/// Readers may run concurrently with a refresh pass; each sample reflects
/// the latest atomic update to its instrument.
pub fn render_prometheus(registry: &MetricRegistry) -> MetricsResult<String> {
    let families = registry.prometheus().gather();
    let mut buf = Vec::new();
    TextEncoder::new()
        .encode(&families, &mut buf)
        .map_err(|e| MetricsError::Encode(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| MetricsError::Encode(e.to_string()))
}

impl MetricRegistry {
    /// Shorthand for [`render_prometheus`].
    pub fn render(&self) -> MetricsResult<String> {
        render_prometheus(self)
    }
}
