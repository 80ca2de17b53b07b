//! Error types for the metric registry.

use thiserror::Error;

/// Result type alias for registry operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Errors that can occur while registering or updating instruments.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metric {name} is already registered as a {existing}")]
    KindConflict { name: String, existing: &'static str },

    #[error("metric {name} is registered with labels {existing:?}, not {requested:?}")]
    LabelMismatch {
        name: String,
        existing: Vec<String>,
        requested: Vec<String>,
    },

    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("encoding error: {0}")]
    Encode(String),
}

impl MetricsError {
    /// Stable identifier used as the `type` label of the exporter error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            MetricsError::KindConflict { .. } => "metrics_kind_conflict",
            MetricsError::LabelMismatch { .. } => "metrics_label_mismatch",
            MetricsError::Prometheus(_) => "metrics_prometheus",
            MetricsError::Encode(_) => "metrics_encode",
        }
    }
}
