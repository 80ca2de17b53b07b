//! Refresh outcomes and fatal errors.

use thiserror::Error;

use chainmon_metrics::MetricsError;
use chainmon_rpc::RpcError;

/// Conditions that stop the refresh engine. The binary exits non-zero.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("{method}: {source}")]
    Rpc {
        method: String,
        #[source]
        source: RpcError,
    },

    #[error("metric registry error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("refresh task failed: {0}")]
    Task(String),
}

impl FatalError {
    /// Stable identifier of the concrete error, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FatalError::Rpc { source, .. } => source.kind(),
            FatalError::Metrics(e) => e.kind(),
            FatalError::Task(_) => "refresh_task",
        }
    }
}

/// How a non-fatal refresh pass ended.
#[derive(Debug)]
pub enum PassOutcome {
    /// Every battery call answered (or was skipped after a daemon fault).
    Completed,
    /// The pass was abandoned at `method`; later calls were not issued.
    Abandoned { method: String, error: RpcError },
}

impl PassOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, PassOutcome::Completed)
    }
}

/// Why `collect` stopped early.
#[derive(Debug)]
pub(crate) enum PassError {
    Abandoned { method: String, source: RpcError },
    Fatal(FatalError),
}

impl From<FatalError> for PassError {
    fn from(e: FatalError) -> Self {
        PassError::Fatal(e)
    }
}
