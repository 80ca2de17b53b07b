//! RPC and connection-configuration error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// JSON-RPC error code the daemon returns while it is still starting up.
pub const RPC_IN_WARMUP: i64 = -28;

/// Errors returned by an [`RpcClient`](crate::RpcClient) or the gateway.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("daemon is warming up: {0}")]
    InWarmup(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("response was not JSON (bad credentials?): {0}")]
    MalformedResponse(String),

    #[error("could not build request: {0}")]
    InvalidRequest(String),

    #[error("RPC error {code}: {message}")]
    Fault { code: i64, message: String },

    #[error("unexpected {method} response: {detail}")]
    UnexpectedShape { method: String, detail: String },

    #[error("gave up after {attempts} attempts within {budget:?}: {source}")]
    RetryBudgetExhausted {
        budget: Duration,
        attempts: u32,
        #[source]
        source: Box<RpcError>,
    },
}

impl RpcError {
    /// Stable identifier used as the `type` label of the exporter error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::InWarmup(_) => "in_warmup",
            RpcError::Connection(_) => "connection",
            RpcError::Timeout(_) => "timeout",
            RpcError::MalformedResponse(_) => "malformed_response",
            RpcError::InvalidRequest(_) => "invalid_request",
            RpcError::Fault { .. } => "rpc_fault",
            RpcError::UnexpectedShape { .. } => "unexpected_shape",
            RpcError::RetryBudgetExhausted { .. } => "retry_budget_exhausted",
        }
    }

    /// Build the error for a JSON-RPC `error` object.
    pub fn from_rpc_error(code: i64, message: String) -> Self {
        if code == RPC_IN_WARMUP {
            RpcError::InWarmup(message)
        } else {
            RpcError::Fault { code, message }
        }
    }
}

/// Errors resolving the daemon connection descriptor.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported RPC scheme {0:?} (only http is supported)")]
    UnsupportedScheme(String),

    #[error("invalid rpcport {0:?} in config file")]
    InvalidPort(String),

    #[error("malformed cookie file {0}")]
    MalformedCookie(PathBuf),
}
