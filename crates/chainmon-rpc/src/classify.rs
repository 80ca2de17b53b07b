//! Maps an [`RpcError`] to what the caller should do about it.

use crate::error::RpcError;

/// How a failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Transient; the gateway backs off and tries again.
    Retryable,
    /// The process should stop. Reserved for responses that are not data
    /// at all (usually wrong credentials) and for responses whose shape
    /// nothing anticipated.
    Fatal,
    /// Count it, log it, and give up on the current pass only.
    Reported,
}

/// Classify an error. Pure; no side effects.
pub fn classify(err: &RpcError) -> Classification {
    match err {
        RpcError::InWarmup(_) | RpcError::Connection(_) | RpcError::Timeout(_) => {
            Classification::Retryable
        }
        RpcError::MalformedResponse(_)
        | RpcError::InvalidRequest(_)
        | RpcError::UnexpectedShape { .. } => Classification::Fatal,
        RpcError::Fault { .. } | RpcError::RetryBudgetExhausted { .. } => {
            Classification::Reported
        }
    }
}

/// Default retry predicate for [`RetryPolicy`](crate::RetryPolicy).
pub fn is_retryable(err: &RpcError) -> bool {
    classify(err) == Classification::Retryable
}
