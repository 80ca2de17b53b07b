//! Retry policy: time budget, exponential backoff with jitter, and the
//! predicate deciding which errors are worth another attempt.

use std::time::Duration;

use rand::Rng;

use crate::classify::is_retryable;
use crate::error::RpcError;

/// Immutable retry parameters, built once at startup.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Wall-clock budget for all attempts of one call.
    pub timeout: Duration,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Growth factor per attempt.
    pub multiplier: u32,
    /// Cap on a single delay (before jitter).
    pub max_backoff: Duration,
    /// Upper bound of the uniform random delay added to each backoff.
    pub jitter: Duration,
    /// Whether an error should be retried.
    pub retryable: fn(&RpcError) -> bool,
}

impl RetryPolicy {
    /// Policy with the given budget and default backoff curve
    /// (100ms doubling to 10s, up to 100ms jitter).
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            initial_backoff: Duration::from_millis(100),
            multiplier: 2,
            max_backoff: Duration::from_secs(10),
            jitter: Duration::from_millis(100),
            retryable: is_retryable,
        }
    }

    pub fn with_backoff(mut self, initial: Duration, multiplier: u32, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.multiplier = multiplier;
        self.max_backoff = max;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_predicate(mut self, retryable: fn(&RpcError) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Delay before retry number `retry` (0-based), jitter excluded.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(retry);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Delay before retry number `retry` (0-based), jitter included.
    pub fn backoff(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }

    pub fn is_retryable(&self, err: &RpcError) -> bool {
        (self.retryable)(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles() {
        let policy = RetryPolicy::new(Duration::from_secs(30)).with_jitter(Duration::ZERO);
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
    }

    #[test]
    fn delay_caps_at_max() {
        let policy = RetryPolicy::new(Duration::from_secs(30))
            .with_backoff(Duration::from_secs(1), 2, Duration::from_secs(60))
            .with_jitter(Duration::ZERO);
        // 1 → 2 → 4 → 8 → 16 → 32 → 60 → 60
        assert_eq!(policy.backoff(6), Duration::from_secs(60));
        assert_eq!(policy.backoff(40), Duration::from_secs(60));
    }

    #[test]
    fn jitter_within_bounds() {
        let policy =
            RetryPolicy::new(Duration::from_secs(30)).with_jitter(Duration::from_millis(50));
        for _ in 0..100 {
            let delay = policy.backoff(0);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn custom_predicate() {
        let policy = RetryPolicy::new(Duration::from_secs(1))
            .with_predicate(|e| matches!(e, RpcError::Fault { .. }));
        assert!(policy.is_retryable(&RpcError::Fault {
            code: -1,
            message: "x".into()
        }));
        assert!(!policy.is_retryable(&RpcError::Connection("x".into())));
    }
}
