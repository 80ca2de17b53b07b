//! The retrying RPC gateway.
//!
//! Every daemon call in chainmon goes through [`RpcGateway::call`], which
//! bounds the total time spent on one call, backs off between transient
//! failures, and counts every failed attempt by error kind so retry storms
//! show up in the metric stream itself.

use serde_json::Value;
use tokio::time::Instant;
use tracing::{Level, debug, enabled, warn};

use chainmon_metrics::{LabeledCounter, MetricRegistry, MetricsResult};

use crate::call::RpcCall;
use crate::client::RpcClient;
use crate::error::{RpcError, RpcResult};
use crate::retry::RetryPolicy;

/// Counter of failed attempts and abandoned passes, labeled by error kind.
pub const EXPORTER_ERRORS_METRIC: &str = "bitcoin_exporter_errors";
pub const EXPORTER_ERRORS_HELP: &str = "Number of errors encountered by the exporter";

/// Wraps an [`RpcClient`] with a [`RetryPolicy`].
pub struct RpcGateway<C> {
    client: C,
    policy: RetryPolicy,
    errors: LabeledCounter,
}

impl<C: RpcClient> RpcGateway<C> {
    /// Create a gateway. Registers (or reuses) the exporter error counter.
    pub fn new(client: C, policy: RetryPolicy, registry: &MetricRegistry) -> MetricsResult<Self> {
        let errors =
            registry.counter_with_labels(EXPORTER_ERRORS_METRIC, EXPORTER_ERRORS_HELP, &["type"])?;
        Ok(Self {
            client,
            policy,
            errors,
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Issue `call`, retrying transient failures until the policy's budget
    /// runs out.
    ///
    /// Non-retryable errors are returned as-is after the first attempt.
    /// Once the budget is spent the last error is wrapped in
    /// [`RpcError::RetryBudgetExhausted`].
    pub async fn call(&self, call: &RpcCall) -> RpcResult<Value> {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            debug!(%call, attempt = attempts, "RPC call");

            let remaining = self.policy.timeout.saturating_sub(started.elapsed());
            let outcome = match tokio::time::timeout(remaining, self.client.call(call)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(RpcError::Timeout(self.policy.timeout)),
            };

            let err = match outcome {
                Ok(value) => {
                    if enabled!(Level::DEBUG) {
                        debug!(method = %call.method, result = %value, "RPC result");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            self.record_failure(&err);

            if !self.policy.is_retryable(&err) {
                return Err(err);
            }

            let delay = self.policy.backoff(attempts - 1);
            if started.elapsed() + delay >= self.policy.timeout {
                return Err(RpcError::RetryBudgetExhausted {
                    budget: self.policy.timeout,
                    attempts,
                    source: Box::new(err),
                });
            }

            warn!(
                method = %call.method,
                kind = err.kind(),
                error = %err,
                retry_in = ?delay,
                "retrying RPC call"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn record_failure(&self, err: &RpcError) {
        if let Err(e) = self.errors.inc(&[err.kind()]) {
            warn!(error = %e, "failed to count RPC error");
        }
    }
}
