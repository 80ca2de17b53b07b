//! One refresh pass: the fixed battery of daemon calls, each result written
//! to the registry as soon as it arrives.

use serde::de::{DeserializeOwned, IgnoredAny};
use tokio::time::Instant;
use tracing::{error, info, warn};

use chainmon_metrics::{MetricRegistry, MetricsResult};
use chainmon_rpc::{Classification, RpcCall, RpcClient, RpcError, RpcGateway, classify};

use crate::error::{FatalError, PassError, PassOutcome};
use crate::metrics::ChainMetrics;
use crate::model::{BLOCK_STATS_FIELDS, BlockStats, BlockchainInfo, Reading, SmartFee};
use crate::scheduler::Refresh;

/// Parameters of the dynamic families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Confirmation targets passed to `estimatesmartfee`.
    pub smart_fee_targets: Vec<i64>,
    /// Block windows passed to `getnetworkhashps`. Negative means "since the
    /// last difficulty change".
    pub hashps_windows: Vec<i64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            smart_fee_targets: vec![2, 3, 5, 20],
            hashps_windows: vec![-1, 1, 120],
        }
    }
}

/// Runs refresh passes against one daemon.
pub struct CollectionPipeline<C> {
    gateway: RpcGateway<C>,
    metrics: ChainMetrics,
    config: PipelineConfig,
}

impl<C: RpcClient> CollectionPipeline<C> {
    pub fn new(
        gateway: RpcGateway<C>,
        registry: &MetricRegistry,
        config: PipelineConfig,
    ) -> MetricsResult<Self> {
        Ok(Self {
            gateway,
            metrics: ChainMetrics::new(registry)?,
            config,
        })
    }

    pub fn metrics(&self) -> &ChainMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute exactly one pass.
    ///
    /// A Reported failure abandons the pass and is returned as
    /// [`PassOutcome::Abandoned`]; results written before it stay in place. A
    /// Fatal one is returned as `Err`. Either way the pass's wall time is
    /// accounted.
    pub async fn run_pass(&self) -> Result<PassOutcome, FatalError> {
        let started = Instant::now();

        let outcome = match self.collect().await {
            Ok(()) => Ok(PassOutcome::Completed),
            Err(PassError::Abandoned { method, source }) => {
                self.metrics.count_error(source.kind());
                warn!(
                    method = %method,
                    kind = source.kind(),
                    error = %source,
                    "refresh pass abandoned"
                );
                Ok(PassOutcome::Abandoned {
                    method,
                    error: source,
                })
            }
            Err(PassError::Fatal(e)) => Err(e),
        };

        let elapsed = started.elapsed();
        self.metrics.process_time.inc_by(elapsed.as_secs_f64());

        match &outcome {
            Ok(PassOutcome::Completed) => info!(elapsed = ?elapsed, "refresh pass completed"),
            Ok(PassOutcome::Abandoned { .. }) => {}
            Err(e) => {
                error!(kind = e.kind(), error = %e, elapsed = ?elapsed, "refresh pass failed")
            }
        }
        outcome
    }

    /// Issue the battery in order.
    ///
    /// The best block hash comes from `getblockchaininfo`, so block stats
    /// are requested last.
    async fn collect(&self) -> Result<(), PassError> {
        self.step(RpcCall::new("uptime"), Reading::Uptime).await?;
        self.step(RpcCall::new("getmemoryinfo").arg("stats"), Reading::Memory)
            .await?;

        let best_block = match self
            .fetch::<BlockchainInfo>(RpcCall::new("getblockchaininfo"))
            .await?
        {
            Some(chain) => {
                let hash = chain.bestblockhash.clone();
                self.record(Reading::Blockchain(chain))?;
                Some(hash)
            }
            None => None,
        };

        self.step(RpcCall::new("getnetworkinfo"), Reading::Network)
            .await?;
        self.step(RpcCall::new("getchaintips"), |tips: Vec<IgnoredAny>| {
            Reading::ChainTips(tips.len())
        })
        .await?;
        self.step(RpcCall::new("getmempoolinfo"), Reading::Mempool)
            .await?;
        self.step(RpcCall::new("getnettotals"), Reading::NetTotals)
            .await?;
        self.step(RpcCall::new("getrpcinfo"), Reading::RpcInfo)
            .await?;
        self.step(RpcCall::new("getchaintxstats"), Reading::TxStats)
            .await?;
        self.step(RpcCall::new("listbanned"), Reading::Banned).await?;

        for &target in &self.config.smart_fee_targets {
            let call = RpcCall::new("estimatesmartfee").arg(target);
            // No estimate yet: leave the gauge untouched.
            if let Some(feerate) = self.fetch::<SmartFee>(call).await?.and_then(|f| f.feerate) {
                self.record(Reading::SmartFee { target, feerate })?;
            }
        }

        for &window in &self.config.hashps_windows {
            let call = RpcCall::new("getnetworkhashps").arg(window);
            if let Some(rate) = self.fetch::<f64>(call).await? {
                self.record(Reading::HashPs { window, rate })?;
            }
        }

        if let Some(hash) = best_block {
            self.latest_block_stats(&hash).await?;
        }
        Ok(())
    }

    /// Block stats are best effort: a Reported failure is counted and
    /// skipped instead of abandoning the pass.
    async fn latest_block_stats(&self, hash: &str) -> Result<(), PassError> {
        let call = RpcCall::new("getblockstats")
            .arg(hash)
            .arg(BLOCK_STATS_FIELDS.to_vec());
        match self.fetch::<BlockStats>(call).await {
            Ok(Some(stats)) => self.record(Reading::BlockStats(stats)),
            Ok(None) => Ok(()),
            Err(PassError::Abandoned { source, .. }) => {
                self.metrics.count_error(source.kind());
                warn!(kind = source.kind(), error = %source, "block stats unavailable, skipping");
                Ok(())
            }
            Err(fatal) => Err(fatal),
        }
    }

    /// Fetch one call and write its reading.
    async fn step<T: DeserializeOwned>(
        &self,
        call: RpcCall,
        reading: impl FnOnce(T) -> Reading,
    ) -> Result<(), PassError> {
        match self.fetch(call).await? {
            Some(value) => self.record(reading(value)),
            None => Ok(()),
        }
    }

    fn record(&self, reading: Reading) -> Result<(), PassError> {
        self.metrics
            .record(&reading)
            .map_err(|e| PassError::Fatal(e.into()))
    }

    /// One gateway call, decoded into `T`.
    ///
    /// `Ok(None)` means the daemon rejected the call and its metrics are
    /// skipped for this pass.
    async fn fetch<T: DeserializeOwned>(&self, call: RpcCall) -> Result<Option<T>, PassError> {
        let value = match self.gateway.call(&call).await {
            Ok(value) => value,
            Err(err) => return self.handle_failure(&call, err),
        };

        serde_json::from_value(value).map(Some).map_err(|e| {
            let source = RpcError::UnexpectedShape {
                method: call.method.clone(),
                detail: e.to_string(),
            };
            self.metrics.count_error(source.kind());
            PassError::Fatal(FatalError::Rpc {
                method: call.method,
                source,
            })
        })
    }

    fn handle_failure<T>(&self, call: &RpcCall, err: RpcError) -> Result<Option<T>, PassError> {
        match (classify(&err), err) {
            (Classification::Reported, RpcError::Fault { code, message }) => {
                info!(%call, code, message = %message, "daemon rejected call, skipping");
                Ok(None)
            }
            (Classification::Fatal, source) => Err(PassError::Fatal(FatalError::Rpc {
                method: call.method.clone(),
                source,
            })),
            (_, source) => Err(PassError::Abandoned {
                method: call.method.clone(),
                source,
            }),
        }
    }
}

impl<C: RpcClient + 'static> Refresh for CollectionPipeline<C> {
    async fn refresh(&self) -> Result<PassOutcome, FatalError> {
        self.run_pass().await
    }
}
