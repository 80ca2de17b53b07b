//! chainmon-collector — the refresh engine.
//!
//! Turns one battery of daemon RPC calls into updates of a shared
//! [`MetricRegistry`](chainmon_metrics::MetricRegistry), and makes sure
//! concurrent triggers collapse into at most one pass at a time.
//!
//! # Architecture
//!
//! ```text
//! trigger (timer tick or scrape)
//!   └── RefreshScheduler::trigger()
//!         ├── in flight / too soon → return, caller reads the registry as-is
//!         └── CollectionPipeline::run_pass()
//!               └── per call: RpcGateway → Reading → ChainMetrics::record()
//! ```

pub mod error;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod scheduler;

pub use error::{FatalError, PassOutcome};
pub use metrics::{ChainMetrics, DEFAULT_BAN_REASON};
pub use model::{Reading, SATOSHIS_PER_COIN};
pub use pipeline::{CollectionPipeline, PipelineConfig};
pub use scheduler::{Refresh, RefreshScheduler, TriggerOutcome};
