//! chainmon-metrics — the metric surface shared by the refresh engine
//! and the scrape endpoint.
//!
//! Every instrument is a `prometheus` gauge or counter, so individual
//! updates are atomic and readers never wait on writers. Registration is
//! idempotent: asking for a name twice hands back the same instrument.
//!
//! # Architecture
//!
//! ```text
//! MetricRegistry (Clone, shared)
//!   ├── gauge() / counter()            ← scalar instruments
//!   ├── gauge_family() → GaugeFamily   ← one gauge per integer parameter
//!   ├── gauge_with_labels()            ← one series per label-value set
//!   └── render() → text/plain for /metrics
//! ```
//!
//! Nothing is ever unregistered. A label set or family member that stops
//! being reported keeps its last value until the process exits.

pub mod error;
pub mod exposition;
pub mod family;
pub mod naming;
pub mod registry;

pub use error::{MetricsError, MetricsResult};
pub use exposition::{PROMETHEUS_CONTENT_TYPE, render_prometheus};
pub use family::{FamilyNaming, GaugeFamily};
pub use naming::{DEFAULT_HASHPS_WINDOW, hashps_metric_name, suffixed_metric_name};
pub use registry::{Counter, Gauge, LabeledCounter, LabeledGauge, MetricRegistry};
