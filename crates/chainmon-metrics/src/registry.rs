//! Idempotent instrument registry.
//!
//! Wraps a `prometheus::Registry` with a name → instrument index so that
//! registering the same name twice returns the existing handle instead of
//! failing with a duplicate-registration error on the second refresh.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use prometheus::{CounterVec, GaugeVec, Opts, Registry};
use tracing::debug;

use crate::error::{MetricsError, MetricsResult};
use crate::family::{FamilyNaming, GaugeFamily};

pub use prometheus::{Counter, Gauge};

/// A registered instrument, indexed by metric name.
#[derive(Clone, Debug)]
enum Instrument {
    Gauge(Gauge),
    Counter(Counter),
    LabeledGauge(LabeledGauge),
    LabeledCounter(LabeledCounter),
}

impl Instrument {
    fn kind(&self) -> &'static str {
        match self {
            Instrument::Gauge(_) => "gauge",
            Instrument::Counter(_) => "counter",
            Instrument::LabeledGauge(_) => "labeled gauge",
            Instrument::LabeledCounter(_) => "labeled counter",
        }
    }
}

struct Inner {
    registry: Registry,
    /// Metric name → instrument. Insert-only.
    instruments: RwLock<HashMap<String, Instrument>>,
}

/// Process-lifetime set of numeric instruments.
///
/// Cloning is cheap and every clone sees the same instruments.
#[derive(Clone)]
pub struct MetricRegistry {
    inner: Arc<Inner>,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Registry::new(),
                instruments: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// The underlying prometheus registry (for gathering).
    pub fn prometheus(&self) -> &Registry {
        &self.inner.registry
    }

    /// Look up or register a gauge.
    ///
    /// A second call with the same name returns the original handle even if
    /// `help` differs.
    pub fn gauge(&self, name: &str, help: &str) -> MetricsResult<Gauge> {
        self.get_or_register(
            name,
            || {
                let gauge = Gauge::new(name, help)?;
                self.inner.registry.register(Box::new(gauge.clone()))?;
                Ok(Instrument::Gauge(gauge))
            },
            |instrument| match instrument {
                Instrument::Gauge(g) => Some(g.clone()),
                _ => None,
            },
        )
    }

    /// Look up or register a counter.
    pub fn counter(&self, name: &str, help: &str) -> MetricsResult<Counter> {
        self.get_or_register(
            name,
            || {
                let counter = Counter::new(name, help)?;
                self.inner.registry.register(Box::new(counter.clone()))?;
                Ok(Instrument::Counter(counter))
            },
            |instrument| match instrument {
                Instrument::Counter(c) => Some(c.clone()),
                _ => None,
            },
        )
    }

    /// Look up or register a gauge whose series are keyed by label values.
    pub fn gauge_with_labels(
        &self,
        name: &str,
        help: &str,
        label_names: &[&str],
    ) -> MetricsResult<LabeledGauge> {
        let family = self.get_or_register(
            name,
            || {
                let vec = GaugeVec::new(Opts::new(name, help), label_names)?;
                self.inner.registry.register(Box::new(vec.clone()))?;
                Ok(Instrument::LabeledGauge(LabeledGauge {
                    name: name.to_string(),
                    label_names: owned(label_names),
                    vec,
                }))
            },
            |instrument| match instrument {
                Instrument::LabeledGauge(g) => Some(g.clone()),
                _ => None,
            },
        )?;
        check_labels(name, &family.label_names, label_names)?;
        Ok(family)
    }

    /// Look up or register a counter whose series are keyed by label values.
    pub fn counter_with_labels(
        &self,
        name: &str,
        help: &str,
        label_names: &[&str],
    ) -> MetricsResult<LabeledCounter> {
        let family = self.get_or_register(
            name,
            || {
                let vec = CounterVec::new(Opts::new(name, help), label_names)?;
                self.inner.registry.register(Box::new(vec.clone()))?;
                Ok(Instrument::LabeledCounter(LabeledCounter {
                    name: name.to_string(),
                    label_names: owned(label_names),
                    vec,
                }))
            },
            |instrument| match instrument {
                Instrument::LabeledCounter(c) => Some(c.clone()),
                _ => None,
            },
        )?;
        check_labels(name, &family.label_names, label_names)?;
        Ok(family)
    }

    /// A family of unlabeled gauges, one per integer parameter, created on
    /// first use. `naming` maps (`base`, parameter) to the member's name.
    pub fn gauge_family(
        &self,
        base: &str,
        help: fn(i64) -> String,
        naming: FamilyNaming,
    ) -> GaugeFamily {
        GaugeFamily::new(self.clone(), base, help, naming)
    }

    /// Names of every registered instrument.
    pub fn names(&self) -> Vec<String> {
        let instruments = self
            .inner
            .instruments
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = instruments.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether an instrument with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.inner
            .instruments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    fn get_or_register<T>(
        &self,
        name: &str,
        create: impl FnOnce() -> MetricsResult<Instrument>,
        select: impl Fn(&Instrument) -> Option<T>,
    ) -> MetricsResult<T> {
        {
            let instruments = self
                .inner
                .instruments
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = instruments.get(name) {
                return select(existing).ok_or_else(|| MetricsError::KindConflict {
                    name: name.to_string(),
                    existing: existing.kind(),
                });
            }
        }

        let mut instruments = self
            .inner
            .instruments
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        // Another writer may have registered it between the two locks.
        if let Some(existing) = instruments.get(name) {
            return select(existing).ok_or_else(|| MetricsError::KindConflict {
                name: name.to_string(),
                existing: existing.kind(),
            });
        }

        let instrument = create()?;
        debug!(metric = %name, kind = instrument.kind(), "registered instrument");
        let handle = select(&instrument).ok_or_else(|| MetricsError::KindConflict {
            name: name.to_string(),
            existing: instrument.kind(),
        })?;
        instruments.insert(name.to_string(), instrument);
        Ok(handle)
    }
}

/// Gauge series keyed by a fixed set of label names.
#[derive(Clone, Debug)]
pub struct LabeledGauge {
    name: String,
    label_names: Vec<String>,
    vec: GaugeVec,
}

impl LabeledGauge {
    /// Create or update the series for `label_values`.
    pub fn set(&self, label_values: &[&str], value: f64) -> MetricsResult<()> {
        self.vec.get_metric_with_label_values(label_values)?.set(value);
        Ok(())
    }

    /// Current value of the series for `label_values` (zero if never set).
    pub fn get(&self, label_values: &[&str]) -> MetricsResult<f64> {
        Ok(self.vec.get_metric_with_label_values(label_values)?.get())
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Counter series keyed by a fixed set of label names.
#[derive(Clone, Debug)]
pub struct LabeledCounter {
    name: String,
    label_names: Vec<String>,
    vec: CounterVec,
}

impl LabeledCounter {
    /// Increment the series for `label_values` by one.
    pub fn inc(&self, label_values: &[&str]) -> MetricsResult<()> {
        self.vec.get_metric_with_label_values(label_values)?.inc();
        Ok(())
    }

    /// Current value of the series for `label_values` (zero if never touched).
    pub fn get(&self, label_values: &[&str]) -> MetricsResult<f64> {
        Ok(self.vec.get_metric_with_label_values(label_values)?.get())
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn owned(label_names: &[&str]) -> Vec<String> {
    label_names.iter().map(|l| l.to_string()).collect()
}

fn check_labels(name: &str, existing: &[String], requested: &[&str]) -> MetricsResult<()> {
    if existing.iter().map(String::as_str).eq(requested.iter().copied()) {
        Ok(())
    } else {
        Err(MetricsError::LabelMismatch {
            name: name.to_string(),
            existing: existing.to_vec(),
            requested: owned(requested),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauge_registration_is_idempotent() {
        let registry = MetricRegistry::new();
        let first = registry.gauge("bitcoin_blocks", "Block height").unwrap();
        let second = registry.gauge("bitcoin_blocks", "Block height").unwrap();

        first.set(840_000.0);
        assert_eq!(second.get(), 840_000.0);
    }

    #[test]
    fn gauge_with_different_help_returns_original() {
        let registry = MetricRegistry::new();
        let first = registry.gauge("bitcoin_peers", "Number of peers").unwrap();
        first.set(8.0);

        let third = registry.gauge("bitcoin_peers", "Something else").unwrap();
        assert_eq!(third.get(), 8.0);

        let output = registry.render().unwrap();
        assert!(output.contains("# HELP bitcoin_peers Number of peers"));
        assert!(!output.contains("Something else"));
    }

    #[test]
    fn kind_conflict_is_an_error() {
        let registry = MetricRegistry::new();
        registry.counter("bitcoin_warnings", "Warnings").unwrap();

        let err = registry.gauge("bitcoin_warnings", "Warnings").unwrap_err();
        assert!(matches!(
            err,
            MetricsError::KindConflict { existing: "counter", .. }
        ));
    }

    #[test]
    fn invalid_name_is_rejected_and_not_indexed() {
        let registry = MetricRegistry::new();
        assert!(registry.gauge("bad-name", "nope").is_err());
        assert!(!registry.contains("bad-name"));
    }

    #[test]
    fn labeled_gauge_creates_series_on_set() {
        let registry = MetricRegistry::new();
        let created = registry
            .gauge_with_labels("bitcoin_ban_created", "Ban created", &["address", "reason"])
            .unwrap();

        created.set(&["1.2.3.4:8333", "manually added"], 1_700_000_000.0).unwrap();
        created.set(&["5.6.7.8:8333", "manually added"], 1_700_000_100.0).unwrap();

        let again = registry
            .gauge_with_labels("bitcoin_ban_created", "Ban created", &["address", "reason"])
            .unwrap();
        assert_eq!(again.get(&["1.2.3.4:8333", "manually added"]).unwrap(), 1_700_000_000.0);

        let output = registry.render().unwrap();
        assert!(output.contains("address=\"5.6.7.8:8333\""));
    }

    #[test]
    fn labeled_gauge_rejects_wrong_arity() {
        let registry = MetricRegistry::new();
        let gauge = registry
            .gauge_with_labels("bitcoin_banned_until", "Ban expiry", &["address", "reason"])
            .unwrap();
        assert!(gauge.set(&["1.2.3.4:8333"], 1.0).is_err());
    }

    #[test]
    fn label_mismatch_on_reregistration() {
        let registry = MetricRegistry::new();
        registry
            .counter_with_labels("bitcoin_exporter_errors", "Errors", &["type"])
            .unwrap();

        let err = registry
            .counter_with_labels("bitcoin_exporter_errors", "Errors", &["kind"])
            .unwrap_err();
        assert!(matches!(err, MetricsError::LabelMismatch { .. }));
    }

    #[test]
    fn labeled_counter_increments() {
        let registry = MetricRegistry::new();
        let errors = registry
            .counter_with_labels("bitcoin_exporter_errors", "Errors", &["type"])
            .unwrap();
        errors.inc(&["connection"]).unwrap();
        errors.inc(&["connection"]).unwrap();

        assert_eq!(errors.get(&["connection"]).unwrap(), 2.0);
        assert_eq!(errors.get(&["timeout"]).unwrap(), 0.0);
    }

    #[test]
    fn clones_share_instruments() {
        let registry = MetricRegistry::new();
        let clone = registry.clone();
        registry.gauge("bitcoin_uptime", "Uptime").unwrap().set(42.0);

        assert_eq!(clone.gauge("bitcoin_uptime", "Uptime").unwrap().get(), 42.0);
        assert_eq!(clone.names(), vec!["bitcoin_uptime".to_string()]);
    }
}
