//! Lazily-populated gauge families keyed by an integer parameter.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::MetricsResult;
use crate::registry::{Gauge, MetricRegistry};

/// Maps (`base`, parameter) to the member gauge's metric name.
pub type FamilyNaming = fn(&str, i64) -> String;

/// One gauge per parameter value, created on first use and never removed.
///
/// A parameter that stops being refreshed keeps its last value.
#[derive(Clone)]
pub struct GaugeFamily {
    registry: MetricRegistry,
    base: String,
    help: fn(i64) -> String,
    naming: FamilyNaming,
    members: Arc<RwLock<BTreeMap<i64, Gauge>>>,
}

impl GaugeFamily {
    pub(crate) fn new(
        registry: MetricRegistry,
        base: &str,
        help: fn(i64) -> String,
        naming: FamilyNaming,
    ) -> Self {
        Self {
            registry,
            base: base.to_string(),
            help,
            naming,
            members: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// The gauge for `param`, registering it on first use.
    pub fn gauge(&self, param: i64) -> MetricsResult<Gauge> {
        if let Some(gauge) = self
            .members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&param)
        {
            return Ok(gauge.clone());
        }

        let gauge = self
            .registry
            .gauge(&self.metric_name(param), &(self.help)(param))?;
        self.members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(param)
            .or_insert_with(|| gauge.clone());
        Ok(gauge)
    }

    /// Metric name of the member for `param`.
    pub fn metric_name(&self, param: i64) -> String {
        (self.naming)(&self.base, param)
    }

    /// Parameters seen so far, ascending.
    pub fn params(&self) -> Vec<i64> {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    pub fn base(&self) -> &str {
        &self.base
    }
}
