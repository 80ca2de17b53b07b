//! Rate-limited, single-flight refresh triggering.
//!
//! Any number of callers may call [`RefreshScheduler::trigger`] at once. At
//! most one refresh runs at a time, and a new one starts only once
//! `min_interval` has passed since the previous one completed. Callers that
//! lose either race return immediately and read the registry as it is.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{FatalError, PassOutcome};

/// Something that can run one refresh pass.
pub trait Refresh: Send + Sync + 'static {
    fn refresh(&self) -> impl Future<Output = Result<PassOutcome, FatalError>> + Send;
}

impl<T: Refresh> Refresh for Arc<T> {
    fn refresh(&self) -> impl Future<Output = Result<PassOutcome, FatalError>> + Send {
        (**self).refresh()
    }
}

/// What a trigger did.
#[derive(Debug)]
pub enum TriggerOutcome {
    /// This caller ran a pass.
    Ran(PassOutcome),
    /// Another caller's pass is in flight.
    InFlight,
    /// The last pass completed too recently.
    TooSoon { since_last: Duration },
}

impl TriggerOutcome {
    pub fn ran(&self) -> bool {
        matches!(self, TriggerOutcome::Ran(_))
    }
}

#[derive(Debug, Default)]
struct RefreshState {
    last_completed: Option<Instant>,
}

/// Serializes and rate-limits refreshes.
pub struct RefreshScheduler<R> {
    refresher: Arc<R>,
    state: Arc<Mutex<RefreshState>>,
    min_interval: Duration,
}

impl<R> Clone for RefreshScheduler<R> {
    fn clone(&self) -> Self {
        Self {
            refresher: self.refresher.clone(),
            state: self.state.clone(),
            min_interval: self.min_interval,
        }
    }
}

impl<R: Refresh> RefreshScheduler<R> {
    pub fn new(refresher: R, min_interval: Duration) -> Self {
        Self {
            refresher: Arc::new(refresher),
            state: Arc::new(Mutex::new(RefreshState::default())),
            min_interval,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn refresher(&self) -> &R {
        &self.refresher
    }

    /// Run a pass unless one is in flight or the last one is too recent.
    ///
    /// Never waits for another caller's pass. The pass itself runs on its
    /// own task, so a caller that goes away mid-pass (a dropped scrape
    /// connection) does not cancel it. The completion time is recorded
    /// whatever the pass returned.
    pub async fn trigger(&self) -> Result<TriggerOutcome, FatalError> {
        let Ok(mut state) = self.state.clone().try_lock_owned() else {
            debug!("refresh already in flight");
            return Ok(TriggerOutcome::InFlight);
        };

        if let Some(last) = state.last_completed {
            let since_last = last.elapsed();
            if since_last < self.min_interval {
                debug!(since_last = ?since_last, "refresh rate limited");
                return Ok(TriggerOutcome::TooSoon { since_last });
            }
        }

        let refresher = self.refresher.clone();
        let task = tokio::spawn(async move {
            let result = refresher.refresh().await;
            state.last_completed = Some(Instant::now());
            result
        });

        match task.await {
            Ok(result) => result.map(TriggerOutcome::Ran),
            Err(e) => Err(FatalError::Task(e.to_string())),
        }
    }
}
