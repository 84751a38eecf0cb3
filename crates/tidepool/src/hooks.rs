//! Lifecycle instrumentation feeding the metrics aggregator.
//!
//! [`Instrumentation`] implements [`PoolObserver`] and is registered with the
//! pool primitive once at initialization. Checkout start timestamps live in a
//! concurrent map keyed by handle identity, so a handle checked out on one
//! task and checked in from another still gets an accurate hold duration.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::backend::PoolObserver;
use crate::metrics::MetricsAggregator;

/// Observer wiring pool lifecycle events into a [`MetricsAggregator`].
pub struct Instrumentation {
    metrics: Arc<MetricsAggregator>,
    /// Start timestamp per checked-out handle. An entry exists exactly while
    /// the handle is held by a caller.
    checkout_started: DashMap<Uuid, Instant>,
}

impl Instrumentation {
    /// Create instrumentation feeding the given aggregator.
    #[must_use]
    pub fn new(metrics: Arc<MetricsAggregator>) -> Self {
        Self {
            metrics,
            checkout_started: DashMap::new(),
        }
    }

    /// Number of handles currently tracked as checked out.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.checkout_started.len()
    }
}

impl PoolObserver for Instrumentation {
    fn on_connect(&self, handle: Uuid) {
        // Informational only; connects carry no metric side effect.
        debug!(%handle, "backend connection established");
    }

    fn on_checkout(&self, handle: Uuid) {
        self.checkout_started.insert(handle, Instant::now());
        self.metrics.increment_checkouts();
    }

    fn on_checkin(&self, handle: Uuid) {
        match self.checkout_started.remove(&handle) {
            Some((_, started)) => {
                let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
                self.metrics.record_checkin(duration_ms);
            }
            None => {
                // Checkin without a matching checkout; nothing to measure.
                trace!(%handle, "checkin for untracked handle ignored");
            }
        }
    }

    fn on_invalidate(&self, handle: Uuid) {
        self.checkout_started.remove(&handle);
        self.metrics.increment_errors();
        warn!(%handle, "handle invalidated");
    }
}

impl std::fmt::Debug for Instrumentation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrumentation")
            .field("outstanding", &self.checkout_started.len())
            .finish()
    }
}
