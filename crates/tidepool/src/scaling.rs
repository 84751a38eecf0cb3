//! Adaptive scaling: policy evaluation and the background control loop.
//!
//! The [`ScalingController`] owns the only mutable pool state (current size
//! and last scale event) and runs as a single background task. Each tick it
//! snapshots live metrics, evaluates a [`ScalingDecision`] within the
//! configured bounds and cooldown, applies it through the backend, and
//! records the snapshot into history. A failed resize leaves state untouched;
//! no tick failure ever terminates the loop.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::PoolBackend;
use crate::config::PoolConfig;
use crate::metrics::{MetricsAggregator, MetricsSnapshot};

/// Utilization above which the pool grows.
const HIGH_UTILIZATION: f64 = 0.8;

/// Utilization below which the pool may shrink.
const LOW_UTILIZATION: f64 = 0.3;

/// Average checkout hold time (ms) above which the pool grows.
const SLOW_CHECKOUT_MS: f64 = 100.0;

/// Average checkout hold time (ms) below which the pool may shrink.
const FAST_CHECKOUT_MS: f64 = 10.0;

// ---------------------------------------------------------------------------
// PoolState
// ---------------------------------------------------------------------------

/// Mutable pool state, written only by the scaling controller.
///
/// Invariant: `min_size <= current_size <= max_size` after every tick.
#[derive(Debug, Clone)]
pub struct PoolState {
    /// The size the pool was last resized to
    pub current_size: usize,
    /// When the last scaling decision was applied
    pub last_scale_event: Option<Instant>,
}

// ---------------------------------------------------------------------------
// ScalingDecision
// ---------------------------------------------------------------------------

/// Outcome of one tick's evaluation. Computed, applied, logged, discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalingDecision {
    /// Grow the pool to `target`.
    Grow {
        /// New base pool size
        target: usize,
        /// Which trigger fired
        reason: String,
    },
    /// Shrink the pool to `target`.
    Shrink {
        /// New base pool size
        target: usize,
        /// Which trigger fired
        reason: String,
    },
    /// Leave the pool as it is.
    Hold,
}

impl ScalingDecision {
    /// The size this decision resizes to, if it resizes at all.
    #[must_use]
    pub fn target(&self) -> Option<usize> {
        match self {
            Self::Grow { target, .. } | Self::Shrink { target, .. } => Some(*target),
            Self::Hold => None,
        }
    }
}

/// Evaluate a scaling decision for the current snapshot.
///
/// Pure: no clocks, no cooldown. Grow when utilization, checkout latency, or
/// overflow indicate pressure; shrink only when all of utilization, latency,
/// and the lower bound allow it. Targets are clamped to
/// `[min_size, max_size]`.
#[must_use]
pub fn evaluate(
    config: &PoolConfig,
    current_size: usize,
    snapshot: &MetricsSnapshot,
) -> ScalingDecision {
    let utilization = snapshot.utilization();

    let grow_reason = if utilization > HIGH_UTILIZATION {
        Some(format!("utilization {utilization:.2} above {HIGH_UTILIZATION}"))
    } else if snapshot.avg_checkout_ms > SLOW_CHECKOUT_MS {
        Some(format!(
            "avg checkout {:.1}ms above {SLOW_CHECKOUT_MS}ms",
            snapshot.avg_checkout_ms
        ))
    } else if snapshot.overflow_in_use > 0 {
        Some(format!("{} overflow connections in use", snapshot.overflow_in_use))
    } else {
        None
    };

    if let Some(reason) = grow_reason {
        let target = (current_size + config.scale_up_step).min(config.max_size);
        if target == current_size {
            // Already at the upper bound.
            return ScalingDecision::Hold;
        }
        return ScalingDecision::Grow { target, reason };
    }

    if utilization < LOW_UTILIZATION
        && snapshot.avg_checkout_ms < FAST_CHECKOUT_MS
        && current_size > config.min_size
    {
        let target = current_size
            .saturating_sub(config.scale_down_step)
            .max(config.min_size);
        let reason = format!(
            "utilization {utilization:.2} below {LOW_UTILIZATION}, avg checkout {:.1}ms",
            snapshot.avg_checkout_ms
        );
        return ScalingDecision::Shrink { target, reason };
    }

    ScalingDecision::Hold
}

// ---------------------------------------------------------------------------
// ScalingController
// ---------------------------------------------------------------------------

/// Background controller that periodically resizes the pool.
///
/// Exactly one loop instance runs per manager; scaling decisions are
/// serialized by the single task plus the cooldown guard.
pub struct ScalingController {
    config: PoolConfig,
    state: Mutex<PoolState>,
    cancel: CancellationToken,
}

impl ScalingController {
    /// Create a controller seeded with the initial pool size.
    #[must_use]
    pub fn new(config: PoolConfig, initial_size: usize) -> Self {
        Self {
            config,
            state: Mutex::new(PoolState {
                current_size: initial_size,
                last_scale_event: None,
            }),
            cancel: CancellationToken::new(),
        }
    }

    /// The size the pool was last resized to.
    #[must_use]
    pub fn current_size(&self) -> usize {
        self.state.lock().current_size
    }

    /// Snapshot of the controller-owned state.
    #[must_use]
    pub fn state(&self) -> PoolState {
        self.state.lock().clone()
    }

    /// Spawn the background scaling loop.
    ///
    /// Returns a [`JoinHandle`] that completes once [`shutdown`] is called
    /// and the in-flight tick (if any) has finished. Awaiting it before
    /// disposing the backend guarantees no resize-after-dispose.
    ///
    /// [`shutdown`]: Self::shutdown
    pub fn start<B: PoolBackend>(
        self: &Arc<Self>,
        backend: Arc<B>,
        metrics: Arc<MetricsAggregator>,
    ) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(controller.config.tick_period) => {}
                    () = controller.cancel.cancelled() => break,
                }
                if !controller.config.scaling_enabled {
                    continue;
                }
                controller.tick(backend.as_ref(), &metrics).await;
            }
            debug!("scaling loop stopped");
        })
    }

    /// Run one evaluation tick.
    ///
    /// Failures are contained here: a failed resize is logged and the tick
    /// becomes a no-op, state unchanged. The snapshot is recorded into
    /// history regardless of the outcome.
    pub async fn tick<B: PoolBackend>(&self, backend: &B, metrics: &MetricsAggregator) {
        let snapshot = metrics.snapshot(&backend.counters());

        let decision = {
            let state = self.state.lock();
            let in_cooldown = state
                .last_scale_event
                .is_some_and(|at| at.elapsed() < self.config.scale_cooldown);
            if in_cooldown {
                ScalingDecision::Hold
            } else {
                evaluate(&self.config, state.current_size, &snapshot)
            }
        };

        match &decision {
            ScalingDecision::Grow { target, reason }
            | ScalingDecision::Shrink { target, reason } => {
                match backend.resize(*target).await {
                    Ok(()) => {
                        let mut state = self.state.lock();
                        state.current_size = *target;
                        state.last_scale_event = Some(Instant::now());
                        info!(target = *target, reason = %reason, "pool resized");
                    }
                    Err(err) => {
                        warn!(%err, target = *target, "resize failed, keeping current size");
                    }
                }
            }
            ScalingDecision::Hold => {}
        }

        metrics.record_snapshot(snapshot);
    }

    /// Cancel the background loop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for ScalingController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalingController")
            .field("state", &self.state.lock().clone())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config(min: usize, max: usize) -> PoolConfig {
        PoolConfig::default()
            .with_bounds(min, max)
            .with_initial_size(min)
    }

    fn snapshot(
        checked_out: usize,
        total_connections: usize,
        avg_checkout_ms: f64,
        overflow_in_use: usize,
    ) -> MetricsSnapshot {
        MetricsSnapshot {
            pool_size: total_connections - overflow_in_use,
            checked_out,
            overflow_in_use,
            checked_in: total_connections.saturating_sub(checked_out),
            total_connections,
            avg_checkout_ms,
            total_checkouts: 0,
            total_errors: 0,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn high_utilization_grows_by_step() {
        // 85/100 = 0.85 utilization, latency and overflow quiet.
        let decision = evaluate(&config(5, 100), 50, &snapshot(85, 100, 30.0, 0));
        assert_eq!(
            decision.target(),
            Some(55),
            "0.85 utilization should grow 50 -> 55"
        );
        assert!(matches!(decision, ScalingDecision::Grow { .. }));
    }

    #[test]
    fn slow_checkouts_grow_even_at_low_utilization() {
        let decision = evaluate(&config(5, 100), 20, &snapshot(2, 40, 150.0, 0));
        assert_eq!(decision.target(), Some(25));
    }

    #[test]
    fn overflow_in_use_grows() {
        let decision = evaluate(&config(5, 100), 20, &snapshot(10, 22, 30.0, 2));
        assert_eq!(decision.target(), Some(25));
    }

    #[test]
    fn grow_clamps_to_max_size() {
        let decision = evaluate(&config(5, 52), 50, &snapshot(90, 100, 30.0, 0));
        assert_eq!(decision.target(), Some(52));
    }

    #[test]
    fn at_max_size_holds() {
        let decision = evaluate(&config(5, 50), 50, &snapshot(45, 50, 200.0, 0));
        assert_eq!(decision, ScalingDecision::Hold);
    }

    #[test]
    fn quiet_pool_shrinks_by_step() {
        // 10/50 = 0.2 utilization, 5ms average.
        let decision = evaluate(&config(10, 100), 50, &snapshot(10, 50, 5.0, 0));
        assert_eq!(
            decision.target(),
            Some(47),
            "quiet pool should shrink 50 -> 47"
        );
        assert!(matches!(decision, ScalingDecision::Shrink { .. }));
    }

    #[test]
    fn shrink_clamps_to_min_size() {
        let decision = evaluate(&config(10, 100), 11, &snapshot(1, 11, 2.0, 0));
        assert_eq!(decision.target(), Some(10));
    }

    #[test]
    fn at_min_size_never_shrinks() {
        let decision = evaluate(&config(10, 100), 10, &snapshot(0, 10, 0.0, 0));
        assert_eq!(decision, ScalingDecision::Hold);
    }

    #[test]
    fn moderate_load_holds() {
        // Utilization between watermarks, moderate latency.
        let decision = evaluate(&config(5, 100), 50, &snapshot(25, 50, 40.0, 0));
        assert_eq!(decision, ScalingDecision::Hold);
    }

    #[test]
    fn low_utilization_with_slow_checkouts_does_not_shrink() {
        // Shrink requires both signals quiet; 50ms average blocks it.
        let decision = evaluate(&config(5, 100), 50, &snapshot(5, 50, 50.0, 0));
        assert_eq!(decision, ScalingDecision::Hold);
    }

    #[test]
    fn empty_pool_utilization_is_zero_not_nan() {
        let decision = evaluate(&config(5, 100), 10, &snapshot(0, 0, 0.0, 0));
        // 0/0 counts as zero utilization; current 10 > min 5 and all quiet.
        assert_eq!(decision.target(), Some(7));
    }

    #[test]
    fn controller_state_starts_with_initial_size() {
        let controller = ScalingController::new(config(5, 100), 12);
        assert_eq!(controller.current_size(), 12);
        assert!(controller.state().last_scale_event.is_none());
    }
}
