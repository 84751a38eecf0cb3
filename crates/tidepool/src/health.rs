//! Composite health scoring and status classification.
//!
//! The score is a pure function of a metrics snapshot; the report adds a live
//! probe round-trip measured by the manager. Deductions are independent and
//! the sum is floored at zero, never clamped individually.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::metrics::MetricsSnapshot;

/// Average checkout hold time (ms) above which the score loses 20 points.
const SLOW_CHECKOUT_MS: f64 = 50.0;

/// Utilization above which the score loses 30 points.
const HIGH_UTILIZATION: f64 = 0.8;

/// Lifetime error count above which the score loses 25 points.
const ERROR_BUDGET: u64 = 10;

/// Score above which the pool counts as healthy.
const HEALTHY_THRESHOLD: u8 = 70;

// ---------------------------------------------------------------------------
// HealthStatus
// ---------------------------------------------------------------------------

/// Classified health state of the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HealthStatus {
    /// Probe succeeded and the score is above the healthy threshold
    Healthy,
    /// Probe succeeded but the score indicates pressure
    Degraded {
        /// What is dragging the score down
        reason: String,
    },
    /// The liveness probe failed
    Unhealthy {
        /// Why the probe failed
        reason: String,
    },
}

impl HealthStatus {
    /// Whether the pool is usable at all.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::Unhealthy { .. })
    }
}

// ---------------------------------------------------------------------------
// HealthReport
// ---------------------------------------------------------------------------

/// Result of one health check.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HealthReport {
    /// Classified status
    pub status: HealthStatus,
    /// Composite 0-100 score; 0 when the probe failed
    pub score: u8,
    /// Round-trip time of the liveness probe, in milliseconds
    pub response_time_ms: f64,
    /// The snapshot the score was computed from
    pub snapshot: MetricsSnapshot,
}

impl HealthReport {
    /// Build a report for a successful probe.
    #[must_use]
    pub fn from_probe(response_time_ms: f64, snapshot: MetricsSnapshot) -> Self {
        let score = health_score(&snapshot);
        let status = if score > HEALTHY_THRESHOLD {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded {
                reason: deduction_summary(&snapshot),
            }
        };
        Self {
            status,
            score,
            response_time_ms,
            snapshot,
        }
    }

    /// Build a report for a failed probe.
    pub fn probe_failed(
        reason: impl Into<String>,
        response_time_ms: f64,
        snapshot: MetricsSnapshot,
    ) -> Self {
        Self {
            status: HealthStatus::Unhealthy {
                reason: reason.into(),
            },
            score: 0,
            response_time_ms,
            snapshot,
        }
    }
}

/// Composite 0-100 health score for a snapshot.
///
/// Starts at 100 and subtracts 20 for slow checkouts, 30 for high
/// utilization, and 25 for a blown error budget; the sum is floored at 0.
/// Deterministic for identical snapshots.
#[must_use]
pub fn health_score(snapshot: &MetricsSnapshot) -> u8 {
    let mut deductions: u32 = 0;
    if snapshot.avg_checkout_ms > SLOW_CHECKOUT_MS {
        deductions += 20;
    }
    if snapshot.utilization() > HIGH_UTILIZATION {
        deductions += 30;
    }
    if snapshot.total_errors > ERROR_BUDGET {
        deductions += 25;
    }
    100u32.saturating_sub(deductions) as u8
}

/// Human-readable summary of every active deduction.
fn deduction_summary(snapshot: &MetricsSnapshot) -> String {
    let mut reasons = Vec::new();
    if snapshot.avg_checkout_ms > SLOW_CHECKOUT_MS {
        reasons.push(format!(
            "avg checkout {:.1}ms above {SLOW_CHECKOUT_MS}ms",
            snapshot.avg_checkout_ms
        ));
    }
    if snapshot.utilization() > HIGH_UTILIZATION {
        reasons.push(format!(
            "utilization {:.2} above {HIGH_UTILIZATION}",
            snapshot.utilization()
        ));
    }
    if snapshot.total_errors > ERROR_BUDGET {
        reasons.push(format!(
            "{} errors exceed budget of {ERROR_BUDGET}",
            snapshot.total_errors
        ));
    }
    if reasons.is_empty() {
        "score at threshold".to_string()
    } else {
        reasons.join("; ")
    }
}
