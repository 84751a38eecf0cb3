//! Performance reporting: trend detection and recommendations.
//!
//! Pull-based: an operator endpoint asks for a report and gets the current
//! snapshot, query statistics, a latency trend derived from snapshot history,
//! and whichever recommendations apply.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::metrics::{MetricsSnapshot, QueryRecord};

/// Queries slower than this count as slow, in milliseconds.
const SLOW_QUERY_MS: f64 = 100.0;

/// How many history snapshots each trend window spans.
const TREND_WINDOW: usize = 5;

/// Relative latency growth that counts as degrading.
const DEGRADING_FACTOR: f64 = 1.2;

/// Relative latency drop that counts as improving.
const IMPROVING_FACTOR: f64 = 0.8;

// ---------------------------------------------------------------------------
// Trend
// ---------------------------------------------------------------------------

/// Direction of checkout latency over recent history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Trend {
    /// Recent latency is at least 20% lower than before
    Improving,
    /// No significant movement, or not enough history yet
    Stable,
    /// Recent latency is at least 20% higher than before
    Degrading,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Improving => write!(f, "improving"),
            Self::Stable => write!(f, "stable"),
            Self::Degrading => write!(f, "degrading"),
        }
    }
}

/// Detect the latency trend from snapshot history.
///
/// Compares the mean `avg_checkout_ms` of the last five snapshots against the
/// five before them. Fewer than ten entries yields [`Trend::Stable`].
#[must_use]
pub fn detect_trend(history: &[MetricsSnapshot]) -> Trend {
    if history.len() < 2 * TREND_WINDOW {
        return Trend::Stable;
    }

    let recent = &history[history.len() - TREND_WINDOW..];
    let prior = &history[history.len() - 2 * TREND_WINDOW..history.len() - TREND_WINDOW];

    let mean = |window: &[MetricsSnapshot]| {
        window.iter().map(|s| s.avg_checkout_ms).sum::<f64>() / window.len() as f64
    };

    let recent_avg = mean(recent);
    let prior_avg = mean(prior);

    if recent_avg > prior_avg * DEGRADING_FACTOR {
        Trend::Degrading
    } else if recent_avg < prior_avg * IMPROVING_FACTOR {
        Trend::Improving
    } else {
        Trend::Stable
    }
}

// ---------------------------------------------------------------------------
// PerformanceSummary / PerformanceReport
// ---------------------------------------------------------------------------

/// Aggregated figures for the report header.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PerformanceSummary {
    /// Pool utilization as a percentage
    pub pool_utilization_pct: f64,
    /// Mean duration over accumulated query records, in milliseconds
    pub avg_query_time_ms: f64,
    /// Queries slower than the slow-query threshold
    pub slow_query_count: usize,
    /// Checkout latency trend over recent history
    pub trend: Trend,
}

/// Full performance report.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PerformanceReport {
    /// Aggregated figures
    pub summary: PerformanceSummary,
    /// The snapshot the report was built from
    pub current: MetricsSnapshot,
    /// Actionable suggestions; a single "performing well" line when none apply
    pub recommendations: Vec<String>,
}

impl PerformanceReport {
    /// Build a report from the current snapshot, history, and query records.
    #[must_use]
    pub fn build(
        current: MetricsSnapshot,
        history: &[MetricsSnapshot],
        queries: &[QueryRecord],
    ) -> Self {
        let avg_query_time_ms = if queries.is_empty() {
            0.0
        } else {
            queries.iter().map(|q| q.duration_ms).sum::<f64>() / queries.len() as f64
        };
        let slow_query_count = queries
            .iter()
            .filter(|q| q.duration_ms > SLOW_QUERY_MS)
            .count();

        let summary = PerformanceSummary {
            pool_utilization_pct: current.utilization() * 100.0,
            avg_query_time_ms,
            slow_query_count,
            trend: detect_trend(history),
        };
        let recommendations = recommendations(&current);

        Self {
            summary,
            current,
            recommendations,
        }
    }
}

/// Independent recommendation checks; all that apply are emitted.
fn recommendations(snapshot: &MetricsSnapshot) -> Vec<String> {
    let mut out = Vec::new();
    if snapshot.avg_checkout_ms > 50.0 {
        out.push(format!(
            "average checkout time is {:.1}ms; consider growing the pool",
            snapshot.avg_checkout_ms
        ));
    }
    if snapshot.utilization() > 0.8 {
        out.push(format!(
            "pool utilization is {:.0}%; consider scaling up",
            snapshot.utilization() * 100.0
        ));
    }
    if snapshot.overflow_in_use > 5 {
        out.push(format!(
            "{} overflow connections in use; consider raising the base pool size",
            snapshot.overflow_in_use
        ));
    }
    if snapshot.total_errors > 10 {
        out.push(format!(
            "{} connection errors recorded; investigate backend connectivity",
            snapshot.total_errors
        ));
    }
    if out.is_empty() {
        out.push("pool is performing well".to_string());
    }
    out
}
