//! Metrics aggregation for pool lifecycle events.
//!
//! [`MetricsAggregator`] is the single source of truth for derived metrics:
//! checkout/checkin events arrive from arbitrary concurrent callers, the
//! scaling loop reads periodic snapshots, and health/performance queries read
//! on demand. Every container is individually serialized; reads are eventually
//! consistent point-in-time views.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::backend::PoolCounters;

/// Capacity of the rolling checkout-latency window.
const LATENCY_WINDOW: usize = 1000;

/// Capacity of the snapshot history used for trend detection.
const HISTORY_CAPACITY: usize = 100;

/// Capacity of the query-execution record buffer.
const QUERY_RECORD_CAPACITY: usize = 10_000;

// ---------------------------------------------------------------------------
// MetricsSnapshot
// ---------------------------------------------------------------------------

/// Point-in-time view of pool metrics.
///
/// Combines live pool-primitive counters with the rolling checkout average
/// and lifetime totals. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetricsSnapshot {
    /// Configured base pool size
    pub pool_size: usize,
    /// Handles currently held by callers
    pub checked_out: usize,
    /// Connections in use beyond the base size
    pub overflow_in_use: usize,
    /// Idle handles sitting in the pool
    pub checked_in: usize,
    /// Base size plus overflow in use
    pub total_connections: usize,
    /// Mean checkout hold time over the rolling window, in milliseconds
    pub avg_checkout_ms: f64,
    /// Lifetime checkout count
    pub total_checkouts: u64,
    /// Lifetime error count
    pub total_errors: u64,
    /// When this snapshot was captured
    pub captured_at: DateTime<Utc>,
}

impl MetricsSnapshot {
    /// Fraction of total connections currently checked out.
    ///
    /// Returns `0.0` when the pool holds no connections.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.total_connections == 0 {
            0.0
        } else {
            self.checked_out as f64 / self.total_connections as f64
        }
    }
}

// ---------------------------------------------------------------------------
// QueryRecord
// ---------------------------------------------------------------------------

/// Outcome of one executed operation, kept for performance reporting.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QueryRecord {
    /// Unique id of this execution
    pub id: Uuid,
    /// Wall-clock duration of the operation, in milliseconds
    pub duration_ms: f64,
    /// When the operation finished
    pub timestamp: DateTime<Utc>,
    /// Rows affected, when the caller knows it
    pub rows_affected: u64,
    /// Error description when the operation failed
    pub error: Option<String>,
}

impl QueryRecord {
    /// Record a successful execution.
    #[must_use]
    pub fn success(duration_ms: f64, rows_affected: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            duration_ms,
            timestamp: Utc::now(),
            rows_affected,
            error: None,
        }
    }

    /// Record a failed execution.
    pub fn failure(duration_ms: f64, error: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            duration_ms,
            timestamp: Utc::now(),
            rows_affected: 0,
            error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// MetricsAggregator
// ---------------------------------------------------------------------------

/// Thread-safe aggregator for checkout latency, snapshot history, query
/// records, and lifetime counters.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    /// Rolling checkout hold times in milliseconds, oldest first.
    latencies: Mutex<VecDeque<f64>>,
    /// Periodic snapshots, oldest first. Appended once per scaling tick.
    history: Mutex<VecDeque<MetricsSnapshot>>,
    /// Bounded operation outcomes for reporting.
    queries: Mutex<VecDeque<QueryRecord>>,
    total_checkouts: AtomicU64,
    total_errors: AtomicU64,
}

impl MetricsAggregator {
    /// Create an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one checkout hold duration.
    ///
    /// The oldest sample is evicted once the window holds 1000 entries.
    pub fn record_checkin(&self, duration_ms: f64) {
        let mut latencies = self.latencies.lock();
        if latencies.len() == LATENCY_WINDOW {
            latencies.pop_front();
        }
        latencies.push_back(duration_ms);
    }

    /// Increment the lifetime checkout counter.
    pub fn increment_checkouts(&self) {
        self.total_checkouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the lifetime error counter.
    pub fn increment_errors(&self) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Mean of the rolling latency window, `0.0` when empty.
    #[must_use]
    pub fn average_checkout_ms(&self) -> f64 {
        let latencies = self.latencies.lock();
        if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<f64>() / latencies.len() as f64
        }
    }

    /// Lifetime checkout count.
    #[must_use]
    pub fn total_checkouts(&self) -> u64 {
        self.total_checkouts.load(Ordering::Relaxed)
    }

    /// Lifetime error count.
    #[must_use]
    pub fn total_errors(&self) -> u64 {
        self.total_errors.load(Ordering::Relaxed)
    }

    /// Combine live pool counters with rolling stats into a snapshot.
    ///
    /// Pure read: taking a snapshot never mutates history, so on-demand
    /// queries do not pollute trend detection.
    #[must_use]
    pub fn snapshot(&self, counters: &PoolCounters) -> MetricsSnapshot {
        MetricsSnapshot {
            pool_size: counters.size,
            checked_out: counters.checked_out,
            overflow_in_use: counters.overflow_in_use,
            checked_in: counters.checked_in,
            total_connections: counters.size + counters.overflow_in_use,
            avg_checkout_ms: self.average_checkout_ms(),
            total_checkouts: self.total_checkouts(),
            total_errors: self.total_errors(),
            captured_at: Utc::now(),
        }
    }

    /// Append a snapshot to the trend history (capacity 100, FIFO eviction).
    ///
    /// Called once per scaling tick.
    pub fn record_snapshot(&self, snapshot: MetricsSnapshot) {
        let mut history = self.history.lock();
        if history.len() == HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(snapshot);
    }

    /// Append a query record (capacity 10 000, FIFO eviction).
    pub fn record_query(&self, record: QueryRecord) {
        let mut queries = self.queries.lock();
        if queries.len() == QUERY_RECORD_CAPACITY {
            queries.pop_front();
        }
        queries.push_back(record);
    }

    /// Cloned view of the snapshot history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<MetricsSnapshot> {
        self.history.lock().iter().cloned().collect()
    }

    /// Cloned view of the query records, oldest first.
    #[must_use]
    pub fn query_records(&self) -> Vec<QueryRecord> {
        self.queries.lock().iter().cloned().collect()
    }

    /// Clear every container and counter. Used on close.
    pub fn clear(&self) {
        self.latencies.lock().clear();
        self.history.lock().clear();
        self.queries.lock().clear();
        self.total_checkouts.store(0, Ordering::Relaxed);
        self.total_errors.store(0, Ordering::Relaxed);
    }
}
