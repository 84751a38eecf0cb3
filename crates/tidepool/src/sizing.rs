//! Initial pool sizing from host resources.
//!
//! Runs once at startup to seed the pool size before the adaptive loop takes
//! over. Pure: the same inputs always produce the same recommendation, and the
//! result is guaranteed to lie within the configured bounds.

use crate::config::{HostResources, PoolConfig};

/// Assumed memory cost per pooled connection, in megabytes.
const PER_CONNECTION_MB: f64 = 10.0;

/// Fraction of host memory the pool is allowed to budget for.
const MEMORY_BUDGET_FRACTION: f64 = 0.25;

/// Recommend an initial pool size for the given host.
///
/// Takes the smaller of a CPU-derived size (three connections per core) and a
/// memory-derived cap (a quarter of the memory budget at the assumed per
/// connection cost), then clamps into `[min_size, max_size]`.
#[must_use]
pub fn initial_pool_size(host: &HostResources, config: &PoolConfig) -> usize {
    let base = host.cpu_cores * 3;
    let memory_budget = host.total_memory_mb * MEMORY_BUDGET_FRACTION;
    let memory_limited = (memory_budget / PER_CONNECTION_MB / 4.0).floor() as usize;
    let optimal = base.min(memory_limited);
    optimal.clamp(config.min_size, config.max_size)
}
