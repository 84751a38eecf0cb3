//! Property tests for scaling bounds and health scoring.

use chrono::Utc;
use proptest::prelude::*;

use tidepool::{MetricsSnapshot, PoolConfig, ScalingDecision, evaluate, health_score};

fn snapshot(
    checked_out: usize,
    total_connections: usize,
    avg_checkout_ms: f64,
    overflow_in_use: usize,
    total_errors: u64,
) -> MetricsSnapshot {
    MetricsSnapshot {
        pool_size: total_connections.saturating_sub(overflow_in_use),
        checked_out,
        overflow_in_use,
        checked_in: total_connections.saturating_sub(checked_out),
        total_connections,
        avg_checkout_ms,
        total_checkouts: 0,
        total_errors,
        captured_at: Utc::now(),
    }
}

fn arb_snapshot() -> impl Strategy<Value = MetricsSnapshot> {
    (
        0usize..200,
        0usize..200,
        0.0f64..500.0,
        0usize..20,
        0u64..100,
    )
        .prop_map(|(out, total, avg, overflow, errors)| {
            snapshot(out.min(total), total, avg, overflow.min(total), errors)
        })
}

proptest! {
    /// For every sequence of snapshots, applying each tick's decision keeps
    /// the size inside the configured bounds.
    #[test]
    fn current_size_never_escapes_bounds(
        min in 1usize..20,
        span in 0usize..80,
        up_step in 1usize..10,
        down_step in 1usize..10,
        snapshots in prop::collection::vec(arb_snapshot(), 1..60),
    ) {
        let max = min + span;
        let config = PoolConfig {
            min_size: min,
            max_size: max,
            initial_size: min,
            scale_up_step: up_step,
            scale_down_step: down_step,
            ..Default::default()
        };

        let mut current = min + span / 2;
        for snap in &snapshots {
            match evaluate(&config, current, snap) {
                ScalingDecision::Grow { target, .. } => {
                    prop_assert!(target > current);
                    current = target;
                }
                ScalingDecision::Shrink { target, .. } => {
                    prop_assert!(target < current);
                    current = target;
                }
                ScalingDecision::Hold => {}
            }
            prop_assert!(current >= min, "size {current} fell below min {min}");
            prop_assert!(current <= max, "size {current} rose above max {max}");
        }
    }

    /// Decisions that resize always change the size; `Hold` never does.
    #[test]
    fn decisions_are_never_no_op_resizes(
        current in 1usize..100,
        snap in arb_snapshot(),
    ) {
        let config = PoolConfig {
            min_size: 1,
            max_size: 100,
            initial_size: 1,
            ..Default::default()
        };
        if let Some(target) = evaluate(&config, current, &snap).target() {
            prop_assert_ne!(target, current);
        }
    }

    /// The health score stays within 0..=100 for any snapshot.
    #[test]
    fn health_score_is_bounded(snap in arb_snapshot()) {
        let score = health_score(&snap);
        prop_assert!(score <= 100);
    }

    /// More errors can only lower the score, never raise it.
    #[test]
    fn health_score_is_monotone_in_errors(
        snap in arb_snapshot(),
        extra in 0u64..1000,
    ) {
        let mut worse = snap.clone();
        worse.total_errors += extra;
        prop_assert!(health_score(&worse) <= health_score(&snap));
    }

    /// Slower checkouts can only lower the score.
    #[test]
    fn health_score_is_monotone_in_latency(
        snap in arb_snapshot(),
        extra in 0.0f64..1000.0,
    ) {
        let mut worse = snap.clone();
        worse.avg_checkout_ms += extra;
        prop_assert!(health_score(&worse) <= health_score(&snap));
    }

    /// Higher utilization (more checked out, same capacity) can only lower
    /// the score.
    #[test]
    fn health_score_is_monotone_in_utilization(
        total in 1usize..200,
        out in 0usize..200,
        more in 0usize..200,
    ) {
        let out = out.min(total);
        let worse_out = (out + more).min(total);
        let base = snapshot(out, total, 0.0, 0, 0);
        let worse = snapshot(worse_out, total, 0.0, 0, 0);
        prop_assert!(health_score(&worse) <= health_score(&base));
    }
}
