//! Drive the full manager stack against the in-memory backend.
//!
//! Run with: `cargo run --example adaptive_pool`

use std::time::Duration;

use tidepool::testing::InMemoryBackend;
use tidepool::{Error, HostResources, PoolConfig, PoolManager, RetryPolicy};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = PoolConfig::default()
        .with_bounds(2, 16)
        .with_initial_size(4)
        .with_tick_period(Duration::from_secs(1))
        .with_scale_cooldown(Duration::from_secs(3));

    let backend = InMemoryBackend::from_config(&config);
    let manager =
        PoolManager::initialize(backend, config, HostResources::new(4, 8192.0)).await?;

    // A few session-scoped operations, one of them retried.
    for i in 0..8u32 {
        let value = manager
            .execute_with_retry(
                move |_conn| {
                    Box::pin(async move {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        Ok(i * 2)
                    })
                },
                &RetryPolicy::default(),
            )
            .await?;
        println!("operation {i} -> {value}");
    }

    // Let the scaling loop observe the workload.
    tokio::time::sleep(Duration::from_millis(1200)).await;

    let health = manager.health_check().await;
    println!(
        "health: {:?} (score {}, probe {:.2}ms)",
        health.status, health.score, health.response_time_ms
    );

    let report = manager.performance_report();
    println!(
        "utilization {:.0}%, avg query {:.2}ms, trend {}",
        report.summary.pool_utilization_pct,
        report.summary.avg_query_time_ms,
        report.summary.trend
    );
    for line in &report.recommendations {
        println!("recommendation: {line}");
    }

    manager.close().await
}
