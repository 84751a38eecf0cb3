//! The pool manager: public surface over backend, metrics, and scaling.
//!
//! [`PoolManager::initialize`] validates configuration, seeds the pool size
//! from host resources, subscribes instrumentation to the backend, and starts
//! the scaling loop. Callers then acquire sessions (directly or through the
//! retry executor) while health and performance reports read the shared
//! aggregator on demand. [`PoolManager::close`] stops the loop, waits for the
//! in-flight tick, and only then disposes the backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{PoolBackend, PoolObserver};
use crate::config::{HostResources, PoolConfig};
use crate::error::{Error, Result};
use crate::health::HealthReport;
use crate::hooks::Instrumentation;
use crate::metrics::{MetricsAggregator, MetricsSnapshot, QueryRecord};
use crate::report::PerformanceReport;
use crate::retry::RetryPolicy;
use crate::scaling::ScalingController;
use crate::session::Session;
use crate::sizing;

/// Adaptive manager over a connection-pool primitive.
///
/// One instance per pool; cheap to share behind an `Arc`.
pub struct PoolManager<B: PoolBackend> {
    backend: Arc<B>,
    config: PoolConfig,
    metrics: Arc<MetricsAggregator>,
    controller: Arc<ScalingController>,
    scaling_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl<B: PoolBackend> PoolManager<B> {
    /// Initialize the manager over a backend.
    ///
    /// Validates `config`, sizes the pool from `host` (the advisor's clamped
    /// recommendation replaces `config.initial_size`), registers lifecycle
    /// instrumentation with the backend, and spawns the scaling loop when
    /// scaling is enabled.
    ///
    /// # Errors
    /// [`Error::Configuration`] on invalid bounds; any backend error from the
    /// initial resize.
    pub async fn initialize(backend: B, config: PoolConfig, host: HostResources) -> Result<Self> {
        config.validate()?;

        let backend = Arc::new(backend);
        let metrics = Arc::new(MetricsAggregator::new());
        let instrumentation: Arc<dyn PoolObserver> =
            Arc::new(Instrumentation::new(Arc::clone(&metrics)));
        backend.subscribe(instrumentation);

        let initial_size = sizing::initial_pool_size(&host, &config);
        backend.resize(initial_size).await?;
        info!(
            initial_size,
            cpu_cores = host.cpu_cores,
            total_memory_mb = host.total_memory_mb,
            "pool seeded from host resources"
        );

        let controller = Arc::new(ScalingController::new(config.clone(), initial_size));
        let scaling_task = if config.scaling_enabled {
            Some(controller.start(Arc::clone(&backend), Arc::clone(&metrics)))
        } else {
            debug!("adaptive scaling disabled");
            None
        };

        Ok(Self {
            backend,
            config,
            metrics,
            controller,
            scaling_task: Mutex::new(scaling_task),
            closed: AtomicBool::new(false),
        })
    }

    /// Acquire a validated session.
    ///
    /// The handle is released back to the pool exactly once when the session
    /// drops, whatever the exit path.
    ///
    /// # Errors
    /// [`Error::PoolExhausted`] after `acquire_timeout`;
    /// [`Error::TransientConnection`] when validation fails twice.
    pub async fn acquire(&self) -> Result<Session<B>> {
        self.ensure_open()?;
        Session::acquire(Arc::clone(&self.backend), self.config.acquire_timeout).await
    }

    /// Run one operation against a session-scoped handle.
    ///
    /// On an operation error that is not a disconnect, the handle is rolled
    /// back before release; on a transient error the handle is discarded
    /// rather than returned to the pool.
    ///
    /// # Errors
    /// Acquisition errors, plus whatever the operation returns.
    pub async fn with_session<T, F>(&self, op: F) -> Result<T>
    where
        T: Send,
        F: for<'a> FnOnce(&'a mut B::Handle) -> BoxFuture<'a, Result<T>> + Send,
    {
        let mut session = self.acquire().await?;
        match op(session.handle_mut()).await {
            Ok(value) => Ok(value),
            Err(err) if err.is_transient() => {
                // A dead connection must not rejoin the pool.
                session.invalidate().await;
                Err(err)
            }
            Err(err) => {
                if let Err(rollback_err) = self.backend.rollback(session.handle_mut()).await {
                    warn!(%rollback_err, "rollback failed after operation error");
                }
                Err(err)
            }
        }
    }

    /// Run an operation with retry on transient connection failures.
    ///
    /// Each attempt acquires its own session via [`with_session`]. Transient
    /// failures back off exponentially (`base_delay * 2^attempt`) between
    /// attempts; every other error propagates immediately. Each attempt also
    /// appends a [`QueryRecord`] to the aggregator.
    ///
    /// # Errors
    /// The last transient error once attempts are exhausted, or the first
    /// non-transient error.
    ///
    /// [`with_session`]: Self::with_session
    pub async fn execute_with_retry<T, F>(&self, mut op: F, policy: &RetryPolicy) -> Result<T>
    where
        T: Send,
        F: for<'a> FnMut(&'a mut B::Handle) -> BoxFuture<'a, Result<T>> + Send,
    {
        let mut last_transient: Option<Error> = None;

        for attempt in 0..policy.max_retries {
            let started = Instant::now();
            match self.with_session(&mut op).await {
                Ok(value) => {
                    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
                    self.metrics.record_query(QueryRecord::success(duration_ms, 0));
                    return Ok(value);
                }
                Err(err) if err.is_transient() => {
                    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
                    self.metrics
                        .record_query(QueryRecord::failure(duration_ms, err.to_string()));

                    let delay = policy.backoff_delay(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, %err, "transient failure, backing off");
                    last_transient = Some(err);
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
                    self.metrics
                        .record_query(QueryRecord::failure(duration_ms, err.to_string()));
                    return Err(err);
                }
            }
        }

        Err(last_transient
            .unwrap_or_else(|| Error::internal("retry policy allowed zero attempts")))
    }

    /// Point-in-time metrics snapshot from live counters.
    ///
    /// Pure read: never touches the trend history.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot(&self.backend.counters())
    }

    /// Probe liveness and score the current snapshot.
    ///
    /// Never returns an error: a failed probe yields an unhealthy report
    /// with a zero score.
    pub async fn health_check(&self) -> HealthReport {
        let snapshot = self.snapshot();
        let backend = Arc::clone(&self.backend);

        let started = Instant::now();
        let probe: Result<()> = self
            .with_session(move |conn| Box::pin(async move { backend.ping(conn).await }))
            .await;
        let response_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        match probe {
            Ok(()) => HealthReport::from_probe(response_time_ms, snapshot),
            Err(err) => {
                warn!(%err, "health probe failed");
                HealthReport::probe_failed(err.to_string(), response_time_ms, snapshot)
            }
        }
    }

    /// Build a performance report from the snapshot, history, and query
    /// records.
    #[must_use]
    pub fn performance_report(&self) -> PerformanceReport {
        PerformanceReport::build(
            self.snapshot(),
            &self.metrics.history(),
            &self.metrics.query_records(),
        )
    }

    /// Record an operation outcome a caller measured itself (e.g. with a
    /// known row count).
    pub fn record_query(&self, record: QueryRecord) {
        self.metrics.record_query(record);
    }

    /// The configuration this manager was initialized with.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// The size the pool was last resized to.
    #[must_use]
    pub fn current_size(&self) -> usize {
        self.controller.current_size()
    }

    /// The shared metrics aggregator.
    #[must_use]
    pub fn metrics(&self) -> &MetricsAggregator {
        &self.metrics
    }

    /// Stop the scaling loop, wait for the in-flight tick, clear metric
    /// containers, and dispose the backend.
    ///
    /// Idempotent: subsequent calls return `Ok(())` without effect.
    ///
    /// # Errors
    /// Whatever the backend's `shutdown` returns.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.controller.shutdown();
        let task = self.scaling_task.lock().take();
        if let Some(task) = task {
            // Joining here guarantees no resize can race backend disposal.
            if let Err(err) = task.await {
                warn!(%err, "scaling loop terminated abnormally");
            }
        }

        self.metrics.clear();
        info!("pool manager closed");
        self.backend.shutdown().await
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::internal("pool manager is closed"));
        }
        Ok(())
    }
}

impl<B: PoolBackend> Drop for PoolManager<B> {
    fn drop(&mut self) {
        // Best effort: stop the loop even when close() was never called.
        self.controller.shutdown();
    }
}

impl<B: PoolBackend> std::fmt::Debug for PoolManager<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("config", &self.config)
            .field("current_size", &self.controller.current_size())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
