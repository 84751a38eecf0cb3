//! Testing utilities: an in-process pool primitive with failure injection.
//!
//! [`InMemoryBackend`] implements [`PoolBackend`] without any real sockets:
//! handles are plain value objects, capacity is enforced with a notify-based
//! waiter queue so it survives live resizing, and tests can inject ping and
//! resize failures or slow down acquisition. Call accounting makes leak and
//! lifecycle assertions cheap.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::backend::{PoolBackend, PoolHandle, PoolObserver};
use crate::config::PoolConfig;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// TestConn
// ---------------------------------------------------------------------------

/// Fake connection handle vended by [`InMemoryBackend`].
#[derive(Debug)]
pub struct TestConn {
    id: Uuid,
    created_at: Instant,
    overflow: bool,
}

impl TestConn {
    fn new(overflow: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Instant::now(),
            overflow,
        }
    }

    /// Whether this handle was created beyond the base pool size.
    #[must_use]
    pub fn is_overflow(&self) -> bool {
        self.overflow
    }
}

impl PoolHandle for TestConn {
    fn id(&self) -> Uuid {
        self.id
    }
}

// ---------------------------------------------------------------------------
// InMemoryBackend
// ---------------------------------------------------------------------------

/// In-use and idle handle accounting, mutated under one lock.
struct State {
    checked_out: usize,
    overflow_in_use: usize,
    idle: VecDeque<TestConn>,
}

struct Inner {
    max_overflow: usize,
    recycle_age: Duration,
    base_size: AtomicUsize,
    state: Mutex<State>,
    observers: RwLock<Vec<Arc<dyn PoolObserver>>>,
    /// Wakes waiters when capacity frees up or the pool grows.
    free: Notify,

    // Failure injection
    ping_failures: AtomicUsize,
    resize_failures: AtomicUsize,
    acquire_delay: Mutex<Option<Duration>>,

    // Call accounting
    connects: AtomicUsize,
    releases: AtomicUsize,
    invalidations: AtomicUsize,
    rollbacks: AtomicUsize,
    shutdowns: AtomicUsize,
    resize_calls: Mutex<Vec<usize>>,
}

/// In-process pool primitive for tests.
#[derive(Clone)]
pub struct InMemoryBackend {
    inner: Arc<Inner>,
}

impl InMemoryBackend {
    /// Create a backend with the given base size and overflow allowance.
    #[must_use]
    pub fn new(base_size: usize, max_overflow: usize) -> Self {
        Self::with_recycle_age(base_size, max_overflow, Duration::from_secs(3600))
    }

    /// Create a backend with an explicit recycle age.
    #[must_use]
    pub fn with_recycle_age(base_size: usize, max_overflow: usize, recycle_age: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                max_overflow,
                recycle_age,
                base_size: AtomicUsize::new(base_size),
                state: Mutex::new(State {
                    checked_out: 0,
                    overflow_in_use: 0,
                    idle: VecDeque::new(),
                }),
                observers: RwLock::new(Vec::new()),
                free: Notify::new(),
                ping_failures: AtomicUsize::new(0),
                resize_failures: AtomicUsize::new(0),
                acquire_delay: Mutex::new(None),
                connects: AtomicUsize::new(0),
                releases: AtomicUsize::new(0),
                invalidations: AtomicUsize::new(0),
                rollbacks: AtomicUsize::new(0),
                shutdowns: AtomicUsize::new(0),
                resize_calls: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Create a backend sized from a manager configuration.
    #[must_use]
    pub fn from_config(config: &PoolConfig) -> Self {
        Self::with_recycle_age(config.initial_size, config.max_overflow, config.recycle_age)
    }

    // -- Failure injection ---------------------------------------------------

    /// Make the next `n` pings fail with a transient error.
    pub fn fail_pings(&self, n: usize) {
        self.inner.ping_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` resize calls fail.
    pub fn fail_resizes(&self, n: usize) {
        self.inner.resize_failures.store(n, Ordering::SeqCst);
    }

    /// Delay every acquisition by `delay` before capacity is checked.
    pub fn set_acquire_delay(&self, delay: Option<Duration>) {
        *self.inner.acquire_delay.lock() = delay;
    }

    // -- Call accounting -----------------------------------------------------

    /// Physical connections established so far.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Handles returned to the pool so far.
    #[must_use]
    pub fn releases(&self) -> usize {
        self.inner.releases.load(Ordering::SeqCst)
    }

    /// Handles discarded as broken so far.
    #[must_use]
    pub fn invalidations(&self) -> usize {
        self.inner.invalidations.load(Ordering::SeqCst)
    }

    /// Rollbacks performed so far.
    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.inner.rollbacks.load(Ordering::SeqCst)
    }

    /// Times `shutdown` was called.
    #[must_use]
    pub fn shutdowns(&self) -> usize {
        self.inner.shutdowns.load(Ordering::SeqCst)
    }

    /// Every resize target received, in call order.
    #[must_use]
    pub fn resize_calls(&self) -> Vec<usize> {
        self.inner.resize_calls.lock().clone()
    }

    // -- Internals -----------------------------------------------------------

    fn fire(&self, f: impl Fn(&dyn PoolObserver)) {
        for observer in self.inner.observers.read().iter() {
            f(observer.as_ref());
        }
    }

    /// Try to hand out a handle right now. Returns `None` at capacity.
    fn try_take(&self) -> Option<(TestConn, bool)> {
        let inner = &self.inner;
        let mut state = inner.state.lock();

        // Prefer an idle handle, dropping any past their recycle age.
        while let Some(conn) = state.idle.pop_front() {
            if conn.created_at.elapsed() > inner.recycle_age {
                continue;
            }
            state.checked_out += 1;
            return Some((conn, false));
        }

        let base = inner.base_size.load(Ordering::SeqCst);
        let regular_in_use = state.checked_out - state.overflow_in_use;
        if regular_in_use < base {
            state.checked_out += 1;
            Some((TestConn::new(false), true))
        } else if state.overflow_in_use < inner.max_overflow {
            state.checked_out += 1;
            state.overflow_in_use += 1;
            Some((TestConn::new(true), true))
        } else {
            None
        }
    }

    async fn wait_for_capacity(&self) -> (TestConn, bool) {
        loop {
            // Register interest before re-checking to avoid missed wakeups.
            let notified = self.inner.free.notified();
            if let Some(taken) = self.try_take() {
                return taken;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl PoolBackend for InMemoryBackend {
    type Handle = TestConn;

    async fn acquire(&self, timeout: Duration) -> Result<TestConn> {
        let delay = *self.inner.acquire_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (conn, is_new) = tokio::time::timeout(timeout, self.wait_for_capacity())
            .await
            .map_err(|_| {
                Error::pool_exhausted(timeout.as_millis() as u64, self.checked_out(), self.size())
            })?;

        if is_new {
            self.inner.connects.fetch_add(1, Ordering::SeqCst);
            self.fire(|o| o.on_connect(conn.id));
        }
        self.fire(|o| o.on_checkout(conn.id));
        Ok(conn)
    }

    async fn release(&self, conn: TestConn) {
        let id = conn.id;
        {
            let mut state = self.inner.state.lock();
            state.checked_out = state.checked_out.saturating_sub(1);
            if conn.overflow {
                // Overflow handles are discarded, never pooled.
                state.overflow_in_use = state.overflow_in_use.saturating_sub(1);
            } else if conn.created_at.elapsed() <= self.inner.recycle_age {
                state.idle.push_back(conn);
            }
        }
        self.inner.releases.fetch_add(1, Ordering::SeqCst);
        self.fire(|o| o.on_checkin(id));
        self.inner.free.notify_one();
    }

    async fn invalidate(&self, conn: TestConn) {
        {
            let mut state = self.inner.state.lock();
            state.checked_out = state.checked_out.saturating_sub(1);
            if conn.overflow {
                state.overflow_in_use = state.overflow_in_use.saturating_sub(1);
            }
        }
        self.inner.invalidations.fetch_add(1, Ordering::SeqCst);
        self.fire(|o| o.on_invalidate(conn.id));
        self.inner.free.notify_one();
    }

    async fn ping(&self, _conn: &mut TestConn) -> Result<()> {
        let inject = self
            .inner
            .ping_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if inject {
            return Err(Error::transient("injected ping failure"));
        }
        Ok(())
    }

    async fn rollback(&self, _conn: &mut TestConn) -> Result<()> {
        self.inner.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn resize(&self, new_size: usize) -> Result<()> {
        let inject = self
            .inner
            .resize_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if inject {
            return Err(Error::internal("injected resize failure"));
        }

        self.inner.resize_calls.lock().push(new_size);
        self.inner.base_size.store(new_size, Ordering::SeqCst);
        {
            // Shrinking retires idle handles only; in-use handles live on.
            let mut state = self.inner.state.lock();
            let regular_in_use = state.checked_out - state.overflow_in_use;
            while regular_in_use + state.idle.len() > new_size && !state.idle.is_empty() {
                state.idle.pop_back();
            }
        }
        self.inner.free.notify_waiters();
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.inner.state.lock().idle.clear();
        self.inner.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn size(&self) -> usize {
        self.inner.base_size.load(Ordering::SeqCst)
    }

    fn checked_out(&self) -> usize {
        self.inner.state.lock().checked_out
    }

    fn checked_in(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    fn overflow(&self) -> usize {
        self.inner.state.lock().overflow_in_use
    }

    fn subscribe(&self, observer: Arc<dyn PoolObserver>) {
        self.inner.observers.write().push(observer);
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("InMemoryBackend")
            .field("base_size", &self.size())
            .field("checked_out", &state.checked_out)
            .field("idle", &state.idle.len())
            .field("overflow_in_use", &state.overflow_in_use)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[tokio::test]
    async fn acquire_release_roundtrip() {
        let backend = InMemoryBackend::new(2, 0);

        let conn = backend.acquire(TIMEOUT).await.unwrap();
        assert_eq!(backend.checked_out(), 1);
        assert_eq!(backend.connects(), 1);

        backend.release(conn).await;
        assert_eq!(backend.checked_out(), 0);
        assert_eq!(backend.checked_in(), 1);
    }

    #[tokio::test]
    async fn overflow_handles_are_discarded_on_release() {
        let backend = InMemoryBackend::new(1, 1);

        let regular = backend.acquire(TIMEOUT).await.unwrap();
        let burst = backend.acquire(TIMEOUT).await.unwrap();
        assert!(burst.is_overflow());
        assert_eq!(backend.overflow(), 1);

        backend.release(burst).await;
        assert_eq!(backend.overflow(), 0);
        assert_eq!(backend.checked_in(), 0, "overflow handle must not go idle");

        backend.release(regular).await;
        assert_eq!(backend.checked_in(), 1);
    }

    #[tokio::test]
    async fn acquire_times_out_at_capacity() {
        let backend = InMemoryBackend::new(1, 0);
        let _held = backend.acquire(TIMEOUT).await.unwrap();

        let err = backend.acquire(Duration::from_millis(30)).await.unwrap_err();
        assert!(matches!(err, Error::PoolExhausted { .. }));
    }

    #[tokio::test]
    async fn release_wakes_waiter() {
        let backend = InMemoryBackend::new(1, 0);
        let held = backend.acquire(TIMEOUT).await.unwrap();

        let waiter = {
            let backend = backend.clone();
            tokio::spawn(async move { backend.acquire(Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;

        backend.release(held).await;
        let conn = waiter.await.unwrap().unwrap();
        assert_eq!(backend.checked_out(), 1);
        backend.release(conn).await;
    }

    #[tokio::test]
    async fn resize_grow_wakes_waiters() {
        let backend = InMemoryBackend::new(1, 0);
        let _held = backend.acquire(TIMEOUT).await.unwrap();

        let waiter = {
            let backend = backend.clone();
            tokio::spawn(async move { backend.acquire(Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;

        backend.resize(2).await.unwrap();
        let conn = waiter.await.unwrap().unwrap();
        assert!(!conn.is_overflow());
        assert_eq!(backend.size(), 2);
    }

    #[tokio::test]
    async fn resize_shrink_trims_idle_only() {
        let backend = InMemoryBackend::new(3, 0);
        let a = backend.acquire(TIMEOUT).await.unwrap();
        let b = backend.acquire(TIMEOUT).await.unwrap();
        let c = backend.acquire(TIMEOUT).await.unwrap();
        backend.release(b).await;
        backend.release(c).await;
        assert_eq!(backend.checked_in(), 2);

        backend.resize(1).await.unwrap();
        // One in use + idle trimmed down to the new size.
        assert_eq!(backend.checked_out(), 1, "in-use handle untouched");
        assert_eq!(backend.checked_in(), 0);

        backend.release(a).await;
    }

    #[tokio::test]
    async fn injected_ping_failures_are_consumed() {
        let backend = InMemoryBackend::new(1, 0);
        backend.fail_pings(1);

        let mut conn = backend.acquire(TIMEOUT).await.unwrap();
        assert!(backend.ping(&mut conn).await.unwrap_err().is_transient());
        assert!(backend.ping(&mut conn).await.is_ok());
        backend.release(conn).await;
    }

    #[tokio::test]
    async fn injected_resize_failures_are_consumed() {
        let backend = InMemoryBackend::new(1, 0);
        backend.fail_resizes(1);

        assert!(backend.resize(5).await.is_err());
        assert_ok!(backend.resize(5).await);
        assert_eq!(backend.resize_calls(), vec![5]);
    }

    #[tokio::test]
    async fn recycle_age_drops_stale_idle_handles() {
        let backend = InMemoryBackend::with_recycle_age(1, 0, Duration::from_millis(10));

        let conn = backend.acquire(TIMEOUT).await.unwrap();
        let first_id = conn.id();
        backend.release(conn).await;

        tokio::time::sleep(Duration::from_millis(30)).await;

        let conn = backend.acquire(TIMEOUT).await.unwrap();
        assert_ne!(conn.id(), first_id, "stale handle must be replaced");
        assert_eq!(backend.connects(), 2);
        backend.release(conn).await;
    }

    #[tokio::test]
    async fn counters_bundle_matches_getters() {
        let backend = InMemoryBackend::new(2, 1);
        let _a = backend.acquire(TIMEOUT).await.unwrap();

        let counters = backend.counters();
        assert_eq!(counters.size, 2);
        assert_eq!(counters.checked_out, 1);
        assert_eq!(counters.overflow_in_use, 0);
    }
}
