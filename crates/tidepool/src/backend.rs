//! The pool primitive interface.
//!
//! The manager does not own sockets itself; it drives a supplied
//! [`PoolBackend`] that implements acquisition, release, validation, and
//! live resizing. Lifecycle observation happens through a [`PoolObserver`]
//! registered once at initialization, not through hidden listener registries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

// ---------------------------------------------------------------------------
// PoolHandle
// ---------------------------------------------------------------------------

/// A connection handle vended by a [`PoolBackend`].
///
/// Handles are exclusively owned by one caller between acquire and release.
/// The identity is stable for the lifetime of the underlying connection and
/// is what lifecycle events are keyed on.
pub trait PoolHandle: Send + 'static {
    /// Stable identity of this handle.
    fn id(&self) -> Uuid;
}

// ---------------------------------------------------------------------------
// PoolObserver
// ---------------------------------------------------------------------------

/// Lifecycle callbacks fired by the pool primitive.
///
/// Implementations must be cheap and non-blocking; they run inline on the
/// acquire/release paths.
pub trait PoolObserver: Send + Sync {
    /// A new underlying connection was established.
    fn on_connect(&self, handle: Uuid);
    /// A handle was checked out to a caller.
    fn on_checkout(&self, handle: Uuid);
    /// A handle was returned to the pool.
    fn on_checkin(&self, handle: Uuid);
    /// A handle was discarded as broken.
    fn on_invalidate(&self, handle: Uuid);
}

// ---------------------------------------------------------------------------
// PoolCounters
// ---------------------------------------------------------------------------

/// Live counters read off the pool primitive.
///
/// A point-in-time view; the individual fields are not sampled atomically
/// with respect to each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolCounters {
    /// Configured base pool size
    pub size: usize,
    /// Handles currently held by callers
    pub checked_out: usize,
    /// Idle handles sitting in the pool
    pub checked_in: usize,
    /// Connections in use beyond the base size
    pub overflow_in_use: usize,
}

// ---------------------------------------------------------------------------
// PoolBackend
// ---------------------------------------------------------------------------

/// The connection-pool primitive the manager drives.
///
/// Implementations own the actual sockets/handles and are responsible for
/// pre-validation plumbing, age-based recycling, and bounded waiting. The
/// manager layers sizing, scaling, and health intelligence on top.
#[async_trait]
pub trait PoolBackend: Send + Sync + 'static {
    /// The handle type vended to callers.
    type Handle: PoolHandle;

    /// Acquire a handle, waiting at most `timeout`.
    ///
    /// # Errors
    /// Returns [`Error::PoolExhausted`](crate::Error::PoolExhausted) when no
    /// handle becomes available in time.
    async fn acquire(&self, timeout: Duration) -> Result<Self::Handle>;

    /// Return a handle to the pool.
    async fn release(&self, handle: Self::Handle);

    /// Discard a broken handle without returning it to the pool.
    async fn invalidate(&self, handle: Self::Handle);

    /// Probe handle liveness with a trivial round-trip.
    ///
    /// # Errors
    /// Returns a transient error when the connection is found dead.
    async fn ping(&self, handle: &mut Self::Handle) -> Result<()>;

    /// Abort any in-flight transactional state on the handle.
    async fn rollback(&self, handle: &mut Self::Handle) -> Result<()>;

    /// Resize the base pool.
    ///
    /// Growing adds idle connections up to the new size; shrinking retires
    /// excess idle connections and must never force-close in-use handles.
    async fn resize(&self, new_size: usize) -> Result<()>;

    /// Dispose the pool and every idle handle it holds.
    async fn shutdown(&self) -> Result<()>;

    /// Configured base pool size.
    fn size(&self) -> usize;

    /// Handles currently checked out.
    fn checked_out(&self) -> usize;

    /// Idle handles currently in the pool.
    fn checked_in(&self) -> usize;

    /// Connections currently in use beyond the base size.
    fn overflow(&self) -> usize;

    /// Register a lifecycle observer. Called once at initialization.
    fn subscribe(&self, observer: Arc<dyn PoolObserver>);

    /// Bundle the live counters into one view.
    fn counters(&self) -> PoolCounters {
        PoolCounters {
            size: self.size(),
            checked_out: self.checked_out(),
            checked_in: self.checked_in(),
            overflow_in_use: self.overflow(),
        }
    }
}
