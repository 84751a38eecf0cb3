//! Scoped acquisition of a validated connection handle.
//!
//! A [`Session`] owns one handle between acquire and release. Validation runs
//! before the handle is handed to the caller, with exactly one reconnect
//! attempt if the first handle turns out to be dead. Release happens exactly
//! once, on every exit path: normal return, error, panic unwind, or the
//! enclosing future being dropped mid-flight.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;
use uuid::Uuid;

use crate::backend::{PoolBackend, PoolHandle};
use crate::error::{Error, Result};

/// RAII scope around one checked-out handle.
///
/// Derefs to the backend's handle type. Dropping the session returns the
/// handle to the pool; [`invalidate`](Self::invalidate) consumes the session
/// and discards the handle instead.
pub struct Session<B: PoolBackend> {
    handle: Option<B::Handle>,
    backend: Arc<B>,
}

impl<B: PoolBackend> Session<B> {
    /// Acquire and validate a handle from the backend.
    ///
    /// Waits at most `timeout` for a free handle, then probes liveness. A
    /// disconnection-class probe failure discards the broken handle and
    /// retries with exactly one fresh acquisition; a second failure surfaces
    /// as [`Error::TransientConnection`].
    ///
    /// # Errors
    /// [`Error::PoolExhausted`] when no handle frees up in time;
    /// [`Error::TransientConnection`] when validation fails twice.
    pub(crate) async fn acquire(backend: Arc<B>, timeout: Duration) -> Result<Self> {
        let mut handle = backend.acquire(timeout).await?;

        if let Err(err) = backend.ping(&mut handle).await {
            if !err.is_transient() {
                backend.release(handle).await;
                return Err(err);
            }

            // Dead handle: discard it and try exactly one replacement.
            warn!(handle = %handle.id(), %err, "validation failed, reconnecting once");
            backend.invalidate(handle).await;

            let mut fresh = backend.acquire(timeout).await?;
            if let Err(second) = backend.ping(&mut fresh).await {
                backend.invalidate(fresh).await;
                return Err(Error::transient(format!(
                    "validation failed after reconnect: {second}"
                )));
            }
            handle = fresh;
        }

        Ok(Self {
            handle: Some(handle),
            backend,
        })
    }

    /// Identity of the held handle.
    #[must_use]
    pub fn handle_id(&self) -> Uuid {
        self.handle_ref().id()
    }

    /// Borrow the held handle.
    #[must_use]
    pub fn handle_ref(&self) -> &B::Handle {
        self.handle
            .as_ref()
            .expect("session handle taken before drop")
    }

    /// Mutably borrow the held handle.
    pub fn handle_mut(&mut self) -> &mut B::Handle {
        self.handle
            .as_mut()
            .expect("session handle taken before drop")
    }

    /// Discard the handle as broken instead of returning it to the pool.
    pub async fn invalidate(mut self) {
        if let Some(handle) = self.handle.take() {
            self.backend.invalidate(handle).await;
        }
    }
}

impl<B: PoolBackend> std::ops::Deref for Session<B> {
    type Target = B::Handle;

    fn deref(&self) -> &B::Handle {
        self.handle_ref()
    }
}

impl<B: PoolBackend> std::ops::DerefMut for Session<B> {
    fn deref_mut(&mut self) -> &mut B::Handle {
        self.handle_mut()
    }
}

impl<B: PoolBackend> Drop for Session<B> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let backend = Arc::clone(&self.backend);
            // Release must not be lost even when the caller's future is
            // cancelled; hand the handle back on a detached task.
            drop(tokio::spawn(async move {
                backend.release(handle).await;
            }));
        }
    }
}

impl<B: PoolBackend> std::fmt::Debug for Session<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("handle", &self.handle.as_ref().map(PoolHandle::id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryBackend;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_millis(200);

    async fn settle() {
        // Let spawned release tasks run.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
    }

    #[tokio::test]
    async fn acquire_validates_and_releases_on_drop() {
        let backend = Arc::new(InMemoryBackend::new(2, 0));

        {
            let session = Session::acquire(Arc::clone(&backend), TIMEOUT)
                .await
                .unwrap();
            assert_eq!(backend.checked_out(), 1);
            let _ = session.handle_id();
        }
        settle().await;

        assert_eq!(backend.checked_out(), 0);
        assert_eq!(backend.checked_in(), 1);
    }

    #[tokio::test]
    async fn dead_handle_reconnects_once() {
        let backend = Arc::new(InMemoryBackend::new(2, 0));
        backend.fail_pings(1);

        let session = Session::acquire(Arc::clone(&backend), TIMEOUT)
            .await
            .unwrap();

        // The first handle was discarded, the replacement validated.
        assert_eq!(backend.invalidations(), 1);
        assert_eq!(backend.checked_out(), 1);
        drop(session);
    }

    #[tokio::test]
    async fn second_validation_failure_is_transient_error() {
        let backend = Arc::new(InMemoryBackend::new(2, 0));
        backend.fail_pings(2);

        let err = Session::acquire(Arc::clone(&backend), TIMEOUT)
            .await
            .unwrap_err();

        assert!(err.is_transient());
        // Both broken handles were discarded, nothing leaked.
        assert_eq!(backend.invalidations(), 2);
        assert_eq!(backend.checked_out(), 0);
    }

    #[tokio::test]
    async fn exhausted_pool_times_out() {
        let backend = Arc::new(InMemoryBackend::new(1, 0));

        let held = Session::acquire(Arc::clone(&backend), TIMEOUT)
            .await
            .unwrap();

        let err = Session::acquire(Arc::clone(&backend), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PoolExhausted { .. }));

        drop(held);
    }

    #[tokio::test]
    async fn invalidate_discards_instead_of_releasing() {
        let backend = Arc::new(InMemoryBackend::new(2, 0));

        let session = Session::acquire(Arc::clone(&backend), TIMEOUT)
            .await
            .unwrap();
        session.invalidate().await;
        settle().await;

        assert_eq!(backend.invalidations(), 1);
        assert_eq!(backend.checked_in(), 0, "discarded handle must not go idle");
        assert_eq!(backend.checked_out(), 0);
    }

    #[tokio::test]
    async fn cancelled_acquirer_leaks_nothing() {
        let backend = Arc::new(InMemoryBackend::new(1, 0));

        let task = {
            let backend = Arc::clone(&backend);
            tokio::spawn(async move {
                let _session = Session::acquire(backend, TIMEOUT).await.unwrap();
                // Hold the session until the task is aborted.
                tokio::time::sleep(Duration::from_secs(3600)).await;
            })
        };

        // Let the task acquire, then cancel it mid-hold.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.checked_out(), 1);
        task.abort();
        let _ = task.await;
        settle().await;

        assert_eq!(backend.checked_out(), 0, "abort must still release");
    }

    #[tokio::test]
    async fn released_handle_is_reused() {
        let backend = Arc::new(InMemoryBackend::new(1, 0));

        let first_id = {
            let session = Session::acquire(Arc::clone(&backend), TIMEOUT)
                .await
                .unwrap();
            session.handle_id()
        };
        settle().await;

        let session = Session::acquire(Arc::clone(&backend), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(session.handle_id(), first_id);
        assert_eq!(backend.connects(), 1, "no second physical connection");
    }
}
