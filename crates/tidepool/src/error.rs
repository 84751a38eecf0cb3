//! Error types for the pool manager
use thiserror::Error;
use uuid::Uuid;

/// Result type for pool manager operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type covering every failure class the manager surfaces
#[derive(Error, Debug)]
pub enum Error {
    /// Pool configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// No handle became available within the acquire timeout
    #[error("Pool exhausted: {checked_out}/{pool_size} checked out after waiting {waited_ms}ms")]
    PoolExhausted {
        /// How long the caller waited, in milliseconds
        waited_ms: u64,
        /// Handles checked out at the time of failure
        checked_out: usize,
        /// Pool size at the time of failure
        pool_size: usize,
    },

    /// A disconnection-class failure was detected during validation or
    /// operation execution
    #[error("Transient connection failure: {reason}")]
    TransientConnection {
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A failure that must never be retried (e.g. a malformed request)
    #[error("Operation failed: {reason}")]
    NonRetryable {
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A handle was marked invalid by the pool primitive
    #[error("Handle {handle} invalidated: {reason}")]
    Invalidated {
        /// Identity of the invalidated handle
        handle: Uuid,
        /// Why the handle was invalidated
        reason: String,
    },

    /// Generic internal error (backend faults, runtime failures)
    #[error("Internal error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a transient connection error
    pub fn transient<S: Into<String>>(reason: S) -> Self {
        Self::TransientConnection {
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a transient connection error wrapping an underlying cause
    pub fn transient_with_source<S: Into<String>>(
        reason: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::TransientConnection {
            reason: reason.into(),
            source: Some(source),
        }
    }

    /// Create a non-retryable operation error
    pub fn non_retryable<S: Into<String>>(reason: S) -> Self {
        Self::NonRetryable {
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a pool-exhausted error
    #[must_use]
    pub fn pool_exhausted(waited_ms: u64, checked_out: usize, pool_size: usize) -> Self {
        Self::PoolExhausted {
            waited_ms,
            checked_out,
            pool_size,
        }
    }

    /// Create an invalidated-handle error
    pub fn invalidated<S: Into<String>>(handle: Uuid, reason: S) -> Self {
        Self::Invalidated {
            handle,
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check whether this error is a disconnection-class failure.
    ///
    /// Transient failures are the only class the session layer revalidates
    /// against and the only class the retry executor retries.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientConnection { .. })
    }
}
