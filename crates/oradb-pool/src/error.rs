//! Pool error types.

use std::time::Duration;

use oradb_client::BoxError;
use thiserror::Error;

/// Errors that can occur during pool operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// The pool is closing or closed.
    #[error("pool is closed")]
    PoolClosed,

    /// NOWAIT acquire found no idle connection and no room to grow.
    #[error("pool exhausted: all {max} connections are busy")]
    PoolExhausted {
        /// Pool ceiling at the time of the request.
        max: u32,
    },

    /// TIMEDWAIT acquire did not get a connection in time.
    #[error("timed out after {0:?} waiting for a connection")]
    Timeout(Duration),

    /// Every candidate failed its health check.
    #[error("no healthy connection after {attempts} attempts")]
    PoolUnhealthy {
        /// Candidates discarded before giving up.
        attempts: u32,
    },

    /// Opening a new connection failed.
    #[error("connection error: {0}")]
    Connect(#[from] oradb_client::Error),

    /// A configuration value was rejected.
    #[error("invalid value for {attribute}: {reason}")]
    Configuration {
        /// Name of the rejected attribute.
        attribute: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The session callback failed; the connection was returned to the pool.
    #[error("session callback failed: {0}")]
    SessionCallback(#[source] BoxError),

    /// The connection is not checked out from this pool.
    #[error("connection {id} is not busy in this pool")]
    NotBusy {
        /// Pool-assigned connection id.
        id: u64,
    },

    /// Per-acquire credentials were supplied to a homogeneous pool.
    #[error("credentials can only be given per acquire on a heterogeneous pool")]
    HomogeneousCredentials,

    /// An alias is already taken.
    #[error("a pool is already registered under alias '{0}'")]
    AliasExists(String),
}

impl PoolError {
    /// Create a [`PoolError::Configuration`].
    pub fn configuration(attribute: &'static str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            attribute,
            reason: reason.into(),
        }
    }

    /// Whether retrying the same request later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PoolExhausted { .. } | Self::Timeout(_) | Self::PoolUnhealthy { .. } => true,
            Self::Connect(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(PoolError::PoolExhausted { max: 5 }.is_retryable());
        assert!(PoolError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!PoolError::PoolClosed.is_retryable());
        assert!(
            PoolError::Connect(oradb_client::Error::connect_failed("refused")).is_retryable()
        );
        assert!(
            !PoolError::Connect(oradb_client::Error::AuthFailed("denied".into())).is_retryable()
        );
    }

    #[test]
    fn test_display() {
        let err = PoolError::configuration("min", "must not exceed max (5)");
        assert_eq!(err.to_string(), "invalid value for min: must not exceed max (5)");
    }
}
