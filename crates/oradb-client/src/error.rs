//! Client error types.

use std::time::Duration;

use oradb_types::TypeError;
use thiserror::Error;

/// Boxed error from a network or protocol layer below the client.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while connecting to or using a connection.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The connection could not be established.
    #[error("connection failed: {message}")]
    ConnectFailed {
        /// Description of the failure.
        message: String,
        /// Underlying network or protocol error.
        #[source]
        source: Option<BoxError>,
    },

    /// The server rejected the credentials.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The connection has been closed.
    #[error("connection closed")]
    Closed,

    /// An operation did not complete in time.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// A bind value was rejected.
    #[error("bind error: {0}")]
    Type(#[from] TypeError),

    /// The server returned an error for a statement.
    #[error("ORA-{code:05}: {message}")]
    Server {
        /// Server error number.
        code: u32,
        /// Server error message.
        message: String,
    },

    /// Invalid connection parameters.
    #[error("configuration error: {0}")]
    Config(String),

    /// No connector is registered for the descriptor's protocol.
    #[error("no connector registered for protocol '{0}'")]
    UnknownProtocol(String),

    /// An identifier failed validation.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// IO error on the underlying transport.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a [`Error::ConnectFailed`] without an underlying cause.
    pub fn connect_failed(message: impl Into<String>) -> Self {
        Self::ConnectFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a [`Error::ConnectFailed`] wrapping the network or protocol cause.
    pub fn connect_failed_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::ConnectFailed {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Whether a new connection attempt may succeed where this one failed.
    ///
    /// Authentication failures are never transient.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectFailed { .. } | Self::Timeout(_) | Self::Io(_))
    }

    /// Whether the error means the session itself is unusable.
    #[must_use]
    pub fn is_session_dead(&self) -> bool {
        matches!(self, Self::Closed | Self::Io(_))
    }
}
