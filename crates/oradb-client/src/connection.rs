//! The connection boundary.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use oradb_types::Capabilities;

use crate::error::Result;
use crate::statement::Statement;

/// Database server release, e.g. `23.4.0.24.5`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerVersion {
    /// Major release.
    pub major: u8,
    /// Release update.
    pub update: u8,
    /// Release update revision.
    pub revision: u8,
    /// Increment.
    pub increment: u8,
    /// Extension.
    pub ext: u8,
}

impl ServerVersion {
    /// Create a version from its five components.
    #[must_use]
    pub const fn new(major: u8, update: u8, revision: u8, increment: u8, ext: u8) -> Self {
        Self {
            major,
            update,
            revision,
            increment,
            ext,
        }
    }

    /// Capabilities a server of this release negotiates by default.
    ///
    /// Native BOOLEAN in SQL and 32k strings arrived with release 23.
    #[must_use]
    pub fn default_capabilities(&self) -> Capabilities {
        if self.major >= 23 {
            Capabilities::extended()
        } else {
            Capabilities::default()
        }
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}.{}",
            self.major, self.update, self.revision, self.increment, self.ext
        )
    }
}

/// Severs a session's transport from outside the task that owns the
/// connection.
///
/// After [`abort`](SessionAbort::abort) the owning connection reports
/// `is_open() == false` and every call on it fails with
/// [`Error::Closed`](crate::Error::Closed).
pub trait SessionAbort: Send + Sync + fmt::Debug {
    /// Shut the transport down. Calling it again has no effect.
    fn abort(&self);
}

/// A single authenticated session with the server.
///
/// Implemented by protocol connectors. A connection is used by one caller
/// at a time; the pool hands out exclusive ownership while it is busy.
#[async_trait]
pub trait Connection: Send + Sync + fmt::Debug {
    /// Server-assigned session identifier.
    fn session_id(&self) -> u64;

    /// Whether the transport is still open. Never performs a round trip.
    fn is_open(&self) -> bool;

    /// Capability set negotiated at connect time.
    fn capabilities(&self) -> Capabilities;

    /// Server release.
    fn server_version(&self) -> ServerVersion;

    /// Perform a round trip to the server.
    async fn ping(&mut self) -> Result<()>;

    /// Execute a statement with the values bound in its arena.
    ///
    /// Returns the number of rows affected.
    async fn execute(&mut self, statement: &mut Statement) -> Result<u64>;

    /// Close the session and its transport.
    async fn close(&mut self) -> Result<()>;

    /// Handle that closes this session while another task holds it.
    ///
    /// Connectors without out-of-band shutdown return `None`.
    fn abort_handle(&self) -> Option<Arc<dyn SessionAbort>> {
        None
    }
}
