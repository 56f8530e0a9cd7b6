//! Connection factories and the connector registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::config::{ConnectionDescriptor, Credentials};
use crate::connection::Connection;
use crate::error::{Error, Result};

/// Performs the handshake that turns a descriptor and credentials into a
/// live [`Connection`].
///
/// Calls are independent of each other; a factory keeps no per-connection
/// state.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Open a new connection.
    ///
    /// Fails with [`Error::ConnectFailed`] when the server cannot be reached
    /// or the handshake fails, and [`Error::AuthFailed`] when the
    /// credentials are rejected.
    async fn open(
        &self,
        descriptor: &ConnectionDescriptor,
        credentials: &Credentials,
    ) -> Result<Box<dyn Connection>>;
}

/// Maps transport protocols to the factories that speak them.
///
/// The registry is an ordinary value handed to whoever opens connections,
/// so different pools can use different connectors side by side.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    factories: Arc<RwLock<HashMap<String, Arc<dyn ConnectionFactory>>>>,
}

impl ConnectorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` for `protocol`, returning the factory it replaces.
    pub fn register(
        &self,
        protocol: &str,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Option<Arc<dyn ConnectionFactory>> {
        let protocol = protocol.to_ascii_lowercase();
        tracing::debug!(protocol = %protocol, "registering connector");
        self.factories.write().insert(protocol, factory)
    }

    /// Remove the factory for `protocol`.
    pub fn unregister(&self, protocol: &str) -> Option<Arc<dyn ConnectionFactory>> {
        self.factories.write().remove(&protocol.to_ascii_lowercase())
    }

    /// Look up the factory for `protocol`.
    pub fn get(&self, protocol: &str) -> Result<Arc<dyn ConnectionFactory>> {
        self.factories
            .read()
            .get(&protocol.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| Error::UnknownProtocol(protocol.to_string()))
    }

    /// Registered protocols, sorted.
    #[must_use]
    pub fn protocols(&self) -> Vec<String> {
        let mut protocols: Vec<String> = self.factories.read().keys().cloned().collect();
        protocols.sort();
        protocols
    }

    /// Open a connection with the factory registered for the descriptor's
    /// protocol.
    pub async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
        credentials: &Credentials,
    ) -> Result<Box<dyn Connection>> {
        let factory = self.get(&descriptor.protocol)?;
        connect(factory.as_ref(), descriptor, credentials).await
    }
}

impl fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("protocols", &self.protocols())
            .finish()
    }
}

/// Open a connection, applying the descriptor's timeout and retry policy.
///
/// Each attempt is bounded by `tcp_connect_timeout`. Transient failures are
/// retried `retry_count` times with `retry_delay` between attempts;
/// authentication failures are returned immediately.
pub async fn connect(
    factory: &dyn ConnectionFactory,
    descriptor: &ConnectionDescriptor,
    credentials: &Credentials,
) -> Result<Box<dyn Connection>> {
    descriptor.validate()?;

    let attempts = descriptor.retry_count.saturating_add(1);
    let mut attempt = 1;
    loop {
        tracing::debug!(
            address = %descriptor.address(),
            attempt = attempt,
            "opening connection"
        );

        let result =
            match tokio::time::timeout(descriptor.tcp_connect_timeout, factory.open(descriptor, credentials))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(descriptor.tcp_connect_timeout)),
            };

        match result {
            Ok(conn) => {
                tracing::debug!(
                    session_id = conn.session_id(),
                    server_version = %conn.server_version(),
                    "connection established"
                );
                return Ok(conn);
            }
            Err(e) if e.is_transient() && attempt < attempts => {
                tracing::warn!(
                    attempt = attempt,
                    error = %e,
                    "connect attempt failed, retrying"
                );
                attempt += 1;
                tokio::time::sleep(descriptor.retry_delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
