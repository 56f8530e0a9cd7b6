//! Connection lifecycle bookkeeping and health checks.

use std::time::Duration;

use oradb_client::Connection;
use tokio::time::Instant;

use crate::config::PoolConfig;

/// State of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Idle in the pool.
    Free,
    /// Checked out by a caller.
    Busy,
    /// Failed a check and is being closed.
    Invalid,
}

/// Pool-side record of one connection.
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// Pool-assigned identifier, unique within the pool.
    pub id: u64,
    /// Server session identifier.
    pub session_id: u64,
    /// Session user, for heterogeneous pools.
    pub user: Option<String>,
    /// Current state.
    pub state: ConnectionState,
    /// When the connection was opened.
    pub created_at: Instant,
    /// When the connection was last returned to the pool.
    pub last_released_at: Instant,
    /// Whether the connection was opened beyond `max` under FORCEGET.
    pub over_limit: bool,
    /// Number of times the connection has been checked out.
    pub checkouts: u64,
}

impl ConnectionMetadata {
    /// Record for a connection opened at `now`.
    #[must_use]
    pub fn new(id: u64, session_id: u64, user: Option<String>, now: Instant) -> Self {
        Self {
            id,
            session_id,
            user,
            state: ConnectionState::Free,
            created_at: now,
            last_released_at: now,
            over_limit: false,
            checkouts: 0,
        }
    }

    /// Time since the connection was opened.
    #[must_use]
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Time since the connection was last released.
    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_released_at)
    }

    /// Whether the connection has outlived `max_lifetime` (zero: never).
    #[must_use]
    pub fn is_expired(&self, max_lifetime: Duration, now: Instant) -> bool {
        !max_lifetime.is_zero() && self.age(now) >= max_lifetime
    }

    /// Whether the connection has been idle for `timeout` (zero: never).
    #[must_use]
    pub fn is_idle_expired(&self, timeout: Duration, now: Instant) -> bool {
        !timeout.is_zero() && self.idle_for(now) >= timeout
    }
}

/// Outcome of a health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthCheckResult {
    /// The transport is open and no ping was due.
    Healthy,
    /// A ping was due and succeeded.
    Pinged,
    /// The check failed.
    Unhealthy(String),
    /// The ping did not answer within the ping timeout.
    TimedOut,
}

impl HealthCheckResult {
    /// Whether the connection may be handed out.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy | Self::Pinged)
    }

    /// Whether a round trip was attempted.
    #[must_use]
    pub fn pinged(&self) -> bool {
        !matches!(self, Self::Healthy)
    }
}

/// Validates idle connections before reuse.
#[derive(Debug, Clone, Copy)]
pub struct HealthChecker {
    ping_interval: Option<Duration>,
    ping_timeout: Duration,
}

impl HealthChecker {
    /// Create a checker.
    #[must_use]
    pub fn new(ping_interval: Option<Duration>, ping_timeout: Duration) -> Self {
        Self {
            ping_interval,
            ping_timeout,
        }
    }

    /// Checker using a pool's ping settings.
    #[must_use]
    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(config.ping_interval, config.ping_timeout)
    }

    /// Transport-level check without a round trip.
    #[must_use]
    pub fn quick_check(connection: &dyn Connection) -> bool {
        connection.is_open()
    }

    /// Round trip bounded by the ping timeout.
    pub async fn full_check(&self, connection: &mut dyn Connection) -> HealthCheckResult {
        match tokio::time::timeout(self.ping_timeout, connection.ping()).await {
            Ok(Ok(())) => HealthCheckResult::Pinged,
            Ok(Err(e)) => HealthCheckResult::Unhealthy(e.to_string()),
            Err(_) => HealthCheckResult::TimedOut,
        }
    }

    /// Whether a connection idle since its last release needs a ping.
    #[must_use]
    pub fn ping_due(&self, metadata: &ConnectionMetadata, now: Instant) -> bool {
        self.ping_interval
            .is_some_and(|interval| metadata.idle_for(now) >= interval)
    }

    /// Check for a connection that was just opened: the quick check only.
    #[must_use]
    pub fn check_opened(connection: &dyn Connection) -> HealthCheckResult {
        if Self::quick_check(connection) {
            HealthCheckResult::Healthy
        } else {
            HealthCheckResult::Unhealthy("transport closed".into())
        }
    }

    /// Quick check always, full check when a ping is due.
    pub async fn check(
        &self,
        connection: &mut dyn Connection,
        metadata: &ConnectionMetadata,
        now: Instant,
    ) -> HealthCheckResult {
        let quick = Self::check_opened(connection);
        if !quick.is_healthy() {
            return quick;
        }
        if self.ping_due(metadata, now) {
            return self.full_check(connection).await;
        }
        HealthCheckResult::Healthy
    }
}
