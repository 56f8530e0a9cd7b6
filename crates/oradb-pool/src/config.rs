//! Pool configuration.

use std::time::Duration;

use oradb_client::{ConnectionDescriptor, Purity};

use crate::error::PoolError;
use crate::tag::{SessionCallback, SessionCallbackKind};

/// What `acquire` does when no idle connection fits and the pool is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum GetMode {
    /// Wait until a connection is released.
    #[default]
    Wait,
    /// Fail immediately with [`PoolError::PoolExhausted`].
    NoWait,
    /// Open one connection beyond `max`; it is closed when released.
    ForceGet,
    /// Wait up to `wait_timeout`, then fail with [`PoolError::Timeout`].
    TimedWait,
}

/// Configuration for the connection pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connections kept open at all times (default: 1).
    pub min: u32,

    /// Ceiling on open connections (default: 2).
    pub max: u32,

    /// Connections opened per growth step (default: 1). Zero is treated as 1.
    pub increment: u32,

    /// Idle time after which connections above `min` are closed.
    /// Zero keeps idle connections forever.
    pub timeout: Duration,

    /// Age after which a connection is closed instead of reused.
    /// Zero means unbounded.
    pub max_lifetime: Duration,

    /// Idle time after which a round-trip ping precedes reuse (default: 60s).
    /// `None` disables pings.
    pub ping_interval: Option<Duration>,

    /// Bound on a health check ping (default: 5s).
    pub ping_timeout: Duration,

    /// Behavior of `acquire` when the pool is exhausted.
    pub get_mode: GetMode,

    /// Bound on waiting under [`GetMode::TimedWait`].
    pub wait_timeout: Duration,

    /// Whether every connection uses the pool's credentials (default: true).
    pub homogeneous: bool,

    /// Whether the pool authenticates externally (default: false).
    pub external_auth: bool,

    /// Callback reconciling session state with a requested tag.
    pub session_callback: Option<SessionCallbackKind>,

    /// DRCP connection class, overriding the descriptor's.
    pub connection_class: Option<String>,

    /// DRCP purity, overriding the descriptor's unless left at default.
    pub purity: Purity,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min: 1,
            max: 2,
            increment: 1,
            timeout: Duration::ZERO,
            max_lifetime: Duration::ZERO,
            ping_interval: Some(Duration::from_secs(60)),
            ping_timeout: Duration::from_secs(5),
            get_mode: GetMode::Wait,
            wait_timeout: Duration::ZERO,
            homogeneous: true,
            external_auth: false,
            session_callback: None,
            connection_class: None,
            purity: Purity::Default,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum number of connections.
    #[must_use]
    pub fn min(mut self, count: u32) -> Self {
        self.min = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max(mut self, count: u32) -> Self {
        self.max = count;
        self
    }

    /// Set the growth increment.
    #[must_use]
    pub fn increment(mut self, count: u32) -> Self {
        self.increment = count;
        self
    }

    /// Set the idle timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum connection lifetime.
    #[must_use]
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Set the ping interval; `None` disables pings.
    #[must_use]
    pub fn ping_interval(mut self, interval: Option<Duration>) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set the ping timeout.
    #[must_use]
    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// Set the get mode.
    #[must_use]
    pub fn get_mode(mut self, mode: GetMode) -> Self {
        self.get_mode = mode;
        self
    }

    /// Set the wait timeout used by [`GetMode::TimedWait`].
    #[must_use]
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Allow per-acquire credentials.
    #[must_use]
    pub fn heterogeneous(mut self) -> Self {
        self.homogeneous = false;
        self
    }

    /// Authenticate externally.
    #[must_use]
    pub fn external_auth(mut self, enabled: bool) -> Self {
        self.external_auth = enabled;
        self
    }

    /// Set a session callback.
    #[must_use]
    pub fn session_callback(mut self, callback: impl SessionCallback + 'static) -> Self {
        self.session_callback = Some(SessionCallbackKind::callback(callback));
        self
    }

    /// Use a server-side procedure as the session callback.
    pub fn session_procedure(mut self, name: &str) -> Result<Self, PoolError> {
        self.session_callback = Some(SessionCallbackKind::procedure(name)?);
        Ok(self)
    }

    /// Set the DRCP connection class.
    #[must_use]
    pub fn connection_class(mut self, cclass: impl Into<String>) -> Self {
        self.connection_class = Some(cclass.into());
        self
    }

    /// Set the DRCP purity.
    #[must_use]
    pub fn purity(mut self, purity: Purity) -> Self {
        self.purity = purity;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        validate_sizing(self.min, self.max)?;
        validate_ping_timeout(self.ping_timeout)?;
        Ok(())
    }

    /// The growth increment with zero normalized to one.
    #[must_use]
    pub fn effective_increment(&self) -> u32 {
        self.increment.max(1)
    }

    /// Whether a pool with this configuration starts with no connections.
    ///
    /// Heterogeneous, externally authenticated and DRCP pools open
    /// connections only on demand.
    #[must_use]
    pub fn is_zero_start(&self, descriptor: &ConnectionDescriptor) -> bool {
        !self.homogeneous || self.external_auth || descriptor.is_drcp()
    }

    /// Interval of the housekeeping sweep, if any check needs one.
    #[must_use]
    pub fn sweep_interval(&self) -> Option<Duration> {
        [self.timeout, self.max_lifetime]
            .into_iter()
            .filter(|d| !d.is_zero())
            .min()
    }

    /// Apply the DRCP overrides to a descriptor.
    pub(crate) fn apply_to(&self, descriptor: &mut ConnectionDescriptor) {
        if let Some(cclass) = &self.connection_class {
            descriptor.cclass = Some(cclass.clone());
        }
        if self.purity != Purity::Default {
            descriptor.purity = self.purity;
        }
    }
}

pub(crate) fn validate_sizing(min: u32, max: u32) -> Result<(), PoolError> {
    if max == 0 {
        return Err(PoolError::configuration("max", "must be at least 1"));
    }
    if min > max {
        return Err(PoolError::configuration(
            "min",
            format!("{min} exceeds max ({max})"),
        ));
    }
    Ok(())
}

pub(crate) fn validate_ping_timeout(timeout: Duration) -> Result<(), PoolError> {
    if timeout.is_zero() {
        return Err(PoolError::configuration("ping_timeout", "must be positive"));
    }
    Ok(())
}

/// Attribute changes requested from [`Pool::reconfigure`](crate::Pool::reconfigure).
///
/// Unset fields keep their current value. `min`, `max` and `increment` are
/// applied together and atomically before any other attribute.
#[derive(Debug, Clone, Default)]
pub struct Reconfigure {
    /// New minimum.
    pub min: Option<u32>,
    /// New maximum.
    pub max: Option<u32>,
    /// New increment.
    pub increment: Option<u32>,
    /// New idle timeout.
    pub timeout: Option<Duration>,
    /// New maximum lifetime.
    pub max_lifetime: Option<Duration>,
    /// New ping interval; `Some(None)` disables pings.
    pub ping_interval: Option<Option<Duration>>,
    /// New ping timeout.
    pub ping_timeout: Option<Duration>,
    /// New get mode.
    pub get_mode: Option<GetMode>,
    /// New wait timeout.
    pub wait_timeout: Option<Duration>,
}

impl Reconfigure {
    /// Create an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the sizing fields together.
    #[must_use]
    pub fn sizing(mut self, min: u32, max: u32, increment: u32) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self.increment = Some(increment);
        self
    }

    /// Change the minimum.
    #[must_use]
    pub fn min(mut self, count: u32) -> Self {
        self.min = Some(count);
        self
    }

    /// Change the maximum.
    #[must_use]
    pub fn max(mut self, count: u32) -> Self {
        self.max = Some(count);
        self
    }

    /// Change the increment.
    #[must_use]
    pub fn increment(mut self, count: u32) -> Self {
        self.increment = Some(count);
        self
    }

    /// Change the idle timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Change the maximum lifetime.
    #[must_use]
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    /// Change the ping interval.
    #[must_use]
    pub fn ping_interval(mut self, interval: Option<Duration>) -> Self {
        self.ping_interval = Some(interval);
        self
    }

    /// Change the ping timeout.
    #[must_use]
    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = Some(timeout);
        self
    }

    /// Change the get mode.
    #[must_use]
    pub fn get_mode(mut self, mode: GetMode) -> Self {
        self.get_mode = Some(mode);
        self
    }

    /// Change the wait timeout.
    #[must_use]
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    /// Whether the request touches `min`, `max` or `increment`.
    #[must_use]
    pub fn changes_sizing(&self) -> bool {
        self.min.is_some() || self.max.is_some() || self.increment.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oradb_client::ServerType;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.min, 1);
        assert_eq!(config.max, 2);
        assert_eq!(config.get_mode, GetMode::Wait);
        assert_eq!(config.ping_interval, Some(Duration::from_secs(60)));
        assert!(config.homogeneous);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let err = PoolConfig::new().min(3).max(2).validate().unwrap_err();
        assert!(matches!(err, PoolError::Configuration { attribute: "min", .. }));

        let err = PoolConfig::new().min(0).max(0).validate().unwrap_err();
        assert!(matches!(err, PoolError::Configuration { attribute: "max", .. }));

        let err = PoolConfig::new()
            .ping_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            PoolError::Configuration {
                attribute: "ping_timeout",
                ..
            }
        ));
    }

    #[test]
    fn test_increment_normalized() {
        assert_eq!(PoolConfig::new().increment(0).effective_increment(), 1);
        assert_eq!(PoolConfig::new().increment(4).effective_increment(), 4);
    }

    #[test]
    fn test_zero_start_modes() {
        let desc = ConnectionDescriptor::new("h", "svc");
        assert!(!PoolConfig::new().is_zero_start(&desc));
        assert!(PoolConfig::new().heterogeneous().is_zero_start(&desc));
        assert!(PoolConfig::new().external_auth(true).is_zero_start(&desc));

        let drcp = desc.server_type(ServerType::Pooled);
        assert!(PoolConfig::new().is_zero_start(&drcp));
    }

    #[test]
    fn test_sweep_interval() {
        assert_eq!(PoolConfig::new().sweep_interval(), None);
        let config = PoolConfig::new()
            .timeout(Duration::from_secs(30))
            .max_lifetime(Duration::from_secs(10));
        assert_eq!(config.sweep_interval(), Some(Duration::from_secs(10)));
        let config = PoolConfig::new().max_lifetime(Duration::from_secs(60));
        assert_eq!(config.sweep_interval(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_drcp_overrides() {
        let mut desc = ConnectionDescriptor::new("h", "svc").cclass("DESC");
        PoolConfig::new()
            .connection_class("POOLCLASS")
            .purity(Purity::SelfSession)
            .apply_to(&mut desc);
        assert_eq!(desc.cclass.as_deref(), Some("POOLCLASS"));
        assert_eq!(desc.purity, Purity::SelfSession);
    }
}
