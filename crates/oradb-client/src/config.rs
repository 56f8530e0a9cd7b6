//! Resolved connection descriptors and credentials.
//!
//! Both types are produced by collaborators outside this crate (connect
//! string resolution, wallets, token providers) and handed to a
//! [`ConnectionFactory`](crate::factory::ConnectionFactory). Nothing here
//! parses connect strings.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Error;

/// Server process type requested for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerType {
    /// A dedicated server process.
    Dedicated,
    /// A shared server process.
    Shared,
    /// A server process from the database resident connection pool (DRCP).
    Pooled,
}

/// Whether a reused DRCP session keeps its session state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Purity {
    /// Let the server decide.
    #[default]
    Default,
    /// Always start from a fresh session (NEW).
    New,
    /// Reuse the session with its state intact (SELF).
    SelfSession,
}

/// When an implicitly pooled DRCP session is released back to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolBoundary {
    /// After every statement.
    Statement,
    /// At the end of every transaction.
    Transaction,
}

/// Privileged authentication mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AuthMode {
    /// Normal session.
    #[default]
    Default,
    /// SYSDBA privilege.
    SysDba,
    /// SYSOPER privilege.
    SysOper,
    /// SYSASM privilege.
    SysAsm,
    /// SYSBACKUP privilege.
    SysBackup,
    /// SYSDG privilege.
    SysDg,
    /// SYSKM privilege.
    SysKm,
    /// SYSRAC privilege.
    SysRac,
}

macro_rules! impl_from_str {
    ($ty:ty, $what:literal, { $($name:literal => $variant:expr),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($name => Ok($variant),)+
                    other => Err(Error::Config(format!(concat!("invalid ", $what, ": {}"), other))),
                }
            }
        }
    };
}

impl_from_str!(ServerType, "server type", {
    "dedicated" => ServerType::Dedicated,
    "shared" => ServerType::Shared,
    "pooled" => ServerType::Pooled,
});

impl_from_str!(Purity, "purity", {
    "default" => Purity::Default,
    "new" => Purity::New,
    "self" => Purity::SelfSession,
});

impl_from_str!(PoolBoundary, "pool boundary", {
    "statement" => PoolBoundary::Statement,
    "transaction" => PoolBoundary::Transaction,
});

/// A resolved description of where and how to connect.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionDescriptor {
    /// Transport protocol, used to pick the connector (default: `tcp`).
    pub protocol: String,
    /// Listener host name.
    pub host: String,
    /// Listener port (default: 1521).
    pub port: u16,
    /// Database service name.
    pub service_name: Option<String>,
    /// Database instance SID, used when no service name is given.
    pub sid: Option<String>,
    /// Requested server process type.
    pub server_type: Option<ServerType>,
    /// DRCP connection class.
    pub cclass: Option<String>,
    /// DRCP session purity.
    pub purity: Purity,
    /// Implicit connection pooling boundary.
    pub pool_boundary: Option<PoolBoundary>,
    /// Privileged authentication mode.
    pub mode: AuthMode,
    /// Extra attempts after a failed connect.
    pub retry_count: u32,
    /// Delay between connect attempts.
    pub retry_delay: Duration,
    /// Bound on each connect attempt.
    pub tcp_connect_timeout: Duration,
    /// Interval of keepalive probes on the transport; zero disables them.
    pub expire_time: Duration,
    /// Session data unit size in bytes.
    pub sdu: u32,
    /// Statements cached per connection; zero disables caching.
    pub stmtcachesize: usize,
    /// Edition for edition-based redefinition.
    pub edition: Option<String>,
    /// Application context entries as `(namespace, name, value)`.
    pub appcontext: Vec<(String, String, String)>,
    /// Prefix added to the connection id sent to the server for tracing.
    pub connection_id_prefix: Option<String>,
    /// Program name reported to the server.
    pub program: String,
    /// Machine name reported to the server.
    pub machine: String,
    /// Terminal name reported to the server.
    pub terminal: String,
    /// Operating system user reported to the server.
    pub osuser: String,
    /// Driver name reported to the server.
    pub driver_name: String,
}

impl Default for ConnectionDescriptor {
    fn default() -> Self {
        Self {
            protocol: "tcp".to_string(),
            host: "localhost".to_string(),
            port: 1521,
            service_name: None,
            sid: None,
            server_type: None,
            cclass: None,
            purity: Purity::Default,
            pool_boundary: None,
            mode: AuthMode::Default,
            retry_count: 0,
            retry_delay: Duration::from_secs(1),
            tcp_connect_timeout: Duration::from_secs(20),
            expire_time: Duration::ZERO,
            sdu: 8192,
            stmtcachesize: 20,
            edition: None,
            appcontext: Vec::new(),
            connection_id_prefix: None,
            program: "oradb".to_string(),
            machine: "localhost".to_string(),
            terminal: "unknown".to_string(),
            osuser: String::new(),
            driver_name: concat!("oradb-rs : ", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ConnectionDescriptor {
    /// Create a descriptor for a service on a host.
    pub fn new(host: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            service_name: Some(service_name.into()),
            ..Self::default()
        }
    }

    /// Set the transport protocol.
    #[must_use]
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Set the listener port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Connect by SID instead of service name.
    #[must_use]
    pub fn sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self.service_name = None;
        self
    }

    /// Set the server process type.
    #[must_use]
    pub fn server_type(mut self, server_type: ServerType) -> Self {
        self.server_type = Some(server_type);
        self
    }

    /// Set the DRCP connection class.
    #[must_use]
    pub fn cclass(mut self, cclass: impl Into<String>) -> Self {
        self.cclass = Some(cclass.into());
        self
    }

    /// Set the DRCP purity.
    #[must_use]
    pub fn purity(mut self, purity: Purity) -> Self {
        self.purity = purity;
        self
    }

    /// Set the implicit pooling boundary.
    #[must_use]
    pub fn pool_boundary(mut self, boundary: PoolBoundary) -> Self {
        self.pool_boundary = Some(boundary);
        self
    }

    /// Set the authentication mode.
    #[must_use]
    pub fn mode(mut self, mode: AuthMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the number of connect retries and the delay between them.
    #[must_use]
    pub fn retry(mut self, count: u32, delay: Duration) -> Self {
        self.retry_count = count;
        self.retry_delay = delay;
        self
    }

    /// Set the bound on each connect attempt.
    #[must_use]
    pub fn tcp_connect_timeout(mut self, timeout: Duration) -> Self {
        self.tcp_connect_timeout = timeout;
        self
    }

    /// Set the statement cache size.
    #[must_use]
    pub fn stmtcachesize(mut self, size: usize) -> Self {
        self.stmtcachesize = size;
        self
    }

    /// Set the edition.
    #[must_use]
    pub fn edition(mut self, edition: impl Into<String>) -> Self {
        self.edition = Some(edition.into());
        self
    }

    /// Add an application context entry.
    #[must_use]
    pub fn appcontext(
        mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.appcontext
            .push((namespace.into(), name.into(), value.into()));
        self
    }

    /// Set the program name reported to the server.
    #[must_use]
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Whether sessions come from the database resident connection pool.
    #[must_use]
    pub fn is_drcp(&self) -> bool {
        self.server_type == Some(ServerType::Pooled)
    }

    /// Listener address as `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check the descriptor for values no connector can use.
    pub fn validate(&self) -> Result<(), Error> {
        if self.protocol.is_empty() {
            return Err(Error::Config("protocol cannot be empty".into()));
        }
        if self.host.is_empty() {
            return Err(Error::Config("host cannot be empty".into()));
        }
        if self.port == 0 {
            return Err(Error::Config("port cannot be 0".into()));
        }
        if self.service_name.is_none() && self.sid.is_none() {
            return Err(Error::Config(
                "either a service name or a SID is required".into(),
            ));
        }
        if self.pool_boundary.is_some() && !self.is_drcp() {
            return Err(Error::Config(
                "pool boundary requires server type 'pooled'".into(),
            ));
        }
        if self.tcp_connect_timeout.is_zero() {
            return Err(Error::Config("tcp connect timeout must be positive".into()));
        }
        Ok(())
    }
}

/// Credentials presented when a session is opened.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Database user name and password.
    Password {
        /// Database user.
        user: String,
        /// Password.
        password: String,
        /// User to connect as through `user`'s proxy authority.
        proxy_user: Option<String>,
        /// New password to set while connecting, for expired accounts.
        new_password: Option<String>,
    },
    /// Access token from an identity provider.
    Token {
        /// Encoded token.
        token: String,
        /// Private key paired with the token, when required.
        private_key: Option<String>,
    },
    /// Operating system or wallet authentication.
    External,
}

impl Credentials {
    /// Password credentials.
    pub fn password(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Password {
            user: user.into(),
            password: password.into(),
            proxy_user: None,
            new_password: None,
        }
    }

    /// Token credentials.
    pub fn token(token: impl Into<String>) -> Self {
        Self::Token {
            token: token.into(),
            private_key: None,
        }
    }

    /// External authentication.
    #[must_use]
    pub fn external() -> Self {
        Self::External
    }

    /// Connect as `proxy_user` through the password user's proxy authority.
    ///
    /// Ignored for non-password credentials.
    #[must_use]
    pub fn with_proxy_user(mut self, proxy: impl Into<String>) -> Self {
        if let Self::Password { proxy_user, .. } = &mut self {
            *proxy_user = Some(proxy.into());
        }
        self
    }

    /// Attach a private key to token credentials.
    #[must_use]
    pub fn with_private_key(mut self, key: impl Into<String>) -> Self {
        if let Self::Token { private_key, .. } = &mut self {
            *private_key = Some(key.into());
        }
        self
    }

    /// Session user these credentials log in as, if known before connecting.
    #[must_use]
    pub fn session_user(&self) -> Option<&str> {
        match self {
            Self::Password {
                user, proxy_user, ..
            } => Some(proxy_user.as_deref().unwrap_or(user)),
            Self::Token { .. } | Self::External => None,
        }
    }

    /// Whether the credentials delegate authentication to the environment.
    #[must_use]
    pub fn is_external(&self) -> bool {
        matches!(self, Self::External)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password {
                user, proxy_user, ..
            } => f
                .debug_struct("Password")
                .field("user", user)
                .field("password", &"[REDACTED]")
                .field("proxy_user", proxy_user)
                .finish(),
            Self::Token { private_key, .. } => f
                .debug_struct("Token")
                .field("token", &"[REDACTED]")
                .field("private_key", &private_key.as_ref().map(|_| "[REDACTED]"))
                .finish(),
            Self::External => f.write_str("External"),
        }
    }
}
