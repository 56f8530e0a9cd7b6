//! # oradb-pool
//!
//! Session-aware connection pool for Oracle Database.
//!
//! The pool understands Oracle session semantics: sessions carry tags
//! describing their state, a session callback (application code or a PL/SQL
//! procedure) reconciles a session with the tag a caller asks for, and
//! heterogeneous pools hand out sessions for different users.
//!
//! ## Features
//!
//! - `min`/`max`/`increment` sizing with background growth
//! - WAIT, NOWAIT, FORCEGET and TIMEDWAIT acquire modes
//! - Health checks: transport check on every acquire, ping after `ping_interval`
//! - Idle timeout and maximum connection lifetime
//! - Session tags and session callbacks
//! - Online reconfiguration, graceful and forced close
//! - Alias registry for looking pools up by name
//! - Comprehensive metrics for observability
//!
//! ## Example
//!
//! ```rust,ignore
//! use oradb_pool::{AcquireOptions, GetMode, Pool, PoolConfig, Tag};
//! use oradb_client::{ConnectionDescriptor, Credentials};
//! use std::time::Duration;
//!
//! let pool = Pool::builder()
//!     .descriptor(ConnectionDescriptor::new("dbhost", "orclpdb1"))
//!     .credentials(Credentials::password("scott", "tiger"))
//!     .factory(connector)
//!     .pool_config(
//!         PoolConfig::new()
//!             .min(2)
//!             .max(10)
//!             .timeout(Duration::from_secs(300))
//!             .get_mode(GetMode::TimedWait)
//!             .wait_timeout(Duration::from_secs(5))
//!             .session_procedure("app.session_pkg.fix_state")?,
//!     )
//!     .build()
//!     .await?;
//!
//! // Ask for a session in a particular state
//! let tag: Tag = "NLS_DATE_FORMAT=ISO;TIME_ZONE=UTC".parse()?;
//! let conn = pool.acquire_with(AcquireOptions::new().tag(tag)).await?;
//! // Use connection...
//! // Connection automatically returned to pool on drop
//! drop(conn);
//!
//! // Check pool status
//! let status = pool.status();
//! println!("Pool utilization: {:.1}%", status.utilization());
//!
//! pool.close(false).await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod alias;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pool;
pub mod tag;

// Configuration
pub use config::{GetMode, PoolConfig, Reconfigure};

// Error types
pub use error::PoolError;

// Pool types
pub use pool::{
    AcquireOptions, Pool, PoolBuilder, PoolLifecycle, PoolMetrics, PoolStatus, PooledConnection,
};

// Registry
pub use alias::PoolRegistry;

// Lifecycle management
pub use lifecycle::{ConnectionMetadata, ConnectionState, HealthCheckResult, HealthChecker};

// Session state
pub use tag::{SessionCallback, SessionCallbackKind, SessionContext, Tag};
