//! # oradb-client
//!
//! Connection boundary for Oracle Database.
//!
//! This crate defines what the pool and application code see of a single
//! server session. Connect string resolution, credential acquisition and the
//! wire protocol live behind it: callers hand a resolved
//! [`ConnectionDescriptor`] and [`Credentials`] to a [`ConnectionFactory`]
//! and get back a boxed [`Connection`].
//!
//! ## Features
//!
//! - **Injected connectors**: a [`ConnectorRegistry`] maps protocols to
//!   factories without process-wide state
//! - **Retrying connect**: per-attempt timeout, bounded retries of transient
//!   failures, no retries of rejected credentials
//! - **Statements**: PL/SQL detection and a per-statement bind arena
//! - **Statement cache**: LRU reuse of statements and their variables
//!
//! ## Example
//!
//! ```rust,ignore
//! use oradb_client::{ConnectionDescriptor, ConnectorRegistry, Credentials};
//! use oradb_types::BindValue;
//!
//! let registry = ConnectorRegistry::new();
//! registry.register("tcp", my_connector);
//!
//! let descriptor = ConnectionDescriptor::new("dbhost", "orclpdb1")
//!     .retry(3, Duration::from_secs(1));
//! let mut conn = registry
//!     .connect(&descriptor, &Credentials::password("scott", "tiger"))
//!     .await?;
//!
//! let mut stmt = Statement::new("insert into t values (:1)", conn.capabilities());
//! stmt.bind(vec![BindValue::from(42)])?;
//! conn.execute(&mut stmt).await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod error;
pub mod factory;
pub mod statement;

pub use config::{AuthMode, ConnectionDescriptor, Credentials, PoolBoundary, Purity, ServerType};
pub use connection::{Connection, ServerVersion, SessionAbort};
pub use error::{BoxError, Error, Result};
pub use factory::{ConnectionFactory, ConnectorRegistry, connect};
pub use statement::{Statement, StatementCache};
