//! # oradb-testing
//!
//! Test infrastructure for the Oracle connection pool and client.
//!
//! [`MockConnector`] is an in-memory
//! [`ConnectionFactory`](oradb_client::ConnectionFactory) whose sessions
//! can be scripted from the test: refuse or reject the next opens, slow the
//! handshake down, kill a session's transport, terminate it server-side so
//! only a ping notices, or make its pings hang.
//!
//! ## Example
//!
//! ```rust,ignore
//! use oradb_testing::{MockConnector, MockFailure};
//!
//! let connector = MockConnector::new();
//! connector.fail_next(MockFailure::Refuse);
//!
//! let pool = Pool::builder()
//!     .factory(connector.clone())
//!     .build()
//!     .await?;
//! assert_eq!(connector.live(), 1);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod mock;

pub use mock::{ExecutedStatement, MockConnection, MockConnector, MockFailure, PingBehavior, SessionControl};
