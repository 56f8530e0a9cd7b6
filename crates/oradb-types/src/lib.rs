//! # oradb-types
//!
//! Oracle wire type catalog and variable binding.
//!
//! This crate bridges dynamically shaped application values and the fixed,
//! versioned set of types the server understands. Values are expressed as a
//! closed tagged union ([`BindValue`]), resolved once into an
//! [`OracleMetadata`] descriptor, and stored in a [`Variable`] bind slot.
//!
//! ## Features
//!
//! - Type catalog with wire type numbers and buffer sizing ([`DbType`])
//! - Metadata inference from values, with widening and conflict detection
//! - Scalar and array binding with capacity checks and dynamic resize
//! - Optional input/output converters applied around validation
//! - A per-statement arena of reusable variables ([`BindArena`])
//!
//! ## Example
//!
//! ```rust
//! use oradb_types::{BindValue, Capabilities, Variable};
//!
//! let caps = Capabilities::default();
//! let mut var = Variable::from_value(&BindValue::from("hello"), false, caps)?;
//! var.bind_scalar(0, BindValue::from("a longer value"))?;
//!
//! assert_eq!(var.metadata().max_size, 14);
//! # Ok::<(), oradb_types::TypeError>(())
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod arena;
pub mod catalog;
pub mod error;
pub mod metadata;
pub mod value;
pub mod variable;

pub use arena::BindArena;
pub use catalog::{Capabilities, CharsetForm, DbType};
pub use error::{Result, TypeError};
pub use metadata::OracleMetadata;
pub use value::{BindValue, ObjectValue};
pub use variable::{InConverter, OutConverter, Variable};
