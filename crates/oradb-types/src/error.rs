//! Binding and conversion error types.

use thiserror::Error;

use crate::catalog::DbType;

/// Result type for binding operations.
pub type Result<T> = std::result::Result<T, TypeError>;

/// Errors that can occur while inferring metadata or binding values.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum TypeError {
    /// The value cannot be bound to a variable of this type.
    #[error("a value of kind {value_kind} cannot be bound to a {dbtype} variable")]
    ArgumentType {
        /// Type of the target variable.
        dbtype: DbType,
        /// Kind of the rejected value.
        value_kind: &'static str,
    },

    /// An array bind supplied more elements than the variable can hold.
    #[error("array of {requested} elements exceeds the variable capacity of {num_elements}")]
    Capacity {
        /// Maximum number of elements the variable holds.
        num_elements: u32,
        /// Number of elements supplied.
        requested: usize,
    },

    /// Values bound to one variable disagree on their type.
    #[error("mixed element types: variable is {existing}, value requires {found}")]
    TypeConflict {
        /// Description of the type already established for the variable.
        existing: String,
        /// Description of the conflicting type.
        found: String,
    },

    /// An array variable was given a scalar value.
    #[error("an array variable requires a list of values")]
    ExpectedArray,

    /// An array operation was attempted on a scalar variable.
    #[error("variable is not an array")]
    NotAnArray,

    /// Arrays may not contain nested arrays.
    #[error("nested arrays cannot be bound")]
    NestedArray,

    /// A position outside the variable's allocation was addressed.
    #[error("position {position} is out of range for a variable with {num_elements} elements")]
    PositionOutOfRange {
        /// Requested position.
        position: u32,
        /// Number of allocated elements.
        num_elements: u32,
    },

    /// Rows of a batch bind do not all have the same number of values.
    #[error("row {row} has {actual} values, expected {expected}")]
    RowLength {
        /// Index of the offending row.
        row: usize,
        /// Number of values in the first row.
        expected: usize,
        /// Number of values in the offending row.
        actual: usize,
    },

    /// A value could not be represented in the target type.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// The type name is not part of the catalog.
    #[error("unknown database type: {0}")]
    UnknownType(String),
}

impl TypeError {
    /// Whether a probing bind may report this error as "not set" instead of failing.
    ///
    /// Only type acceptability failures are soft; capacity and position
    /// errors always fail.
    #[must_use]
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::ArgumentType { .. } | Self::TypeConflict { .. } | Self::NestedArray
        )
    }
}
