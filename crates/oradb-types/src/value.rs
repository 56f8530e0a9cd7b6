//! Application-level bind values.

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta};

/// A dynamically typed value supplied by the application for binding.
///
/// The set of shapes is closed: every variant maps to exactly one catalog
/// entry when metadata is inferred, and [`BindValue::Array`] carries the
/// elements of an array (PL/SQL collection) bind.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    /// SQL NULL.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Float(f64),
    /// Exact decimal value.
    #[cfg(feature = "decimal")]
    Decimal(rust_decimal::Decimal),
    /// Character data.
    Text(String),
    /// Binary data.
    Bytes(Bytes),
    /// Calendar date.
    Date(NaiveDate),
    /// Date and time without time zone.
    Timestamp(NaiveDateTime),
    /// Date and time with a fixed offset.
    TimestampTz(DateTime<FixedOffset>),
    /// Day to second interval.
    IntervalDs(TimeDelta),
    /// Year to month interval.
    IntervalYm {
        /// Whole years.
        years: i32,
        /// Remaining months.
        months: i32,
    },
    /// JSON document.
    #[cfg(feature = "json")]
    Json(serde_json::Value),
    /// Instance of a named object type.
    Object(ObjectValue),
    /// Elements of an array bind.
    Array(Vec<BindValue>),
}

impl BindValue {
    /// Short name of the value's shape, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            #[cfg(feature = "decimal")]
            Self::Decimal(_) => "decimal",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Date(_) => "date",
            Self::Timestamp(_) => "timestamp",
            Self::TimestampTz(_) => "timestamp with time zone",
            Self::IntervalDs(_) => "day to second interval",
            Self::IntervalYm { .. } => "year to month interval",
            #[cfg(feature = "json")]
            Self::Json(_) => "json",
            Self::Object(_) => "object",
            Self::Array(_) => "array",
        }
    }

    /// Whether this value is SQL NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow the text of a [`BindValue::Text`].
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Build an array bind from any iterator of values.
    pub fn array<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<BindValue>,
    {
        Self::Array(values.into_iter().map(Into::into).collect())
    }

    /// The integer of a [`BindValue::Integer`].
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

/// An instance of a named database object type.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectValue {
    /// Fully qualified type name, e.g. `HR.ADDRESS_T`.
    pub type_name: String,
    /// Attribute values in declaration order.
    pub attributes: Vec<(String, BindValue)>,
}

impl ObjectValue {
    /// Create an object with no attributes set.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            attributes: Vec::new(),
        }
    }

    /// Add an attribute value.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<BindValue>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }
}

impl From<bool> for BindValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i32> for BindValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i64> for BindValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for BindValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

#[cfg(feature = "decimal")]
impl From<rust_decimal::Decimal> for BindValue {
    fn from(value: rust_decimal::Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for BindValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&[u8]> for BindValue {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(Bytes::copy_from_slice(value))
    }
}

impl From<Vec<u8>> for BindValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<Bytes> for BindValue {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<NaiveDate> for BindValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveDateTime> for BindValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl From<DateTime<FixedOffset>> for BindValue {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self::TimestampTz(value)
    }
}

impl From<TimeDelta> for BindValue {
    fn from(value: TimeDelta) -> Self {
        Self::IntervalDs(value)
    }
}

#[cfg(feature = "json")]
impl From<serde_json::Value> for BindValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<ObjectValue> for BindValue {
    fn from(value: ObjectValue) -> Self {
        Self::Object(value)
    }
}

impl<T: Into<BindValue>> From<Option<T>> for BindValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
