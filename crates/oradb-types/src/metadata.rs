//! Wire type descriptors and inference from values.

use crate::catalog::{Capabilities, DbType};
use crate::error::{Result, TypeError};
use crate::value::BindValue;

/// Wire type descriptor of a variable.
///
/// For character types `max_size` counts characters and `buffer_size` the
/// bytes needed to transfer them; for every other type both are bytes.
/// Once a variable is bound, `max_size` only grows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleMetadata {
    /// Catalog entry.
    pub dbtype: DbType,
    /// Largest value size the variable accepts without a resize.
    pub max_size: u32,
    /// Bytes reserved per element for transfer.
    pub buffer_size: u32,
    /// Whether the variable is a PL/SQL array.
    pub is_array: bool,
    /// Number of allocated elements (array capacity or batch rows).
    pub num_elements: u32,
    /// Object type name for [`DbType::Object`].
    pub objtype: Option<String>,
}

impl OracleMetadata {
    /// Metadata for a single element of the given type with its default size.
    #[must_use]
    pub fn new(dbtype: DbType) -> Self {
        let mut metadata = Self {
            dbtype,
            max_size: dbtype.fixed_size().unwrap_or(0),
            buffer_size: 0,
            is_array: false,
            num_elements: 1,
            objtype: None,
        };
        metadata.refresh_buffer_size();
        metadata
    }

    /// Metadata for a dynamically sized type with an explicit maximum size.
    ///
    /// The size is ignored for fixed-width types.
    #[must_use]
    pub fn with_size(dbtype: DbType, max_size: u32) -> Self {
        let mut metadata = Self::new(dbtype);
        metadata.grow(max_size);
        metadata
    }

    /// Metadata for an instance of the named object type.
    pub fn object(type_name: impl Into<String>) -> Self {
        let mut metadata = Self::new(DbType::Object);
        metadata.objtype = Some(type_name.into());
        metadata
    }

    /// Turn this into an array descriptor holding up to `num_elements` values.
    #[must_use]
    pub fn array(mut self, num_elements: u32) -> Self {
        self.is_array = true;
        self.num_elements = num_elements.max(1);
        self
    }

    /// Allocate `num_elements` positions without making this an array.
    ///
    /// Used for batch execution, where each position is one row.
    #[must_use]
    pub fn rows(mut self, num_elements: u32) -> Self {
        self.num_elements = num_elements.max(1);
        self
    }

    /// Infer metadata from a value; `None` for NULL, which carries no type.
    pub fn from_value(value: &BindValue, is_plsql: bool, caps: Capabilities) -> Result<Option<Self>> {
        let BindValue::Array(values) = value else {
            return scalar_metadata(value, is_plsql, caps);
        };

        let mut inferred: Option<Self> = None;
        for element in values {
            if matches!(element, BindValue::Array(_)) {
                return Err(TypeError::NestedArray);
            }
            if let Some(element_metadata) = scalar_metadata(element, is_plsql, caps)? {
                inferred = Some(match inferred {
                    Some(existing) => existing.widened(&element_metadata)?,
                    None => element_metadata,
                });
            }
        }

        let metadata = inferred.unwrap_or_else(null_metadata);
        Ok(Some(metadata.array(len_to_u32(values.len()))))
    }

    /// Infer metadata from a value, using a one-character VARCHAR2 for NULL.
    pub fn infer(value: &BindValue, is_plsql: bool, caps: Capabilities) -> Result<Self> {
        Ok(Self::from_value(value, is_plsql, caps)?.unwrap_or_else(null_metadata))
    }

    /// Human readable type description used in conflict errors.
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.objtype {
            Some(name) => format!("{} {}", self.dbtype, name),
            None => self.dbtype.to_string(),
        }
    }

    /// Combine with metadata inferred from another value of the same variable.
    ///
    /// Sizes widen to the larger of the two and strings that outgrow the
    /// VARCHAR2/RAW limit promote to LONG/LONG RAW. Any other disagreement on
    /// type or object type is a [`TypeError::TypeConflict`].
    pub fn widened(&self, other: &Self) -> Result<Self> {
        let conflict = || TypeError::TypeConflict {
            existing: self.describe(),
            found: other.describe(),
        };

        let dbtype = if self.dbtype == other.dbtype {
            if self.objtype != other.objtype {
                return Err(conflict());
            }
            self.dbtype
        } else if self.dbtype.long_variant() == Some(other.dbtype) {
            other.dbtype
        } else if other.dbtype.long_variant() == Some(self.dbtype) {
            self.dbtype
        } else {
            return Err(conflict());
        };

        let mut merged = self.clone();
        merged.dbtype = dbtype;
        merged.max_size = self.max_size.max(other.max_size);
        merged.refresh_buffer_size();
        Ok(merged)
    }

    /// In-place form of [`OracleMetadata::widened`].
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        *self = self.widened(other)?;
        Ok(())
    }

    /// Grow `max_size` to `size` for dynamically sized types.
    ///
    /// Returns whether the size changed. Never shrinks.
    pub fn grow(&mut self, size: u32) -> bool {
        if !self.dbtype.is_dynamically_sized() || size <= self.max_size {
            return false;
        }
        self.max_size = size;
        self.refresh_buffer_size();
        true
    }

    fn refresh_buffer_size(&mut self) {
        self.buffer_size = self.max_size.saturating_mul(self.dbtype.buffer_ratio());
    }
}

/// Size of a value in the units of `max_size` for the given type.
///
/// Returns zero for values whose size does not depend on content.
#[must_use]
pub fn value_size(dbtype: DbType, value: &BindValue) -> u32 {
    match value {
        BindValue::Text(s) if dbtype.is_character() => len_to_u32(s.chars().count()),
        BindValue::Bytes(b) => len_to_u32(b.len()),
        _ => 0,
    }
}

fn null_metadata() -> OracleMetadata {
    OracleMetadata::with_size(DbType::Varchar, 1)
}

fn scalar_metadata(
    value: &BindValue,
    is_plsql: bool,
    caps: Capabilities,
) -> Result<Option<OracleMetadata>> {
    let metadata = match value {
        BindValue::Null => return Ok(None),
        BindValue::Boolean(_) => {
            if is_plsql || caps.supports_bool {
                OracleMetadata::new(DbType::Boolean)
            } else {
                OracleMetadata::new(DbType::BinaryInteger)
            }
        }
        BindValue::Integer(_) | BindValue::Float(_) => OracleMetadata::new(DbType::Number),
        #[cfg(feature = "decimal")]
        BindValue::Decimal(_) => OracleMetadata::new(DbType::Number),
        BindValue::Text(s) => {
            let chars = len_to_u32(s.chars().count()).max(1);
            if len_to_u32(s.len()) > caps.max_string_size {
                OracleMetadata::with_size(DbType::Long, chars)
            } else {
                OracleMetadata::with_size(DbType::Varchar, chars)
            }
        }
        BindValue::Bytes(b) => {
            let size = len_to_u32(b.len()).max(1);
            if size > caps.max_string_size {
                OracleMetadata::with_size(DbType::LongRaw, size)
            } else {
                OracleMetadata::with_size(DbType::Raw, size)
            }
        }
        BindValue::Date(_) => OracleMetadata::new(DbType::Date),
        BindValue::Timestamp(_) => OracleMetadata::new(DbType::Timestamp),
        BindValue::TimestampTz(_) => OracleMetadata::new(DbType::TimestampTz),
        BindValue::IntervalDs(_) => OracleMetadata::new(DbType::IntervalDs),
        BindValue::IntervalYm { .. } => OracleMetadata::new(DbType::IntervalYm),
        #[cfg(feature = "json")]
        BindValue::Json(_) => OracleMetadata::new(DbType::Json),
        BindValue::Object(obj) => OracleMetadata::object(obj.type_name.clone()),
        BindValue::Array(_) => return Err(TypeError::NestedArray),
    };
    Ok(Some(metadata))
}

fn len_to_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ObjectValue;

    fn caps() -> Capabilities {
        Capabilities::default()
    }

    #[test]
    fn test_infer_text() {
        let m = OracleMetadata::infer(&BindValue::from("héllo"), false, caps()).unwrap();
        assert_eq!(m.dbtype, DbType::Varchar);
        assert_eq!(m.max_size, 5);
        assert_eq!(m.buffer_size, 20);
        assert!(!m.is_array);
    }

    #[test]
    fn test_infer_long_text() {
        let big = "x".repeat(4001);
        let m = OracleMetadata::infer(&BindValue::from(big), false, caps()).unwrap();
        assert_eq!(m.dbtype, DbType::Long);

        let extended = Capabilities::extended();
        let big = "x".repeat(4001);
        let m = OracleMetadata::infer(&BindValue::from(big), false, extended).unwrap();
        assert_eq!(m.dbtype, DbType::Varchar);
    }

    #[test]
    fn test_infer_boolean_fallback() {
        let value = BindValue::from(true);
        assert_eq!(
            OracleMetadata::infer(&value, false, caps()).unwrap().dbtype,
            DbType::BinaryInteger
        );
        assert_eq!(
            OracleMetadata::infer(&value, true, caps()).unwrap().dbtype,
            DbType::Boolean
        );
        assert_eq!(
            OracleMetadata::infer(&value, false, Capabilities::extended())
                .unwrap()
                .dbtype,
            DbType::Boolean
        );
    }

    #[test]
    fn test_infer_null() {
        assert_eq!(OracleMetadata::from_value(&BindValue::Null, false, caps()).unwrap(), None);
        let m = OracleMetadata::infer(&BindValue::Null, false, caps()).unwrap();
        assert_eq!(m.dbtype, DbType::Varchar);
        assert_eq!(m.max_size, 1);
    }

    #[test]
    fn test_infer_array_widens() {
        let value = BindValue::array(["a", "abc", "ab"]);
        let m = OracleMetadata::infer(&value, true, caps()).unwrap();
        assert!(m.is_array);
        assert_eq!(m.num_elements, 3);
        assert_eq!(m.max_size, 3);
    }

    #[test]
    fn test_infer_array_nulls_skipped() {
        let value = BindValue::Array(vec![BindValue::Null, BindValue::Integer(1)]);
        let m = OracleMetadata::infer(&value, true, caps()).unwrap();
        assert_eq!(m.dbtype, DbType::Number);
    }

    #[test]
    fn test_infer_array_mixed_types() {
        let value = BindValue::Array(vec![BindValue::Integer(1), BindValue::from("one")]);
        let err = OracleMetadata::infer(&value, true, caps()).unwrap_err();
        assert!(matches!(err, TypeError::TypeConflict { .. }));
    }

    #[test]
    fn test_infer_nested_array() {
        let value = BindValue::Array(vec![BindValue::array([1])]);
        assert_eq!(
            OracleMetadata::infer(&value, true, caps()).unwrap_err(),
            TypeError::NestedArray
        );
    }

    #[test]
    fn test_object_type_conflict() {
        let a = OracleMetadata::object("HR.A_T");
        let b = OracleMetadata::object("HR.B_T");
        assert!(matches!(a.widened(&b), Err(TypeError::TypeConflict { .. })));

        let value = BindValue::Object(ObjectValue::new("HR.A_T"));
        let inferred = OracleMetadata::infer(&value, false, caps()).unwrap();
        assert_eq!(inferred, a);
    }

    #[test]
    fn test_widen_promotes_long() {
        let short = OracleMetadata::with_size(DbType::Varchar, 10);
        let long = OracleMetadata::with_size(DbType::Long, 5000);
        let merged = short.widened(&long).unwrap();
        assert_eq!(merged.dbtype, DbType::Long);
        assert_eq!(merged.max_size, 5000);
        assert_eq!(long.widened(&short).unwrap().dbtype, DbType::Long);
    }

    #[test]
    fn test_grow_never_shrinks() {
        let mut m = OracleMetadata::with_size(DbType::Raw, 10);
        assert!(m.grow(20));
        assert!(!m.grow(5));
        assert_eq!(m.max_size, 20);

        let mut fixed = OracleMetadata::new(DbType::Number);
        assert!(!fixed.grow(100));
        assert_eq!(fixed.max_size, 22);
    }

    #[test]
    fn test_value_size() {
        assert_eq!(value_size(DbType::NVarchar, &BindValue::from("äb")), 2);
        assert_eq!(value_size(DbType::Raw, &BindValue::from(vec![0u8; 7])), 7);
        assert_eq!(value_size(DbType::Number, &BindValue::from(7)), 0);
    }
}
