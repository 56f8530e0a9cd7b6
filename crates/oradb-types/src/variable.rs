//! Bind variables.
//!
//! A [`Variable`] owns one [`OracleMetadata`] and the values bound to it:
//! one slot for a scalar, `num_elements` slots for an array or a batch.
//! Every value passes through the same pipeline before it is stored:
//!
//! 1. the optional input converter,
//! 2. type acceptance for the variable's catalog entry, including the
//!    boolean to integer fallback outside PL/SQL,
//! 3. metadata widening (inferred variables) and resize of dynamically
//!    sized types.
//!
//! Array binds validate every element before any slot is touched, so a
//! rejected element leaves the variable exactly as it was.

use std::fmt;
use std::sync::Arc;

use crate::catalog::{Capabilities, DbType};
use crate::error::{Result, TypeError};
use crate::metadata::{OracleMetadata, value_size};
use crate::value::BindValue;

/// Function applied to every value before validation.
pub type InConverter = Arc<dyn Fn(BindValue) -> Result<BindValue> + Send + Sync>;

/// Function applied to every value read back from a variable.
pub type OutConverter = Arc<dyn Fn(BindValue) -> Result<BindValue> + Send + Sync>;

/// A bind slot for one statement parameter.
#[derive(Clone)]
pub struct Variable {
    metadata: OracleMetadata,
    values: Vec<BindValue>,
    num_elements_in_array: u32,
    capabilities: Capabilities,
    is_plsql: bool,
    inferred: bool,
    value_set: bool,
    inconverter: Option<InConverter>,
    outconverter: Option<OutConverter>,
}

impl Variable {
    /// Create a variable with declared metadata.
    ///
    /// A declared BOOLEAN outside PL/SQL on a server without native boolean
    /// support is bound as BINARY_INTEGER instead.
    #[must_use]
    pub fn new(metadata: OracleMetadata, capabilities: Capabilities, is_plsql: bool) -> Self {
        let mut metadata = metadata;
        if metadata.dbtype == DbType::Boolean && !is_plsql && !capabilities.supports_bool {
            let fallback = OracleMetadata::new(DbType::BinaryInteger);
            metadata.dbtype = fallback.dbtype;
            metadata.max_size = fallback.max_size;
            metadata.buffer_size = fallback.buffer_size;
        }

        let slots = metadata.num_elements.max(1) as usize;
        Self {
            metadata,
            values: vec![BindValue::Null; slots],
            num_elements_in_array: 0,
            capabilities,
            is_plsql,
            inferred: false,
            value_set: false,
            inconverter: None,
            outconverter: None,
        }
    }

    /// Create a variable whose metadata is inferred from `value`, and bind it.
    ///
    /// An array value creates an array variable sized to the array.
    pub fn from_value(value: &BindValue, is_plsql: bool, capabilities: Capabilities) -> Result<Self> {
        let metadata = OracleMetadata::infer(value, is_plsql, capabilities)?;
        let mut var = Self::new(metadata, capabilities, is_plsql);
        var.inferred = true;
        var.set(value.clone())?;
        Ok(var)
    }

    /// Create an inferred variable with room for `num_rows` positional values.
    ///
    /// Values bound later may widen the metadata but not change its type.
    #[must_use]
    pub fn for_rows(
        metadata: OracleMetadata,
        num_rows: u32,
        capabilities: Capabilities,
        is_plsql: bool,
    ) -> Self {
        let mut var = Self::new(metadata.rows(num_rows), capabilities, is_plsql);
        var.inferred = true;
        var
    }

    /// Create a batch variable holding one inferred value per row.
    ///
    /// NULL rows carry no type; an all-NULL batch binds as VARCHAR2(1).
    pub fn from_values(
        values: &[BindValue],
        is_plsql: bool,
        capabilities: Capabilities,
    ) -> Result<Self> {
        let mut metadata: Option<OracleMetadata> = None;
        for value in values {
            if let Some(inferred) = OracleMetadata::from_value(value, is_plsql, capabilities)? {
                metadata = Some(match metadata {
                    Some(existing) => existing.widened(&inferred)?,
                    None => inferred,
                });
            }
        }
        let metadata = metadata.unwrap_or_else(|| OracleMetadata::with_size(DbType::Varchar, 1));

        let num_rows = u32::try_from(values.len()).map_err(|_| TypeError::Capacity {
            num_elements: u32::MAX,
            requested: values.len(),
        })?;
        let mut var = Self::for_rows(metadata, num_rows, capabilities, is_plsql);
        for (position, value) in (0..num_rows).zip(values) {
            var.bind_scalar(position, value.clone())?;
        }
        Ok(var)
    }

    /// Set the input converter.
    #[must_use]
    pub fn with_inconverter(mut self, converter: InConverter) -> Self {
        self.inconverter = Some(converter);
        self
    }

    /// Set the output converter.
    #[must_use]
    pub fn with_outconverter(mut self, converter: OutConverter) -> Self {
        self.outconverter = Some(converter);
        self
    }

    /// The variable's metadata.
    #[must_use]
    pub fn metadata(&self) -> &OracleMetadata {
        &self.metadata
    }

    /// Catalog entry of the variable.
    #[must_use]
    pub fn dbtype(&self) -> DbType {
        self.metadata.dbtype
    }

    /// Number of allocated positions.
    #[must_use]
    pub fn num_elements(&self) -> u32 {
        self.metadata.num_elements
    }

    /// Number of positions bound by the last array bind.
    #[must_use]
    pub fn num_elements_in_array(&self) -> u32 {
        self.num_elements_in_array
    }

    /// Whether this is an array variable.
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.metadata.is_array
    }

    /// Whether the variable belongs to a PL/SQL statement.
    #[must_use]
    pub fn is_plsql(&self) -> bool {
        self.is_plsql
    }

    /// Whether any value has been bound since creation or the last reset.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.value_set
    }

    /// Bind a whole value: an array for array variables, a scalar otherwise.
    pub fn set(&mut self, value: BindValue) -> Result<()> {
        if self.metadata.is_array {
            match value {
                BindValue::Array(values) => self.bind_array(values),
                _ => Err(TypeError::ExpectedArray),
            }
        } else {
            self.bind_scalar(0, value)
        }
    }

    /// Bind `value` at `position`.
    pub fn bind_scalar(&mut self, position: u32, value: BindValue) -> Result<()> {
        self.set_scalar(position, value, true).map(|_| ())
    }

    /// Bind `value` at `position` if its type is acceptable.
    ///
    /// Returns `Ok(false)` without changing the variable when the value's
    /// type is not acceptable; other failures are still errors.
    pub fn probe_scalar(&mut self, position: u32, value: BindValue) -> Result<bool> {
        self.set_scalar(position, value, false)
    }

    /// Bind the elements of an array variable.
    ///
    /// Fewer values than `num_elements` is valid; trailing positions keep
    /// their previous values.
    pub fn bind_array(&mut self, values: Vec<BindValue>) -> Result<()> {
        self.set_array(values, true).map(|_| ())
    }

    /// Array form of [`Variable::probe_scalar`].
    pub fn probe_array(&mut self, values: Vec<BindValue>) -> Result<bool> {
        self.set_array(values, false)
    }

    /// Grow the maximum size of a dynamically sized variable.
    ///
    /// Requests smaller than the current size are ignored.
    pub fn resize(&mut self, new_size: u32) {
        self.metadata.grow(new_size);
    }

    /// Read back the value at `position` through the output converter.
    pub fn get_value(&self, position: u32) -> Result<BindValue> {
        self.check_position(position)?;
        let value = self.values[position as usize].clone();
        match &self.outconverter {
            Some(convert) => convert(value),
            None => Ok(value),
        }
    }

    /// The bound values: the array elements for arrays, all slots otherwise.
    #[must_use]
    pub fn values(&self) -> &[BindValue] {
        if self.metadata.is_array {
            &self.values[..self.num_elements_in_array as usize]
        } else {
            &self.values
        }
    }

    /// Clear the "value set" marker so the variable can be reused.
    pub fn reset(&mut self) {
        self.value_set = false;
    }

    fn set_scalar(&mut self, position: u32, value: BindValue, strict: bool) -> Result<bool> {
        self.check_position(position)?;
        let value = self.convert_in(value)?;

        match self.prepare(&self.metadata, value) {
            Ok((value, metadata)) => {
                self.metadata = metadata;
                self.values[position as usize] = value;
                if self.metadata.is_array {
                    self.num_elements_in_array = self.num_elements_in_array.max(position + 1);
                }
                self.value_set = true;
                Ok(true)
            }
            Err(err) if !strict && err.is_soft() => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn set_array(&mut self, values: Vec<BindValue>, strict: bool) -> Result<bool> {
        if !self.metadata.is_array {
            return Err(TypeError::NotAnArray);
        }
        if values.len() > self.metadata.num_elements as usize {
            return Err(TypeError::Capacity {
                num_elements: self.metadata.num_elements,
                requested: values.len(),
            });
        }

        let mut metadata = self.metadata.clone();
        let mut prepared = Vec::with_capacity(values.len());
        for value in values {
            let value = self.convert_in(value)?;
            match self.prepare(&metadata, value) {
                Ok((value, widened)) => {
                    metadata = widened;
                    prepared.push(value);
                }
                Err(err) if !strict && err.is_soft() => return Ok(false),
                Err(err) => return Err(err),
            }
        }

        let count = prepared.len();
        for (slot, value) in self.values.iter_mut().zip(prepared) {
            *slot = value;
        }
        self.metadata = metadata;
        self.num_elements_in_array = count as u32;
        self.value_set = true;
        Ok(true)
    }

    fn convert_in(&self, value: BindValue) -> Result<BindValue> {
        match &self.inconverter {
            Some(convert) => convert(value),
            None => Ok(value),
        }
    }

    /// Validate one value against `metadata`, returning the stored form of
    /// the value and the metadata after widening and resize.
    fn prepare(
        &self,
        metadata: &OracleMetadata,
        value: BindValue,
    ) -> Result<(BindValue, OracleMetadata)> {
        if let BindValue::Array(_) = value {
            return Err(if metadata.is_array {
                TypeError::NestedArray
            } else {
                TypeError::ArgumentType {
                    dbtype: metadata.dbtype,
                    value_kind: value.kind(),
                }
            });
        }

        let mut target = metadata.clone();
        if self.inferred {
            if let Some(inferred) =
                OracleMetadata::from_value(&value, self.is_plsql, self.capabilities)?
            {
                target = target.widened(&inferred)?;
            }
        }

        let value = coerce(&target, value)?;
        let size = value_size(target.dbtype, &value);
        if size > target.max_size {
            target.grow(size);
        }
        Ok((value, target))
    }

    fn check_position(&self, position: u32) -> Result<()> {
        if position >= self.metadata.num_elements {
            return Err(TypeError::PositionOutOfRange {
                position,
                num_elements: self.metadata.num_elements,
            });
        }
        Ok(())
    }
}

/// Convert `value` into the stored representation for `metadata`'s type.
fn coerce(metadata: &OracleMetadata, value: BindValue) -> Result<BindValue> {
    use BindValue as V;
    use DbType as T;

    let dbtype = metadata.dbtype;
    let value_kind = value.kind();

    match (dbtype, value) {
        (_, V::Null) => Ok(V::Null),
        (
            T::Varchar | T::NVarchar | T::Char | T::NChar | T::Long | T::Clob | T::NClob | T::Rowid,
            v @ V::Text(_),
        ) => Ok(v),
        (T::Raw | T::LongRaw | T::Blob, v @ V::Bytes(_)) => Ok(v),
        (T::Number, v @ (V::Integer(_) | V::Float(_))) => Ok(v),
        #[cfg(feature = "decimal")]
        (T::Number, v @ V::Decimal(_)) => Ok(v),
        (T::Number | T::BinaryInteger, V::Boolean(b)) => Ok(V::Integer(i64::from(b))),
        (T::BinaryInteger, V::Integer(n)) => match i32::try_from(n) {
            Ok(_) => Ok(V::Integer(n)),
            Err(_) => Err(TypeError::Conversion(format!(
                "{n} does not fit in {}",
                T::BinaryInteger
            ))),
        },
        (T::BinaryFloat | T::BinaryDouble, v @ V::Float(_)) => Ok(v),
        (T::BinaryFloat | T::BinaryDouble, V::Integer(n)) => Ok(V::Float(n as f64)),
        (T::Date, v @ (V::Date(_) | V::Timestamp(_))) => Ok(v),
        (T::Timestamp | T::TimestampLtz, v @ V::Timestamp(_)) => Ok(v),
        (T::Timestamp | T::TimestampLtz, V::Date(d)) => d
            .and_hms_opt(0, 0, 0)
            .map(V::Timestamp)
            .ok_or_else(|| TypeError::Conversion(format!("invalid date {d}"))),
        (T::TimestampTz, v @ V::TimestampTz(_)) => Ok(v),
        (T::IntervalDs, v @ V::IntervalDs(_)) => Ok(v),
        (T::IntervalYm, v @ V::IntervalYm { .. }) => Ok(v),
        (T::Boolean, v @ V::Boolean(_)) => Ok(v),
        #[cfg(feature = "json")]
        (T::Json, v @ V::Json(_)) => Ok(v),
        (T::Object, V::Object(obj)) => match &metadata.objtype {
            Some(expected) if *expected != obj.type_name => Err(TypeError::TypeConflict {
                existing: metadata.describe(),
                found: format!("{} {}", T::Object, obj.type_name),
            }),
            _ => Ok(V::Object(obj)),
        },
        _ => Err(TypeError::ArgumentType { dbtype, value_kind }),
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("metadata", &self.metadata)
            .field("num_elements_in_array", &self.num_elements_in_array)
            .field("is_plsql", &self.is_plsql)
            .field("value_set", &self.value_set)
            .field("inconverter", &self.inconverter.is_some())
            .field("outconverter", &self.outconverter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ObjectValue;
    use bytes::Bytes;
    use chrono::{NaiveDate, TimeDelta};

    fn caps() -> Capabilities {
        Capabilities::default()
    }

    fn int_array(capacity: u32) -> Variable {
        Variable::new(OracleMetadata::new(DbType::Number).array(capacity), caps(), true)
    }

    #[test]
    fn test_scalar_round_trip() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let values = vec![
            BindValue::from(42),
            BindValue::from(2.5),
            BindValue::from("text"),
            BindValue::from(Bytes::from_static(b"\x00\x01")),
            BindValue::from(date),
            BindValue::from(date.and_hms_opt(13, 14, 15).unwrap()),
            BindValue::from(TimeDelta::seconds(90)),
            BindValue::IntervalYm { years: 1, months: 6 },
            BindValue::Object(ObjectValue::new("HR.POINT_T").attribute("X", 1)),
            BindValue::Null,
        ];

        for value in values {
            let var = Variable::from_value(&value, false, caps()).unwrap();
            assert_eq!(var.get_value(0).unwrap(), value);
            assert!(var.is_set());
        }
    }

    #[test]
    fn test_boolean_fallback_outside_plsql() {
        let mut var = Variable::new(OracleMetadata::new(DbType::Boolean), caps(), false);
        assert_eq!(var.dbtype(), DbType::BinaryInteger);
        var.bind_scalar(0, BindValue::from(true)).unwrap();
        assert_eq!(var.get_value(0).unwrap(), BindValue::Integer(1));

        let mut plsql = Variable::new(OracleMetadata::new(DbType::Boolean), caps(), true);
        plsql.bind_scalar(0, BindValue::from(true)).unwrap();
        assert_eq!(plsql.get_value(0).unwrap(), BindValue::Boolean(true));
    }

    #[test]
    fn test_outconverter_restores_boolean() {
        let to_bool: OutConverter = Arc::new(|value| match value {
            BindValue::Integer(n) => Ok(BindValue::Boolean(n != 0)),
            other => Ok(other),
        });
        let var = Variable::from_value(&BindValue::from(false), false, caps())
            .unwrap()
            .with_outconverter(to_bool);
        assert_eq!(var.get_value(0).unwrap(), BindValue::Boolean(false));
    }

    #[test]
    fn test_inconverter_runs_before_validation() {
        let upper: InConverter = Arc::new(|value| match value {
            BindValue::Integer(n) => Ok(BindValue::Text(n.to_string())),
            other => Ok(other),
        });
        let mut var = Variable::new(OracleMetadata::with_size(DbType::Varchar, 1), caps(), false)
            .with_inconverter(upper);
        var.bind_scalar(0, BindValue::from(12345)).unwrap();
        assert_eq!(var.get_value(0).unwrap(), BindValue::from("12345"));
        assert_eq!(var.metadata().max_size, 5);
    }

    #[test]
    fn test_scalar_resize_grows_only() {
        let mut var = Variable::from_value(&BindValue::from("abcdef"), false, caps()).unwrap();
        assert_eq!(var.metadata().max_size, 6);

        var.bind_scalar(0, BindValue::from("ab")).unwrap();
        assert_eq!(var.metadata().max_size, 6);

        var.bind_scalar(0, BindValue::from("abcdefghij")).unwrap();
        assert_eq!(var.metadata().max_size, 10);
        assert_eq!(var.metadata().buffer_size, 40);

        var.resize(4);
        assert_eq!(var.metadata().max_size, 10);
    }

    #[test]
    fn test_declared_type_rejects_mismatch() {
        let mut var = Variable::new(OracleMetadata::new(DbType::Date), caps(), false);
        let err = var.bind_scalar(0, BindValue::from("2024-01-01")).unwrap_err();
        assert_eq!(
            err,
            TypeError::ArgumentType {
                dbtype: DbType::Date,
                value_kind: "text"
            }
        );
        assert!(!var.is_set());
    }

    #[test]
    fn test_probe_reports_without_raising() {
        let mut var = Variable::new(OracleMetadata::new(DbType::Number), caps(), false);
        assert!(!var.probe_scalar(0, BindValue::from("nope")).unwrap());
        assert!(!var.is_set());
        assert!(var.probe_scalar(0, BindValue::from(7)).unwrap());
        assert_eq!(var.get_value(0).unwrap(), BindValue::Integer(7));

        // Position errors are never soft.
        assert!(var.probe_scalar(3, BindValue::from(7)).is_err());
    }

    #[test]
    fn test_inferred_type_conflict() {
        let mut var = Variable::from_value(&BindValue::from(1), false, caps()).unwrap();
        let err = var.bind_scalar(0, BindValue::from("one")).unwrap_err();
        assert!(matches!(err, TypeError::TypeConflict { .. }));
        assert_eq!(var.get_value(0).unwrap(), BindValue::Integer(1));
    }

    #[test]
    fn test_binary_integer_range() {
        let mut var = Variable::new(OracleMetadata::new(DbType::BinaryInteger), caps(), true);
        assert!(matches!(
            var.bind_scalar(0, BindValue::Integer(i64::MAX)),
            Err(TypeError::Conversion(_))
        ));
    }

    #[test]
    fn test_array_capacity() {
        let mut var = int_array(3);
        let err = var.bind_array(vec![1.into(), 2.into(), 3.into(), 4.into()]).unwrap_err();
        assert_eq!(
            err,
            TypeError::Capacity {
                num_elements: 3,
                requested: 4
            }
        );
        assert_eq!(var.num_elements_in_array(), 0);
    }

    #[test]
    fn test_array_partial_keeps_trailing_slots() {
        let mut var = int_array(3);
        var.bind_array(vec![1.into(), 2.into(), 3.into()]).unwrap();
        var.bind_array(vec![9.into(), 8.into()]).unwrap();

        assert_eq!(var.num_elements_in_array(), 2);
        assert_eq!(var.values(), &[BindValue::Integer(9), BindValue::Integer(8)]);
        assert_eq!(var.get_value(2).unwrap(), BindValue::Integer(3));
    }

    #[test]
    fn test_array_invalid_element_is_atomic() {
        let mut var = int_array(3);
        var.bind_array(vec![1.into(), 2.into()]).unwrap();

        let err = var
            .bind_array(vec![5.into(), "bad".into(), 6.into()])
            .unwrap_err();
        assert!(matches!(err, TypeError::ArgumentType { .. }));
        assert_eq!(var.values(), &[BindValue::Integer(1), BindValue::Integer(2)]);

        assert!(!var.probe_array(vec![5.into(), "bad".into()]).unwrap());
        assert_eq!(var.num_elements_in_array(), 2);
    }

    #[test]
    fn test_array_requires_list() {
        let mut var = int_array(2);
        assert_eq!(var.set(BindValue::from(1)), Err(TypeError::ExpectedArray));

        let mut scalar = Variable::new(OracleMetadata::new(DbType::Number), caps(), false);
        assert_eq!(scalar.bind_array(vec![1.into()]), Err(TypeError::NotAnArray));
        assert!(matches!(
            scalar.set(BindValue::array([1])),
            Err(TypeError::ArgumentType { .. })
        ));
    }

    #[test]
    fn test_inferred_array_widens_strings() {
        let mut var =
            Variable::from_value(&BindValue::array(["a", "bb"]), true, caps()).unwrap();
        assert_eq!(var.metadata().max_size, 2);
        var.bind_array(vec!["ccc".into()]).unwrap();
        assert_eq!(var.metadata().max_size, 3);
        assert_eq!(var.num_elements_in_array(), 1);
    }

    #[test]
    fn test_object_type_mismatch() {
        let mut var = Variable::new(OracleMetadata::object("HR.A_T"), caps(), false);
        let err = var
            .bind_scalar(0, BindValue::Object(ObjectValue::new("HR.B_T")))
            .unwrap_err();
        assert!(matches!(err, TypeError::TypeConflict { .. }));
    }

    #[test]
    fn test_from_values_batch() {
        let rows = [BindValue::from("a"), BindValue::Null, BindValue::from("abcd")];
        let var = Variable::from_values(&rows, false, caps()).unwrap();
        assert!(!var.is_array());
        assert_eq!(var.num_elements(), 3);
        assert_eq!(var.metadata().max_size, 4);
        assert_eq!(var.values().len(), 3);
        assert_eq!(var.get_value(1).unwrap(), BindValue::Null);
    }

    #[test]
    fn test_timestamp_accepts_date() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
        let mut var = Variable::new(OracleMetadata::new(DbType::Timestamp), caps(), false);
        var.bind_scalar(0, date.into()).unwrap();
        assert_eq!(
            var.get_value(0).unwrap(),
            BindValue::Timestamp(date.and_hms_opt(0, 0, 0).unwrap())
        );
    }
}
