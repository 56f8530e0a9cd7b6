//! Fuzz metadata inference and widening over arbitrary bind values.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use oradb_types::{BindValue, Capabilities, OracleMetadata};

#[derive(Debug, Arbitrary)]
enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Array(Vec<Scalar>),
}

#[derive(Debug, Arbitrary)]
enum Scalar {
    Null,
    Integer(i64),
    Text(String),
}

#[derive(Debug, Arbitrary)]
struct Input {
    first: Value,
    second: Value,
    is_plsql: bool,
    supports_bool: bool,
    extended_strings: bool,
}

fn scalar(value: Scalar) -> BindValue {
    match value {
        Scalar::Null => BindValue::Null,
        Scalar::Integer(n) => BindValue::Integer(n),
        Scalar::Text(s) => BindValue::from(s),
    }
}

fn bind_value(value: Value) -> BindValue {
    match value {
        Value::Null => BindValue::Null,
        Value::Boolean(b) => BindValue::Boolean(b),
        Value::Integer(n) => BindValue::Integer(n),
        Value::Float(f) => BindValue::Float(f),
        Value::Text(s) => BindValue::from(s),
        Value::Bytes(b) => BindValue::Bytes(b.into()),
        Value::Array(values) => BindValue::Array(values.into_iter().map(scalar).collect()),
    }
}

fuzz_target!(|input: Input| {
    let caps = if input.extended_strings {
        Capabilities::extended()
    } else {
        Capabilities::default()
    }
    .with_bool_support(input.supports_bool);

    let first = bind_value(input.first);
    let second = bind_value(input.second);
    let (Ok(a), Ok(b)) = (
        OracleMetadata::infer(&first, input.is_plsql, caps),
        OracleMetadata::infer(&second, input.is_plsql, caps),
    ) else {
        return;
    };

    assert!(a.num_elements >= 1);
    if let Ok(widened) = a.widened(&b) {
        assert!(widened.max_size >= a.max_size);
        assert!(widened.max_size >= b.max_size);
        assert_eq!(b.widened(&a).map(|m| m.dbtype).ok(), Some(widened.dbtype));
    }
});
