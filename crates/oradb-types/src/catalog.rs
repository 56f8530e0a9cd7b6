//! Database type catalog.
//!
//! Every bindable value is eventually described by one of the [`DbType`]
//! entries below. Each entry carries the wire type number used on the
//! protocol, the character set form, and the buffer size for fixed-width
//! types. Types without a fixed width are sized from the values bound to
//! them and may grow (see [`DbType::is_dynamically_sized`]).

use std::fmt;

use crate::error::TypeError;

/// Largest size, in bytes, of a VARCHAR2/RAW value in extended mode.
pub const MAX_EXTENDED_STRING_SIZE: u32 = 32767;

/// Largest size, in bytes, of a VARCHAR2/RAW value in standard mode.
pub const MAX_STANDARD_STRING_SIZE: u32 = 4000;

/// Bytes per character used when sizing database character set buffers (UTF-8).
pub const DB_CHARSET_RATIO: u32 = 4;

/// Bytes per character used when sizing national character set buffers (AL16UTF16).
pub const NCHAR_CHARSET_RATIO: u32 = 2;

/// Character set form of a character type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharsetForm {
    /// Not a character type.
    None,
    /// Database character set.
    Implicit,
    /// National character set.
    NChar,
}

impl CharsetForm {
    /// Wire value of the character set form.
    #[must_use]
    pub const fn wire_value(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Implicit => 1,
            Self::NChar => 2,
        }
    }
}

/// Wire type catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbType {
    /// VARCHAR2.
    Varchar,
    /// NVARCHAR2.
    NVarchar,
    /// CHAR.
    Char,
    /// NCHAR.
    NChar,
    /// LONG, used for strings beyond the VARCHAR2 limit.
    Long,
    /// LONG RAW, used for byte strings beyond the RAW limit.
    LongRaw,
    /// NUMBER.
    Number,
    /// PLS_INTEGER / BINARY_INTEGER.
    BinaryInteger,
    /// BINARY_FLOAT.
    BinaryFloat,
    /// BINARY_DOUBLE.
    BinaryDouble,
    /// RAW.
    Raw,
    /// DATE.
    Date,
    /// TIMESTAMP.
    Timestamp,
    /// TIMESTAMP WITH TIME ZONE.
    TimestampTz,
    /// TIMESTAMP WITH LOCAL TIME ZONE.
    TimestampLtz,
    /// INTERVAL DAY TO SECOND.
    IntervalDs,
    /// INTERVAL YEAR TO MONTH.
    IntervalYm,
    /// BOOLEAN (native in PL/SQL and 23ai servers).
    Boolean,
    /// CLOB.
    Clob,
    /// NCLOB.
    NClob,
    /// BLOB.
    Blob,
    /// JSON.
    Json,
    /// ROWID.
    Rowid,
    /// Named object type.
    Object,
}

impl DbType {
    /// All catalog entries.
    pub const ALL: [DbType; 24] = [
        Self::Varchar,
        Self::NVarchar,
        Self::Char,
        Self::NChar,
        Self::Long,
        Self::LongRaw,
        Self::Number,
        Self::BinaryInteger,
        Self::BinaryFloat,
        Self::BinaryDouble,
        Self::Raw,
        Self::Date,
        Self::Timestamp,
        Self::TimestampTz,
        Self::TimestampLtz,
        Self::IntervalDs,
        Self::IntervalYm,
        Self::Boolean,
        Self::Clob,
        Self::NClob,
        Self::Blob,
        Self::Json,
        Self::Rowid,
        Self::Object,
    ];

    /// Wire type number.
    #[must_use]
    pub const fn type_num(self) -> u8 {
        match self {
            Self::Varchar | Self::NVarchar => 1,
            Self::Number => 2,
            Self::BinaryInteger => 3,
            Self::Long => 8,
            Self::Rowid => 11,
            Self::Date => 12,
            Self::Raw => 23,
            Self::LongRaw => 24,
            Self::Char | Self::NChar => 96,
            Self::BinaryFloat => 100,
            Self::BinaryDouble => 101,
            Self::Object => 109,
            Self::Clob | Self::NClob => 112,
            Self::Blob => 113,
            Self::Json => 119,
            Self::Timestamp => 180,
            Self::TimestampTz => 181,
            Self::IntervalYm => 182,
            Self::IntervalDs => 183,
            Self::TimestampLtz => 231,
            Self::Boolean => 252,
        }
    }

    /// Character set form used on the wire.
    #[must_use]
    pub const fn charset_form(self) -> CharsetForm {
        match self {
            Self::Varchar | Self::Char | Self::Long | Self::Clob => CharsetForm::Implicit,
            Self::NVarchar | Self::NChar | Self::NClob => CharsetForm::NChar,
            _ => CharsetForm::None,
        }
    }

    /// Buffer size of fixed-width types; `None` for types sized by value.
    #[must_use]
    pub const fn fixed_size(self) -> Option<u32> {
        match self {
            Self::Number | Self::BinaryInteger => Some(22),
            Self::BinaryFloat => Some(4),
            Self::BinaryDouble => Some(8),
            Self::Date => Some(7),
            Self::Timestamp | Self::TimestampLtz => Some(11),
            Self::TimestampTz => Some(13),
            Self::IntervalDs => Some(11),
            Self::IntervalYm => Some(5),
            Self::Boolean => Some(4),
            Self::Rowid => Some(18),
            Self::Clob | Self::NClob | Self::Blob | Self::Json | Self::Object => Some(112),
            Self::Varchar
            | Self::NVarchar
            | Self::Char
            | Self::NChar
            | Self::Long
            | Self::LongRaw
            | Self::Raw => None,
        }
    }

    /// Whether the maximum size is derived from bound values and may grow.
    #[must_use]
    pub const fn is_dynamically_sized(self) -> bool {
        self.fixed_size().is_none()
    }

    /// Whether values of this type are character data.
    #[must_use]
    pub const fn is_character(self) -> bool {
        !matches!(self.charset_form(), CharsetForm::None)
    }

    /// Bytes per unit of `max_size` when sizing the transfer buffer.
    #[must_use]
    pub const fn buffer_ratio(self) -> u32 {
        match self.charset_form() {
            CharsetForm::Implicit => DB_CHARSET_RATIO,
            CharsetForm::NChar => NCHAR_CHARSET_RATIO,
            CharsetForm::None => 1,
        }
    }

    /// The long variant a dynamically sized type is promoted to when a
    /// value exceeds the string limit.
    #[must_use]
    pub const fn long_variant(self) -> Option<DbType> {
        match self {
            Self::Varchar => Some(Self::Long),
            Self::Raw => Some(Self::LongRaw),
            _ => None,
        }
    }

    /// Type name as written in SQL.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Varchar => "VARCHAR2",
            Self::NVarchar => "NVARCHAR2",
            Self::Char => "CHAR",
            Self::NChar => "NCHAR",
            Self::Long => "LONG",
            Self::LongRaw => "LONG RAW",
            Self::Number => "NUMBER",
            Self::BinaryInteger => "BINARY_INTEGER",
            Self::BinaryFloat => "BINARY_FLOAT",
            Self::BinaryDouble => "BINARY_DOUBLE",
            Self::Raw => "RAW",
            Self::Date => "DATE",
            Self::Timestamp => "TIMESTAMP",
            Self::TimestampTz => "TIMESTAMP WITH TIME ZONE",
            Self::TimestampLtz => "TIMESTAMP WITH LOCAL TIME ZONE",
            Self::IntervalDs => "INTERVAL DAY TO SECOND",
            Self::IntervalYm => "INTERVAL YEAR TO MONTH",
            Self::Boolean => "BOOLEAN",
            Self::Clob => "CLOB",
            Self::NClob => "NCLOB",
            Self::Blob => "BLOB",
            Self::Json => "JSON",
            Self::Rowid => "ROWID",
            Self::Object => "OBJECT",
        }
    }

    /// Parse a declared type name such as `"VARCHAR2(100)"` or `"number"`.
    ///
    /// Any parenthesized size or precision suffix is ignored.
    pub fn from_name(name: &str) -> Result<Self, TypeError> {
        let upper = name.trim().to_uppercase();
        let base = match upper.find('(') {
            Some(idx) => upper[..idx].trim_end(),
            None => upper.as_str(),
        };
        let base = base.split_whitespace().collect::<Vec<_>>().join(" ");

        let dbtype = match base.as_str() {
            "VARCHAR2" | "VARCHAR" => Self::Varchar,
            "NVARCHAR2" => Self::NVarchar,
            "CHAR" => Self::Char,
            "NCHAR" => Self::NChar,
            "LONG" => Self::Long,
            "LONG RAW" => Self::LongRaw,
            "NUMBER" | "FLOAT" | "INTEGER" => Self::Number,
            "BINARY_INTEGER" | "PLS_INTEGER" => Self::BinaryInteger,
            "BINARY_FLOAT" => Self::BinaryFloat,
            "BINARY_DOUBLE" => Self::BinaryDouble,
            "RAW" => Self::Raw,
            "DATE" => Self::Date,
            "TIMESTAMP" => Self::Timestamp,
            "TIMESTAMP WITH TIME ZONE" => Self::TimestampTz,
            "TIMESTAMP WITH LOCAL TIME ZONE" => Self::TimestampLtz,
            "INTERVAL DAY TO SECOND" => Self::IntervalDs,
            "INTERVAL YEAR TO MONTH" => Self::IntervalYm,
            "BOOLEAN" => Self::Boolean,
            "CLOB" => Self::Clob,
            "NCLOB" => Self::NClob,
            "BLOB" => Self::Blob,
            "JSON" => Self::Json,
            "ROWID" | "UROWID" => Self::Rowid,
            "OBJECT" => Self::Object,
            _ => return Err(TypeError::UnknownType(name.trim().to_string())),
        };
        Ok(dbtype)
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Server capabilities that influence how values are bound.
///
/// These are negotiated by the connection during the handshake and handed to
/// every variable created for that connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Whether SQL (not only PL/SQL) accepts native BOOLEAN values.
    pub supports_bool: bool,
    /// Largest VARCHAR2/RAW size in bytes before LONG types are used.
    pub max_string_size: u32,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            supports_bool: false,
            max_string_size: MAX_STANDARD_STRING_SIZE,
        }
    }
}

impl Capabilities {
    /// Capabilities of a server with extended strings and native booleans.
    #[must_use]
    pub fn extended() -> Self {
        Self {
            supports_bool: true,
            max_string_size: MAX_EXTENDED_STRING_SIZE,
        }
    }

    /// Set native boolean support.
    #[must_use]
    pub fn with_bool_support(mut self, supported: bool) -> Self {
        self.supports_bool = supported;
        self
    }

    /// Set the maximum string size.
    #[must_use]
    pub fn with_max_string_size(mut self, size: u32) -> Self {
        self.max_string_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_simple() {
        assert_eq!(DbType::from_name("NUMBER").unwrap(), DbType::Number);
        assert_eq!(DbType::from_name("number").unwrap(), DbType::Number);
        assert_eq!(DbType::from_name("PLS_INTEGER").unwrap(), DbType::BinaryInteger);
        assert_eq!(DbType::from_name("rowid").unwrap(), DbType::Rowid);
    }

    #[test]
    fn test_from_name_with_suffix() {
        assert_eq!(DbType::from_name("VARCHAR2(100)").unwrap(), DbType::Varchar);
        assert_eq!(DbType::from_name("NUMBER(10, 2)").unwrap(), DbType::Number);
        assert_eq!(
            DbType::from_name("timestamp  with time zone").unwrap(),
            DbType::TimestampTz
        );
    }

    #[test]
    fn test_from_name_unknown() {
        assert!(matches!(
            DbType::from_name("GEOMETRY"),
            Err(TypeError::UnknownType(name)) if name == "GEOMETRY"
        ));
    }

    #[test]
    fn test_name_round_trip() {
        for dbtype in DbType::ALL {
            assert_eq!(DbType::from_name(dbtype.name()).unwrap(), dbtype);
        }
    }

    #[test]
    fn test_type_numbers() {
        assert_eq!(DbType::Varchar.type_num(), 1);
        assert_eq!(DbType::NVarchar.type_num(), 1);
        assert_eq!(DbType::Number.type_num(), 2);
        assert_eq!(DbType::Boolean.type_num(), 252);
        assert_eq!(DbType::TimestampLtz.type_num(), 231);
    }

    #[test]
    fn test_charset_forms() {
        assert_eq!(DbType::Varchar.charset_form(), CharsetForm::Implicit);
        assert_eq!(DbType::NChar.charset_form(), CharsetForm::NChar);
        assert_eq!(DbType::Number.charset_form(), CharsetForm::None);
        assert_eq!(CharsetForm::NChar.wire_value(), 2);
    }

    #[test]
    fn test_dynamic_sizing() {
        assert!(DbType::Varchar.is_dynamically_sized());
        assert!(DbType::Raw.is_dynamically_sized());
        assert!(!DbType::Number.is_dynamically_sized());
        assert_eq!(DbType::Date.fixed_size(), Some(7));
    }

    #[test]
    fn test_capabilities_default() {
        let caps = Capabilities::default();
        assert!(!caps.supports_bool);
        assert_eq!(caps.max_string_size, MAX_STANDARD_STRING_SIZE);
        assert!(Capabilities::extended().supports_bool);
    }
}
