//! Cell and parameter values.
//!
//! `Value` is the single in-memory representation of a database cell and of a
//! bound parameter. `Parameter` pairs a value with its name and, optionally, an
//! explicitly declared backend type.

use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

/// A database value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// The database NULL sentinel
    #[default]
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    /// Exact DECIMAL/NUMERIC value as the database renders it
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
    Json(JsonValue),
}

impl Value {
    /// Check if this value is the database NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this value for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Decimal(_) => "decimal",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Timestamp(_) => "timestamp",
            Self::Json(_) => "json",
        }
    }

    /// The backend type inferred from this value's variant.
    pub fn inferred_type(&self) -> Option<DbType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(DbType::Bool),
            Self::Int(_) => Some(DbType::BigInt),
            Self::Float(_) => Some(DbType::Double),
            Self::Decimal(_) => Some(DbType::Decimal),
            Self::Text(_) => Some(DbType::Text),
            Self::Bytes(_) => Some(DbType::Binary),
            Self::Timestamp(_) => Some(DbType::Timestamp),
            Self::Json(_) => Some(DbType::Json),
        }
    }

    /// Parse a command-line literal: `null`, `true`/`false`, integers, floats,
    /// otherwise text.
    pub fn parse_literal(s: &str) -> Self {
        if s.eq_ignore_ascii_case("null") {
            return Self::Null;
        }
        if s.eq_ignore_ascii_case("true") {
            return Self::Bool(true);
        }
        if s.eq_ignore_ascii_case("false") {
            return Self::Bool(false);
        }
        if let Ok(i) = s.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            if f.is_finite() {
                return Self::Float(f);
            }
        }
        Self::Text(s.to_string())
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::Decimal(v) | Self::Text(v) => serializer.serialize_str(v),
            Self::Bytes(v) => serializer.serialize_str(&STANDARD.encode(v)),
            Self::Timestamp(v) => v.serialize(serializer),
            Self::Json(v) => v.serialize(serializer),
        }
    }
}

macro_rules! impl_value_from {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v.into())
                }
            }
        )+
    };
}

impl_value_from! {
    bool => Bool,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u8 => Int,
    u16 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    String => Text,
    Vec<u8> => Bytes,
    NaiveDateTime => Timestamp,
    JsonValue => Json,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Explicit backend type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbType {
    Bool,
    SmallInt,
    Int,
    BigInt,
    Real,
    Double,
    Decimal,
    Text,
    Binary,
    Timestamp,
    Json,
}

/// A named value bound to a command.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    value: Value,
    db_type: Option<DbType>,
}

impl Parameter {
    /// Create a parameter whose backend type is inferred from the value.
    ///
    /// Any backend prefix (`@id`, `:id`, `$id`, `?id`) is stripped from the name;
    /// the driver's marker style re-applies its own prefix when rendering.
    pub fn new(name: impl AsRef<str>, value: impl Into<Value>) -> Self {
        Self {
            name: normalize_name(name.as_ref()),
            value: value.into(),
            db_type: None,
        }
    }

    /// Create a parameter with an explicitly declared backend type.
    pub fn typed(name: impl AsRef<str>, value: impl Into<Value>, db_type: DbType) -> Self {
        Self {
            db_type: Some(db_type),
            ..Self::new(name, value)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The declared type, if any.
    pub fn declared_type(&self) -> Option<DbType> {
        self.db_type
    }

    /// The declared type, or the type inferred from the value.
    pub fn effective_type(&self) -> Option<DbType> {
        self.db_type.or_else(|| self.value.inferred_type())
    }
}

fn normalize_name(name: &str) -> String {
    name.trim_start_matches(['@', ':', '$', '?']).to_string()
}
