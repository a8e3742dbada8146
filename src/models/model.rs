//! Model contracts.
//!
//! A model is a plain struct whose fields line up with result columns. Instead of
//! discovering fields at runtime, each model publishes a static descriptor table
//! built once by [`impl_model!`](crate::impl_model): one `(name, column, get, set)`
//! entry per field, in declaration order. Projection, parameter binding and DML
//! generation all read that table.

use crate::models::value::Value;
use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;
use std::fmt;

/// A type that can be projected from result rows and bound as parameters.
pub trait Model: Default + 'static {
    /// Field descriptors in declaration order.
    fn fields() -> &'static [Field<Self>];

    /// Look up a descriptor by column name (exact, case-sensitive).
    fn field_for_column(column: &str) -> Option<&'static Field<Self>> {
        Self::fields().iter().find(|f| f.column == column)
    }
}

/// Descriptor for one model field.
pub struct Field<T> {
    /// Rust field name
    pub name: &'static str,
    /// Column the field maps to
    pub column: &'static str,
    pub get: fn(&T) -> Value,
    pub set: fn(&mut T, Value) -> Result<(), ConversionError>,
}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("column", &self.column)
            .finish_non_exhaustive()
    }
}

/// A value could not be converted to the field's type without loss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionError {
    pub expected: &'static str,
    pub found: &'static str,
    pub detail: Option<String>,
}

impl ConversionError {
    fn new(expected: &'static str, value: &Value) -> Self {
        Self {
            expected,
            found: value.type_name(),
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot convert {} to {}", self.found, self.expected)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConversionError {}

/// Read a field as a database value.
pub trait ToValue {
    fn to_value(&self) -> Value;
}

/// Build a field from a database value.
///
/// NULL converts to `Default::default()` for types without a null
/// representation; `Option<T>` maps it to `None`.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, ConversionError>;
}

impl<T: Clone + Into<Value>> ToValue for T {
    fn to_value(&self) -> Value {
        self.clone().into()
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        Ok(value)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(false),
            Value::Bool(v) => Ok(v),
            // TINYINT(1) and SQLite booleans arrive as integers
            Value::Int(0) => Ok(false),
            Value::Int(1) => Ok(true),
            Value::Int(v) => Err(ConversionError::new("bool", &value)
                .with_detail(format!("{v} is neither 0 nor 1"))),
            other => Err(ConversionError::new("bool", &other)),
        }
    }
}

macro_rules! impl_from_value_int {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self, ConversionError> {
                    match value {
                        Value::Null => Ok(0),
                        Value::Int(v) => <$ty>::try_from(v).map_err(|_| {
                            ConversionError::new(stringify!($ty), &value)
                                .with_detail(format!("{v} is out of range"))
                        }),
                        other => Err(ConversionError::new(stringify!($ty), &other)),
                    }
                }
            }
        )+
    };
}

impl_from_value_int!(i16, i32, i64, u8, u16, u32);

/// Largest integer magnitude an f64 represents exactly.
const F64_EXACT_INT: u64 = 1 << 53;

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(0.0),
            Value::Float(v) => Ok(v),
            Value::Int(v) if v.unsigned_abs() <= F64_EXACT_INT => Ok(v as f64),
            Value::Int(v) => Err(ConversionError::new("f64", &value)
                .with_detail(format!("{v} is not exactly representable"))),
            Value::Decimal(ref s) => s.parse::<f64>().map_err(|e| {
                ConversionError::new("f64", &value).with_detail(e.to_string())
            }),
            other => Err(ConversionError::new("f64", &other)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        let found = value.type_name();
        let wide = f64::from_value(value).map_err(|mut e| {
            e.expected = "f32";
            e
        })?;
        let narrow = wide as f32;
        if wide.is_finite() && !narrow.is_finite() {
            return Err(ConversionError {
                expected: "f32",
                found,
                detail: Some(format!("{wide} is out of range")),
            });
        }
        Ok(narrow)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(String::new()),
            Value::Text(v) | Value::Decimal(v) => Ok(v),
            other => Err(ConversionError::new("String", &other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Bytes(v) => Ok(v),
            other => Err(ConversionError::new("Vec<u8>", &other)),
        }
    }
}

/// Text layouts accepted for timestamps stored as strings.
const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(NaiveDateTime::default()),
            Value::Timestamp(v) => Ok(v),
            Value::Text(ref s) => TIMESTAMP_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .ok_or_else(|| {
                    ConversionError::new("NaiveDateTime", &value)
                        .with_detail(format!("'{s}' is not a timestamp"))
                }),
            other => Err(ConversionError::new("NaiveDateTime", &other)),
        }
    }
}

impl FromValue for JsonValue {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(JsonValue::Null),
            Value::Json(v) => Ok(v),
            Value::Text(ref s) => serde_json::from_str(s).map_err(|e| {
                ConversionError::new("serde_json::Value", &value).with_detail(e.to_string())
            }),
            other => Err(ConversionError::new("serde_json::Value", &other)),
        }
    }
}

/// Implement [`Model`] for a struct by listing its fields.
///
/// Each field maps to the column of the same name unless a column is given
/// with `=>`.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Default)]
/// struct User {
///     id: i64,
///     name: String,
///     email: Option<String>,
/// }
///
/// impl_model!(User { id => "ID", name => "Name", email => "Email" });
/// ```
#[macro_export]
macro_rules! impl_model {
    (@column $field:ident) => {
        stringify!($field)
    };
    (@column $field:ident $column:literal) => {
        $column
    };
    ($ty:ty { $($field:ident $(=> $column:literal)?),+ $(,)? }) => {
        impl $crate::models::Model for $ty {
            fn fields() -> &'static [$crate::models::Field<Self>] {
                static FIELDS: &[$crate::models::Field<$ty>] = &[
                    $(
                        $crate::models::Field {
                            name: stringify!($field),
                            column: $crate::impl_model!(@column $field $($column)?),
                            get: |model: &$ty| -> $crate::models::Value {
                                $crate::models::ToValue::to_value(&model.$field)
                            },
                            set: |model: &mut $ty,
                                  value: $crate::models::Value|
                             -> ::std::result::Result<(), $crate::models::ConversionError> {
                                model.$field = $crate::models::FromValue::from_value(value)?;
                                Ok(())
                            },
                        },
                    )+
                ];
                FIELDS
            }
        }
    };
}
