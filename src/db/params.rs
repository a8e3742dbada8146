//! Parameter binding utilities for database queries.
//!
//! A `Parameter` is first coerced to a `BindValue`: the declared `DbType` when
//! there is one, otherwise the type implied by the value. The `bind_*` functions
//! then attach it to a database-specific sqlx query. A declared type also picks
//! the SQL type of a NULL.

use crate::error::{DbError, DbResult};
use crate::models::{ConversionError, DbType, FromValue, Parameter, Value};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{MySql, Postgres, Sqlite};
use std::str::FromStr;

/// A parameter value in the shape it is bound to the driver.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BindValue {
    /// NULL, typed when the parameter declared a type
    Null(Option<DbType>),
    Bool(bool),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Real(f32),
    Double(f64),
    Decimal(Decimal),
    Text(String),
    Binary(Vec<u8>),
    Timestamp(NaiveDateTime),
    Json(JsonValue),
}

impl BindValue {
    /// Coerce a parameter to its bind shape. A value that cannot represent the
    /// declared type is an `InvalidInput` error.
    pub(crate) fn from_param(param: &Parameter) -> DbResult<Self> {
        let value = param.value().clone();
        if value.is_null() {
            return Ok(Self::Null(param.declared_type()));
        }
        let Some(db_type) = param.declared_type() else {
            return Self::inferred(param, value);
        };

        let value = match (db_type, value) {
            (
                DbType::SmallInt | DbType::Int | DbType::BigInt | DbType::Real | DbType::Double,
                Value::Text(s),
            ) => Value::parse_literal(s.trim()),
            (DbType::SmallInt | DbType::Int | DbType::BigInt, Value::Bool(b)) => {
                Value::Int(i64::from(b))
            }
            (_, value) => value,
        };

        Ok(match db_type {
            DbType::Bool => Self::Bool(coerce_bool(param, value)?),
            DbType::SmallInt => Self::SmallInt(convert(param, value)?),
            DbType::Int => Self::Int(convert(param, value)?),
            DbType::BigInt => Self::BigInt(convert(param, value)?),
            DbType::Real => Self::Real(convert(param, value)?),
            DbType::Double => Self::Double(convert(param, value)?),
            DbType::Decimal => Self::Decimal(coerce_decimal(param, value)?),
            DbType::Text => Self::Text(coerce_text(param, value)?),
            DbType::Binary => match value {
                Value::Bytes(v) => Self::Binary(v),
                Value::Text(s) => Self::Binary(s.into_bytes()),
                other => return Err(mismatch(param, "binary", &other)),
            },
            DbType::Timestamp => Self::Timestamp(convert(param, value)?),
            DbType::Json => Self::Json(convert(param, value)?),
        })
    }

    fn inferred(param: &Parameter, value: Value) -> DbResult<Self> {
        Ok(match value {
            Value::Null => Self::Null(None),
            Value::Bool(v) => Self::Bool(v),
            Value::Int(v) => Self::BigInt(v),
            Value::Float(v) => Self::Double(v),
            Value::Decimal(s) => Self::Decimal(parse_decimal(param, &s)?),
            Value::Text(v) => Self::Text(v),
            Value::Bytes(v) => Self::Binary(v),
            Value::Timestamp(v) => Self::Timestamp(v),
            Value::Json(v) => Self::Json(v),
        })
    }
}

fn convert<T: FromValue>(param: &Parameter, value: Value) -> DbResult<T> {
    T::from_value(value).map_err(|e| invalid(param, &e))
}

fn coerce_bool(param: &Parameter, value: Value) -> DbResult<bool> {
    match value {
        Value::Text(ref s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(mismatch(param, "bool", &value)),
        },
        other => convert(param, other),
    }
}

fn coerce_decimal(param: &Parameter, value: Value) -> DbResult<Decimal> {
    match value {
        Value::Decimal(ref s) | Value::Text(ref s) => parse_decimal(param, s),
        Value::Int(v) => Ok(Decimal::from(v)),
        Value::Float(v) => Decimal::try_from(v).map_err(|e| {
            DbError::invalid_input(format!(
                "parameter '{}': {v} is not a decimal: {e}",
                param.name()
            ))
        }),
        other => Err(mismatch(param, "decimal", &other)),
    }
}

fn coerce_text(param: &Parameter, value: Value) -> DbResult<String> {
    Ok(match value {
        Value::Text(v) | Value::Decimal(v) => v,
        Value::Bool(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Timestamp(v) => v.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
        Value::Json(v) => v.to_string(),
        Value::Bytes(v) => String::from_utf8(v).map_err(|_| {
            DbError::invalid_input(format!(
                "parameter '{}': bytes are not valid UTF-8 text",
                param.name()
            ))
        })?,
        Value::Null => String::new(),
    })
}

fn parse_decimal(param: &Parameter, s: &str) -> DbResult<Decimal> {
    Decimal::from_str(s.trim()).map_err(|e| {
        DbError::invalid_input(format!(
            "parameter '{}': '{s}' is not a decimal: {e}",
            param.name()
        ))
    })
}

fn invalid(param: &Parameter, err: &ConversionError) -> DbError {
    DbError::invalid_input(format!("parameter '{}': {err}", param.name()))
}

fn mismatch(param: &Parameter, expected: &str, value: &Value) -> DbError {
    DbError::invalid_input(format!(
        "parameter '{}': cannot bind {} as {expected}",
        param.name(),
        value.type_name()
    ))
}

/// Coerce every parameter of a command, in order.
pub(crate) fn bind_values(params: &[Parameter]) -> DbResult<Vec<BindValue>> {
    params.iter().map(BindValue::from_param).collect()
}

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    value: BindValue,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match value {
        BindValue::Null(ty) => match ty {
            Some(DbType::Bool) => query.bind(None::<bool>),
            Some(DbType::SmallInt) => query.bind(None::<i16>),
            Some(DbType::Int) => query.bind(None::<i32>),
            Some(DbType::BigInt) => query.bind(None::<i64>),
            Some(DbType::Real) => query.bind(None::<f32>),
            Some(DbType::Double) => query.bind(None::<f64>),
            Some(DbType::Decimal) => query.bind(None::<Decimal>),
            Some(DbType::Binary) => query.bind(None::<Vec<u8>>),
            Some(DbType::Timestamp) => query.bind(None::<NaiveDateTime>),
            Some(DbType::Json) => query.bind(None::<Json<JsonValue>>),
            Some(DbType::Text) | None => query.bind(None::<String>),
        },
        BindValue::Bool(v) => query.bind(v),
        BindValue::SmallInt(v) => query.bind(v),
        BindValue::Int(v) => query.bind(v),
        BindValue::BigInt(v) => query.bind(v),
        BindValue::Real(v) => query.bind(v),
        BindValue::Double(v) => query.bind(v),
        BindValue::Decimal(v) => query.bind(v),
        BindValue::Text(v) => query.bind(v),
        BindValue::Binary(v) => query.bind(v),
        BindValue::Timestamp(v) => query.bind(v),
        BindValue::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    value: BindValue,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match value {
        BindValue::Null(ty) => match ty {
            Some(DbType::Bool) => query.bind(None::<bool>),
            Some(DbType::SmallInt) => query.bind(None::<i16>),
            Some(DbType::Int) => query.bind(None::<i32>),
            Some(DbType::BigInt) => query.bind(None::<i64>),
            Some(DbType::Real) => query.bind(None::<f32>),
            Some(DbType::Double) => query.bind(None::<f64>),
            Some(DbType::Decimal) => query.bind(None::<Decimal>),
            Some(DbType::Binary) => query.bind(None::<Vec<u8>>),
            Some(DbType::Timestamp) => query.bind(None::<NaiveDateTime>),
            Some(DbType::Json) => query.bind(None::<Json<JsonValue>>),
            Some(DbType::Text) | None => query.bind(None::<String>),
        },
        BindValue::Bool(v) => query.bind(v),
        BindValue::SmallInt(v) => query.bind(v),
        BindValue::Int(v) => query.bind(v),
        BindValue::BigInt(v) => query.bind(v),
        BindValue::Real(v) => query.bind(v),
        BindValue::Double(v) => query.bind(v),
        BindValue::Decimal(v) => query.bind(v),
        BindValue::Text(v) => query.bind(v),
        BindValue::Binary(v) => query.bind(v),
        BindValue::Timestamp(v) => query.bind(v),
        BindValue::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: BindValue,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        BindValue::Null(ty) => match ty {
            Some(DbType::Bool) => query.bind(None::<bool>),
            Some(DbType::SmallInt | DbType::Int | DbType::BigInt) => query.bind(None::<i64>),
            Some(DbType::Real | DbType::Double) => query.bind(None::<f64>),
            Some(DbType::Binary) => query.bind(None::<Vec<u8>>),
            Some(DbType::Timestamp) => query.bind(None::<NaiveDateTime>),
            _ => query.bind(None::<String>),
        },
        BindValue::Bool(v) => query.bind(v),
        BindValue::SmallInt(v) => query.bind(v),
        BindValue::Int(v) => query.bind(v),
        BindValue::BigInt(v) => query.bind(v),
        BindValue::Real(v) => query.bind(v),
        BindValue::Double(v) => query.bind(v),
        // SQLite has no exact numeric or JSON type, store as string
        BindValue::Decimal(v) => query.bind(v.to_string()),
        BindValue::Text(v) => query.bind(v),
        BindValue::Binary(v) => query.bind(v),
        BindValue::Timestamp(v) => query.bind(v),
        BindValue::Json(v) => query.bind(v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coerce(value: impl Into<Value>, db_type: DbType) -> DbResult<BindValue> {
        BindValue::from_param(&Parameter::typed("@p", value, db_type))
    }

    #[test]
    fn test_inferred_types() {
        assert_eq!(
            BindValue::from_param(&Parameter::new("id", 42)).unwrap(),
            BindValue::BigInt(42)
        );
        assert_eq!(
            BindValue::from_param(&Parameter::new("name", "Alice")).unwrap(),
            BindValue::Text("Alice".into())
        );
        assert_eq!(
            BindValue::from_param(&Parameter::new("n", Value::Null)).unwrap(),
            BindValue::Null(None)
        );
    }

    #[test]
    fn test_declared_type_selects_typed_null() {
        assert_eq!(
            coerce(None::<i32>, DbType::Int).unwrap(),
            BindValue::Null(Some(DbType::Int))
        );
    }

    #[test]
    fn test_declared_integer_is_range_checked() {
        assert_eq!(coerce(42, DbType::SmallInt).unwrap(), BindValue::SmallInt(42));
        assert_eq!(coerce("17", DbType::Int).unwrap(), BindValue::Int(17));
        assert!(matches!(
            coerce(70_000, DbType::SmallInt),
            Err(DbError::InvalidInput { .. })
        ));
        assert!(coerce(1.5, DbType::Int).is_err());
        assert!(coerce("abc", DbType::BigInt).is_err());
    }

    #[test]
    fn test_declared_decimal() {
        assert_eq!(
            coerce("12.50", DbType::Decimal).unwrap(),
            BindValue::Decimal(Decimal::new(1250, 2))
        );
        assert_eq!(
            coerce(3, DbType::Decimal).unwrap(),
            BindValue::Decimal(Decimal::from(3))
        );
        assert!(coerce("twelve", DbType::Decimal).is_err());
    }

    #[test]
    fn test_declared_bool_and_text() {
        assert_eq!(coerce(1, DbType::Bool).unwrap(), BindValue::Bool(true));
        assert_eq!(coerce("false", DbType::Bool).unwrap(), BindValue::Bool(false));
        assert!(coerce(2, DbType::Bool).is_err());
        assert_eq!(
            coerce(5, DbType::Text).unwrap(),
            BindValue::Text("5".to_string())
        );
    }

    #[test]
    fn test_declared_timestamp_and_json() {
        let ts = coerce("2024-03-01 10:30:00", DbType::Timestamp).unwrap();
        assert!(matches!(ts, BindValue::Timestamp(_)));
        assert_eq!(
            coerce(r#"{"a":1}"#, DbType::Json).unwrap(),
            BindValue::Json(serde_json::json!({"a": 1}))
        );
        assert!(coerce("{not json", DbType::Json).is_err());
    }

    #[test]
    fn test_bind_values_reports_parameter_name() {
        let params = vec![
            Parameter::new("ok", 1),
            Parameter::typed("@age", "old", DbType::Int),
        ];
        let err = bind_values(&params).unwrap_err();
        assert!(err.to_string().contains("age"));
    }
}
