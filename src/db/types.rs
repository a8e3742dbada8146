//! Database-agnostic type mappings.
//!
//! This module decodes driver rows into [`Value`] cells.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction
//!
//! NULL is detected from the raw value before any typed decode. A value the
//! decoder cannot represent is an error, never a silent NULL.

use crate::error::{DbError, DbResult};
use crate::models::{Column, DatabaseType, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column as _, Decode, Row, Type, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Timestamp,
    Date,
    Time,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    // Date/time - before integers, "interval" and "point" contain "int"
    if lower.starts_with("timestamp") || lower == "datetime" {
        return TypeCategory::Timestamp;
    }
    if lower == "date" {
        return TypeCategory::Date;
    }
    if lower == "time" {
        return TypeCategory::Time;
    }
    if lower == "interval" || lower == "point" {
        return TypeCategory::Unknown;
    }

    // Boolean (MySQL reports TINYINT(1) as BOOLEAN)
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    // Integer types
    if lower.contains("int") || lower.contains("serial") || lower == "year" {
        return TypeCategory::Integer;
    }

    // Float types
    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    // JSON types
    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    // UUID (PostgreSQL)
    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    // Binary types
    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower == "name" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Raw MySQL DECIMAL text, preserving the exact database representation
/// (including precision beyond `rust_decimal`'s 28 digits).
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Row Decoding
// =============================================================================

/// Column metadata of a row.
pub fn columns_of<R: Row>(row: &R) -> Vec<Column> {
    columns_from(row.columns())
}

/// Column metadata from driver column descriptions.
pub fn columns_from<C: sqlx::Column>(columns: &[C]) -> Vec<Column> {
    columns
        .iter()
        .map(|col| Column::new(col.name(), col.type_info().name()))
        .collect()
}

/// Decode every cell of a row into [`Value`]s.
pub trait DecodeRow: Row {
    fn decode_values(&self) -> DbResult<Vec<Value>>;
}

impl DecodeRow for MySqlRow {
    fn decode_values(&self) -> DbResult<Vec<Value>> {
        (0..self.columns().len())
            .map(|idx| {
                if self.try_get_raw(idx)?.is_null() {
                    return Ok(Value::Null);
                }
                let type_name = self.column(idx).type_info().name();
                let category = categorize_type(type_name, DatabaseType::MySQL);
                mysql::decode_column(self, idx, category)
            })
            .collect()
    }
}

impl DecodeRow for PgRow {
    fn decode_values(&self) -> DbResult<Vec<Value>> {
        (0..self.columns().len())
            .map(|idx| {
                if self.try_get_raw(idx)?.is_null() {
                    return Ok(Value::Null);
                }
                let type_name = self.column(idx).type_info().name();
                let category = categorize_type(type_name, DatabaseType::PostgreSQL);
                postgres::decode_column(self, idx, type_name, category)
            })
            .collect()
    }
}

impl DecodeRow for SqliteRow {
    fn decode_values(&self) -> DbResult<Vec<Value>> {
        (0..self.columns().len())
            .map(|idx| {
                let raw = self.try_get_raw(idx)?;
                if raw.is_null() {
                    return Ok(Value::Null);
                }
                // SQLite is dynamically typed: decode by the stored value's type
                let storage = raw.type_info().name().to_string();
                let declared = self.column(idx).type_info().name();
                sqlite::decode_column(self, idx, &storage, declared)
            })
            .collect()
    }
}

fn undecodable(column: &str, type_name: &str) -> DbError {
    DbError::execution(
        format!("cannot decode column '{column}' of type {type_name}"),
        None,
    )
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> DbResult<Value> {
        match category {
            TypeCategory::Decimal => Ok(Value::Decimal(row.try_get::<RawDecimal, _>(idx)?.0)),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => Ok(Value::Bool(row.try_get::<bool, _>(idx)?)),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => Ok(Value::Bytes(row.try_get::<Vec<u8>, _>(idx)?)),
            TypeCategory::Json => Ok(Value::Json(row.try_get::<JsonValue, _>(idx)?)),
            TypeCategory::Timestamp => decode_timestamp(row, idx),
            TypeCategory::Date => Ok(Value::Text(row.try_get::<NaiveDate, _>(idx)?.to_string())),
            TypeCategory::Time => Ok(Value::Text(row.try_get::<NaiveTime, _>(idx)?.to_string())),
            _ => decode_text(row, idx),
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> DbResult<Value> {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Ok(Value::Int(v));
        }
        // BIGINT UNSIGNED beyond i64 keeps its exact digits
        if let Ok(v) = row.try_get::<u64, _>(idx) {
            return Ok(i64::try_from(v)
                .map(Value::Int)
                .unwrap_or_else(|_| Value::Decimal(v.to_string())));
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Ok(Value::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<u32, _>(idx) {
            return Ok(Value::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Ok(Value::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<u16, _>(idx) {
            return Ok(Value::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<i8, _>(idx) {
            return Ok(Value::Int(v.into()));
        }
        Ok(Value::Int(row.try_get::<u8, _>(idx)?.into()))
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> DbResult<Value> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Ok(Value::Float(v));
        }
        Ok(Value::Float(row.try_get::<f32, _>(idx)?.into()))
    }

    fn decode_timestamp(row: &MySqlRow, idx: usize) -> DbResult<Value> {
        if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
            return Ok(Value::Timestamp(v));
        }
        let v = row.try_get::<DateTime<Utc>, _>(idx)?;
        Ok(Value::Timestamp(v.naive_utc()))
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> DbResult<Value> {
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return Ok(Value::Text(v));
        }
        // VARBINARY and friends come back as byte strings
        row.try_get::<Vec<u8>, _>(idx)
            .map(Value::Bytes)
            .map_err(|_| {
                let col = row.column(idx);
                undecodable(col.name(), col.type_info().name())
            })
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> DbResult<Value> {
        match category {
            TypeCategory::Decimal => {
                let v = row.try_get::<rust_decimal::Decimal, _>(idx)?;
                Ok(Value::Decimal(v.to_string()))
            }
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => Ok(Value::Bool(row.try_get::<bool, _>(idx)?)),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => Ok(Value::Bytes(row.try_get::<Vec<u8>, _>(idx)?)),
            TypeCategory::Json => Ok(Value::Json(row.try_get::<JsonValue, _>(idx)?)),
            TypeCategory::Uuid => Ok(Value::Text(row.try_get::<uuid::Uuid, _>(idx)?.to_string())),
            TypeCategory::Timestamp if type_name.eq_ignore_ascii_case("timestamptz") => {
                Ok(Value::Timestamp(row.try_get::<DateTime<Utc>, _>(idx)?.naive_utc()))
            }
            TypeCategory::Timestamp => Ok(Value::Timestamp(row.try_get::<NaiveDateTime, _>(idx)?)),
            TypeCategory::Date => Ok(Value::Text(row.try_get::<NaiveDate, _>(idx)?.to_string())),
            TypeCategory::Time => Ok(Value::Text(row.try_get::<NaiveTime, _>(idx)?.to_string())),
            _ => row.try_get::<String, _>(idx).map(Value::Text).map_err(|_| {
                undecodable(row.column(idx).name(), type_name)
            }),
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> DbResult<Value> {
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Ok(Value::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Ok(Value::Int(v.into()));
        }
        Ok(Value::Int(row.try_get::<i64, _>(idx)?))
    }

    fn decode_float(row: &PgRow, idx: usize) -> DbResult<Value> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Ok(Value::Float(v));
        }
        Ok(Value::Float(row.try_get::<f32, _>(idx)?.into()))
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(
        row: &SqliteRow,
        idx: usize,
        storage: &str,
        declared: &str,
    ) -> DbResult<Value> {
        match categorize_type(storage, DatabaseType::SQLite) {
            TypeCategory::Integer => Ok(Value::Int(row.try_get::<i64, _>(idx)?)),
            TypeCategory::Float => Ok(Value::Float(row.try_get::<f64, _>(idx)?)),
            TypeCategory::Binary => Ok(Value::Bytes(row.try_get::<Vec<u8>, _>(idx)?)),
            _ => decode_text(row, idx, declared),
        }
    }

    fn decode_text(row: &SqliteRow, idx: usize, declared: &str) -> DbResult<Value> {
        let v = row.try_get_unchecked::<String, _>(idx)?;
        if declared.to_lowercase().contains("json") {
            if let Ok(json) = serde_json::from_str::<JsonValue>(&v) {
                return Ok(Value::Json(json));
            }
        }
        Ok(Value::Text(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(
            categorize_type("INT", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("BIGINT UNSIGNED", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("INT8", DatabaseType::PostgreSQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("INTEGER", DatabaseType::SQLite),
            TypeCategory::Integer
        );
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(
            categorize_type("DECIMAL", DatabaseType::MySQL),
            TypeCategory::Decimal
        );
        assert_eq!(
            categorize_type("NUMERIC", DatabaseType::PostgreSQL),
            TypeCategory::Decimal
        );
        // SQLite NUMERIC is a float
        assert_eq!(
            categorize_type("numeric", DatabaseType::SQLite),
            TypeCategory::Float
        );
    }

    #[test]
    fn test_categorize_type_temporal() {
        assert_eq!(
            categorize_type("DATETIME", DatabaseType::MySQL),
            TypeCategory::Timestamp
        );
        assert_eq!(
            categorize_type("TIMESTAMPTZ", DatabaseType::PostgreSQL),
            TypeCategory::Timestamp
        );
        assert_eq!(
            categorize_type("DATE", DatabaseType::PostgreSQL),
            TypeCategory::Date
        );
        assert_eq!(
            categorize_type("TIME", DatabaseType::MySQL),
            TypeCategory::Time
        );
        assert_eq!(
            categorize_type("INTERVAL", DatabaseType::PostgreSQL),
            TypeCategory::Unknown
        );
    }

    #[test]
    fn test_categorize_type_misc() {
        assert_eq!(
            categorize_type("BOOLEAN", DatabaseType::MySQL),
            TypeCategory::Boolean
        );
        assert_eq!(
            categorize_type("jsonb", DatabaseType::PostgreSQL),
            TypeCategory::Json
        );
        assert_eq!(
            categorize_type("uuid", DatabaseType::PostgreSQL),
            TypeCategory::Uuid
        );
        assert_eq!(
            categorize_type("VARBINARY", DatabaseType::MySQL),
            TypeCategory::Binary
        );
        assert_eq!(
            categorize_type("VARCHAR", DatabaseType::MySQL),
            TypeCategory::Text
        );
    }
}
