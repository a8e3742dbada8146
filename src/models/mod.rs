//! Data models for the engine.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod model;
pub mod table;
pub mod value;

// Re-export commonly used types
pub use connection::{DatabaseType, masked_connection_string};
pub use model::{ConversionError, Field, FromValue, Model, ToValue};
pub use table::{Column, DataSet, Record, Table, positional_table_name};
pub use value::{DbType, Parameter, Value};
