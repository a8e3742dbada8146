//! dbmap library
//!
//! A small data-access engine: run stored procedures or parameterized
//! statements against a configured database service and map the tabular
//! results onto plain Rust structs (SQLite, PostgreSQL, MySQL).

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{Config, ConnectionSettings, ServiceKey, Settings};
pub use db::{CollisionPolicy, DbService, SharedService, SqlxDriver};
pub use error::{DbError, DbResult};
pub use models::{DataSet, DbType, Model, Record, Table, Value};
