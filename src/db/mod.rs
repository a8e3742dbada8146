//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - The driver seam and the bundled sqlx driver
//! - Connection management with RAII release
//! - Command construction and identifier validation
//! - Query execution (`DbService`)
//! - Result projection onto models
//! - Type mappings and parameter binding

pub mod blocking;
pub mod command;
pub mod connection;
pub mod driver;
pub mod executor;
pub mod mapper;
pub mod params;
pub mod sqlx_driver;
pub mod types;

pub use blocking::SharedService;
pub use command::{Command, CommandBuilder, CommandKind, DEFAULT_KEY_COLUMN, validate_identifier};
pub use connection::{ConnectionGuard, ConnectionManager};
pub use driver::{CommandType, Connection, Driver, MarkerStyle, PreparedCommand, Purpose};
pub use executor::{DbService, ExecState};
pub use mapper::CollisionPolicy;
pub use sqlx_driver::{SqlxConnection, SqlxDriver};
