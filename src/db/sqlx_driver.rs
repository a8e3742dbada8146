//! sqlx-backed driver for MySQL/MariaDB, PostgreSQL and SQLite.
//!
//! The engine is synchronous, so the driver owns a current-thread tokio
//! runtime and runs each connection call to completion on it. Must not be
//! called from inside an async context; use `SharedService` there. Dropping
//! the driver is fine anywhere.
//!
//! # Architecture
//!
//! The driver uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific execute and fetch operations
//! - `postgres`: PostgreSQL-specific execute and fetch operations
//! - `sqlite`: SQLite-specific execute and fetch operations
//!
//! Each submodule provides identical functionality adapted to the database's type system.

use crate::config::{ConnectionSettings, ServiceKey, Settings};
use crate::db::driver::{
    CommandType, Connection, Driver, MarkerStyle, PreparedCommand, Purpose, not_open,
};
use crate::db::executor::DbService;
use crate::db::params::bind_values;
use crate::db::types::{DecodeRow, columns_from, columns_of};
use crate::error::{DbError, DbResult};
use crate::models::{DataSet, DatabaseType, Parameter, Table, masked_connection_string};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Either};
use std::str::FromStr;
use std::sync::Arc;
use tokio::runtime::{Builder as RuntimeBuilder, Runtime};
use tracing::debug;

/// Driver for the backends sqlx speaks natively.
#[derive(Clone)]
pub struct SqlxDriver {
    db_type: DatabaseType,
    runtime: Arc<DriverRuntime>,
}

/// Runtime shared by a driver and its connections.
struct DriverRuntime(Option<Runtime>);

impl DriverRuntime {
    fn get(&self) -> DbResult<&Runtime> {
        self.0
            .as_ref()
            .ok_or_else(|| DbError::internal("driver runtime has shut down"))
    }
}

impl Drop for DriverRuntime {
    fn drop(&mut self) {
        // A plain drop blocks, which panics inside an async context
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

impl SqlxDriver {
    pub fn new(db_type: DatabaseType) -> DbResult<Self> {
        let runtime = RuntimeBuilder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DbError::internal(format!("failed to build driver runtime: {e}")))?;
        Ok(Self {
            db_type,
            runtime: Arc::new(DriverRuntime(Some(runtime))),
        })
    }

    /// Pick the backend from the connection string's scheme.
    pub fn from_connection_string(connection_string: &str) -> DbResult<Self> {
        let db_type = DatabaseType::from_connection_string(connection_string).ok_or_else(|| {
            DbError::configuration(
                "ConnectionString",
                format!(
                    "unsupported scheme in '{}'; expected mysql://, postgres:// or sqlite:",
                    masked_connection_string(connection_string)
                ),
            )
        })?;
        Self::new(db_type)
    }

    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }
}

impl std::fmt::Debug for SqlxDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlxDriver")
            .field("db_type", &self.db_type)
            .finish()
    }
}

impl Driver for SqlxDriver {
    type Connection = SqlxConnection;

    fn name(&self) -> &'static str {
        match self.db_type {
            DatabaseType::MySQL => "mysql",
            DatabaseType::PostgreSQL => "postgres",
            DatabaseType::SQLite => "sqlite",
        }
    }

    fn marker_style(&self) -> MarkerStyle {
        match self.db_type {
            DatabaseType::PostgreSQL => MarkerStyle::Numbered,
            DatabaseType::MySQL | DatabaseType::SQLite => MarkerStyle::Positional,
        }
    }

    fn connection(&self, connection_string: &str) -> DbResult<SqlxConnection> {
        if let Some(found) = DatabaseType::from_connection_string(connection_string) {
            if found != self.db_type {
                return Err(DbError::configuration(
                    "ConnectionString",
                    format!("{found} connection string given to the {} driver", self.db_type),
                ));
            }
        }
        let options = match self.db_type {
            DatabaseType::MySQL => {
                ConnectOptionsKind::MySql(MySqlConnectOptions::from_str(connection_string)?)
            }
            DatabaseType::PostgreSQL => {
                ConnectOptionsKind::Postgres(PgConnectOptions::from_str(connection_string)?)
            }
            DatabaseType::SQLite => {
                ConnectOptionsKind::SQLite(SqliteConnectOptions::from_str(connection_string)?)
            }
        };
        Ok(SqlxConnection {
            driver: self.name(),
            options,
            conn: None,
            runtime: Arc::clone(&self.runtime),
        })
    }

    fn procedure_text(
        &self,
        name: &str,
        params: &[Parameter],
        purpose: Purpose,
    ) -> DbResult<String> {
        let markers = self.marker_style().markers(params);
        match (self.db_type, purpose) {
            (DatabaseType::SQLite, _) => Err(DbError::unsupported(format!(
                "SQLite has no stored procedures (cannot call '{name}')"
            ))),
            // Set-returning functions are selected from; CALL returns no rows
            (DatabaseType::PostgreSQL, Purpose::Query) => {
                Ok(format!("SELECT * FROM {name}({markers})"))
            }
            _ => Ok(format!("CALL {name}({markers})")),
        }
    }
}

enum ConnectOptionsKind {
    MySql(MySqlConnectOptions),
    Postgres(PgConnectOptions),
    SQLite(SqliteConnectOptions),
}

/// Database-specific live connection.
enum DbConnection {
    MySql(MySqlConnection),
    Postgres(PgConnection),
    SQLite(SqliteConnection),
}

/// A single sqlx connection, opened and closed per call.
pub struct SqlxConnection {
    driver: &'static str,
    options: ConnectOptionsKind,
    conn: Option<DbConnection>,
    runtime: Arc<DriverRuntime>,
}

impl Connection for SqlxConnection {
    fn open(&mut self) -> DbResult<()> {
        if self.conn.is_some() {
            return Err(DbError::command_state(format!(
                "{} connection is already open",
                self.driver
            )));
        }
        let conn = self
            .runtime
            .get()?
            .block_on(async {
                Ok::<_, sqlx::Error>(match &self.options {
                    ConnectOptionsKind::MySql(o) => DbConnection::MySql(o.connect().await?),
                    ConnectOptionsKind::Postgres(o) => DbConnection::Postgres(o.connect().await?),
                    ConnectOptionsKind::SQLite(o) => DbConnection::SQLite(o.connect().await?),
                })
            })
            .map_err(|e| {
                DbError::connection_with_source(
                    format!("failed to open {} connection: {e}", self.driver),
                    e,
                )
            })?;
        debug!(driver = self.driver, "Opened database connection");
        self.conn = Some(conn);
        Ok(())
    }

    fn close(&mut self) -> DbResult<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        let result = self.runtime.get()?.block_on(async {
            match conn {
                DbConnection::MySql(c) => sqlx::Connection::close(c).await,
                DbConnection::Postgres(c) => sqlx::Connection::close(c).await,
                DbConnection::SQLite(c) => sqlx::Connection::close(c).await,
            }
        });
        debug!(driver = self.driver, ok = result.is_ok(), "Closed database connection");
        result.map_err(|e| {
            DbError::connection_with_source(
                format!("failed to close {} connection: {e}", self.driver),
                e,
            )
        })
    }

    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn execute(&mut self, command: &PreparedCommand) -> DbResult<u64> {
        let runtime = self.runtime.get()?;
        match self.conn.as_mut() {
            Some(DbConnection::MySql(c)) => runtime.block_on(mysql::execute(c, command)),
            Some(DbConnection::Postgres(c)) => runtime.block_on(postgres::execute(c, command)),
            Some(DbConnection::SQLite(c)) => runtime.block_on(sqlite::execute(c, command)),
            None => Err(not_open(self.driver)),
        }
    }

    fn fetch(&mut self, command: &PreparedCommand) -> DbResult<DataSet> {
        let runtime = self.runtime.get()?;
        match self.conn.as_mut() {
            Some(DbConnection::MySql(c)) => runtime.block_on(mysql::fetch(c, command)),
            Some(DbConnection::Postgres(c)) => runtime.block_on(postgres::fetch(c, command)),
            Some(DbConnection::SQLite(c)) => runtime.block_on(sqlite::fetch(c, command)),
            None => Err(not_open(self.driver)),
        }
    }
}

impl DbService<SqlxDriver> {
    /// Service over the sqlx driver matching the primary connection string.
    pub fn for_connection(settings: ConnectionSettings) -> DbResult<Self> {
        let driver = SqlxDriver::from_connection_string(&settings.primary)?;
        Ok(Self::new(driver, settings))
    }

    /// Service for a configured `<namespace>:DataBase:<Backend>:<Service>` entry.
    pub fn for_service(settings: &Settings, key: &ServiceKey) -> DbResult<Self> {
        Self::for_connection(ConnectionSettings::resolve(settings, key)?)
    }
}

// =============================================================================
// Common Helper Functions
// =============================================================================

/// Collect every result set of a command. Each query result closes one table,
/// so a statement that returns no rows still yields an (empty) table.
async fn collect_data_set<Q, R>(
    mut stream: BoxStream<'_, Result<Either<Q, R>, sqlx::Error>>,
    command_type: CommandType,
) -> DbResult<DataSet>
where
    R: DecodeRow,
{
    let mut set = DataSet::new();
    let mut current: Option<Table> = None;

    while let Some(item) = stream.next().await {
        match item? {
            Either::Left(_) => {
                set.push(current.take().unwrap_or_else(|| Table::new("", Vec::new())));
            }
            Either::Right(row) => {
                let table = current.get_or_insert_with(|| Table::new("", columns_of(&row)));
                table.push_row(row.decode_values()?);
            }
        }
    }
    if let Some(table) = current {
        set.push(table);
    }

    // MySQL ends every CALL with a bare status result
    if command_type == CommandType::StoredProcedure
        && set.len() > 1
        && set.tables.last().is_some_and(|t| t.columns.is_empty() && t.is_empty())
    {
        set.tables.pop();
    }

    debug!(tables = set.len(), "Fetched result sets");
    Ok(set)
}

/// Rows carry the only column metadata, so a lone empty result set from a
/// statement is described separately to keep its shape.
async fn shape_empty_result<'c, E>(set: &mut DataSet, executor: E, command: &PreparedCommand)
where
    E: sqlx::Executor<'c>,
{
    let shapeless = command.command_type == CommandType::Text
        && set.len() == 1
        && set.tables[0].columns.is_empty();
    if !shapeless {
        return;
    }
    match executor.describe(&command.text).await {
        Ok(described) => set.tables[0].columns = columns_from(described.columns()),
        Err(e) => debug!(error = %e, "Could not describe empty result set"),
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.
// The code structure is intentionally parallel to make differences obvious.

mod mysql {
    use super::*;
    use crate::db::params::bind_mysql;
    use sqlx::Executor;

    pub async fn execute(conn: &mut MySqlConnection, command: &PreparedCommand) -> DbResult<u64> {
        // When params is empty, execute raw SQL directly to avoid prepared statement issues
        // (some SQL like CREATE PROCEDURE doesn't support prepared statements)
        if command.params.is_empty() {
            let result = (&mut *conn).execute(command.text.as_str()).await?;
            return Ok(result.rows_affected());
        }
        let mut query = sqlx::query(&command.text);
        for value in bind_values(&command.params)? {
            query = bind_mysql(query, value);
        }
        Ok((&mut *conn).execute(query).await?.rows_affected())
    }

    pub async fn fetch(conn: &mut MySqlConnection, command: &PreparedCommand) -> DbResult<DataSet> {
        if command.params.is_empty() {
            let stream = (&mut *conn).fetch_many(command.text.as_str());
            let mut set = collect_data_set(stream, command.command_type).await?;
            shape_empty_result(&mut set, &mut *conn, command).await;
            return Ok(set);
        }
        let mut query = sqlx::query(&command.text);
        for value in bind_values(&command.params)? {
            query = bind_mysql(query, value);
        }
        let stream = (&mut *conn).fetch_many(query);
        let mut set = collect_data_set(stream, command.command_type).await?;
        shape_empty_result(&mut set, &mut *conn, command).await;
        Ok(set)
    }
}

mod postgres {
    use super::*;
    use crate::db::params::bind_postgres;
    use sqlx::Executor;

    pub async fn execute(conn: &mut PgConnection, command: &PreparedCommand) -> DbResult<u64> {
        if command.params.is_empty() {
            let result = (&mut *conn).execute(command.text.as_str()).await?;
            return Ok(result.rows_affected());
        }
        let mut query = sqlx::query(&command.text);
        for value in bind_values(&command.params)? {
            query = bind_postgres(query, value);
        }
        Ok((&mut *conn).execute(query).await?.rows_affected())
    }

    pub async fn fetch(conn: &mut PgConnection, command: &PreparedCommand) -> DbResult<DataSet> {
        if command.params.is_empty() {
            let stream = (&mut *conn).fetch_many(command.text.as_str());
            let mut set = collect_data_set(stream, command.command_type).await?;
            shape_empty_result(&mut set, &mut *conn, command).await;
            return Ok(set);
        }
        let mut query = sqlx::query(&command.text);
        for value in bind_values(&command.params)? {
            query = bind_postgres(query, value);
        }
        let stream = (&mut *conn).fetch_many(query);
        let mut set = collect_data_set(stream, command.command_type).await?;
        shape_empty_result(&mut set, &mut *conn, command).await;
        Ok(set)
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite;
    use sqlx::Executor;

    pub async fn execute(conn: &mut SqliteConnection, command: &PreparedCommand) -> DbResult<u64> {
        if command.params.is_empty() {
            let result = (&mut *conn).execute(command.text.as_str()).await?;
            return Ok(result.rows_affected());
        }
        let mut query = sqlx::query(&command.text);
        for value in bind_values(&command.params)? {
            query = bind_sqlite(query, value);
        }
        Ok((&mut *conn).execute(query).await?.rows_affected())
    }

    pub async fn fetch(
        conn: &mut SqliteConnection,
        command: &PreparedCommand,
    ) -> DbResult<DataSet> {
        if command.params.is_empty() {
            let stream = (&mut *conn).fetch_many(command.text.as_str());
            let mut set = collect_data_set(stream, command.command_type).await?;
            shape_empty_result(&mut set, &mut *conn, command).await;
            return Ok(set);
        }
        let mut query = sqlx::query(&command.text);
        for value in bind_values(&command.params)? {
            query = bind_sqlite(query, value);
        }
        let stream = (&mut *conn).fetch_many(query);
        let mut set = collect_data_set(stream, command.command_type).await?;
        shape_empty_result(&mut set, &mut *conn, command).await;
        Ok(set)
    }
}
