//! Query execution engine.
//!
//! `DbService` is the caller-facing object for one configured database service.
//! A caller binds a pending command (`set_stored_procedure` / `set_query`),
//! attaches parameters, then runs one operation. Every operation follows the
//! same lifecycle regardless of backend:
//!
//! ```text
//! Idle -> CommandBound -> ConnectionOpen -> Executing -> Closed
//! ```
//!
//! The pending command is consumed by the operation, and the connection is
//! closed before the operation returns, on success and on error alike.

use crate::config::{ConnectionSettings, ServiceKey, Settings};
use crate::db::command::{Command, CommandBuilder, DEFAULT_KEY_COLUMN, validate_identifier};
use crate::db::connection::{ConnectionGuard, ConnectionManager};
use crate::db::driver::{Connection, Driver, PreparedCommand, Purpose};
use crate::db::mapper::{self, CollisionPolicy};
use crate::error::{DbError, DbResult};
use crate::models::{DataSet, DbType, Model, Parameter, Record, Table, Value};
use tracing::debug;

/// Lifecycle position of a `DbService`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    /// Nothing bound yet
    Idle,
    CommandBound,
    ConnectionOpen,
    Executing,
    /// The last operation finished (successfully or not) and released its connection
    Closed,
}

pub struct DbService<D: Driver> {
    connections: ConnectionManager<D>,
    pending: Option<Command>,
    state: ExecState,
    key_column: String,
    collision_policy: CollisionPolicy,
}

impl<D: Driver> DbService<D> {
    /// Create a service over `driver` with already-resolved connection strings.
    pub fn new(driver: D, settings: ConnectionSettings) -> Self {
        Self {
            connections: ConnectionManager::new(driver, settings),
            pending: None,
            state: ExecState::Idle,
            key_column: DEFAULT_KEY_COLUMN.to_string(),
            collision_policy: CollisionPolicy::default(),
        }
    }

    /// Create a service, resolving its connection strings from `settings`.
    pub fn from_settings(driver: D, settings: &Settings, key: &ServiceKey) -> DbResult<Self> {
        let connection = ConnectionSettings::resolve(settings, key)?;
        debug!(
            service = %key.service,
            backend = %key.backend,
            mirror = connection.mirror.is_some(),
            "Resolved service connection"
        );
        Ok(Self::new(driver, connection))
    }

    /// Key column used by `update` and `delete` (default `ID`).
    pub fn with_key_column(mut self, column: impl Into<String>) -> DbResult<Self> {
        let column = column.into();
        validate_identifier(&column)?;
        self.key_column = column;
        Ok(self)
    }

    /// Table precedence for `multi_select_model`.
    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn collision_policy(&self) -> CollisionPolicy {
        self.collision_policy
    }

    pub fn connections(&self) -> &ConnectionManager<D> {
        &self.connections
    }

    /// The command bound for the next operation, if any.
    pub fn pending(&self) -> Option<&Command> {
        self.pending.as_ref()
    }

    /// Whether any connection is currently open. Always false between calls.
    pub fn is_open(&self) -> bool {
        self.connections.is_open()
    }

    // =========================================================================
    // Command binding
    // =========================================================================

    /// Bind a stored procedure call, replacing any pending command.
    pub fn set_stored_procedure(&mut self, name: impl Into<String>) -> DbResult<()> {
        let command = Command::stored_procedure(name)?;
        debug!(procedure = command.describe(), "Bound stored procedure");
        self.bind(command);
        Ok(())
    }

    /// Bind statement text, replacing any pending command.
    pub fn set_query(&mut self, sql: impl Into<String>) {
        let command = Command::text(sql);
        debug!(sql = command.describe(), "Bound statement");
        self.bind(command);
    }

    /// Attach a parameter whose type is inferred from its value.
    pub fn add_parameter(&mut self, name: impl AsRef<str>, value: impl Into<Value>) -> DbResult<()> {
        self.pending_mut()?.push_param(Parameter::new(name, value));
        Ok(())
    }

    /// Attach a parameter with an explicit backend type.
    pub fn add_typed_parameter(
        &mut self,
        name: impl AsRef<str>,
        value: impl Into<Value>,
        db_type: DbType,
    ) -> DbResult<()> {
        self.pending_mut()?
            .push_param(Parameter::typed(name, value, db_type));
        Ok(())
    }

    /// Attach one parameter per model field, named after the field's column.
    pub fn add_parameters<M: Model>(&mut self, model: &M) -> DbResult<()> {
        self.pending_mut()?.push_model_params(model);
        Ok(())
    }

    fn bind(&mut self, command: Command) {
        self.pending = Some(command);
        self.state = ExecState::CommandBound;
    }

    fn pending_mut(&mut self) -> DbResult<&mut Command> {
        self.pending
            .as_mut()
            .ok_or_else(|| DbError::command_state("no command is bound"))
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Run the pending command on the primary; returns rows affected.
    pub fn execute(&mut self) -> DbResult<u64> {
        self.run(Purpose::Execute, |conn, command| conn.execute(command))
    }

    /// First result set of the pending command.
    pub fn select(&mut self) -> DbResult<Table> {
        self.multi_select().map(DataSet::into_first)
    }

    /// First result set as records.
    pub fn select_list(&mut self) -> DbResult<Vec<Record>> {
        self.select().map(|table| mapper::to_records(&table))
    }

    /// First row of the first result set projected onto `T`.
    pub fn select_model<T: Model>(&mut self) -> DbResult<T> {
        let table = self.select()?;
        mapper::project_first(&table)
    }

    /// Every row of the first result set projected onto `T`.
    pub fn select_models<T: Model>(&mut self) -> DbResult<Vec<T>> {
        let table = self.select()?;
        mapper::project_all(&table)
    }

    /// Every result set of the pending command.
    pub fn multi_select(&mut self) -> DbResult<DataSet> {
        self.run(Purpose::Query, |conn, command| conn.fetch(command))
    }

    /// Every result set as records.
    pub fn multi_select_list(&mut self) -> DbResult<Vec<Vec<Record>>> {
        self.multi_select().map(|set| mapper::to_record_lists(&set))
    }

    /// First row of each named result set projected onto one `T`, using the
    /// service's collision policy.
    pub fn multi_select_model<T: Model, S: AsRef<str>>(&mut self, names: &[S]) -> DbResult<T> {
        let policy = self.collision_policy;
        self.multi_select_model_with(names, policy)
    }

    pub fn multi_select_model_with<T: Model, S: AsRef<str>>(
        &mut self,
        names: &[S],
        policy: CollisionPolicy,
    ) -> DbResult<T> {
        let set = self.multi_select()?;
        mapper::project_tables(&set, names, policy)
    }

    /// `INSERT INTO <table>` every field of `model`.
    pub fn insert<T: Model>(&mut self, table: &str, model: &T) -> DbResult<u64> {
        let command = self.builder().insert(table, model);
        self.run_generated(command)
    }

    /// `UPDATE <table>` every field of `model` where the key column equals `id`.
    pub fn update<T: Model>(
        &mut self,
        table: &str,
        id: impl Into<Value>,
        model: &T,
    ) -> DbResult<u64> {
        let command = self.builder().update(table, &self.key_column, id, model);
        self.run_generated(command)
    }

    /// `DELETE FROM <table>` where the key column equals `id`.
    pub fn delete(&mut self, table: &str, id: impl Into<Value>) -> DbResult<u64> {
        let command = self.builder().delete(table, &self.key_column, id);
        self.run_generated(command)
    }

    fn builder(&self) -> CommandBuilder {
        CommandBuilder::new(self.connections.driver().marker_style())
    }

    fn run_generated(&mut self, command: DbResult<Command>) -> DbResult<u64> {
        match command {
            Ok(command) => {
                debug!(sql = command.describe(), "Bound generated statement");
                self.bind(command);
                self.execute()
            }
            Err(err) => {
                // Rejected statements consume the pending command too
                self.pending = None;
                self.state = ExecState::Idle;
                Err(err)
            }
        }
    }

    /// Take the pending command and run `op` on an open connection chosen for
    /// `purpose`. The service ends `Closed` on every path past this point.
    fn run<R>(
        &mut self,
        purpose: Purpose,
        op: impl FnOnce(&mut D::Connection, &PreparedCommand) -> DbResult<R>,
    ) -> DbResult<R> {
        let command = self.pending.take().ok_or_else(|| {
            DbError::command_state("no command is bound; call set_stored_procedure or set_query first")
        })?;
        let result = self.run_command(&command, purpose, op);
        self.state = ExecState::Closed;
        result
    }

    fn run_command<R>(
        &mut self,
        command: &Command,
        purpose: Purpose,
        op: impl FnOnce(&mut D::Connection, &PreparedCommand) -> DbResult<R>,
    ) -> DbResult<R> {
        let driver = self.connections.driver().name();
        let prepared = command.prepare(self.connections.driver(), purpose)?;
        debug!(
            driver,
            ?purpose,
            sql = %prepared.text,
            params = prepared.params.len(),
            "Executing command"
        );

        let conn = self.connections.connection(purpose)?;
        let mut guard = ConnectionGuard::open(conn)?;
        self.state = ExecState::ConnectionOpen;
        debug!(driver, state = ?self.state, "Connection ready");

        self.state = ExecState::Executing;
        let output = op(&mut *guard, &prepared)?;
        guard.close()?;
        Ok(output)
    }
}

impl<D: Driver + std::fmt::Debug> std::fmt::Debug for DbService<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbService")
            .field("connections", &self.connections)
            .field("state", &self.state)
            .field("pending", &self.pending.as_ref().map(Command::describe))
            .field("key_column", &self.key_column)
            .field("collision_policy", &self.collision_policy)
            .finish()
    }
}
