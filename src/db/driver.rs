//! Driver abstraction.
//!
//! This is the only seam between the generic engine and a concrete backend. A
//! driver renders commands in its own dialect and produces connection handles;
//! a connection opens, runs one prepared command, and closes. Everything else
//! (command building, mapping, lifecycle) is implemented once in the engine.

use crate::error::{DbError, DbResult};
use crate::models::{DataSet, Parameter};

/// How a backend spells parameter markers in statement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerStyle {
    /// `?` (MySQL, SQLite, ODBC)
    Positional,
    /// `$1`, `$2`, ... (PostgreSQL)
    Numbered,
    /// `@name` (SQL Server)
    AtNamed,
    /// `:name` (Oracle)
    ColonNamed,
}

impl MarkerStyle {
    /// Marker for the parameter `name` at zero-based `index`.
    pub fn marker(&self, name: &str, index: usize) -> String {
        match self {
            Self::Positional => "?".to_string(),
            Self::Numbered => format!("${}", index + 1),
            Self::AtNamed => format!("@{name}"),
            Self::ColonNamed => format!(":{name}"),
        }
    }

    /// Comma-separated markers for a parameter list.
    pub fn markers(&self, params: &[Parameter]) -> String {
        params
            .iter()
            .enumerate()
            .map(|(idx, p)| self.marker(p.name(), idx))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// What a command is run for; selects the connection and, for some backends,
/// the procedure call syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Select family: runs on the mirror when one is configured
    Query,
    /// Execute/Insert/Update/Delete: always runs on the primary
    Execute,
}

/// Shape of a prepared command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    Text,
    StoredProcedure,
}

/// A command rendered in the backend's dialect, ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedCommand {
    pub text: String,
    pub command_type: CommandType,
    /// Bound positionally, in this order
    pub params: Vec<Parameter>,
}

/// Backend factory and dialect.
pub trait Driver {
    type Connection: Connection;

    /// Short driver identifier for logs (e.g. "mysql").
    fn name(&self) -> &'static str;

    fn marker_style(&self) -> MarkerStyle;

    /// Construct a connection handle. Does not open it.
    fn connection(&self, connection_string: &str) -> DbResult<Self::Connection>;

    /// Statement text invoking a stored procedure.
    ///
    /// The default renders `CALL name(<markers>)`.
    fn procedure_text(
        &self,
        name: &str,
        params: &[Parameter],
        purpose: Purpose,
    ) -> DbResult<String> {
        let _ = purpose;
        Ok(format!(
            "CALL {}({})",
            name,
            self.marker_style().markers(params)
        ))
    }
}

/// A connection handle owned by the connection manager across calls.
pub trait Connection {
    fn open(&mut self) -> DbResult<()>;

    fn close(&mut self) -> DbResult<()>;

    fn is_open(&self) -> bool;

    /// Run a command that produces no result set; returns rows affected.
    fn execute(&mut self, command: &PreparedCommand) -> DbResult<u64>;

    /// Run a command and collect every result set it produces.
    fn fetch(&mut self, command: &PreparedCommand) -> DbResult<DataSet>;
}

/// Error for operations attempted on a connection that is not open.
pub fn not_open(driver: &str) -> DbError {
    DbError::command_state(format!("{driver} connection is not open"))
}
