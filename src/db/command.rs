//! Command construction.
//!
//! A `Command` is the pending unit of work on a service: a stored procedure
//! invocation or statement text plus its ordered parameters. DML commands are
//! generated from a model's field descriptors. Values are always bound as
//! parameters; only table and column identifiers reach the statement text, and
//! each of them passes [`validate_identifier`] first.

use crate::db::driver::{CommandType, Driver, MarkerStyle, PreparedCommand, Purpose};
use crate::error::{DbError, DbResult};
use crate::models::{Model, Parameter, Value};

/// Default key column used by `update` and `delete`.
pub const DEFAULT_KEY_COLUMN: &str = "ID";

/// Name of the WHERE-clause parameter in generated UPDATE/DELETE statements.
pub const KEY_PARAMETER: &str = "__key";

/// Maximum length of one identifier part.
const MAX_IDENTIFIER_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    StoredProcedure(String),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    kind: CommandKind,
    params: Vec<Parameter>,
}

impl Command {
    /// Invoke a stored procedure. The name is validated as an identifier.
    pub fn stored_procedure(name: impl Into<String>) -> DbResult<Self> {
        let name = name.into();
        validate_identifier(&name)?;
        Ok(Self {
            kind: CommandKind::StoredProcedure(name),
            params: Vec::new(),
        })
    }

    /// Run caller-written statement text. Parameters bind positionally.
    pub fn text(sql: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::Text(sql.into()),
            params: Vec::new(),
        }
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn push_param(&mut self, param: Parameter) {
        self.params.push(param);
    }

    /// Bind one parameter per model field, in declaration order.
    pub fn push_model_params<M: Model>(&mut self, model: &M) {
        for field in M::fields() {
            self.params
                .push(Parameter::new(field.column, (field.get)(model)));
        }
    }

    /// Render the command in the driver's dialect.
    pub fn prepare<D: Driver + ?Sized>(
        &self,
        driver: &D,
        purpose: Purpose,
    ) -> DbResult<PreparedCommand> {
        let (text, command_type) = match &self.kind {
            CommandKind::StoredProcedure(name) => (
                driver.procedure_text(name, &self.params, purpose)?,
                CommandType::StoredProcedure,
            ),
            CommandKind::Text(sql) => (sql.clone(), CommandType::Text),
        };
        Ok(PreparedCommand {
            text,
            command_type,
            params: self.params.clone(),
        })
    }

    /// Short description for logs; never includes parameter values.
    pub fn describe(&self) -> &str {
        match &self.kind {
            CommandKind::StoredProcedure(name) => name,
            CommandKind::Text(sql) => sql,
        }
    }
}

/// Generates DML text for a backend's marker style.
#[derive(Debug, Clone, Copy)]
pub struct CommandBuilder {
    style: MarkerStyle,
}

impl CommandBuilder {
    pub fn new(style: MarkerStyle) -> Self {
        Self { style }
    }

    /// `INSERT INTO <table> (<columns>) VALUES (<markers>)`
    pub fn insert<M: Model>(&self, table: &str, model: &M) -> DbResult<Command> {
        validate_identifier(table)?;
        let fields = M::fields();
        let mut params = Vec::with_capacity(fields.len());
        let mut columns = Vec::with_capacity(fields.len());
        for field in fields {
            validate_identifier(field.column)?;
            columns.push(field.column);
            params.push(Parameter::new(field.column, (field.get)(model)));
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            self.style.markers(&params)
        );
        Ok(Command {
            kind: CommandKind::Text(sql),
            params,
        })
    }

    /// `UPDATE <table> SET <col>=<marker>, ... WHERE <key>=<marker>`
    pub fn update<M: Model>(
        &self,
        table: &str,
        key_column: &str,
        id: impl Into<Value>,
        model: &M,
    ) -> DbResult<Command> {
        validate_identifier(table)?;
        validate_identifier(key_column)?;
        let fields = M::fields();
        let mut params = Vec::with_capacity(fields.len() + 1);
        let mut assignments = Vec::with_capacity(fields.len());
        for (idx, field) in fields.iter().enumerate() {
            validate_identifier(field.column)?;
            assignments.push(format!(
                "{}={}",
                field.column,
                self.style.marker(field.column, idx)
            ));
            params.push(Parameter::new(field.column, (field.get)(model)));
        }
        let key_marker = self.style.marker(KEY_PARAMETER, params.len());
        params.push(Parameter::new(KEY_PARAMETER, id));
        let sql = format!(
            "UPDATE {} SET {} WHERE {}={}",
            table,
            assignments.join(", "),
            key_column,
            key_marker
        );
        Ok(Command {
            kind: CommandKind::Text(sql),
            params,
        })
    }

    /// `DELETE FROM <table> WHERE <key>=<marker>`
    pub fn delete(&self, table: &str, key_column: &str, id: impl Into<Value>) -> DbResult<Command> {
        validate_identifier(table)?;
        validate_identifier(key_column)?;
        let sql = format!(
            "DELETE FROM {} WHERE {}={}",
            table,
            key_column,
            self.style.marker(KEY_PARAMETER, 0)
        );
        Ok(Command {
            kind: CommandKind::Text(sql),
            params: vec![Parameter::new(KEY_PARAMETER, id)],
        })
    }
}

/// Accept only plain identifiers, optionally schema-qualified:
/// `[A-Za-z_][A-Za-z0-9_$#]*` per dot-separated part.
pub fn validate_identifier(identifier: &str) -> DbResult<()> {
    if identifier.is_empty() {
        return Err(DbError::invalid_identifier(identifier, "identifier is empty"));
    }
    for part in identifier.split('.') {
        let mut chars = part.chars();
        match chars.next() {
            None => {
                return Err(DbError::invalid_identifier(
                    identifier,
                    "empty qualified name part",
                ));
            }
            Some(c) if !(c.is_ascii_alphabetic() || c == '_') => {
                return Err(DbError::invalid_identifier(
                    identifier,
                    format!("'{c}' cannot start an identifier"),
                ));
            }
            Some(_) => {}
        }
        if let Some(c) = chars.find(|c| !(c.is_ascii_alphanumeric() || matches!(*c, '_' | '$' | '#'))) {
            return Err(DbError::invalid_identifier(
                identifier,
                format!("character '{c}' is not allowed"),
            ));
        }
        if part.len() > MAX_IDENTIFIER_LEN {
            return Err(DbError::invalid_identifier(
                identifier,
                format!("part exceeds {MAX_IDENTIFIER_LEN} characters"),
            ));
        }
    }
    Ok(())
}
