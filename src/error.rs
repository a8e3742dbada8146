//! Error types for the data-access engine.
//!
//! This module defines all error types using `thiserror`. The engine performs no
//! local recovery: every variant is surfaced to the immediate caller, and driver
//! errors keep the original error as their `source`.

use thiserror::Error;

/// Boxed driver error kept as the diagnostic source of a failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {message} (key: {key})")]
    Configuration { key: String, message: String },

    #[error("Command state error: {message}")]
    CommandState { message: String },

    #[error("Connection failed: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Execution failed: {message}")]
    Execution {
        message: String,
        /// e.g., "23000" for an integrity constraint violation
        sql_state: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Mapping error: field '{field}' from column '{column}': {message}")]
    Mapping {
        field: String,
        column: String,
        message: String,
    },

    #[error("Invalid identifier '{identifier}': {reason}")]
    InvalidIdentifier { identifier: String, reason: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration error for the given key.
    pub fn configuration(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a command state error.
    pub fn command_state(message: impl Into<String>) -> Self {
        Self::CommandState {
            message: message.into(),
        }
    }

    /// Create a connection error without an underlying source.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error wrapping the driver error.
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create an execution error with optional SQL state.
    pub fn execution(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Execution {
            message: message.into(),
            sql_state,
            source: None,
        }
    }

    /// Create a mapping error for a field/column pair.
    pub fn mapping(
        field: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Mapping {
            field: field.into(),
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create an invalid identifier error.
    pub fn invalid_identifier(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// SQL state reported by the driver, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Execution { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// Whether the calling layer may reasonably retry. The engine itself never does.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// Convert sqlx errors to DbError, keeping the driver error as the source.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => {
                DbError::configuration("ConnectionString", msg.to_string())
            }
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => {
                DbError::Connection {
                    message: err.to_string(),
                    source: Some(Box::new(err)),
                }
            }
            sqlx::Error::Database(ref db_err) => {
                let message = db_err.message().to_string();
                let sql_state = db_err.code().map(|c| c.to_string());
                DbError::Execution {
                    message,
                    sql_state,
                    source: Some(Box::new(err)),
                }
            }
            _ => DbError::Execution {
                message: err.to_string(),
                sql_state: None,
                source: Some(Box::new(err)),
            },
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = DbError::configuration("App:DataBase:MySql:Users:ConnectionString", "missing");
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("App:DataBase:MySql:Users"));
    }

    #[test]
    fn test_sql_state() {
        let err = DbError::execution("duplicate key", Some("23000".to_string()));
        assert_eq!(err.sql_state(), Some("23000"));
        assert_eq!(DbError::internal("x").sql_state(), None);
    }

    #[test]
    fn test_transient() {
        assert!(DbError::connection("refused").is_transient());
        assert!(!DbError::command_state("no command").is_transient());
    }

    #[test]
    fn test_sqlx_error_keeps_source() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        match &err {
            DbError::Execution { sql_state, .. } => assert!(sql_state.is_none()),
            other => panic!("unexpected variant: {other:?}"),
        }
        let source = err.source().expect("source should be kept");
        assert!(source.downcast_ref::<sqlx::Error>().is_some());
    }

    #[test]
    fn test_sqlx_io_error_is_connection() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: DbError = sqlx::Error::Io(io).into();
        assert!(matches!(err, DbError::Connection { .. }));
    }
}
