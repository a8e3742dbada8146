//! Connection-related data models.

use serde::{Deserialize, Serialize};
use url::Url;

/// Database backends served by the bundled sqlx driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Backend segment used in configuration keys
    /// (`<namespace>:DataBase:<Backend>:<Service>:ConnectionString`).
    pub fn config_key(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSql",
            Self::MySQL => "MySql",
            Self::SQLite => "Sqlite",
        }
    }

    /// Parse a backend name as written in configuration keys or on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Some(Self::PostgreSQL),
            "mysql" | "mariadb" => Some(Self::MySQL),
            "sqlite" => Some(Self::SQLite),
            _ => None,
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Display-safe version of a connection string (password masked).
pub fn masked_connection_string(connection_string: &str) -> String {
    match Url::parse(connection_string) {
        Ok(mut url) if url.password().is_some() => {
            if url.set_password(Some("****")).is_err() {
                return "****".to_string();
            }
            url.to_string()
        }
        Ok(url) => url.to_string(),
        // Not a URL (e.g. ADO-style key/value pairs): show nothing sensitive
        Err(_) => match connection_string.split_once(';') {
            Some((first, _)) => format!("{first};****"),
            None => connection_string.to_string(),
        },
    }
}
