//! Connection management.
//!
//! `ConnectionManager` owns the primary and optional mirror handles of one
//! service. Handles are built lazily and kept across calls, but a handle is
//! only ever open inside a `ConnectionGuard`.

use crate::config::ConnectionSettings;
use crate::db::driver::{Connection, Driver, Purpose};
use crate::error::{DbError, DbResult};
use std::ops::{Deref, DerefMut};
use tracing::{debug, warn};

pub struct ConnectionManager<D: Driver> {
    driver: D,
    settings: ConnectionSettings,
    primary: Option<D::Connection>,
    mirror: Option<D::Connection>,
}

impl<D: Driver> ConnectionManager<D> {
    pub fn new(driver: D, settings: ConnectionSettings) -> Self {
        Self {
            driver,
            settings,
            primary: None,
            mirror: None,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn has_mirror(&self) -> bool {
        self.settings.mirror.is_some()
    }

    /// Handle for `purpose`: queries go to the mirror when one is configured,
    /// everything else to the primary.
    pub fn connection(&mut self, purpose: Purpose) -> DbResult<&mut D::Connection> {
        let use_mirror = purpose == Purpose::Query && self.settings.mirror.is_some();
        let (slot, connection_string, role) = if use_mirror {
            (
                &mut self.mirror,
                self.settings.mirror.as_deref().unwrap_or_default(),
                "mirror",
            )
        } else {
            (&mut self.primary, self.settings.primary.as_str(), "primary")
        };

        if slot.is_none() {
            debug!(driver = self.driver.name(), role, "Creating connection handle");
            *slot = Some(self.driver.connection(connection_string)?);
        }
        slot.as_mut()
            .ok_or_else(|| DbError::internal(format!("{role} connection handle missing")))
    }

    /// Whether any handle is currently open.
    pub fn is_open(&self) -> bool {
        self.primary.as_ref().is_some_and(Connection::is_open)
            || self.mirror.as_ref().is_some_and(Connection::is_open)
    }
}

impl<D: Driver + std::fmt::Debug> std::fmt::Debug for ConnectionManager<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("driver", &self.driver)
            .field("settings", &self.settings)
            .field("primary_created", &self.primary.is_some())
            .field("mirror_created", &self.mirror.is_some())
            .finish()
    }
}

/// RAII guard for one open connection.
///
/// Call [`ConnectionGuard::close`] on the success path to surface close errors.
/// A guard dropped while still open force-closes the connection and logs.
pub struct ConnectionGuard<'a, C: Connection> {
    conn: &'a mut C,
    released: bool,
}

impl<'a, C: Connection> ConnectionGuard<'a, C> {
    /// Open `conn` and guard it.
    pub fn open(conn: &'a mut C) -> DbResult<Self> {
        if let Err(err) = conn.open() {
            // A driver may report open after a partial failure
            if conn.is_open() {
                if let Err(close_err) = conn.close() {
                    warn!(error = %close_err, "Failed to close connection after open error");
                }
            }
            return Err(err);
        }
        debug!("Connection opened");
        Ok(Self {
            conn,
            released: false,
        })
    }

    /// Close the connection, returning any close error.
    pub fn close(mut self) -> DbResult<()> {
        self.released = true;
        let result = self.conn.close();
        debug!(ok = result.is_ok(), "Connection closed");
        result
    }
}

impl<C: Connection> Deref for ConnectionGuard<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.conn
    }
}

impl<C: Connection> DerefMut for ConnectionGuard<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn
    }
}

impl<C: Connection> Drop for ConnectionGuard<'_, C> {
    fn drop(&mut self) {
        if self.released || !self.conn.is_open() {
            return;
        }
        warn!("ConnectionGuard dropped while open; forcing close");
        if let Err(err) = self.conn.close() {
            warn!(error = %err, "Forced connection close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::driver::{MarkerStyle, PreparedCommand};
    use crate::models::DataSet;

    #[derive(Debug, Default)]
    struct StubConnection {
        target: String,
        open: bool,
        fail_open: bool,
        fail_close: bool,
        closes: usize,
    }

    impl Connection for StubConnection {
        fn open(&mut self) -> DbResult<()> {
            if self.fail_open {
                self.open = true;
                return Err(DbError::connection("refused"));
            }
            self.open = true;
            Ok(())
        }

        fn close(&mut self) -> DbResult<()> {
            self.closes += 1;
            self.open = false;
            if self.fail_close {
                return Err(DbError::connection("close failed"));
            }
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn execute(&mut self, _: &PreparedCommand) -> DbResult<u64> {
            Ok(0)
        }

        fn fetch(&mut self, _: &PreparedCommand) -> DbResult<DataSet> {
            Ok(DataSet::new())
        }
    }

    #[derive(Debug)]
    struct StubDriver;

    impl Driver for StubDriver {
        type Connection = StubConnection;

        fn name(&self) -> &'static str {
            "stub"
        }

        fn marker_style(&self) -> MarkerStyle {
            MarkerStyle::Positional
        }

        fn connection(&self, connection_string: &str) -> DbResult<StubConnection> {
            Ok(StubConnection {
                target: connection_string.to_string(),
                ..Default::default()
            })
        }
    }

    #[test]
    fn test_routes_queries_to_mirror() {
        let settings = ConnectionSettings::new("primary").with_mirror("mirror");
        let mut manager = ConnectionManager::new(StubDriver, settings);
        assert_eq!(manager.connection(Purpose::Query).unwrap().target, "mirror");
        assert_eq!(manager.connection(Purpose::Execute).unwrap().target, "primary");
    }

    #[test]
    fn test_without_mirror_everything_uses_primary() {
        let mut manager = ConnectionManager::new(StubDriver, ConnectionSettings::new("primary"));
        assert_eq!(manager.connection(Purpose::Query).unwrap().target, "primary");
        assert!(!manager.is_open());
    }

    #[test]
    fn test_guard_close_and_drop() {
        let mut conn = StubConnection::default();
        let guard = ConnectionGuard::open(&mut conn).unwrap();
        guard.close().unwrap();
        assert!(!conn.is_open());
        assert_eq!(conn.closes, 1);

        {
            let _guard = ConnectionGuard::open(&mut conn).unwrap();
        }
        assert!(!conn.is_open());
        assert_eq!(conn.closes, 2);
    }

    #[test]
    fn test_guard_surfaces_close_error() {
        let mut conn = StubConnection {
            fail_close: true,
            ..Default::default()
        };
        let guard = ConnectionGuard::open(&mut conn).unwrap();
        assert!(guard.close().is_err());
    }

    #[test]
    fn test_failed_open_leaves_connection_closed() {
        let mut conn = StubConnection {
            fail_open: true,
            ..Default::default()
        };
        assert!(ConnectionGuard::open(&mut conn).is_err());
        assert!(!conn.is_open());
    }
}
