//! Scripted in-memory driver shared by the integration tests.

#![allow(dead_code)]

use dbmap::config::ConnectionSettings;
use dbmap::db::{Connection, DbService, Driver, MarkerStyle, PreparedCommand};
use dbmap::error::{DbError, DbResult};
use dbmap::models::{Column, DataSet, Table, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// What the fixture saw and what it will answer next.
#[derive(Debug, Default)]
pub struct FixtureState {
    /// (connection string, command) per execute/fetch call
    pub commands: Vec<(String, PreparedCommand)>,
    pub opens: usize,
    pub closes: usize,
    pub open_now: usize,
    pub fail_open: bool,
    pub fail_close: bool,
    pub fetch_results: VecDeque<DbResult<DataSet>>,
    pub execute_results: VecDeque<DbResult<u64>>,
}

#[derive(Debug, Clone)]
pub struct FixtureDriver {
    pub state: Arc<Mutex<FixtureState>>,
    style: MarkerStyle,
}

impl FixtureDriver {
    pub fn new(style: MarkerStyle) -> Self {
        Self {
            state: Arc::new(Mutex::new(FixtureState::default())),
            style,
        }
    }

    pub fn push_fetch(&self, result: DbResult<DataSet>) {
        self.state.lock().unwrap().fetch_results.push_back(result);
    }

    pub fn push_execute(&self, result: DbResult<u64>) {
        self.state.lock().unwrap().execute_results.push_back(result);
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state.lock().unwrap().fail_open = fail;
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.state.lock().unwrap().fail_close = fail;
    }

    pub fn commands(&self) -> Vec<(String, PreparedCommand)> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn last_command(&self) -> (String, PreparedCommand) {
        self.commands().pop().expect("no command was run")
    }

    /// (opens, closes, currently open)
    pub fn counts(&self) -> (usize, usize, usize) {
        let state = self.state.lock().unwrap();
        (state.opens, state.closes, state.open_now)
    }
}

impl Driver for FixtureDriver {
    type Connection = FixtureConnection;

    fn name(&self) -> &'static str {
        "fixture"
    }

    fn marker_style(&self) -> MarkerStyle {
        self.style
    }

    fn connection(&self, connection_string: &str) -> DbResult<FixtureConnection> {
        Ok(FixtureConnection {
            target: connection_string.to_string(),
            open: false,
            state: Arc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
pub struct FixtureConnection {
    target: String,
    open: bool,
    state: Arc<Mutex<FixtureState>>,
}

impl Connection for FixtureConnection {
    fn open(&mut self) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_open {
            return Err(DbError::connection(format!("{} refused", self.target)));
        }
        state.opens += 1;
        state.open_now += 1;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> DbResult<()> {
        if !self.open {
            return Ok(());
        }
        let mut state = self.state.lock().unwrap();
        state.closes += 1;
        state.open_now -= 1;
        self.open = false;
        if state.fail_close {
            return Err(DbError::connection("close failed"));
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn execute(&mut self, command: &PreparedCommand) -> DbResult<u64> {
        let mut state = self.state.lock().unwrap();
        state.commands.push((self.target.clone(), command.clone()));
        state.execute_results.pop_front().unwrap_or(Ok(1))
    }

    fn fetch(&mut self, command: &PreparedCommand) -> DbResult<DataSet> {
        let mut state = self.state.lock().unwrap();
        state.commands.push((self.target.clone(), command.clone()));
        state
            .fetch_results
            .pop_front()
            .unwrap_or_else(|| Ok(DataSet::new()))
    }
}

pub fn service(style: MarkerStyle) -> (DbService<FixtureDriver>, FixtureDriver) {
    let driver = FixtureDriver::new(style);
    let service = DbService::new(driver.clone(), ConnectionSettings::new("primary"));
    (service, driver)
}

pub fn mirrored_service(style: MarkerStyle) -> (DbService<FixtureDriver>, FixtureDriver) {
    let driver = FixtureDriver::new(style);
    let settings = ConnectionSettings::new("primary").with_mirror("mirror");
    (DbService::new(driver.clone(), settings), driver)
}

pub fn table(name: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> Table {
    let mut table = Table::new(
        name,
        columns.iter().map(|c| Column::new(*c, "TEXT")).collect(),
    );
    for row in rows {
        table.push_row(row);
    }
    table
}

pub fn data_set(tables: Vec<Table>) -> DataSet {
    let mut set = DataSet::new();
    for t in tables {
        set.push(t);
    }
    set
}
