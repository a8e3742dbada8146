//! In-memory result sets.
//!
//! A `Table` is an ordered list of columns plus ordered rows of values; a
//! `DataSet` is an ordered list of tables, addressable by position or name.

use crate::models::value::Value;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::sync::Arc;

/// Name given to the first unnamed table of a data set.
pub const DEFAULT_TABLE_NAME: &str = "Table";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    /// Database-specific type (e.g., "BIGINT", "varchar", "TEXT")
    pub type_name: String,
}

impl Column {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// A single tabular result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table with the given columns.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row. The row must have one value per column.
    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the first column with this exact name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Value of the named column in a row (first matching column wins).
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Rows as key/value records sharing this table's column list.
    pub fn records(&self) -> Vec<Record> {
        let columns: Arc<[String]> = self.column_names().into();
        self.rows
            .iter()
            .map(|row| Record {
                columns: Arc::clone(&columns),
                values: row.clone(),
            })
            .collect()
    }
}

/// An ordered collection of tables produced by one command.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataSet {
    pub tables: Vec<Table>,
}

impl DataSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a table; an empty name is replaced by its positional name.
    pub fn push(&mut self, mut table: Table) {
        if table.name.is_empty() {
            table.name = positional_table_name(self.tables.len());
        }
        self.tables.push(table);
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Table> {
        self.tables.get(index)
    }

    /// First table with this exact name.
    pub fn by_name(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Rename tables positionally, like a table mapping on a data adapter.
    pub fn name_tables<S: AsRef<str>>(&mut self, names: &[S]) {
        for (table, name) in self.tables.iter_mut().zip(names) {
            table.name = name.as_ref().to_string();
        }
    }

    /// Take the first table, or an empty one when the command produced none.
    pub fn into_first(self) -> Table {
        self.tables
            .into_iter()
            .next()
            .unwrap_or_else(|| Table::new(DEFAULT_TABLE_NAME, Vec::new()))
    }
}

impl IntoIterator for DataSet {
    type Item = Table;
    type IntoIter = std::vec::IntoIter<Table>;

    fn into_iter(self) -> Self::IntoIter {
        self.tables.into_iter()
    }
}

/// Default name of the table at `index`: `Table`, `Table1`, `Table2`, ...
pub fn positional_table_name(index: usize) -> String {
    if index == 0 {
        DEFAULT_TABLE_NAME.to_string()
    } else {
        format!("{DEFAULT_TABLE_NAME}{index}")
    }
}

/// One row as an ordered column → value map.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Record {
    /// Value of the first column with this exact name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| self.values.get(idx))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column/value pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}
