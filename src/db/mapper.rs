//! Result projection.
//!
//! Maps tabular results onto models by exact column name. Columns without a
//! matching field are dropped, fields without a matching column keep their
//! default, and a type-incompatible match is a loud `Mapping` error.

use crate::error::{DbError, DbResult};
use crate::models::{DataSet, Model, Record, Table};
use std::collections::HashMap;

/// Which table supplies a field matched by columns of several tables in a
/// multi-table projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    /// The earliest table in the requested order keeps the field
    #[default]
    FirstTableWins,
    /// Each later table overwrites earlier values
    LastTableWins,
    /// A field matched by two tables is an error
    Reject,
}

/// Project the first row of `table` onto a new `T`; zero rows yield `T::default()`.
pub fn project_first<T: Model>(table: &Table) -> DbResult<T> {
    let mut model = T::default();
    if !table.is_empty() {
        apply_row(&mut model, table, 0, |_, _| true)?;
    }
    Ok(model)
}

/// Project every row of `table`.
pub fn project_all<T: Model>(table: &Table) -> DbResult<Vec<T>> {
    (0..table.row_count())
        .map(|row| {
            let mut model = T::default();
            apply_row(&mut model, table, row, |_, _| true)?;
            Ok(model)
        })
        .collect()
}

/// Rows of `table` as records.
pub fn to_records(table: &Table) -> Vec<Record> {
    table.records()
}

/// Records of every table in the set.
pub fn to_record_lists(set: &DataSet) -> Vec<Vec<Record>> {
    set.tables.iter().map(Table::records).collect()
}

/// Project the first row of each named table onto one `T`, in the order given.
///
/// A table is located by name, falling back to the name's position in `names`.
pub fn project_tables<T: Model, S: AsRef<str>>(
    set: &DataSet,
    names: &[S],
    policy: CollisionPolicy,
) -> DbResult<T> {
    let mut model = T::default();
    // field name -> table that supplied it
    let mut claimed: HashMap<&'static str, String> = HashMap::new();

    for (position, name) in names.iter().enumerate() {
        let name = name.as_ref();
        let table = locate_table(set, name, position)?;
        if table.is_empty() {
            continue;
        }

        let mut conflict = None;
        apply_row(&mut model, table, 0, |field, column| {
            let previous = claimed.get(field).cloned();
            match previous {
                None => {
                    claimed.insert(field, name.to_string());
                    true
                }
                Some(_) if policy == CollisionPolicy::LastTableWins => {
                    claimed.insert(field, name.to_string());
                    true
                }
                Some(_) if policy == CollisionPolicy::FirstTableWins => false,
                Some(previous) => {
                    if conflict.is_none() {
                        conflict = Some(DbError::mapping(
                            field,
                            column,
                            format!("matched by both tables '{previous}' and '{name}'"),
                        ));
                    }
                    false
                }
            }
        })?;
        if let Some(err) = conflict {
            return Err(err);
        }
    }
    Ok(model)
}

fn locate_table<'a>(set: &'a DataSet, name: &str, position: usize) -> DbResult<&'a Table> {
    set.by_name(name)
        .or_else(|| set.get(position))
        .ok_or_else(|| {
            DbError::mapping(
                "*",
                "*",
                format!(
                    "table '{}' not found (result has {} table(s))",
                    name,
                    set.len()
                ),
            )
        })
}

/// Copy matching columns of one row into `model`. `accept(field, column)` decides
/// whether a matched field is written.
fn apply_row<T, F>(model: &mut T, table: &Table, row: usize, mut accept: F) -> DbResult<()>
where
    T: Model,
    F: FnMut(&'static str, &str) -> bool,
{
    let Some(values) = table.rows.get(row) else {
        return Ok(());
    };
    for field in T::fields() {
        let Some(idx) = table.column_index(field.column) else {
            continue;
        };
        if !accept(field.name, field.column) {
            continue;
        }
        let value = values.get(idx).cloned().unwrap_or_default();
        (field.set)(model, value)
            .map_err(|e| DbError::mapping(field.name, field.column, e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Column, Value};

    #[derive(Debug, Default, Clone, PartialEq)]
    struct OrderSummary {
        order_id: i64,
        customer_id: i64,
        customer_name: Option<String>,
        total: f64,
    }

    crate::impl_model!(OrderSummary {
        order_id => "OrderId",
        customer_id => "CustomerId",
        customer_name => "CustomerName",
        total => "Total",
    });

    fn table(name: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> Table {
        let mut t = Table::new(
            name,
            columns.iter().map(|c| Column::new(*c, "TEXT")).collect(),
        );
        for row in rows {
            t.push_row(row);
        }
        t
    }

    fn orders_and_customers() -> DataSet {
        let mut set = DataSet::new();
        set.push(table(
            "Orders",
            &["OrderId", "CustomerId", "Total"],
            vec![vec![Value::Int(100), Value::Int(5), Value::Float(19.5)]],
        ));
        set.push(table(
            "Customers",
            &["CustomerId", "CustomerName"],
            vec![vec![Value::Int(6), Value::Text("Bob".into())]],
        ));
        set
    }

    #[test]
    fn test_project_first_matches_by_exact_name() {
        let t = table(
            "t",
            &["OrderId", "orderid", "Unrelated"],
            vec![vec![Value::Int(1), Value::Int(2), Value::Text("x".into())]],
        );
        let summary: OrderSummary = project_first(&t).unwrap();
        assert_eq!(summary.order_id, 1);
        assert_eq!(summary.customer_name, None);
    }

    #[test]
    fn test_project_first_zero_rows_is_default() {
        let t = table("t", &["OrderId"], Vec::new());
        for _ in 0..2 {
            let summary: OrderSummary = project_first(&t).unwrap();
            assert_eq!(summary, OrderSummary::default());
        }
    }

    #[test]
    fn test_no_matching_columns_is_default() {
        let t = table("t", &["Foo"], vec![vec![Value::Int(1)]]);
        let summary: OrderSummary = project_first(&t).unwrap();
        assert_eq!(summary, OrderSummary::default());
    }

    #[test]
    fn test_null_cell_maps_to_default() {
        let t = table(
            "t",
            &["OrderId", "CustomerName"],
            vec![vec![Value::Null, Value::Null]],
        );
        let summary: OrderSummary = project_first(&t).unwrap();
        assert_eq!(summary.order_id, 0);
        assert_eq!(summary.customer_name, None);
    }

    #[test]
    fn test_type_mismatch_is_mapping_error() {
        let t = table("t", &["OrderId"], vec![vec![Value::Text("abc".into())]]);
        let err = project_first::<OrderSummary>(&t).unwrap_err();
        match err {
            DbError::Mapping { field, column, .. } => {
                assert_eq!(field, "order_id");
                assert_eq!(column, "OrderId");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_project_all() {
        let t = table(
            "t",
            &["OrderId"],
            vec![vec![Value::Int(1)], vec![Value::Int(2)]],
        );
        let all: Vec<OrderSummary> = project_all(&t).unwrap();
        assert_eq!(all.iter().map(|o| o.order_id).collect::<Vec<_>>(), [1, 2]);
    }

    #[test]
    fn test_multi_table_first_wins() {
        let set = orders_and_customers();
        let summary: OrderSummary =
            project_tables(&set, &["Orders", "Customers"], CollisionPolicy::FirstTableWins)
                .unwrap();
        assert_eq!(summary.order_id, 100);
        assert_eq!(summary.customer_id, 5);
        assert_eq!(summary.customer_name.as_deref(), Some("Bob"));
        assert_eq!(summary.total, 19.5);
    }

    #[test]
    fn test_multi_table_last_wins() {
        let set = orders_and_customers();
        let summary: OrderSummary =
            project_tables(&set, &["Orders", "Customers"], CollisionPolicy::LastTableWins)
                .unwrap();
        assert_eq!(summary.customer_id, 6);
        assert_eq!(summary.order_id, 100);
    }

    #[test]
    fn test_multi_table_reject() {
        let set = orders_and_customers();
        let err = project_tables::<OrderSummary, _>(
            &set,
            &["Orders", "Customers"],
            CollisionPolicy::Reject,
        )
        .unwrap_err();
        assert!(err.to_string().contains("CustomerId"));
    }

    #[test]
    fn test_multi_table_positional_fallback() {
        let mut set = DataSet::new();
        set.push(table("", &["OrderId"], vec![vec![Value::Int(1)]]));
        set.push(table("", &["CustomerName"], vec![vec![Value::Text("Ann".into())]]));
        let summary: OrderSummary =
            project_tables(&set, &["Orders", "Customers"], CollisionPolicy::Reject).unwrap();
        assert_eq!(summary.order_id, 1);
        assert_eq!(summary.customer_name.as_deref(), Some("Ann"));
    }

    #[test]
    fn test_multi_table_missing_table() {
        let set = orders_and_customers();
        let err = project_tables::<OrderSummary, _>(
            &set,
            &["Orders", "Customers", "Invoices"],
            CollisionPolicy::FirstTableWins,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Invoices"));
    }

    #[test]
    fn test_to_record_lists() {
        let lists = to_record_lists(&orders_and_customers());
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[1][0].get("CustomerName"), Some(&Value::Text("Bob".into())));
    }
}
