//! Async access to a blocking `DbService`.
//!
//! `SharedService` serializes callers behind a mutex and runs each unit of
//! work on tokio's blocking pool, so async code never blocks its executor.

use crate::db::driver::Driver;
use crate::db::executor::DbService;
use crate::error::{DbError, DbResult};
use crate::models::{DataSet, Model, Record, Table, Value};
use std::sync::{Arc, Mutex};

pub struct SharedService<D: Driver> {
    inner: Arc<Mutex<DbService<D>>>,
}

impl<D: Driver> Clone for SharedService<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D> SharedService<D>
where
    D: Driver + Send + 'static,
    D::Connection: Send,
{
    pub fn new(service: DbService<D>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(service)),
        }
    }

    /// Run `f` with exclusive access to the service on the blocking pool.
    ///
    /// Binding and running happen under one lock, so concurrent callers cannot
    /// interleave their pending commands.
    pub async fn run<R, F>(&self, f: F) -> DbResult<R>
    where
        F: FnOnce(&mut DbService<D>) -> DbResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut service = inner
                .lock()
                .map_err(|_| DbError::internal("database service lock poisoned"))?;
            f(&mut *service)
        })
        .await
        .map_err(|e| DbError::internal(format!("blocking task failed: {e}")))?
    }

    /// Bind `sql` with positional parameters and return the first result set.
    pub async fn select(
        &self,
        sql: impl Into<String>,
        params: Vec<(String, Value)>,
    ) -> DbResult<Table> {
        let sql = sql.into();
        self.run(move |service| {
            service.set_query(sql);
            for (name, value) in params {
                service.add_parameter(name, value)?;
            }
            service.select()
        })
        .await
    }

    pub async fn select_list(
        &self,
        sql: impl Into<String>,
        params: Vec<(String, Value)>,
    ) -> DbResult<Vec<Record>> {
        let table = self.select(sql, params).await?;
        Ok(table.records())
    }

    /// Call a stored procedure and return every result set.
    pub async fn call(
        &self,
        procedure: impl Into<String>,
        params: Vec<(String, Value)>,
    ) -> DbResult<DataSet> {
        let procedure = procedure.into();
        self.run(move |service| {
            service.set_stored_procedure(procedure)?;
            for (name, value) in params {
                service.add_parameter(name, value)?;
            }
            service.multi_select()
        })
        .await
    }

    /// Bind `sql` and return rows affected.
    pub async fn execute(
        &self,
        sql: impl Into<String>,
        params: Vec<(String, Value)>,
    ) -> DbResult<u64> {
        let sql = sql.into();
        self.run(move |service| {
            service.set_query(sql);
            for (name, value) in params {
                service.add_parameter(name, value)?;
            }
            service.execute()
        })
        .await
    }

    pub async fn insert<T>(&self, table: impl Into<String>, model: T) -> DbResult<u64>
    where
        T: Model + Send,
    {
        let table = table.into();
        self.run(move |service| service.insert(&table, &model)).await
    }

    pub async fn select_model<T>(
        &self,
        sql: impl Into<String>,
        params: Vec<(String, Value)>,
    ) -> DbResult<T>
    where
        T: Model + Send,
    {
        let sql = sql.into();
        self.run(move |service| {
            service.set_query(sql);
            for (name, value) in params {
                service.add_parameter(name, value)?;
            }
            service.select_model()
        })
        .await
    }
}
