//! Pool- and transaction-backed query executors.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row as _, Transaction};
use tokio::sync::Mutex;
use tracing::debug;

use rowkit_core::{
    ColumnKind, DeleteSpec, InsertManySpec, InsertSpec, QueryExecutor, Result, Row, RowError,
    SelectSpec, TableSpec, TransactionExecutor, UpdateSpec, Value,
};

use crate::sql::{self, Bind, SqlQuery};

fn storage(err: sqlx::Error) -> RowError {
    RowError::storage(err)
}

fn apply_binds(
    mut query: Query<'_, Postgres, PgArguments>,
    binds: Vec<Bind>,
) -> Query<'_, Postgres, PgArguments> {
    for bind in binds {
        query = match (bind.kind, bind.value) {
            (_, Value::Bool(b)) => query.bind(b),
            (_, Value::BigInt(n)) => query.bind(n),
            (_, Value::Double(f)) => query.bind(f),
            (_, Value::Text(s)) => query.bind(s),
            (_, Value::Uuid(id)) => query.bind(id),
            (_, Value::Date(d)) => query.bind(d),
            (_, Value::Timestamp(ts)) => query.bind(ts),
            (_, Value::Json(json)) => query.bind(json),
            // Nulls take the declared column kind so the parameter type
            // matches the column.
            (ColumnKind::Bool, Value::Null) => query.bind(None::<bool>),
            (ColumnKind::BigInt, Value::Null) => query.bind(None::<i64>),
            (ColumnKind::Double, Value::Null) => query.bind(None::<f64>),
            (ColumnKind::Text, Value::Null) => query.bind(None::<String>),
            (ColumnKind::Uuid, Value::Null) => query.bind(None::<uuid::Uuid>),
            (ColumnKind::Date, Value::Null) => query.bind(None::<NaiveDate>),
            (ColumnKind::Timestamp, Value::Null) => query.bind(None::<DateTime<Utc>>),
            (ColumnKind::Json, Value::Null) => query.bind(None::<serde_json::Value>),
        };
    }
    query
}

fn decode_row(pg_row: &PgRow, table: &TableSpec, columns: &[&'static str]) -> Result<Row> {
    let mut row = Row::new();
    for &name in columns {
        let kind = table
            .column(name)
            .ok_or_else(|| {
                RowError::consistency(format!(
                    "column `{name}` is not declared for table `{}`",
                    table.name
                ))
            })?
            .kind;
        let value = match kind {
            ColumnKind::Bool => pg_row
                .try_get::<Option<bool>, _>(name)
                .map_err(storage)?
                .map(Value::Bool),
            ColumnKind::BigInt => pg_row
                .try_get::<Option<i64>, _>(name)
                .map_err(storage)?
                .map(Value::BigInt),
            ColumnKind::Double => pg_row
                .try_get::<Option<f64>, _>(name)
                .map_err(storage)?
                .map(Value::Double),
            ColumnKind::Text => pg_row
                .try_get::<Option<String>, _>(name)
                .map_err(storage)?
                .map(Value::Text),
            ColumnKind::Uuid => pg_row
                .try_get::<Option<uuid::Uuid>, _>(name)
                .map_err(storage)?
                .map(Value::Uuid),
            ColumnKind::Date => pg_row
                .try_get::<Option<NaiveDate>, _>(name)
                .map_err(storage)?
                .map(Value::Date),
            ColumnKind::Timestamp => pg_row
                .try_get::<Option<DateTime<Utc>>, _>(name)
                .map_err(storage)?
                .map(Value::Timestamp),
            ColumnKind::Json => pg_row
                .try_get::<Option<serde_json::Value>, _>(name)
                .map_err(storage)?
                .map(Value::Json),
        };
        row.insert(name, value.unwrap_or(Value::Null));
    }
    Ok(row)
}

async fn run_fetch_one<'c, X>(conn: X, spec: &SelectSpec) -> Result<Option<Row>>
where
    X: sqlx::Executor<'c, Database = Postgres>,
{
    let SqlQuery { sql, binds, output } = sql::select(spec)?;
    let row = apply_binds(sqlx::query(&sql), binds)
        .fetch_optional(conn)
        .await
        .map_err(storage)?;
    row.map(|r| decode_row(&r, spec.table, &output)).transpose()
}

async fn run_fetch_all<'c, X>(conn: X, spec: &SelectSpec) -> Result<Vec<Row>>
where
    X: sqlx::Executor<'c, Database = Postgres>,
{
    let SqlQuery { sql, binds, output } = sql::select(spec)?;
    let rows = apply_binds(sqlx::query(&sql), binds)
        .fetch_all(conn)
        .await
        .map_err(storage)?;
    rows.iter()
        .map(|row| decode_row(row, spec.table, &output))
        .collect()
}

async fn run_count<'c, X>(conn: X, spec: &SelectSpec) -> Result<i64>
where
    X: sqlx::Executor<'c, Database = Postgres>,
{
    let SqlQuery { sql, binds, .. } = sql::count(spec)?;
    let row = apply_binds(sqlx::query(&sql), binds)
        .fetch_one(conn)
        .await
        .map_err(storage)?;
    row.try_get(0).map_err(storage)
}

async fn run_insert<'c, X>(conn: X, spec: &InsertSpec) -> Result<Row>
where
    X: sqlx::Executor<'c, Database = Postgres>,
{
    let SqlQuery { sql, binds, output } = sql::insert(spec)?;
    debug!(table = spec.table.name, "insert");
    let row = apply_binds(sqlx::query(&sql), binds)
        .fetch_one(conn)
        .await
        .map_err(storage)?;
    decode_row(&row, spec.table, &output)
}

async fn run_insert_many<'c, X>(conn: X, spec: &InsertManySpec) -> Result<Vec<Row>>
where
    X: sqlx::Executor<'c, Database = Postgres>,
{
    let SqlQuery { sql, binds, output } = sql::insert_many(spec)?;
    debug!(table = spec.table.name, rows = spec.rows.len(), "batch insert");
    let rows = apply_binds(sqlx::query(&sql), binds)
        .fetch_all(conn)
        .await
        .map_err(storage)?;
    rows.iter()
        .map(|row| decode_row(row, spec.table, &output))
        .collect()
}

async fn run_update<'c, X>(conn: X, spec: &UpdateSpec) -> Result<u64>
where
    X: sqlx::Executor<'c, Database = Postgres>,
{
    let SqlQuery { sql, binds, .. } = sql::update(spec)?;
    let result = apply_binds(sqlx::query(&sql), binds)
        .execute(conn)
        .await
        .map_err(storage)?;
    Ok(result.rows_affected())
}

async fn run_delete<'c, X>(conn: X, spec: &DeleteSpec) -> Result<u64>
where
    X: sqlx::Executor<'c, Database = Postgres>,
{
    let SqlQuery { sql, binds, .. } = sql::delete(spec)?;
    let result = apply_binds(sqlx::query(&sql), binds)
        .execute(conn)
        .await
        .map_err(storage)?;
    Ok(result.rows_affected())
}

/// Pool-backed [`QueryExecutor`].
///
/// Each call checks a connection out of the pool; use [`begin`] to pin a
/// sequence of calls to one transaction.
///
/// [`begin`]: QueryExecutor::begin
pub struct PgPoolExecutor {
    pool: PgPool,
}

impl PgPoolExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying pool reference.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl QueryExecutor for PgPoolExecutor {
    async fn fetch_one(&self, spec: &SelectSpec) -> Result<Option<Row>> {
        run_fetch_one(&self.pool, spec).await
    }

    async fn fetch_all(&self, spec: &SelectSpec) -> Result<Vec<Row>> {
        run_fetch_all(&self.pool, spec).await
    }

    async fn count(&self, spec: &SelectSpec) -> Result<i64> {
        run_count(&self.pool, spec).await
    }

    async fn insert(&self, spec: &InsertSpec) -> Result<Row> {
        run_insert(&self.pool, spec).await
    }

    async fn insert_many(&self, spec: &InsertManySpec) -> Result<Vec<Row>> {
        run_insert_many(&self.pool, spec).await
    }

    async fn update(&self, spec: &UpdateSpec) -> Result<u64> {
        run_update(&self.pool, spec).await
    }

    async fn delete(&self, spec: &DeleteSpec) -> Result<u64> {
        run_delete(&self.pool, spec).await
    }

    async fn begin<'a>(&'a self) -> Result<Box<dyn TransactionExecutor + 'a>> {
        let tx = self.pool.begin().await.map_err(storage)?;
        Ok(Box::new(PgTxExecutor::new(tx)))
    }
}

/// Transaction-backed [`QueryExecutor`].
///
/// Dropping the executor without committing rolls the transaction back
/// (sqlx's transaction drop semantics).
pub struct PgTxExecutor {
    tx: Mutex<Transaction<'static, Postgres>>,
}

impl PgTxExecutor {
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

#[async_trait]
impl QueryExecutor for PgTxExecutor {
    async fn fetch_one(&self, spec: &SelectSpec) -> Result<Option<Row>> {
        let mut tx = self.tx.lock().await;
        run_fetch_one(&mut **tx, spec).await
    }

    async fn fetch_all(&self, spec: &SelectSpec) -> Result<Vec<Row>> {
        let mut tx = self.tx.lock().await;
        run_fetch_all(&mut **tx, spec).await
    }

    async fn count(&self, spec: &SelectSpec) -> Result<i64> {
        let mut tx = self.tx.lock().await;
        run_count(&mut **tx, spec).await
    }

    async fn insert(&self, spec: &InsertSpec) -> Result<Row> {
        let mut tx = self.tx.lock().await;
        run_insert(&mut **tx, spec).await
    }

    async fn insert_many(&self, spec: &InsertManySpec) -> Result<Vec<Row>> {
        let mut tx = self.tx.lock().await;
        run_insert_many(&mut **tx, spec).await
    }

    async fn update(&self, spec: &UpdateSpec) -> Result<u64> {
        let mut tx = self.tx.lock().await;
        run_update(&mut **tx, spec).await
    }

    async fn delete(&self, spec: &DeleteSpec) -> Result<u64> {
        let mut tx = self.tx.lock().await;
        run_delete(&mut **tx, spec).await
    }

    async fn begin<'a>(&'a self) -> Result<Box<dyn TransactionExecutor + 'a>> {
        // Joins the enclosing transaction; commit defers to the outer scope.
        Ok(Box::new(PgJoinedScope { parent: self }))
    }
}

#[async_trait]
impl TransactionExecutor for PgTxExecutor {
    async fn commit(self: Box<Self>) -> Result<()> {
        let PgTxExecutor { tx } = *self;
        tx.into_inner().commit().await.map_err(storage)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let PgTxExecutor { tx } = *self;
        tx.into_inner().rollback().await.map_err(storage)
    }

    fn as_executor(&self) -> &dyn QueryExecutor {
        self
    }
}

/// A scope opened inside an existing transaction.
///
/// All operations run on the parent transaction; commit and rollback are
/// no-ops here, the outer scope decides the outcome.
struct PgJoinedScope<'a> {
    parent: &'a PgTxExecutor,
}

#[async_trait]
impl QueryExecutor for PgJoinedScope<'_> {
    async fn fetch_one(&self, spec: &SelectSpec) -> Result<Option<Row>> {
        self.parent.fetch_one(spec).await
    }

    async fn fetch_all(&self, spec: &SelectSpec) -> Result<Vec<Row>> {
        self.parent.fetch_all(spec).await
    }

    async fn count(&self, spec: &SelectSpec) -> Result<i64> {
        self.parent.count(spec).await
    }

    async fn insert(&self, spec: &InsertSpec) -> Result<Row> {
        self.parent.insert(spec).await
    }

    async fn insert_many(&self, spec: &InsertManySpec) -> Result<Vec<Row>> {
        self.parent.insert_many(spec).await
    }

    async fn update(&self, spec: &UpdateSpec) -> Result<u64> {
        self.parent.update(spec).await
    }

    async fn delete(&self, spec: &DeleteSpec) -> Result<u64> {
        self.parent.delete(spec).await
    }

    async fn begin<'a>(&'a self) -> Result<Box<dyn TransactionExecutor + 'a>> {
        Ok(Box::new(PgJoinedScope {
            parent: self.parent,
        }))
    }
}

#[async_trait]
impl TransactionExecutor for PgJoinedScope<'_> {
    async fn commit(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    fn as_executor(&self) -> &dyn QueryExecutor {
        self
    }
}
