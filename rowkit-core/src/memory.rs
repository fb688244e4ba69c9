//! In-memory query executor for tests and fakes.
//!
//! Implements the full [`QueryExecutor`] contract against process-local
//! tables, including snapshot-based transactions, so repository behavior
//! can be exercised without a database. Not intended for production
//! storage.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::Result;
use crate::executor::{QueryExecutor, TransactionExecutor};
use crate::query::{DeleteSpec, Filter, FilterOp, InsertManySpec, InsertSpec, Order, SelectSpec,
    UpdateSpec};
use crate::row::Row;
use crate::table::TableSpec;
use crate::value::Value;

static NULL: Value = Value::Null;

/// Storage-side default for a column left out of an insert payload.
#[derive(Debug, Clone)]
pub enum ColumnDefault {
    Fixed(Value),
    /// Monotonic counter starting at 1, like a sequence-backed column.
    Serial,
}

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    rows: Vec<Row>,
    next_id: i64,
    defaults: HashMap<String, ColumnDefault>,
    serials: HashMap<String, i64>,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tables: HashMap<String, MemoryTable>,
}

/// Process-local [`QueryExecutor`].
///
/// Cloning shares the same tables. `query_count` reports how many storage
/// operations were issued, which lets tests assert that short-circuit
/// paths (empty id lists) never reach storage.
#[derive(Clone, Default)]
pub struct MemoryExecutor {
    state: Arc<Mutex<MemoryState>>,
    queries: Arc<AtomicUsize>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure a storage-side default for a column, applied when an
    /// insert payload leaves it out or null.
    pub fn set_default(&self, table: &str, column: &str, default: ColumnDefault) {
        let mut state = lock(&self.state);
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .defaults
            .insert(column.to_string(), default);
    }

    /// Number of storage operations issued so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(AtomicOrdering::SeqCst)
    }
}

fn lock(state: &Mutex<MemoryState>) -> std::sync::MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::BigInt(x), Value::Double(y)) | (Value::Double(y), Value::BigInt(x)) => {
            (*x as f64) == *y
        }
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::BigInt(x), Value::BigInt(y)) => Some(x.cmp(y)),
        (Value::Double(x), Value::Double(y)) => x.partial_cmp(y),
        (Value::BigInt(x), Value::Double(y)) => (*x as f64).partial_cmp(y),
        (Value::Double(x), Value::BigInt(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        (Value::Date(x), Value::Date(y)) => Some(x.cmp(y)),
        (Value::Timestamp(x), Value::Timestamp(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Uuid(x), Value::Uuid(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn like_match(text: &str, pattern: &str) -> bool {
    fn rec(t: &[char], p: &[char]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some('%') => rec(t, &p[1..]) || (!t.is_empty() && rec(&t[1..], p)),
            Some('_') => !t.is_empty() && rec(&t[1..], &p[1..]),
            Some(c) => t.first() == Some(c) && rec(&t[1..], &p[1..]),
        }
    }
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    rec(&text, &pattern)
}

fn matches(row: &Row, filter: &Filter) -> bool {
    let value = row.get(filter.column).unwrap_or(&NULL);
    match &filter.op {
        FilterOp::Eq(expected) => values_equal(value, expected),
        FilterOp::Ne(expected) => !values_equal(value, expected),
        FilterOp::Lt(expected) => compare(value, expected) == Some(Ordering::Less),
        FilterOp::Le(expected) => {
            matches!(compare(value, expected), Some(Ordering::Less | Ordering::Equal))
        }
        FilterOp::Gt(expected) => compare(value, expected) == Some(Ordering::Greater),
        FilterOp::Ge(expected) => {
            matches!(compare(value, expected), Some(Ordering::Greater | Ordering::Equal))
        }
        FilterOp::In(values) => values.iter().any(|expected| values_equal(value, expected)),
        FilterOp::IsNull => value.is_null(),
        FilterOp::IsNotNull => !value.is_null(),
        FilterOp::Like(pattern) => match value {
            Value::Text(text) => like_match(text, pattern),
            _ => false,
        },
    }
}

fn matches_all(row: &Row, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| matches(row, filter))
}

fn sort_rows(rows: &mut [Row], orders: &[Order]) {
    rows.sort_by(|a, b| {
        for order in orders {
            let left = a.get(order.column).unwrap_or(&NULL);
            let right = b.get(order.column).unwrap_or(&NULL);
            let mut ordering = compare(left, right).unwrap_or(Ordering::Equal);
            if order.direction == crate::query::Direction::Desc {
                ordering = ordering.reverse();
            }
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn project(row: &Row, columns: &[&'static str]) -> Row {
    columns
        .iter()
        .map(|&column| {
            (
                column.to_string(),
                row.get(column).cloned().unwrap_or(Value::Null),
            )
        })
        .collect()
}

fn select(state: &MemoryState, spec: &SelectSpec) -> Vec<Row> {
    let mut rows: Vec<Row> = state
        .tables
        .get(spec.table.name)
        .map(|table| {
            table
                .rows
                .iter()
                .filter(|row| matches_all(row, &spec.filters))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    sort_rows(&mut rows, &spec.orders);
    if let Some(limit) = spec.limit {
        rows.truncate(limit as usize);
    }
    if let Some(columns) = &spec.columns {
        rows = rows.iter().map(|row| project(row, columns)).collect();
    }
    rows
}

fn insert_row(table: &mut MemoryTable, table_spec: &TableSpec, payload: &Row) -> Row {
    let mut stored = payload.clone();

    let configured: Vec<(String, ColumnDefault)> = table
        .defaults
        .iter()
        .map(|(column, default)| (column.clone(), default.clone()))
        .collect();
    for (column, default) in configured {
        let unset = stored.get(&column).map_or(true, Value::is_null);
        if unset {
            let value = match default {
                ColumnDefault::Fixed(value) => value,
                ColumnDefault::Serial => {
                    let counter = table.serials.entry(column.clone()).or_insert(0);
                    *counter += 1;
                    Value::BigInt(*counter)
                }
            };
            stored.insert(column, value);
        }
    }

    table.next_id += 1;
    stored.insert(table_spec.id_column, Value::BigInt(table.next_id));
    table.rows.push(stored.clone());
    stored
}

#[async_trait]
impl QueryExecutor for MemoryExecutor {
    async fn fetch_one(&self, spec: &SelectSpec) -> Result<Option<Row>> {
        self.queries.fetch_add(1, AtomicOrdering::SeqCst);
        let state = lock(&self.state);
        Ok(select(&state, spec).into_iter().next())
    }

    async fn fetch_all(&self, spec: &SelectSpec) -> Result<Vec<Row>> {
        self.queries.fetch_add(1, AtomicOrdering::SeqCst);
        let state = lock(&self.state);
        Ok(select(&state, spec))
    }

    async fn count(&self, spec: &SelectSpec) -> Result<i64> {
        self.queries.fetch_add(1, AtomicOrdering::SeqCst);
        let state = lock(&self.state);
        let count = state
            .tables
            .get(spec.table.name)
            .map(|table| {
                table
                    .rows
                    .iter()
                    .filter(|row| matches_all(row, &spec.filters))
                    .count()
            })
            .unwrap_or(0);
        Ok(count as i64)
    }

    async fn insert(&self, spec: &InsertSpec) -> Result<Row> {
        self.queries.fetch_add(1, AtomicOrdering::SeqCst);
        let mut state = lock(&self.state);
        let table = state.tables.entry(spec.table.name.to_string()).or_default();
        let stored = insert_row(table, spec.table, &spec.row);
        Ok(project(&stored, &spec.returning))
    }

    async fn insert_many(&self, spec: &InsertManySpec) -> Result<Vec<Row>> {
        self.queries.fetch_add(1, AtomicOrdering::SeqCst);
        let mut state = lock(&self.state);
        let table = state.tables.entry(spec.table.name.to_string()).or_default();
        Ok(spec
            .rows
            .iter()
            .map(|payload| project(&insert_row(table, spec.table, payload), &spec.returning))
            .collect())
    }

    async fn update(&self, spec: &UpdateSpec) -> Result<u64> {
        self.queries.fetch_add(1, AtomicOrdering::SeqCst);
        let mut state = lock(&self.state);
        let Some(table) = state.tables.get_mut(spec.table.name) else {
            return Ok(0);
        };
        let mut affected = 0;
        for row in &mut table.rows {
            if matches_all(row, &spec.filters) {
                for (column, value) in spec.values.iter() {
                    row.insert(column, value.clone());
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn delete(&self, spec: &DeleteSpec) -> Result<u64> {
        self.queries.fetch_add(1, AtomicOrdering::SeqCst);
        let mut state = lock(&self.state);
        let Some(table) = state.tables.get_mut(spec.table.name) else {
            return Ok(0);
        };
        let before = table.rows.len();
        table.rows.retain(|row| !matches_all(row, &spec.filters));
        Ok((before - table.rows.len()) as u64)
    }

    async fn begin<'a>(&'a self) -> Result<Box<dyn TransactionExecutor + 'a>> {
        let snapshot = lock(&self.state).clone();
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            queries: Arc::clone(&self.queries),
            snapshot: Some(snapshot),
        }))
    }
}

/// Snapshot-based transactional scope over a [`MemoryExecutor`].
///
/// Operations apply to the live tables immediately; rollback (explicit or
/// on drop) restores the snapshot taken at `begin`.
pub struct MemoryTransaction {
    state: Arc<Mutex<MemoryState>>,
    queries: Arc<AtomicUsize>,
    snapshot: Option<MemoryState>,
}

impl MemoryTransaction {
    fn live(&self) -> MemoryExecutor {
        MemoryExecutor {
            state: Arc::clone(&self.state),
            queries: Arc::clone(&self.queries),
        }
    }
}

#[async_trait]
impl QueryExecutor for MemoryTransaction {
    async fn fetch_one(&self, spec: &SelectSpec) -> Result<Option<Row>> {
        self.live().fetch_one(spec).await
    }

    async fn fetch_all(&self, spec: &SelectSpec) -> Result<Vec<Row>> {
        self.live().fetch_all(spec).await
    }

    async fn count(&self, spec: &SelectSpec) -> Result<i64> {
        self.live().count(spec).await
    }

    async fn insert(&self, spec: &InsertSpec) -> Result<Row> {
        self.live().insert(spec).await
    }

    async fn insert_many(&self, spec: &InsertManySpec) -> Result<Vec<Row>> {
        self.live().insert_many(spec).await
    }

    async fn update(&self, spec: &UpdateSpec) -> Result<u64> {
        self.live().update(spec).await
    }

    async fn delete(&self, spec: &DeleteSpec) -> Result<u64> {
        self.live().delete(spec).await
    }

    async fn begin<'a>(&'a self) -> Result<Box<dyn TransactionExecutor + 'a>> {
        // Joins the enclosing scope: no snapshot, commit and rollback are
        // deferred to the outer transaction.
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            queries: Arc::clone(&self.queries),
            snapshot: None,
        }))
    }
}

#[async_trait]
impl TransactionExecutor for MemoryTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.snapshot = None;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        if let Some(snapshot) = self.snapshot.take() {
            *lock(&self.state) = snapshot;
        }
        Ok(())
    }

    fn as_executor(&self) -> &dyn QueryExecutor {
        self
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *lock(&self.state) = snapshot;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{col, TableSpec};
    use crate::value::ColumnKind;

    static ITEMS: TableSpec = TableSpec::new(
        "items",
        "id",
        &[col("id", ColumnKind::BigInt), col("label", ColumnKind::Text)],
    );

    #[tokio::test]
    async fn insert_assigns_sequential_ids() {
        let executor = MemoryExecutor::new();
        let spec = InsertSpec {
            table: &ITEMS,
            row: Row::new().with("label", "a"),
            returning: vec!["id"],
        };

        let first = executor.insert(&spec).await.unwrap();
        let second = executor.insert(&spec).await.unwrap();

        assert_eq!(first.get("id"), Some(&Value::BigInt(1)));
        assert_eq!(second.get("id"), Some(&Value::BigInt(2)));
    }

    #[tokio::test]
    async fn dropping_a_transaction_rolls_back() {
        let executor = MemoryExecutor::new();
        let spec = InsertSpec {
            table: &ITEMS,
            row: Row::new().with("label", "a"),
            returning: vec!["id"],
        };

        {
            let tx = executor.begin().await.unwrap();
            tx.insert(&spec).await.unwrap();
            // dropped without commit
        }

        let count = executor
            .count(&SelectSpec::new(&ITEMS))
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn committed_transaction_keeps_rows() {
        let executor = MemoryExecutor::new();
        let spec = InsertSpec {
            table: &ITEMS,
            row: Row::new().with("label", "a"),
            returning: vec!["id"],
        };

        let tx = executor.begin().await.unwrap();
        tx.insert(&spec).await.unwrap();
        tx.commit().await.unwrap();

        let count = executor.count(&SelectSpec::new(&ITEMS)).await.unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn like_matching_supports_wildcards() {
        assert!(like_match("receipt-2020", "receipt-%"));
        assert!(like_match("abc", "a_c"));
        assert!(!like_match("abc", "a_d"));
    }
}
