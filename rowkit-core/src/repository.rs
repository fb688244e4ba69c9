//! The generic repository.
//!
//! Composes the serializer with an injected [`QueryExecutor`]; holds no
//! entity state of its own. The entity binding is the `E` type parameter,
//! fixed at construction.

use std::any::type_name;
use std::marker::PhantomData;

use futures::stream::{self, Stream};
use tracing::warn;

use crate::entity::Entity;
use crate::error::{Result, RowError};
use crate::executor::{QueryExecutor, TransactionExecutor};
use crate::query::{DeleteSpec, Filter, InsertManySpec, InsertSpec, Order, SelectSpec, Selection,
    UpdateSpec};
use crate::row::Row;
use crate::serialize::{apply_row, from_row, insert_payload, to_row};
use crate::table::TableSpec;
use crate::value::Value;

/// CRUD conveniences for one entity type over one table.
///
/// Stateless per call: the only configuration is the table binding and the
/// ignore-on-insert set. Concurrent use is as safe as the executor behind
/// it.
///
/// ```ignore
/// let executor = PgPoolExecutor::new(pool);
/// let repo = Repository::<Expense>::new(&executor, &EXPENSES);
///
/// let mut expense = Expense { id: None, amount: 100, .. };
/// repo.insert(&mut expense).await?;
/// let found = repo.get_by_id(expense.id.unwrap()).await?;
/// ```
///
/// Grouping calls atomically goes through an explicit scope:
///
/// ```ignore
/// let tx = repo.begin().await?;
/// let scoped = repo.scoped(tx.as_ref());
/// scoped.insert(&mut a).await?;
/// scoped.insert(&mut b).await?;
/// tx.commit().await?;
/// ```
pub struct Repository<'x, E: Entity> {
    executor: &'x dyn QueryExecutor,
    table: &'static TableSpec,
    ignore_on_insert: &'static [&'static str],
    _entity: PhantomData<fn() -> E>,
}

impl<'x, E: Entity> Clone for Repository<'x, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'x, E: Entity> Copy for Repository<'x, E> {}

impl<'x, E: Entity> Repository<'x, E> {
    pub fn new(executor: &'x dyn QueryExecutor, table: &'static TableSpec) -> Self {
        Self {
            executor,
            table,
            ignore_on_insert: &[],
            _entity: PhantomData,
        }
    }

    /// Configure columns excluded from insert payloads while unset, so
    /// storage-side defaults apply and are written back after the insert.
    pub fn with_ignore_on_insert(mut self, columns: &'static [&'static str]) -> Self {
        self.ignore_on_insert = columns;
        self
    }

    pub fn table(&self) -> &'static TableSpec {
        self.table
    }

    pub fn executor(&self) -> &'x dyn QueryExecutor {
        self.executor
    }

    /// Serialize an entity into a row for this repository's table.
    pub fn serialize(&self, entity: &E) -> Result<Row> {
        to_row(entity, self.table)
    }

    /// Deserialize a result row into an entity.
    pub fn deserialize(&self, row: Row) -> Result<E> {
        from_row(row)
    }

    // ==============
    // SELECT METHODS
    // ==============

    /// First entity matching `filters` under `orders`, if any. At most one
    /// row is requested from the executor.
    pub async fn first(&self, filters: Vec<Filter>, orders: Vec<Order>) -> Result<Option<E>> {
        let spec = SelectSpec::new(self.table)
            .with_filters(filters)
            .with_orders(orders)
            .with_limit(1);
        match self.executor.fetch_one(&spec).await? {
            Some(row) => Ok(Some(from_row(row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<E>> {
        self.first(vec![Filter::eq(self.table.id_column, id)], Vec::new())
            .await
    }

    /// Entities whose identifier is in `ids`. An empty list returns empty
    /// without touching storage.
    pub async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<E>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.get_all(
            vec![Filter::is_in(self.table.id_column, ids.iter().copied())],
            Vec::new(),
        )
        .await
    }

    /// First match, or a new entity built from `defaults` and inserted.
    ///
    /// Not atomic across concurrent callers; racing inserts are arbitrated
    /// by storage constraints, not here.
    pub async fn get_or_create(&self, filters: Vec<Filter>, defaults: Row) -> Result<(E, bool)> {
        if let Some(entity) = self.first(filters, Vec::new()).await? {
            return Ok((entity, false));
        }

        let mut entity: E = from_row(defaults)?;
        self.insert(&mut entity).await?;
        Ok((entity, true))
    }

    pub async fn get_all(&self, filters: Vec<Filter>, orders: Vec<Order>) -> Result<Vec<E>> {
        let spec = SelectSpec::new(self.table)
            .with_filters(filters)
            .with_orders(orders);
        let rows = self.executor.fetch_all(&spec).await?;
        rows.into_iter().map(from_row).collect()
    }

    /// Like [`get_all`](Self::get_all), but deserializes lazily: a finite,
    /// single-pass stream over the result rows.
    pub async fn get_all_stream(
        &self,
        filters: Vec<Filter>,
        orders: Vec<Order>,
    ) -> Result<impl Stream<Item = Result<E>>> {
        let spec = SelectSpec::new(self.table)
            .with_filters(filters)
            .with_orders(orders);
        let rows = self.executor.fetch_all(&spec).await?;
        Ok(stream::iter(rows.into_iter().map(from_row)))
    }

    /// Identifiers of all matching rows; only the id column is selected.
    pub async fn get_all_ids(&self, filters: Vec<Filter>, orders: Vec<Order>) -> Result<Vec<i64>> {
        let spec = SelectSpec::new(self.table)
            .with_filters(filters)
            .with_orders(orders)
            .with_columns(vec![self.table.id_column]);
        let rows = self.executor.fetch_all(&spec).await?;
        rows.iter().map(|row| self.id_of_row(row)).collect()
    }

    /// Whether any row matches, via a count query. No rows are
    /// materialized.
    pub async fn exists(&self, filters: Vec<Filter>) -> Result<bool> {
        let spec = SelectSpec::new(self.table).with_filters(filters);
        Ok(self.executor.count(&spec).await? > 0)
    }

    // ==============
    // INSERT METHODS
    // ==============

    /// Insert the entity and write storage-assigned columns (identifier,
    /// deferred defaults) back into it.
    pub async fn insert(&self, entity: &mut E) -> Result<()> {
        let payload = insert_payload(entity, self.table, self.ignore_on_insert)?;
        let spec = InsertSpec {
            table: self.table,
            row: payload.row,
            returning: payload.returning,
        };
        let returned = self.executor.insert(&spec).await?;
        apply_row(entity, &returned)
    }

    /// Insert a batch as one operation, populating identifiers in
    /// encounter order.
    ///
    /// Fails with [`RowError::Consistency`] before any write when the
    /// entities disagree on which ignore-on-insert columns are unset: a
    /// uniform batch is required for a single multi-row insert.
    pub async fn insert_many(&self, entities: &mut [E]) -> Result<()> {
        if entities.is_empty() {
            return Ok(());
        }

        let payloads = entities
            .iter()
            .map(|entity| insert_payload(entity, self.table, self.ignore_on_insert))
            .collect::<Result<Vec<_>>>()?;

        let first = &payloads[0];
        for &column in self.ignore_on_insert {
            let deferred = first.deferred.contains(&column);
            if payloads.iter().any(|p| p.deferred.contains(&column) != deferred) {
                return Err(RowError::consistency(format!(
                    "inconsistent ignore-on-insert values for column `{column}` across batch"
                )));
            }
        }

        let spec = InsertManySpec {
            table: self.table,
            returning: first.returning.clone(),
            rows: payloads.into_iter().map(|p| p.row).collect(),
        };
        let returned = self.executor.insert_many(&spec).await?;
        if returned.len() != entities.len() {
            return Err(RowError::consistency(format!(
                "executor returned {} rows for a batch of {}",
                returned.len(),
                entities.len()
            )));
        }

        for (entity, row) in entities.iter_mut().zip(&returned) {
            apply_row(entity, row)?;
        }
        Ok(())
    }

    // ==============
    // UPDATE METHODS
    // ==============

    /// Full-row update keyed by the entity's identifier.
    pub async fn update(&self, entity: &E) -> Result<()> {
        let id = self.require_id(entity)?;
        let values = to_row(entity, self.table)?;
        let spec = UpdateSpec {
            table: self.table,
            values,
            filters: vec![Filter::eq(self.table.id_column, id)],
        };
        self.executor.update(&spec).await?;
        Ok(())
    }

    /// Update each entity sequentially inside one transaction; either all
    /// rows are committed or none.
    pub async fn update_many(&self, entities: &[E]) -> Result<()> {
        if entities.is_empty() {
            return Ok(());
        }

        let tx = self.begin().await?;
        let scoped = self.scoped(tx.as_ref());
        let outcome = async {
            for entity in entities {
                scoped.update(entity).await?;
            }
            Ok(())
        }
        .await;
        Self::finish(tx, outcome).await
    }

    /// Apply `changes` onto the entity through its validating constructor,
    /// then update only those columns in storage.
    pub async fn update_partial(&self, entity: &mut E, changes: Row) -> Result<()> {
        let id = self.require_id(entity)?;
        if changes.contains(self.table.id_column) {
            return Err(RowError::consistency(format!(
                "identifier column `{}` is immutable",
                self.table.id_column
            )));
        }
        if changes.is_empty() {
            return Ok(());
        }

        apply_row(entity, &changes)?;

        let serialized = to_row(entity, self.table)?;
        let mut values = Row::new();
        for (column, _) in changes.iter() {
            let value = serialized.get(column).cloned().ok_or_else(|| {
                RowError::consistency(format!(
                    "field `{column}` is not a column of table `{}`",
                    self.table.name
                ))
            })?;
            values.insert(column, value);
        }

        let spec = UpdateSpec {
            table: self.table,
            values,
            filters: vec![Filter::eq(self.table.id_column, id)],
        };
        self.executor.update(&spec).await?;
        Ok(())
    }

    /// SQL-style bulk update of all rows matching `filters`, without
    /// entities in memory. Returns the affected row count.
    pub async fn update_values(&self, filters: Vec<Filter>, values: Row) -> Result<u64> {
        if values.is_empty() {
            return Err(RowError::consistency("update_values requires at least one value"));
        }
        for (column, _) in values.iter() {
            if column == self.table.id_column {
                return Err(RowError::consistency(format!(
                    "identifier column `{column}` is immutable"
                )));
            }
            if self.table.column(column).is_none() {
                return Err(RowError::consistency(format!(
                    "field `{column}` is not a column of table `{}`",
                    self.table.name
                )));
            }
        }

        let spec = UpdateSpec {
            table: self.table,
            values,
            filters,
        };
        self.executor.update(&spec).await
    }

    /// Update the row whose `field` matches this entity's value, adopting
    /// its identifier; insert when no such row exists. Returns whether an
    /// insert happened.
    pub async fn update_or_insert_first_by_field(
        &self,
        entity: &mut E,
        field: &'static str,
    ) -> Result<bool> {
        let value = self.field_value(entity, field)?;
        match self.first(vec![Filter::eq(field, value)], Vec::new()).await? {
            Some(existing) => {
                entity.set_id(self.require_id(&existing)?);
                self.update(entity).await?;
                Ok(false)
            }
            None => {
                self.insert(entity).await?;
                Ok(true)
            }
        }
    }

    /// Partition `entities` by whether a row with a matching `field` value
    /// exists: matches are updated under the existing identifier, the rest
    /// are inserted. Runs inside one transaction, in encounter order.
    pub async fn update_or_insert_many_by_field(
        &self,
        entities: &mut [E],
        field: &'static str,
    ) -> Result<()> {
        if entities.is_empty() {
            return Ok(());
        }

        let values = entities
            .iter()
            .map(|entity| self.field_value(entity, field))
            .collect::<Result<Vec<_>>>()?;
        let existing = self
            .get_all(vec![Filter::is_in(field, values.clone())], Vec::new())
            .await?;
        let existing_ids = existing
            .iter()
            .map(|entity| Ok((self.field_value(entity, field)?, self.require_id(entity)?)))
            .collect::<Result<Vec<(Value, i64)>>>()?;

        let tx = self.begin().await?;
        let scoped = self.scoped(tx.as_ref());
        let outcome = async {
            for (entity, value) in entities.iter_mut().zip(values) {
                match existing_ids.iter().find(|(v, _)| *v == value) {
                    Some((_, id)) => {
                        entity.set_id(*id);
                        scoped.update(entity).await?;
                    }
                    None => scoped.insert(entity).await?,
                }
            }
            Ok(())
        }
        .await;
        Self::finish(tx, outcome).await
    }

    // ==============
    // DELETE METHODS
    // ==============

    /// Delete the selected rows, returning the affected count.
    ///
    /// Deleting everything takes the explicit [`Selection::All`] marker;
    /// an empty filter list fails with [`RowError::Consistency`] before
    /// any storage call.
    pub async fn delete(&self, selection: Selection) -> Result<u64> {
        let filters = match selection {
            Selection::All => Vec::new(),
            Selection::Where(filters) if filters.is_empty() => {
                return Err(RowError::consistency(
                    "refusing to delete with an empty filter list; pass Selection::All to delete every row",
                ));
            }
            Selection::Where(filters) => filters,
        };
        let spec = DeleteSpec {
            table: self.table,
            filters,
        };
        self.executor.delete(&spec).await
    }

    pub async fn delete_by_id(&self, id: i64) -> Result<u64> {
        self.delete(Selection::Where(vec![Filter::eq(self.table.id_column, id)]))
            .await
    }

    /// Delete rows whose identifier is in `ids`; an empty list is a no-op
    /// without a storage call.
    pub async fn delete_by_ids(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.delete(Selection::Where(vec![Filter::is_in(
            self.table.id_column,
            ids.iter().copied(),
        )]))
        .await
    }

    // ==============
    // TRANSACTIONS
    // ==============

    /// Open a transactional scope on the underlying executor. Dropping the
    /// scope without committing rolls it back.
    pub async fn begin(&self) -> Result<Box<dyn TransactionExecutor + 'x>> {
        self.executor.begin().await
    }

    /// Rebind this repository onto a transactional scope.
    pub fn scoped<'t>(&self, tx: &'t dyn TransactionExecutor) -> Repository<'t, E> {
        Repository {
            executor: tx.as_executor(),
            table: self.table,
            ignore_on_insert: self.ignore_on_insert,
            _entity: PhantomData,
        }
    }

    // ==============
    // HELPERS
    // ==============

    async fn finish(tx: Box<dyn TransactionExecutor + '_>, outcome: Result<()>) -> Result<()> {
        match outcome {
            Ok(()) => tx.commit().await,
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("transaction rollback failed: {rollback_err}");
                }
                Err(err)
            }
        }
    }

    fn require_id(&self, entity: &E) -> Result<i64> {
        entity.id().ok_or_else(|| {
            RowError::consistency(format!(
                "{} has no identifier; insert it first",
                type_name::<E>()
            ))
        })
    }

    fn field_value(&self, entity: &E, field: &'static str) -> Result<Value> {
        let mut row = to_row(entity, self.table)?;
        row.remove(field).ok_or_else(|| {
            RowError::consistency(format!(
                "field `{field}` is not a column of table `{}`",
                self.table.name
            ))
        })
    }

    fn id_of_row(&self, row: &Row) -> Result<i64> {
        match row.get(self.table.id_column) {
            Some(Value::BigInt(id)) => Ok(*id),
            _ => Err(RowError::consistency(format!(
                "result row is missing identifier column `{}`",
                self.table.id_column
            ))),
        }
    }
}
