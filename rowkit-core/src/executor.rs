//! The storage collaborator contract.

use async_trait::async_trait;

use crate::error::Result;
use crate::query::{DeleteSpec, InsertManySpec, InsertSpec, SelectSpec, UpdateSpec};
use crate::row::Row;

/// Executes query specifications against a storage backend.
///
/// Implementations own all query construction and execution; the repository
/// layer never sees SQL. Failures surface as [`RowError::Storage`] with the
/// driver error unchanged underneath.
///
/// [`RowError::Storage`]: crate::error::RowError::Storage
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute a select and return the first result row, if any.
    async fn fetch_one(&self, spec: &SelectSpec) -> Result<Option<Row>>;

    /// Execute a select and return all result rows.
    async fn fetch_all(&self, spec: &SelectSpec) -> Result<Vec<Row>>;

    /// Count the rows matching the spec's filters (orders and projection
    /// are ignored).
    async fn count(&self, spec: &SelectSpec) -> Result<i64>;

    /// Insert one row and return the requested `returning` columns.
    async fn insert(&self, spec: &InsertSpec) -> Result<Row>;

    /// Insert a uniform batch as one operation; returned rows keep the
    /// input order.
    async fn insert_many(&self, spec: &InsertManySpec) -> Result<Vec<Row>>;

    /// Update matching rows, returning the affected count.
    async fn update(&self, spec: &UpdateSpec) -> Result<u64>;

    /// Delete matching rows (all rows when the spec has no filters),
    /// returning the affected count.
    async fn delete(&self, spec: &DeleteSpec) -> Result<u64>;

    /// Open a transactional scope. Dropping the returned executor without
    /// committing rolls the scope back.
    async fn begin<'a>(&'a self) -> Result<Box<dyn TransactionExecutor + 'a>>;
}

/// A transactional scope that is itself a [`QueryExecutor`].
///
/// `begin` on a transaction executor does not nest: the returned scope
/// joins the enclosing transaction, its commit defers to the outer scope.
#[async_trait]
pub trait TransactionExecutor: QueryExecutor {
    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;

    /// View the scope as a plain executor, for binding repositories to it.
    fn as_executor(&self) -> &dyn QueryExecutor;
}
