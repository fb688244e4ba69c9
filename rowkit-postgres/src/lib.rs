//! sqlx/Postgres storage collaborator for rowkit repositories.
//!
//! Renders query specifications into parameterized SQL and executes them on
//! a connection pool or inside a transaction. Driver failures propagate as
//! `RowError::Storage` with the `sqlx::Error` unchanged underneath.

pub mod executor;
pub mod pool;
mod sql;

pub use executor::{PgPoolExecutor, PgTxExecutor};
pub use pool::{create_pool, create_pool_with_options};
