//! Query specifications handed to storage executors.
//!
//! Specs carry no SQL. They name a [`TableSpec`], filters, orders and
//! payload rows; each executor renders them with its own dialect (or, for
//! the in-memory executor, evaluates them directly).

use crate::row::Row;
use crate::table::TableSpec;
use crate::value::Value;

/// A single predicate on one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: &'static str,
    pub op: FilterOp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq(Value),
    Ne(Value),
    Lt(Value),
    Le(Value),
    Gt(Value),
    Ge(Value),
    In(Vec<Value>),
    IsNull,
    IsNotNull,
    Like(String),
}

impl Filter {
    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Self {
            column,
            op: FilterOp::Eq(value.into()),
        }
    }

    pub fn ne(column: &'static str, value: impl Into<Value>) -> Self {
        Self {
            column,
            op: FilterOp::Ne(value.into()),
        }
    }

    pub fn lt(column: &'static str, value: impl Into<Value>) -> Self {
        Self {
            column,
            op: FilterOp::Lt(value.into()),
        }
    }

    pub fn le(column: &'static str, value: impl Into<Value>) -> Self {
        Self {
            column,
            op: FilterOp::Le(value.into()),
        }
    }

    pub fn gt(column: &'static str, value: impl Into<Value>) -> Self {
        Self {
            column,
            op: FilterOp::Gt(value.into()),
        }
    }

    pub fn ge(column: &'static str, value: impl Into<Value>) -> Self {
        Self {
            column,
            op: FilterOp::Ge(value.into()),
        }
    }

    /// Membership filter. An empty list matches nothing.
    pub fn is_in<V: Into<Value>>(
        column: &'static str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            column,
            op: FilterOp::In(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn is_null(column: &'static str) -> Self {
        Self {
            column,
            op: FilterOp::IsNull,
        }
    }

    pub fn is_not_null(column: &'static str) -> Self {
        Self {
            column,
            op: FilterOp::IsNotNull,
        }
    }

    pub fn like(column: &'static str, pattern: impl Into<String>) -> Self {
        Self {
            column,
            op: FilterOp::Like(pattern.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One ORDER BY term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: &'static str,
    pub direction: Direction,
}

impl Order {
    pub fn asc(column: &'static str) -> Self {
        Self {
            column,
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: &'static str) -> Self {
        Self {
            column,
            direction: Direction::Desc,
        }
    }
}

/// Explicit scope for a delete.
///
/// Deleting everything requires the dedicated [`Selection::All`] marker;
/// an empty `Where` list is rejected rather than widened silently.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    All,
    Where(Vec<Filter>),
}

#[derive(Debug, Clone)]
pub struct SelectSpec {
    pub table: &'static TableSpec,
    pub filters: Vec<Filter>,
    pub orders: Vec<Order>,
    /// Projection; `None` selects every declared column.
    pub columns: Option<Vec<&'static str>>,
    pub limit: Option<u32>,
}

impl SelectSpec {
    pub fn new(table: &'static TableSpec) -> Self {
        Self {
            table,
            filters: Vec::new(),
            orders: Vec::new(),
            columns: None,
            limit: None,
        }
    }

    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_orders(mut self, orders: Vec<Order>) -> Self {
        self.orders = orders;
        self
    }

    pub fn with_columns(mut self, columns: Vec<&'static str>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone)]
pub struct InsertSpec {
    pub table: &'static TableSpec,
    pub row: Row,
    /// Columns the executor must read back from the inserted row.
    pub returning: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub struct InsertManySpec {
    pub table: &'static TableSpec,
    /// Payloads in encounter order; all rows carry the same column set.
    pub rows: Vec<Row>,
    pub returning: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub struct UpdateSpec {
    pub table: &'static TableSpec,
    pub values: Row,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone)]
pub struct DeleteSpec {
    pub table: &'static TableSpec,
    /// Already validated by the repository; empty means every row.
    pub filters: Vec<Filter>,
}
