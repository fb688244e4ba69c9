//! SQL rendering for query specifications.
//!
//! Every parameter is numbered (`$1`, `$2`, ...) and paired with its
//! column's declared kind so nulls can be bound with the right type.
//! Column and table names come from static [`TableSpec`] declarations,
//! never from user input.

use std::fmt::Write as _;

use rowkit_core::{
    ColumnKind, DeleteSpec, Direction, Filter, FilterOp, InsertManySpec, InsertSpec, Result, Row,
    RowError, SelectSpec, TableSpec, UpdateSpec, Value,
};

/// One bound parameter with the kind of the column it targets.
#[derive(Debug, Clone)]
pub(crate) struct Bind {
    pub kind: ColumnKind,
    pub value: Value,
}

/// Rendered SQL plus its parameters and the columns of each result row.
#[derive(Debug, Clone)]
pub(crate) struct SqlQuery {
    pub sql: String,
    pub binds: Vec<Bind>,
    /// Projection of result rows (select columns or RETURNING list);
    /// empty for statements that only report an affected count.
    pub output: Vec<&'static str>,
}

fn kind_of(table: &TableSpec, column: &str) -> Result<ColumnKind> {
    table
        .column(column)
        .map(|spec| spec.kind)
        .ok_or_else(|| {
            RowError::consistency(format!(
                "column `{column}` is not declared for table `{}`",
                table.name
            ))
        })
}

fn push_binary(
    sql: &mut String,
    binds: &mut Vec<Bind>,
    kind: ColumnKind,
    column: &str,
    operator: &str,
    value: &Value,
) {
    binds.push(Bind {
        kind,
        value: value.clone(),
    });
    let _ = write!(sql, "{column} {operator} ${}", binds.len());
}

fn push_filter(
    sql: &mut String,
    binds: &mut Vec<Bind>,
    table: &TableSpec,
    filter: &Filter,
) -> Result<()> {
    let kind = kind_of(table, filter.column)?;
    let column = filter.column;
    match &filter.op {
        // `= NULL` never matches in SQL; express null equality properly.
        FilterOp::Eq(value) if value.is_null() => {
            let _ = write!(sql, "{column} IS NULL");
        }
        FilterOp::Ne(value) if value.is_null() => {
            let _ = write!(sql, "{column} IS NOT NULL");
        }
        FilterOp::Eq(value) => push_binary(sql, binds, kind, column, "=", value),
        FilterOp::Ne(value) => push_binary(sql, binds, kind, column, "<>", value),
        FilterOp::Lt(value) => push_binary(sql, binds, kind, column, "<", value),
        FilterOp::Le(value) => push_binary(sql, binds, kind, column, "<=", value),
        FilterOp::Gt(value) => push_binary(sql, binds, kind, column, ">", value),
        FilterOp::Ge(value) => push_binary(sql, binds, kind, column, ">=", value),
        FilterOp::In(values) if values.is_empty() => {
            sql.push_str("FALSE");
        }
        FilterOp::In(values) => {
            let _ = write!(sql, "{column} IN (");
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                binds.push(Bind {
                    kind,
                    value: value.clone(),
                });
                let _ = write!(sql, "${}", binds.len());
            }
            sql.push(')');
        }
        FilterOp::IsNull => {
            let _ = write!(sql, "{column} IS NULL");
        }
        FilterOp::IsNotNull => {
            let _ = write!(sql, "{column} IS NOT NULL");
        }
        FilterOp::Like(pattern) => {
            binds.push(Bind {
                kind: ColumnKind::Text,
                value: Value::Text(pattern.clone()),
            });
            let _ = write!(sql, "{column} LIKE ${}", binds.len());
        }
    }
    Ok(())
}

fn push_where(
    sql: &mut String,
    binds: &mut Vec<Bind>,
    table: &TableSpec,
    filters: &[Filter],
) -> Result<()> {
    if filters.is_empty() {
        return Ok(());
    }
    sql.push_str(" WHERE ");
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            sql.push_str(" AND ");
        }
        push_filter(sql, binds, table, filter)?;
    }
    Ok(())
}

fn push_row_values(binds: &mut Vec<Bind>, sql: &mut String, table: &TableSpec, row: &Row) -> Result<()> {
    sql.push('(');
    for (i, (column, value)) in row.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        binds.push(Bind {
            kind: kind_of(table, column)?,
            value: value.clone(),
        });
        let _ = write!(sql, "${}", binds.len());
    }
    sql.push(')');
    Ok(())
}

pub(crate) fn select(spec: &SelectSpec) -> Result<SqlQuery> {
    let output: Vec<&'static str> = spec
        .columns
        .clone()
        .unwrap_or_else(|| spec.table.column_names().collect());
    for column in &output {
        kind_of(spec.table, column)?;
    }

    let mut sql = format!("SELECT {} FROM {}", output.join(", "), spec.table.name);
    let mut binds = Vec::new();
    push_where(&mut sql, &mut binds, spec.table, &spec.filters)?;

    if !spec.orders.is_empty() {
        sql.push_str(" ORDER BY ");
        for (i, order) in spec.orders.iter().enumerate() {
            kind_of(spec.table, order.column)?;
            if i > 0 {
                sql.push_str(", ");
            }
            let direction = match order.direction {
                Direction::Asc => "ASC",
                Direction::Desc => "DESC",
            };
            let _ = write!(sql, "{} {direction}", order.column);
        }
    }

    if let Some(limit) = spec.limit {
        let _ = write!(sql, " LIMIT {limit}");
    }

    Ok(SqlQuery { sql, binds, output })
}

pub(crate) fn count(spec: &SelectSpec) -> Result<SqlQuery> {
    let mut sql = format!("SELECT COUNT(*) FROM {}", spec.table.name);
    let mut binds = Vec::new();
    push_where(&mut sql, &mut binds, spec.table, &spec.filters)?;
    Ok(SqlQuery {
        sql,
        binds,
        output: Vec::new(),
    })
}

pub(crate) fn insert(spec: &InsertSpec) -> Result<SqlQuery> {
    let returning = spec.returning.join(", ");
    let mut binds = Vec::new();

    let mut sql = if spec.row.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", spec.table.name)
    } else {
        let columns: Vec<&str> = spec.row.column_names().collect();
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ",
            spec.table.name,
            columns.join(", ")
        );
        push_row_values(&mut binds, &mut sql, spec.table, &spec.row)?;
        sql
    };
    let _ = write!(sql, " RETURNING {returning}");

    Ok(SqlQuery {
        sql,
        binds,
        output: spec.returning.clone(),
    })
}

pub(crate) fn insert_many(spec: &InsertManySpec) -> Result<SqlQuery> {
    let Some(first) = spec.rows.first() else {
        return Err(RowError::consistency("batch insert requires at least one row"));
    };
    let columns: Vec<&str> = first.column_names().collect();
    if columns.is_empty() {
        return Err(RowError::consistency(
            "batch insert requires at least one column",
        ));
    }
    for row in &spec.rows {
        let row_columns: Vec<&str> = row.column_names().collect();
        if row_columns != columns {
            return Err(RowError::consistency(
                "batch insert rows do not share a uniform column set",
            ));
        }
    }

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ",
        spec.table.name,
        columns.join(", ")
    );
    let mut binds = Vec::new();
    for (i, row) in spec.rows.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        push_row_values(&mut binds, &mut sql, spec.table, row)?;
    }
    let _ = write!(sql, " RETURNING {}", spec.returning.join(", "));

    Ok(SqlQuery {
        sql,
        binds,
        output: spec.returning.clone(),
    })
}

pub(crate) fn update(spec: &UpdateSpec) -> Result<SqlQuery> {
    if spec.values.is_empty() {
        return Err(RowError::consistency("update requires at least one value"));
    }

    let mut sql = format!("UPDATE {} SET ", spec.table.name);
    let mut binds = Vec::new();
    for (i, (column, value)) in spec.values.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        binds.push(Bind {
            kind: kind_of(spec.table, column)?,
            value: value.clone(),
        });
        let _ = write!(sql, "{column} = ${}", binds.len());
    }
    push_where(&mut sql, &mut binds, spec.table, &spec.filters)?;

    Ok(SqlQuery {
        sql,
        binds,
        output: Vec::new(),
    })
}

pub(crate) fn delete(spec: &DeleteSpec) -> Result<SqlQuery> {
    let mut sql = format!("DELETE FROM {}", spec.table.name);
    let mut binds = Vec::new();
    push_where(&mut sql, &mut binds, spec.table, &spec.filters)?;
    Ok(SqlQuery {
        sql,
        binds,
        output: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowkit_core::{col, Order};

    static EXPENSES: TableSpec = TableSpec::new(
        "expenses",
        "id",
        &[
            col("id", ColumnKind::BigInt),
            col("spent_on", ColumnKind::Date),
            col("amount", ColumnKind::BigInt),
        ],
    );

    #[test]
    fn renders_filtered_ordered_select() {
        let spec = SelectSpec::new(&EXPENSES)
            .with_filters(vec![Filter::eq("amount", 100i64)])
            .with_orders(vec![Order::desc("spent_on")])
            .with_limit(1);

        let query = select(&spec).unwrap();
        assert_eq!(
            query.sql,
            "SELECT id, spent_on, amount FROM expenses WHERE amount = $1 ORDER BY spent_on DESC LIMIT 1"
        );
        assert_eq!(query.binds.len(), 1);
        assert_eq!(query.output, ["id", "spent_on", "amount"]);
    }

    #[test]
    fn renders_membership_and_null_filters() {
        let spec = SelectSpec::new(&EXPENSES).with_filters(vec![
            Filter::is_in("id", [1i64, 2, 3]),
            Filter::is_null("spent_on"),
        ]);

        let query = select(&spec).unwrap();
        assert_eq!(
            query.sql,
            "SELECT id, spent_on, amount FROM expenses WHERE id IN ($1, $2, $3) AND spent_on IS NULL"
        );
        assert_eq!(query.binds.len(), 3);
    }

    #[test]
    fn empty_membership_matches_nothing() {
        let spec = SelectSpec::new(&EXPENSES)
            .with_filters(vec![Filter::is_in("id", Vec::<i64>::new())]);

        let query = select(&spec).unwrap();
        assert!(query.sql.ends_with("WHERE FALSE"));
        assert!(query.binds.is_empty());
    }

    #[test]
    fn null_equality_renders_is_null() {
        let spec = SelectSpec::new(&EXPENSES)
            .with_filters(vec![Filter::eq("spent_on", Value::Null)]);

        let query = select(&spec).unwrap();
        assert!(query.sql.ends_with("WHERE spent_on IS NULL"));
        assert!(query.binds.is_empty());
    }

    #[test]
    fn renders_insert_with_returning() {
        let spec = InsertSpec {
            table: &EXPENSES,
            row: Row::new().with("amount", 100i64),
            returning: vec!["id", "spent_on"],
        };

        let query = insert(&spec).unwrap();
        assert_eq!(
            query.sql,
            "INSERT INTO expenses (amount) VALUES ($1) RETURNING id, spent_on"
        );
    }

    #[test]
    fn renders_multi_row_insert_with_numbered_params() {
        let spec = InsertManySpec {
            table: &EXPENSES,
            rows: vec![
                Row::new().with("amount", 100i64),
                Row::new().with("amount", 200i64),
            ],
            returning: vec!["id"],
        };

        let query = insert_many(&spec).unwrap();
        assert_eq!(
            query.sql,
            "INSERT INTO expenses (amount) VALUES ($1), ($2) RETURNING id"
        );
        assert_eq!(query.binds.len(), 2);
    }

    #[test]
    fn non_uniform_batch_is_rejected() {
        let spec = InsertManySpec {
            table: &EXPENSES,
            rows: vec![
                Row::new().with("amount", 100i64),
                Row::new().with("amount", 200i64).with("spent_on", Value::Null),
            ],
            returning: vec!["id"],
        };

        let err = insert_many(&spec).unwrap_err();
        assert!(matches!(err, RowError::Consistency { .. }));
    }

    #[test]
    fn renders_update_keyed_by_filters() {
        let spec = UpdateSpec {
            table: &EXPENSES,
            values: Row::new().with("amount", 300i64),
            filters: vec![Filter::eq("id", 7i64)],
        };

        let query = update(&spec).unwrap();
        assert_eq!(query.sql, "UPDATE expenses SET amount = $1 WHERE id = $2");
    }

    #[test]
    fn renders_unfiltered_delete_for_match_all() {
        let spec = DeleteSpec {
            table: &EXPENSES,
            filters: vec![],
        };

        let query = delete(&spec).unwrap();
        assert_eq!(query.sql, "DELETE FROM expenses");
    }

    #[test]
    fn undeclared_columns_are_rejected() {
        let spec = SelectSpec::new(&EXPENSES).with_filters(vec![Filter::eq("bogus", 1i64)]);
        let err = select(&spec).unwrap_err();
        assert!(matches!(err, RowError::Consistency { .. }));
    }
}
