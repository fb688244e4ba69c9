//! Static descriptors for storage targets.

use crate::value::ColumnKind;

/// A typed column declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
}

/// Shorthand for declaring a [`ColumnSpec`] in a table literal.
pub const fn col(name: &'static str, kind: ColumnKind) -> ColumnSpec {
    ColumnSpec { name, kind }
}

/// Describes one table: its name, identifier column, and typed columns.
///
/// The column list includes the identifier column. Declared kinds drive
/// typed serialization, so an entity field only round-trips through a
/// column that carries the matching kind.
///
/// ```ignore
/// static EXPENSES: TableSpec = TableSpec::new(
///     "expenses",
///     "id",
///     &[
///         col("id", ColumnKind::BigInt),
///         col("spent_on", ColumnKind::Date),
///         col("amount", ColumnKind::BigInt),
///     ],
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub id_column: &'static str,
    pub columns: &'static [ColumnSpec],
}

impl TableSpec {
    pub const fn new(
        name: &'static str,
        id_column: &'static str,
        columns: &'static [ColumnSpec],
    ) -> Self {
        Self {
            name,
            id_column,
            columns,
        }
    }

    /// Look up a column declaration by name.
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// All declared column names, identifier included.
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|column| column.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn looks_up_columns_by_name() {
        assert_eq!(EXPENSES.column("amount").unwrap().kind, ColumnKind::BigInt);
        assert!(EXPENSES.column("missing").is_none());
    }

    #[test]
    fn column_names_include_the_identifier() {
        let names: Vec<_> = EXPENSES.column_names().collect();
        assert_eq!(names, ["id", "spent_on", "amount"]);
    }
}
