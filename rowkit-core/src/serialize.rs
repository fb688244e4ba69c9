//! Bidirectional conversion between entities and rows.
//!
//! Serialization goes through serde: an entity becomes a JSON object, each
//! field is refined to a typed [`Value`] by its column's declared kind, and
//! rows come back the same way in reverse through the entity's validating
//! deserializer.

use std::any::type_name;

use serde_json::Value as JsonValue;

use crate::entity::Entity;
use crate::error::{Result, RowError};
use crate::row::Row;
use crate::table::TableSpec;
use crate::value::Value;

/// Serialize an entity into a row for the given table.
///
/// The identifier column is never part of the payload (inserts let storage
/// assign it, updates key on it separately). Every serialized field must
/// have a declared column; an unknown field means the model and the table
/// spec disagree.
pub fn to_row<E: Entity>(entity: &E, table: &TableSpec) -> Result<Row> {
    let json =
        serde_json::to_value(entity).map_err(|e| RowError::validation(type_name::<E>(), e))?;
    let JsonValue::Object(fields) = json else {
        return Err(RowError::consistency(format!(
            "{} does not serialize to an object",
            type_name::<E>()
        )));
    };

    let mut row = Row::new();
    for (field, value) in fields {
        if field == table.id_column {
            continue;
        }
        let Some(column) = table.column(&field) else {
            return Err(RowError::consistency(format!(
                "field `{field}` has no declared column in table `{}`",
                table.name
            )));
        };
        row.insert(field, Value::from_json(column.name, column.kind, value)?);
    }
    Ok(row)
}

/// Deserialize a result row into an entity through its validating
/// constructor.
pub fn from_row<E: Entity>(row: Row) -> Result<E> {
    serde_json::from_value(row.into_json())
        .map_err(|e| RowError::validation(type_name::<E>(), e))
}

/// Merge a row over an entity in place, re-running validation.
///
/// Used for insert writeback (storage-assigned id and defaulted columns)
/// and for applying partial updates onto the in-memory object.
pub fn apply_row<E: Entity>(entity: &mut E, row: &Row) -> Result<()> {
    let mut json =
        serde_json::to_value(&*entity).map_err(|e| RowError::validation(type_name::<E>(), e))?;
    let JsonValue::Object(fields) = &mut json else {
        return Err(RowError::consistency(format!(
            "{} does not serialize to an object",
            type_name::<E>()
        )));
    };

    for (column, value) in row.iter() {
        fields.insert(column.to_string(), value.clone().into_json());
    }

    *entity = serde_json::from_value(json).map_err(|e| RowError::validation(type_name::<E>(), e))?;
    Ok(())
}

/// An insert payload plus the columns storage must hand back.
#[derive(Debug, Clone)]
pub struct InsertPayload {
    pub row: Row,
    /// Identifier column plus every deferred column.
    pub returning: Vec<&'static str>,
    /// Ignore-on-insert columns left unset on this entity, in configured
    /// order; storage defaults apply and are written back.
    pub deferred: Vec<&'static str>,
}

/// Build the insert payload for an entity.
///
/// A configured ignore-on-insert column is dropped from the payload iff its
/// value is unset, so the storage-side default applies. Dropped columns are
/// reported as `deferred`; batches must agree on them column-by-column.
pub fn insert_payload<E: Entity>(
    entity: &E,
    table: &TableSpec,
    ignore_on_insert: &'static [&'static str],
) -> Result<InsertPayload> {
    let mut row = to_row(entity, table)?;

    let mut deferred = Vec::new();
    for &column in ignore_on_insert {
        match row.get(column) {
            Some(value) if value.is_null() => {
                row.remove(column);
                deferred.push(column);
            }
            Some(_) => {}
            None => {
                return Err(RowError::consistency(format!(
                    "ignore-on-insert column `{column}` is not a field of {}",
                    type_name::<E>()
                )));
            }
        }
    }

    let mut returning = vec![table.id_column];
    returning.extend(&deferred);

    Ok(InsertPayload {
        row,
        returning,
        deferred,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::col;
    use crate::value::ColumnKind;
    use chrono::NaiveDate;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Expense {
        id: Option<i64>,
        spent_on: NaiveDate,
        amount: i64,
        note: Option<String>,
    }

    impl Entity for Expense {
        fn id(&self) -> Option<i64> {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = Some(id);
        }
    }

    static EXPENSES: TableSpec = TableSpec::new(
        "expenses",
        "id",
        &[
            col("id", ColumnKind::BigInt),
            col("spent_on", ColumnKind::Date),
            col("amount", ColumnKind::BigInt),
            col("note", ColumnKind::Text),
        ],
    );

    fn expense(amount: i64) -> Expense {
        Expense {
            id: None,
            spent_on: NaiveDate::from_ymd_opt(2019, 1, 3).unwrap(),
            amount,
            note: None,
        }
    }

    #[test]
    fn to_row_excludes_the_identifier() {
        let mut e = expense(100);
        e.id = Some(7);

        let row = to_row(&e, &EXPENSES).unwrap();
        assert!(!row.contains("id"));
        assert_eq!(row.get("amount"), Some(&Value::BigInt(100)));
        assert_eq!(
            row.get("spent_on"),
            Some(&Value::Date(NaiveDate::from_ymd_opt(2019, 1, 3).unwrap()))
        );
    }

    #[test]
    fn row_round_trip_preserves_fields() {
        let e = expense(250);
        let row = to_row(&e, &EXPENSES).unwrap();
        let back: Expense = from_row(row).unwrap();

        assert_eq!(back, e);
    }

    #[test]
    fn from_row_rejects_invalid_values() {
        let row = Row::new()
            .with("spent_on", "not-a-date")
            .with("amount", 10i64);

        let err = from_row::<Expense>(row).unwrap_err();
        assert!(matches!(err, RowError::Validation { .. }));
    }

    #[test]
    fn insert_payload_defers_unset_ignore_columns() {
        let payload = insert_payload(&expense(100), &EXPENSES, &["note"]).unwrap();

        assert!(!payload.row.contains("note"));
        assert_eq!(payload.deferred, ["note"]);
        assert_eq!(payload.returning, ["id", "note"]);
    }

    #[test]
    fn insert_payload_keeps_set_ignore_columns() {
        let mut e = expense(100);
        e.note = Some("cash".into());

        let payload = insert_payload(&e, &EXPENSES, &["note"]).unwrap();
        assert_eq!(payload.row.get("note"), Some(&Value::Text("cash".into())));
        assert!(payload.deferred.is_empty());
        assert_eq!(payload.returning, ["id"]);
    }

    #[test]
    fn unknown_ignore_column_fails_fast() {
        let err = insert_payload(&expense(100), &EXPENSES, &["bogus"]).unwrap_err();
        assert!(matches!(err, RowError::Consistency { .. }));
    }

    #[test]
    fn apply_row_writes_returned_columns_back() {
        let mut e = expense(100);
        let returned = Row::new().with("id", 3i64).with("note", "defaulted");

        apply_row(&mut e, &returned).unwrap();
        assert_eq!(e.id, Some(3));
        assert_eq!(e.note.as_deref(), Some("defaulted"));
        assert_eq!(e.amount, 100);
    }
}
