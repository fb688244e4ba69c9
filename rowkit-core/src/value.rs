//! Column values exchanged with storage executors.
//!
//! A [`Value`] keeps dates, timestamps and UUIDs as typed data so executors
//! can bind them with the driver's native encodings; [`Value::into_json`]
//! produces the primitive-safe form used for entity deserialization and the
//! file-backed repository.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{Result, RowError};

/// Declared type of a table column, driving typed (de)serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Bool,
    BigInt,
    Double,
    Text,
    Uuid,
    Date,
    Timestamp,
    Json,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::BigInt => "bigint",
            Self::Double => "double",
            Self::Text => "text",
            Self::Uuid => "uuid",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
            Self::Json => "json",
        }
    }
}

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    BigInt(i64),
    Double(f64),
    Text(String),
    Uuid(Uuid),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Json(JsonValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Refine a serde-produced JSON value into a typed [`Value`] using the
    /// column's declared kind.
    ///
    /// A JSON null is accepted for every kind. Anything else must fit the
    /// declared kind, otherwise the model and the table disagree and the
    /// conversion fails with [`RowError::Consistency`].
    pub fn from_json(column: &str, kind: ColumnKind, json: JsonValue) -> Result<Self> {
        if json.is_null() {
            return Ok(Self::Null);
        }

        let mismatch = |json: &JsonValue| {
            RowError::consistency(format!(
                "column `{column}` expects {}, got incompatible value {json}",
                kind.as_str()
            ))
        };

        match kind {
            ColumnKind::Bool => match json {
                JsonValue::Bool(b) => Ok(Self::Bool(b)),
                other => Err(mismatch(&other)),
            },
            ColumnKind::BigInt => match json.as_i64() {
                Some(n) => Ok(Self::BigInt(n)),
                None => Err(mismatch(&json)),
            },
            ColumnKind::Double => match json.as_f64() {
                Some(f) => Ok(Self::Double(f)),
                None => Err(mismatch(&json)),
            },
            ColumnKind::Text => match json {
                JsonValue::String(s) => Ok(Self::Text(s)),
                other => Err(mismatch(&other)),
            },
            ColumnKind::Uuid => match &json {
                JsonValue::String(s) => match Uuid::parse_str(s) {
                    Ok(id) => Ok(Self::Uuid(id)),
                    Err(_) => Err(mismatch(&json)),
                },
                _ => Err(mismatch(&json)),
            },
            ColumnKind::Date => match &json {
                JsonValue::String(s) => match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                    Ok(d) => Ok(Self::Date(d)),
                    Err(_) => Err(mismatch(&json)),
                },
                _ => Err(mismatch(&json)),
            },
            ColumnKind::Timestamp => match &json {
                JsonValue::String(s) => match DateTime::parse_from_rfc3339(s) {
                    Ok(ts) => Ok(Self::Timestamp(ts.with_timezone(&Utc))),
                    Err(_) => Err(mismatch(&json)),
                },
                _ => Err(mismatch(&json)),
            },
            ColumnKind::Json => Ok(Self::Json(json)),
        }
    }

    /// Convert to the primitive-safe JSON form (dates become strings).
    pub fn into_json(self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(b),
            Self::BigInt(n) => JsonValue::from(n),
            Self::Double(f) => serde_json::Number::from_f64(f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::Text(s) => JsonValue::String(s),
            Self::Uuid(id) => JsonValue::String(id.to_string()),
            Self::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
            Self::Timestamp(ts) => JsonValue::String(ts.to_rfc3339()),
            Self::Json(json) => json,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::BigInt(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::BigInt(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        Self::Json(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(inner) => inner.into(),
            None => Self::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn refines_typed_values_from_json() {
        let date = Value::from_json("spent_on", ColumnKind::Date, json!("2019-01-03")).unwrap();
        assert_eq!(
            date,
            Value::Date(NaiveDate::from_ymd_opt(2019, 1, 3).unwrap())
        );

        let ts =
            Value::from_json("created_at", ColumnKind::Timestamp, json!("2020-01-04T09:10:11Z"))
                .unwrap();
        assert!(matches!(ts, Value::Timestamp(_)));

        let n = Value::from_json("amount", ColumnKind::BigInt, json!(100)).unwrap();
        assert_eq!(n, Value::BigInt(100));
    }

    #[test]
    fn null_is_accepted_for_every_kind() {
        for kind in [ColumnKind::Bool, ColumnKind::Date, ColumnKind::Json] {
            assert_eq!(
                Value::from_json("c", kind, JsonValue::Null).unwrap(),
                Value::Null
            );
        }
    }

    #[test]
    fn kind_mismatch_is_a_consistency_error() {
        let err = Value::from_json("amount", ColumnKind::BigInt, json!("nope")).unwrap_err();
        assert!(matches!(err, RowError::Consistency { .. }));
        assert!(err.to_string().contains("amount"));
    }

    #[test]
    fn json_round_trip_keeps_primitive_form() {
        let date = Value::Date(NaiveDate::from_ymd_opt(2019, 1, 3).unwrap());
        assert_eq!(date.into_json(), json!("2019-01-03"));

        let id = Uuid::nil();
        assert_eq!(
            Value::Uuid(id).into_json(),
            json!("00000000-0000-0000-0000-000000000000")
        );
    }
}
