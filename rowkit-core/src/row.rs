//! Plain column/value rows.

use std::collections::BTreeMap;

use serde_json::{Map, Value as JsonValue};

use crate::value::Value;

/// An ordered mapping of column name to [`Value`].
///
/// Rows are what executors consume (insert/update payloads) and produce
/// (query results). Column order is deterministic (sorted by name) so the
/// payloads of a batch render to a uniform column list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, for literal rows in call sites and tests.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    /// Insert a value, returning the previous one if the column was set.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.columns.insert(column.into(), value.into())
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.columns.remove(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Convert to a JSON object with primitive-safe values.
    pub fn into_json(self) -> JsonValue {
        let mut map = Map::new();
        for (column, value) in self.columns {
            map.insert(column, value.into_json());
        }
        JsonValue::Object(map)
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_inserts_and_reads_back() {
        let row = Row::new().with("title", "x").with("amount", 100i64);

        assert_eq!(row.get("title"), Some(&Value::Text("x".into())));
        assert_eq!(row.get("amount"), Some(&Value::BigInt(100)));
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn into_json_produces_primitive_object() {
        let row = Row::new().with("flag", true).with("note", Value::Null);

        assert_eq!(row.into_json(), json!({ "flag": true, "note": null }));
    }

    #[test]
    fn column_order_is_deterministic() {
        let a = Row::new().with("b", 1i64).with("a", 2i64);
        let b = Row::new().with("a", 2i64).with("b", 1i64);

        let names_a: Vec<_> = a.column_names().collect();
        let names_b: Vec<_> = b.column_names().collect();
        assert_eq!(names_a, names_b);
    }
}
