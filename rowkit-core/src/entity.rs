//! Contract for records a repository can persist.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A validated record with a unique `i64` identifier.
///
/// Serialization and validation are delegated to the type's serde
/// implementation: writing an entity serializes it, reading a row runs it
/// through the type's deserializer, so constraints expressed there
/// (required fields, typed fields, custom `deserialize_with`) gate what can
/// come back from storage.
///
/// The identifier is `None` until the entity is first inserted and must be
/// serialized under the bound table's id column name.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct Expense {
///     id: Option<i64>,
///     spent_on: NaiveDate,
///     amount: i64,
/// }
///
/// impl Entity for Expense {
///     fn id(&self) -> Option<i64> {
///         self.id
///     }
///
///     fn set_id(&mut self, id: i64) {
///         self.id = Some(id);
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    /// Identifier value, `None` before the first successful insert.
    fn id(&self) -> Option<i64>;

    /// Adopt a storage-assigned identifier.
    fn set_id(&mut self, id: i64);
}
