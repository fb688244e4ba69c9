/// Structured error types for rowkit-core.
///
/// Uses `thiserror` for better API surface and error composition.
/// Storage collaborators report failures through [`RowError::Storage`];
/// the underlying driver error stays reachable via `source()` and is
/// never wrapped with extra meaning or retried.
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Boxed pass-through error from a storage collaborator.
pub type StorageError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for rowkit operations
#[derive(Error, Debug)]
pub enum RowError {
    /// Row rejected by the entity's deserializer
    #[error("validation failed for {entity}: {source}")]
    Validation {
        entity: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Batch or configuration contradicts itself (mixed ignore-on-insert
    /// sets, ambiguous delete intent, missing identifier)
    #[error("consistency error: {reason}")]
    Consistency { reason: String },

    /// File-backed read of a missing file
    #[error("file not found: {path:?}")]
    NotFound { path: PathBuf },

    /// JSON parsing or serialization failed for a file payload
    #[error("JSON error at {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// Unmodified failure from the storage collaborator
    #[error("storage error: {source}")]
    Storage {
        #[source]
        source: StorageError,
    },
}

/// Result type alias for rowkit operations
pub type Result<T> = std::result::Result<T, RowError>;

impl RowError {
    /// Create a validation error for an entity type
    pub fn validation(entity: &'static str, source: serde_json::Error) -> Self {
        Self::Validation { entity, source }
    }

    /// Create a consistency error
    pub fn consistency(reason: impl Into<String>) -> Self {
        Self::Consistency {
            reason: reason.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a JSON error with file context
    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    /// Wrap a storage collaborator failure unchanged
    pub fn storage(source: impl Into<StorageError>) -> Self {
        Self::Storage {
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RowError::consistency("cannot update an entity without an identifier");
        assert_eq!(
            err.to_string(),
            "consistency error: cannot update an entity without an identifier"
        );

        let err = RowError::not_found("/tmp/missing.json");
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let row_err: RowError = io_err.into();

        assert!(matches!(row_err, RowError::Io { .. }));
    }

    #[test]
    fn test_storage_source_is_reachable() {
        let inner = io::Error::new(io::ErrorKind::ConnectionReset, "connection reset");
        let err = RowError::storage(inner);

        let source = std::error::Error::source(&err).expect("storage error has a source");
        assert!(source.to_string().contains("connection reset"));
    }
}
