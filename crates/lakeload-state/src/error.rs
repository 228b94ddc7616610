//! Checkpoint store error types.

use lakeload_types::error::EtlError;

/// Errors produced by [`CheckpointStore`](crate::CheckpointStore) operations.
///
/// "Not found" is never an error here: backends report it as `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Object storage failure other than a missing object.
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored checkpoint exists but cannot be read back.
    #[error("corrupt checkpoint at '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// Internal mutex was poisoned by a panicked thread.
    #[error("state backend lock poisoned")]
    LockPoisoned,
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StateError>;

impl From<StateError> for EtlError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::Corrupt { .. } => EtlError::Parse(err.to_string()),
            other => EtlError::transient_io("checkpoint store", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakeload_types::error::ErrorCategory;

    #[test]
    fn sqlite_error_displays_context() {
        let inner = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(1),
            Some("table not found".into()),
        );
        let err = StateError::Sqlite(inner);
        let msg = err.to_string();
        assert!(msg.contains("sqlite"), "got: {msg}");
    }

    #[test]
    fn lock_poisoned_displays() {
        let err = StateError::LockPoisoned;
        assert_eq!(err.to_string(), "state backend lock poisoned");
    }

    #[test]
    fn io_error_maps_to_transient_io() {
        let inner = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let etl: EtlError = StateError::Io(inner).into();
        assert_eq!(etl.category(), ErrorCategory::TransientIo);
    }

    #[test]
    fn corrupt_maps_to_parse() {
        let etl: EtlError = StateError::Corrupt {
            key: "last_load_time.txt".into(),
            reason: "not a timestamp".into(),
        }
        .into();
        assert_eq!(etl.category(), ErrorCategory::Parse);
        assert!(etl.to_string().contains("last_load_time.txt"));
    }
}
