//! State persistence error types.

use std::path::PathBuf;

/// Errors produced by [`StateBackend`](crate::StateBackend) and
/// [`CheckpointStore`](crate::CheckpointStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// File-system I/O failure (e.g. creating the state directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted document could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The final rename of an atomic write failed.
    #[error("failed to persist {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Internal mutex was poisoned by a panicked thread.
    #[error("state backend lock poisoned")]
    LockPoisoned,
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_error_displays_context() {
        let inner = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(1),
            Some("table not found".into()),
        );
        let err = StateError::Sqlite(inner);
        assert!(err.to_string().contains("sqlite"), "got: {err}");
    }

    #[test]
    fn lock_poisoned_displays() {
        assert_eq!(StateError::LockPoisoned.to_string(), "state backend lock poisoned");
    }

    #[test]
    fn persist_error_names_the_path() {
        let err = StateError::Persist {
            path: PathBuf::from("/tmp/state/manifest.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("manifest.json"));
    }
}
