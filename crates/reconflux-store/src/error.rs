use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error outside of the guarded write path (directory creation, reads).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Writing the primary file failed; the previous content was restored from backup.
    #[error("store write failed, previous state restored: {source}")]
    WriteFailed {
        #[source]
        source: std::io::Error,
    },

    /// Writing failed and restoring the backup failed too. On-disk state is unknown.
    #[error("store write failed ({write}) and backup restore failed ({restore})")]
    Unrecoverable {
        write: std::io::Error,
        restore: std::io::Error,
    },

    #[error("key '{0}' not found in store")]
    KeyNotFound(String),

    /// A path segment exists but does not hold the expected container type.
    #[error("store path '{path}' is not a {expected}")]
    UnexpectedShape { path: String, expected: &'static str },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether on-disk consistency can no longer be guaranteed.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Unrecoverable { .. })
    }
}
