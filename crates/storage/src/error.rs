//! Storage error types.

use std::path::PathBuf;

/// Error from the key-value index.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Backend failure.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A stored value could not be decoded.
    #[error("Corrupt record {key}: {reason}")]
    CorruptRecord { key: String, reason: String },
}

impl StorageError {
    pub(crate) fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        StorageError::CorruptRecord {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Error reading or writing checkpoint files.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint file {} is missing", .0.display())]
    Missing(PathBuf),

    /// The trailing integrity tag is absent or does not match the contents.
    #[error("checkpoint file {} failed hash verification", .0.display())]
    HashMismatch(PathBuf),

    #[error("malformed line {line} in {}: {reason}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

impl CheckpointError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            CheckpointError::Missing(path.to_path_buf())
        } else {
            CheckpointError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    /// True if the files exist but their contents cannot be trusted.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            CheckpointError::HashMismatch(_) | CheckpointError::Malformed { .. }
        )
    }
}
