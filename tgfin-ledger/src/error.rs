use std::path::PathBuf;

use thiserror::Error;

/// Failures at the persisted-state boundary
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// File exists but is not a store we understand
    #[error("malformed store file: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("cannot encode store: {0}")]
    Encode(#[source] serde_json::Error),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}
