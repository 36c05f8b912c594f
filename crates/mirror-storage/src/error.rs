//! Error types for mirror-storage

use std::path::PathBuf;

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Fs(#[from] mirror_fs::Error),

    #[error("File not found in storage: {path}")]
    NotFound { path: String },

    #[error("Local file {local} for {target:?} does not exist")]
    MissingSource { local: PathBuf, target: String },

    /// Failure reported by a non-filesystem store
    #[error("Storage backend error: {message}")]
    Backend { message: String },
}
