//! Error types for mirror-resource

use std::path::PathBuf;

/// Result type for mirror-resource operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building sync trees or fetching items
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Filesystem or segmentation error from mirror-fs
    #[error(transparent)]
    Fs(#[from] mirror_fs::Error),

    #[error("Unknown sync item kind: {kind:?}")]
    UnknownKind { kind: String },

    #[error("Sync item kind {kind:?} is already registered")]
    DuplicateKind { kind: String },

    #[error("Sync item kind {kind:?} is reserved, please use another one")]
    ReservedKind { kind: String },

    #[error("Sync item kind must not be empty")]
    EmptyKind,

    #[error("Malformed {kind:?} declaration at {path:?}: {reason}")]
    MalformedDeclaration {
        kind: String,
        path: String,
        reason: String,
    },

    #[error("Sync position {path:?} conflicts with an existing {existing}: unable to place {incoming}")]
    PathConflict {
        path: String,
        existing: &'static str,
        incoming: String,
    },

    #[error("Unable to set metadata at {path:?} below the item at {leaf:?}")]
    MetadataThroughLeaf { path: String, leaf: String },

    #[error("Operation {operation:?} failed at {path:?}: {reason}")]
    Operation {
        operation: String,
        path: String,
        reason: String,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {method} {url} returned status {status}")]
    HttpStatus {
        method: &'static str,
        url: String,
        status: u16,
    },

    #[error("Downloaded file from {url} is not of expected size: {expected} expected but {actual} found")]
    SizeMismatch {
        url: String,
        expected: u64,
        actual: u64,
    },

    #[error("Local source not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("Invalid version pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Generator for {path:?} failed: {reason}")]
    Generator { path: String, reason: String },
}

impl Error {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { source, .. } => source.is_timeout() || source.is_connect(),
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
