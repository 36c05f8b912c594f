//! Error types for mirror-core

/// Result type for mirror-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while synchronizing a resource
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Fs(#[from] mirror_fs::Error),

    /// Declaration, tree or registry error from mirror-resource
    #[error(transparent)]
    Resource(#[from] mirror_resource::Error),

    #[error(transparent)]
    Storage(#[from] mirror_storage::Error),

    #[error("Invalid manifest for {path:?}: {message}")]
    Manifest { path: String, message: String },

    #[error("Item name {name:?} in {path:?} is reserved for the directory manifest")]
    ReservedName { path: String, name: String },

    /// A single item could not be probed or loaded
    #[error("Sync item {path:?} failed: {source}")]
    Item {
        path: String,
        #[source]
        source: mirror_resource::Error,
    },

    #[error("Probe for sync item {path:?} panicked")]
    ProbePanicked { path: String },

    #[error("Invalid configuration: {message}")]
    Config { message: String },
}
