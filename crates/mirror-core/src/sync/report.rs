//! Sync run reports

use serde::Serialize;

/// What happened (or would happen) in one directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryReport {
    pub path: String,
    /// Items loaded and uploaded
    pub uploaded: Vec<String>,
    /// Stale files and folders removed
    pub deleted: Vec<String>,
    /// Items whose previous upload is still current
    pub reused: Vec<String>,
    /// Whether the manifest content differs from the stored one
    pub manifest_changed: bool,
}

impl DirectoryReport {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// An item skipped under [`ItemErrorPolicy::Skip`](crate::ItemErrorPolicy::Skip).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub path: String,
    pub kind: String,
    pub error: String,
}

/// Summary of a sync run or plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Nothing was written to the storage
    pub dry_run: bool,
    pub folders: usize,
    pub leaves: usize,
    /// Directories in the order they were completed (children first)
    pub directories: Vec<DirectoryReport>,
    pub failures: Vec<ItemFailure>,
    /// Number of batches committed to the storage
    pub batches: usize,
}

impl SyncReport {
    pub fn directory(&self, path: &str) -> Option<&DirectoryReport> {
        self.directories.iter().find(|d| d.path == path)
    }

    pub fn uploaded(&self) -> usize {
        self.directories.iter().map(|d| d.uploaded.len()).sum()
    }

    pub fn deleted(&self) -> usize {
        self.directories.iter().map(|d| d.deleted.len()).sum()
    }

    pub fn reused(&self) -> usize {
        self.directories.iter().map(|d| d.reused.len()).sum()
    }

    /// No item was reloaded, nothing deleted and every manifest unchanged.
    pub fn is_noop(&self) -> bool {
        self.uploaded() == 0
            && self.deleted() == 0
            && self.directories.iter().all(|d| !d.manifest_changed)
    }
}
