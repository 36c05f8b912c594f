//! Destination stores for Resource Mirror.
//!
//! The sync engine talks to a destination exclusively through the
//! [`Storage`] trait: existence checks, text reads for manifests, and
//! batches of uploads and deletes. [`LocalStorage`] writes into a
//! directory and rolls a failed batch back to its previous state.

pub mod error;
pub mod local;

use std::collections::HashSet;
use std::path::PathBuf;

use mirror_fs::Segments;
use tracing::warn;

pub use error::{Error, Result};
pub use local::LocalStorage;

/// One operation of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// File to upload, or `None` to delete the target
    pub local: Option<PathBuf>,
    pub target: Segments,
}

impl Change {
    pub fn upload(local: impl Into<PathBuf>, target: Segments) -> Self {
        Self {
            local: Some(local.into()),
            target,
        }
    }

    pub fn delete(target: Segments) -> Self {
        Self {
            local: None,
            target,
        }
    }

    pub fn is_delete(&self) -> bool {
        self.local.is_none()
    }
}

/// What a committed batch did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub uploaded: usize,
    pub deleted: usize,
    /// Deletes whose target did not exist
    pub skipped: usize,
    /// Changes superseded by a later change to the same target
    pub dropped: usize,
}

/// A destination the sync engine can write to.
pub trait Storage {
    /// Destination path of `segments`, including any namespace prefix.
    fn path_join(&self, segments: &[String]) -> String;

    fn file_exists(&self, file: &Segments) -> bool;

    /// Read a UTF-8 file. Fails with [`Error::NotFound`] when absent.
    fn read_text(&self, file: &Segments) -> Result<String>;

    /// Apply every change of the batch.
    fn batch_change_files(&self, changes: &[Change]) -> Result<BatchSummary>;
}

/// Drop changes superseded by a later change to the same target.
///
/// The surviving changes keep their relative order. Returns them together
/// with the number of dropped changes.
pub fn dedupe_changes(changes: &[Change]) -> (Vec<Change>, usize) {
    let mut seen: HashSet<&Segments> = HashSet::new();
    let mut kept: Vec<Change> = Vec::with_capacity(changes.len());
    for change in changes.iter().rev() {
        if seen.insert(&change.target) {
            kept.push(change.clone());
        } else {
            warn!(path = %change.target, "duplicate change in batch dropped, a later one wins");
        }
    }
    kept.reverse();
    let dropped = changes.len() - kept.len();
    (kept, dropped)
}
