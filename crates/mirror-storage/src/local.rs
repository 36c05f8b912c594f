//! Local filesystem storage with all-or-nothing batches
//!
//! Before a batch is applied, every path it touches is copied into a private
//! snapshot directory. If any change fails the snapshot is written back, so
//! the destination ends up exactly as it was before the batch.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use mirror_fs::io::{copy_atomic, copy_path, read_text, remove_path};
use mirror_fs::{PathInput, Segments, normalize};
use tempfile::TempDir;
use tracing::{debug, error, info};

use crate::{BatchSummary, Change, Error, Result, Storage, dedupe_changes};

/// Stores files below `root`, optionally inside a namespace directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    namespace: Segments,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            namespace: Segments::root(),
        }
    }

    /// Place everything below `namespace` inside the root directory.
    pub fn with_namespace(mut self, namespace: impl Into<PathInput>) -> Result<Self> {
        self.namespace = normalize(namespace)?;
        Ok(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn namespace(&self) -> &Segments {
        &self.namespace
    }

    /// Directory all targets are resolved against.
    fn base(&self) -> PathBuf {
        self.namespace
            .iter()
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    fn resolve(&self, segments: &[String]) -> PathBuf {
        segments
            .iter()
            .fold(self.base(), |path, segment| path.join(segment))
    }

    /// Make sure nothing blocks writing a file at `target`: an existing
    /// directory at the target or a file where a parent directory belongs.
    fn make_room(&self, target: &Segments) -> Result<()> {
        let mut current = self.base();
        for (index, segment) in target.iter().enumerate() {
            current.push(segment);
            let is_target = index + 1 == target.len();
            match fs::symlink_metadata(&current) {
                Ok(meta) if is_target && meta.is_dir() => {
                    debug!(path = %current.display(), "replacing directory with a file");
                    remove_path(&current)?;
                }
                Ok(meta) if !is_target && !meta.is_dir() => {
                    debug!(path = %current.display(), "replacing file with a directory");
                    remove_path(&current)?;
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(mirror_fs::Error::io(&current, e).into()),
            }
        }
        Ok(())
    }

    fn apply(&self, changes: &[Change]) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();
        for change in changes {
            let target = self.resolve(change.target.as_slice());
            match &change.local {
                Some(local) => {
                    let meta = fs::metadata(local).map_err(|_| Error::MissingSource {
                        local: local.clone(),
                        target: change.target.to_path_string(),
                    })?;
                    self.make_room(&change.target)?;
                    if meta.is_dir() {
                        copy_path(local, &target)?;
                    } else {
                        copy_atomic(local, &target)?;
                    }
                    debug!(path = %change.target, "uploaded");
                    summary.uploaded += 1;
                }
                None => {
                    if remove_path(&target)? {
                        debug!(path = %change.target, "deleted");
                        summary.deleted += 1;
                    } else {
                        debug!(path = %change.target, "nothing to delete");
                        summary.skipped += 1;
                    }
                }
            }
        }
        Ok(summary)
    }
}

/// Saved state of one protected path.
#[derive(Debug)]
struct SavedPath {
    path: PathBuf,
    /// Copy of the previous content; `None` when the path did not exist
    copy: Option<PathBuf>,
}

/// Pre-batch copies of every path a batch may modify.
#[derive(Debug)]
struct Snapshot {
    dir: TempDir,
    saved: Vec<SavedPath>,
}

impl Snapshot {
    fn capture(storage: &LocalStorage, changes: &[Change]) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("mirror-snapshot-")
            .tempdir()
            .map_err(|e| mirror_fs::Error::io(std::env::temp_dir(), e))?;

        let mut snapshot = Self {
            dir,
            saved: Vec::with_capacity(changes.len()),
        };
        for change in changes {
            snapshot.protect(storage, &change.target)?;
        }
        Ok(snapshot)
    }

    /// Save the first path along `target` that a change could alter: the
    /// target itself, a file standing in for a parent directory, or the
    /// topmost directory the change would create.
    fn protect(&mut self, storage: &LocalStorage, target: &Segments) -> Result<()> {
        let mut current = storage.base();
        for (index, segment) in target.iter().enumerate() {
            current.push(segment);
            let is_target = index + 1 == target.len();
            match fs::symlink_metadata(&current) {
                Ok(meta) if is_target || !meta.is_dir() => return self.save(current),
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    self.saved.push(SavedPath {
                        path: current,
                        copy: None,
                    });
                    return Ok(());
                }
                Err(e) => return Err(mirror_fs::Error::io(&current, e).into()),
            }
        }
        Ok(())
    }

    fn save(&mut self, path: PathBuf) -> Result<()> {
        let slot = self.dir.path().join(self.saved.len().to_string());
        let name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "entry".into());
        let copy = slot.join(name);
        copy_path(&path, &copy)?;
        self.saved.push(SavedPath {
            path,
            copy: Some(copy),
        });
        Ok(())
    }

    /// Put every protected path back, latest first.
    fn restore(&self) -> Result<()> {
        for saved in self.saved.iter().rev() {
            match remove_path(&saved.path) {
                Ok(_) => {}
                Err(_) if !saved.path.exists() => {}
                Err(e) => return Err(e.into()),
            }
            if let Some(copy) = &saved.copy {
                copy_path(copy, &saved.path)?;
            }
        }
        Ok(())
    }
}

impl Storage for LocalStorage {
    fn path_join(&self, segments: &[String]) -> String {
        self.resolve(segments).to_string_lossy().into_owned()
    }

    fn file_exists(&self, file: &Segments) -> bool {
        self.resolve(file.as_slice()).is_file()
    }

    fn read_text(&self, file: &Segments) -> Result<String> {
        let path = self.resolve(file.as_slice());
        if !path.is_file() {
            return Err(Error::NotFound {
                path: file.to_path_string(),
            });
        }
        Ok(read_text(&path)?)
    }

    fn batch_change_files(&self, changes: &[Change]) -> Result<BatchSummary> {
        let (changes, dropped) = dedupe_changes(changes);
        if changes.is_empty() {
            return Ok(BatchSummary {
                dropped,
                ..BatchSummary::default()
            });
        }

        let snapshot = Snapshot::capture(self, &changes)?;
        match self.apply(&changes) {
            Ok(summary) => {
                let summary = BatchSummary { dropped, ..summary };
                info!(
                    uploaded = summary.uploaded,
                    deleted = summary.deleted,
                    skipped = summary.skipped,
                    "batch committed"
                );
                Ok(summary)
            }
            Err(err) => {
                if let Err(restore_err) = snapshot.restore() {
                    error!(error = %restore_err, "failed to roll back batch");
                } else {
                    info!(changes = changes.len(), error = %err, "batch rolled back");
                }
                Err(err)
            }
        }
    }
}
