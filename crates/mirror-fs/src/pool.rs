//! Staging pool for files queued for a later batch
//!
//! When changes are accumulated across directories, the scoped files that
//! produced them are released long before the batch is submitted. The pool
//! keeps private copies until the batch has been flushed.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::{Error, Result, io};

/// A private temporary directory owning copies of staged files.
#[derive(Debug)]
pub struct FilePool {
    dir: TempDir,
    count: usize,
}

fn new_pool_dir() -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix("mirror-pool-")
        .tempdir()
        .map_err(|e| Error::io(std::env::temp_dir(), e))
}

impl FilePool {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: new_pool_dir()?,
            count: 0,
        })
    }

    /// Copy `path` into the pool and return the location of the copy.
    ///
    /// Each staged file gets its own slot directory, so files with the same
    /// base name never collide and keep their original name.
    pub fn put_file(&mut self, path: &Path) -> Result<PathBuf> {
        let slot = self.dir.path().join(format!("{:08}", self.count));
        fs::create_dir_all(&slot).map_err(|e| Error::io(&slot, e))?;

        let name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "unnamed_file".into());
        let staged = slot.join(name);
        io::copy_path(path, &staged)?;

        self.count += 1;
        Ok(staged)
    }

    /// Discard every staged copy.
    pub fn cleanup(&mut self) -> Result<()> {
        let fresh = new_pool_dir()?;
        let old = std::mem::replace(&mut self.dir, fresh);
        self.count = 0;
        let old_path = old.path().to_path_buf();
        old.close().map_err(|e| Error::io(old_path, e))
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
