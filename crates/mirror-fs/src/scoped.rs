//! Scoped local files
//!
//! Items materialize their content as local files only for as long as the
//! caller needs them. A [`ScopedFile`] owns whatever temporary backing the
//! file has and removes it when dropped, on every exit path.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::warn;

use crate::{Error, Result};

/// A local file that lives for the duration of a caller-held guard.
pub struct ScopedFile {
    path: PathBuf,
    backing: Option<TempDir>,
}

impl ScopedFile {
    /// Wrap an existing file that must not be removed on release.
    pub fn borrowed(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backing: None,
        }
    }

    /// Wrap a file stored inside a temporary directory owned by the guard.
    pub fn in_temp_dir(dir: TempDir, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backing: Some(dir),
        }
    }

    /// Create a fresh temporary directory and return it with the path `name`
    /// would have inside it. Nothing is written.
    pub fn reserve(name: &str) -> Result<(TempDir, PathBuf)> {
        let dir = tempfile::Builder::new()
            .prefix("mirror-")
            .tempdir()
            .map_err(|e| Error::io(std::env::temp_dir(), e))?;
        let path = dir.path().join(name);
        Ok((dir, path))
    }

    /// Write `content` into a new temporary file called `name`.
    pub fn from_text(name: &str, content: &str) -> Result<Self> {
        Self::from_bytes(name, content.as_bytes())
    }

    /// Write `content` into a new temporary file called `name`.
    pub fn from_bytes(name: &str, content: &[u8]) -> Result<Self> {
        let (dir, path) = Self::reserve(name)?;
        fs::write(&path, content).map_err(|e| Error::io(&path, e))?;
        Ok(Self::in_temp_dir(dir, path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether releasing this guard deletes anything.
    pub fn is_temporary(&self) -> bool {
        self.backing.is_some()
    }
}

impl fmt::Debug for ScopedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedFile")
            .field("path", &self.path)
            .field("temporary", &self.is_temporary())
            .finish()
    }
}

impl Drop for ScopedFile {
    fn drop(&mut self) {
        if let Some(dir) = self.backing.take()
            && let Err(e) = dir.close()
        {
            warn!(path = %self.path.display(), error = %e, "failed to remove temporary file");
        }
    }
}

impl AsRef<Path> for ScopedFile {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

/// Several scoped files held open together.
///
/// Files are released in reverse acquisition order when the aggregate is
/// dropped.
#[derive(Debug, Default)]
pub struct ScopedFiles {
    files: Vec<ScopedFile>,
}

impl ScopedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `file` and return its path.
    pub fn push(&mut self, file: ScopedFile) -> PathBuf {
        let path = file.path().to_path_buf();
        self.files.push(file);
        path
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Drop for ScopedFiles {
    fn drop(&mut self) {
        while let Some(file) = self.files.pop() {
            drop(file);
        }
    }
}
