//! Atomic I/O operations with file locking

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use walkdir::WalkDir;

use crate::{Error, Result};

/// Sibling path used while a replacement for `path` is being written.
fn temp_sibling(path: &Path) -> PathBuf {
    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        std::process::id()
    );
    path.with_file_name(temp_name)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    Ok(())
}

/// Move a fully written temp file over `target`, cleaning up on failure.
fn commit_temp(temp_path: &Path, target: &Path) -> Result<()> {
    if let Err(e) = fs::rename(temp_path, target) {
        let _ = fs::remove_file(temp_path);
        return Err(Error::io(target, e));
    }
    Ok(())
}

/// Write content atomically to a file with locking.
///
/// Uses write-to-temp-then-rename so readers never observe a partial file.
/// Acquires an advisory lock to prevent concurrent access.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    ensure_parent(path)?;
    let temp_path = temp_sibling(path);

    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| Error::io(&temp_path, e))?;

    temp_file.lock_exclusive().map_err(|_| Error::LockFailed {
        path: path.to_path_buf(),
    })?;

    let written = temp_file
        .write_all(content)
        .and_then(|_| temp_file.sync_all());
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::io(&temp_path, e));
    }

    temp_file.unlock().map_err(|_| Error::LockFailed {
        path: path.to_path_buf(),
    })?;
    drop(temp_file);

    commit_temp(&temp_path, path)
}

/// Copy `source` over `target` atomically.
///
/// The copy is staged next to the target and renamed into place, so a
/// failed copy never leaves a truncated destination file.
pub fn copy_atomic(source: &Path, target: &Path) -> Result<u64> {
    ensure_parent(target)?;
    let temp_path = temp_sibling(target);

    let mut reader = File::open(source).map_err(|e| Error::io(source, e))?;
    let mut temp_file = File::create(&temp_path).map_err(|e| Error::io(&temp_path, e))?;
    temp_file.lock_exclusive().map_err(|_| Error::LockFailed {
        path: target.to_path_buf(),
    })?;

    let copied = std::io::copy(&mut reader, &mut temp_file).and_then(|n| {
        temp_file.sync_all()?;
        Ok(n)
    });
    let copied = match copied {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&temp_path);
            return Err(Error::io(source, e));
        }
    };
    drop(temp_file);

    commit_temp(&temp_path, target)?;
    Ok(copied)
}

/// Read text content from a file.
pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

/// Write text content to a file atomically.
pub fn write_text(path: &Path, content: &str) -> Result<()> {
    write_atomic(path, content.as_bytes())
}

/// Remove a file or a whole directory tree.
///
/// Returns `false` when nothing existed at `path`.
pub fn remove_path(path: &Path) -> Result<bool> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(Error::io(path, e)),
    };
    if meta.is_dir() {
        fs::remove_dir_all(path).map_err(|e| Error::io(path, e))?;
    } else {
        fs::remove_file(path).map_err(|e| Error::io(path, e))?;
    }
    Ok(true)
}

/// Copy a file or a directory tree from `source` to `target`.
///
/// Existing files under `target` are overwritten; the parent of `target`
/// is created when missing.
pub fn copy_path(source: &Path, target: &Path) -> Result<()> {
    let meta = fs::metadata(source).map_err(|e| Error::io(source, e))?;
    if !meta.is_dir() {
        ensure_parent(target)?;
        fs::copy(source, target).map_err(|e| Error::io(target, e))?;
        return Ok(());
    }

    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source).to_path_buf();
            Error::io(path, std::io::Error::other(e.to_string()))
        })?;
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let destination = target.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination).map_err(|e| Error::io(&destination, e))?;
        } else {
            ensure_parent(&destination)?;
            fs::copy(entry.path(), &destination).map_err(|e| Error::io(&destination, e))?;
        }
    }
    Ok(())
}
