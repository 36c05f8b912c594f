//! Files already present on the local filesystem
//!
//! The mark records size and content checksum, so an unchanged local file
//! is never copied again.

use std::path::{Path, PathBuf};

use mirror_fs::ScopedFile;
use mirror_fs::checksum::compute_file_checksum;
use serde_json::json;

use super::{Freshness, ItemBehavior, Mark};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalItem {
    path: PathBuf,
}

impl LocalItem {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_exists(&self) -> Result<u64> {
        match std::fs::metadata(&self.path) {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            _ => Err(Error::SourceNotFound {
                path: self.path.clone(),
            }),
        }
    }
}

impl ItemBehavior for LocalItem {
    fn load_file(&self) -> Result<ScopedFile> {
        self.check_exists()?;
        Ok(ScopedFile::borrowed(&self.path))
    }

    fn refresh_mark(&self, previous: Option<&Mark>) -> Result<Freshness> {
        let size = self.check_exists()?;
        let mark = json!({
            "path": self.path.to_string_lossy(),
            "size": size,
            "checksum": compute_file_checksum(&self.path)?,
        });
        if previous == Some(&mark) {
            Ok(Freshness::Unchanged)
        } else {
            Ok(Freshness::Changed(mark))
        }
    }
}
