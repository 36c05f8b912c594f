//! Mirror a local directory tree

use std::path::{Path, PathBuf};

use mirror_fs::PathInput;
use walkdir::WalkDir;

use crate::declaration::{Declaration, DeclarationStream, Resource};
use crate::{Error, Result};

/// Declares every regular file below `directory` as a `local` item at its
/// relative path. Entries are visited in file name order.
#[derive(Debug, Clone)]
pub struct LocalDirectoryResource {
    directory: PathBuf,
}

impl LocalDirectoryResource {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl Resource for LocalDirectoryResource {
    fn grab(&mut self) -> Result<DeclarationStream<'_>> {
        let root = dunce::canonicalize(&self.directory).map_err(|_| Error::SourceNotFound {
            path: self.directory.clone(),
        })?;

        let walker = WalkDir::new(&root).sort_by_file_name().into_iter();
        let declarations = walker.filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(&root).to_path_buf();
                    let source = std::io::Error::other(e.to_string());
                    return Some(Err(mirror_fs::Error::io(path, source).into()));
                }
            };
            if !entry.file_type().is_file() {
                return None;
            }
            let relative = entry.path().strip_prefix(&root).ok()?;
            let parts = PathInput::parts(
                relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned()),
            );
            Some(Ok(Declaration::local(entry.path(), parts)))
        });
        Ok(Box::new(declarations))
    }
}
