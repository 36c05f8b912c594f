//! Per-directory manifests
//!
//! Every synchronized directory holds a `.meta.json` recording what the last
//! run wrote there: the directory's metadata, each file with its kind and
//! mark, and each subfolder. It is the only state persisted between runs.

use std::collections::BTreeSet;

use mirror_fs::Segments;
use mirror_resource::{Mark, Metadata};
use mirror_storage::Storage;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const MANIFEST_FILENAME: &str = ".meta.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub mark: Mark,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderEntry {
    pub name: String,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub folders: Vec<FolderEntry>,
}

impl Manifest {
    pub fn new(dir: &Segments, metadata: Metadata) -> Self {
        Self {
            path: dir.to_path_string(),
            metadata,
            files: Vec::new(),
            folders: Vec::new(),
        }
    }

    /// Location of the manifest of `dir`.
    pub fn location(dir: &Segments) -> Segments {
        dir.child(MANIFEST_FILENAME)
    }

    /// Read the manifest of `dir`, `None` when the directory has none.
    pub fn load<S: Storage + ?Sized>(storage: &S, dir: &Segments) -> Result<Option<Self>> {
        let location = Self::location(dir);
        if !storage.file_exists(&location) {
            return Ok(None);
        }
        let text = storage.read_text(&location)?;
        Self::from_json(dir, &text).map(Some)
    }

    pub fn from_json(dir: &Segments, text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Manifest {
            path: dir.to_path_string(),
            message: e.to_string(),
        })
    }

    /// Pretty printed JSON with entries sorted by name.
    pub fn to_json(&self) -> Result<String> {
        let mut sorted = self.clone();
        sorted.sort();
        serde_json::to_string_pretty(&sorted).map_err(|e| Error::Manifest {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    pub fn sort(&mut self) {
        self.files.sort_by(|a, b| a.name.cmp(&b.name));
        self.folders.sort_by(|a, b| a.name.cmp(&b.name));
    }

    pub fn file(&self, name: &str) -> Option<&FileEntry> {
        self.files.iter().find(|entry| entry.name == name)
    }

    /// Names of all files and folders.
    pub fn names(&self) -> BTreeSet<&str> {
        self.files
            .iter()
            .map(|entry| entry.name.as_str())
            .chain(self.folders.iter().map(|entry| entry.name.as_str()))
            .collect()
    }
}
