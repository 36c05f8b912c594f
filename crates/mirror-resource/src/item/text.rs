//! Inline text content

use mirror_fs::ScopedFile;

use super::ItemBehavior;
use crate::Result;

/// Writes its content into a fresh temporary file on every load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextItem {
    content: String,
}

impl TextItem {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

impl ItemBehavior for TextItem {
    fn load_file(&self) -> Result<ScopedFile> {
        Ok(ScopedFile::from_text("file", &self.content)?)
    }
}
