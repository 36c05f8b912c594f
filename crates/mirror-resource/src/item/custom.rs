//! Caller provided file generators

use mirror_fs::ScopedFile;

use super::{Generator, ItemBehavior};
use crate::Result;

/// Delegates loading to a [`Generator`] chosen by the resource author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomItem {
    generator: Generator,
}

impl CustomItem {
    pub fn new(generator: Generator) -> Self {
        Self { generator }
    }
}

impl ItemBehavior for CustomItem {
    fn load_file(&self) -> Result<ScopedFile> {
        self.generator.generate()
    }
}
