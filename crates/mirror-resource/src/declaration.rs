//! Resource declarations
//!
//! A [`Resource`] is an external collector. It yields a flat stream of
//! [`Declaration`]s: "an item of this kind lives at this path", "merge this
//! metadata at that path", or a resource specific operation such as
//! `version`. The tree builder folds the stream into a [`SyncTree`].
//!
//! [`SyncTree`]: crate::SyncTree

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use mirror_fs::{PathInput, Segments};
use serde_json::Value;

use crate::item::{Generator, Metadata, Payload};
use crate::{Error, Result};

/// One declaration emitted by a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub kind: String,
    pub value: Payload,
    pub path: PathInput,
    /// Metadata attached to the item itself
    pub attached: Option<Metadata>,
}

impl Declaration {
    pub fn new(kind: impl Into<String>, value: impl Into<Payload>, path: impl Into<PathInput>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
            path: path.into(),
            attached: None,
        }
    }

    /// A file downloaded from `url`.
    pub fn remote(url: impl Into<String>, path: impl Into<PathInput>) -> Self {
        Self::new("remote", url.into(), path)
    }

    /// A file holding `content` verbatim.
    pub fn text(content: impl Into<String>, path: impl Into<PathInput>) -> Self {
        Self::new("text", content.into(), path)
    }

    /// A file produced by `generator`.
    pub fn custom(generator: Generator, path: impl Into<PathInput>) -> Self {
        Self::new("custom", generator, path)
    }

    /// A copy of the existing local file at `source`.
    pub fn local(source: impl AsRef<Path>, path: impl Into<PathInput>) -> Self {
        Self::new(
            "local",
            source.as_ref().to_string_lossy().into_owned(),
            path,
        )
    }

    /// Metadata merged into the folder or item at `path`.
    pub fn metadata(data: Metadata, path: impl Into<PathInput>) -> Self {
        Self::new("metadata", data, path)
    }

    /// A version string, consumed by [`VersionedResource`](crate::VersionedResource).
    pub fn version(version: impl Into<String>, path: impl Into<PathInput>) -> Self {
        Self::new("version", version.into(), path)
    }

    pub fn with_metadata(mut self, attached: Metadata) -> Self {
        self.attached = Some(attached);
        self
    }

    /// Attach a single metadata entry.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attached
            .get_or_insert_with(Metadata::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Lazily produced declarations; an `Err` aborts the build.
pub type DeclarationStream<'a> = Box<dyn Iterator<Item = Result<Declaration>> + 'a>;

/// Side effecting handler invoked for a declaration instead of creating a
/// leaf. Receives the declaration and its normalized path.
pub type OperationHandler = Box<dyn FnMut(&Declaration, &Segments) -> Result<()>>;

/// Named operation handlers registered by a resource.
#[derive(Default)]
pub struct Operations {
    handlers: HashMap<String, OperationHandler>,
}

impl Operations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`.
    ///
    /// `metadata` is handled by the tree builder and cannot be overridden.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F) -> Result<()>
    where
        F: FnMut(&Declaration, &Segments) -> Result<()> + 'static,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::EmptyKind);
        }
        if name == "metadata" {
            return Err(Error::ReservedKind { kind: name });
        }
        if self.handlers.contains_key(&name) {
            return Err(Error::DuplicateKind { kind: name });
        }
        self.handlers.insert(name, Box::new(handler));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut OperationHandler> {
        self.handlers.get_mut(name)
    }
}

impl fmt::Debug for Operations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("Operations").field("names", &names).finish()
    }
}

/// A collector of declarations.
pub trait Resource {
    /// Enumerate the declarations of this resource.
    fn grab(&mut self) -> Result<DeclarationStream<'_>>;

    /// Operations this resource handles itself.
    ///
    /// Called once per build, before [`grab`](Resource::grab). Handlers own
    /// whatever state they share with the resource.
    fn operations(&self) -> Result<Operations> {
        Ok(Operations::new())
    }
}

/// A fixed list of declarations, replayed on every build.
impl Resource for Vec<Declaration> {
    fn grab(&mut self) -> Result<DeclarationStream<'_>> {
        Ok(Box::new(self.iter().cloned().map(Ok)))
    }
}
