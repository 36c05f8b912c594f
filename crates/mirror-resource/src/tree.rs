//! Sync trees
//!
//! [`TreeBuilder`] folds the flat declaration stream of a [`Resource`] into
//! a [`SyncTree`]. Items are placed as they arrive; metadata declarations
//! are buffered and merged in a second pass, so they may target folders that
//! only come into existence later in the stream.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::hash::{Hash, Hasher};

use mirror_fs::{Segments, normalize};
use tracing::{debug, warn};

use crate::declaration::Resource;
use crate::item::{Metadata, SyncItem, canonical_json};
use crate::registry::KindRegistry;
use crate::{Error, Result};

/// Metadata to merge into the node at `segments`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataItem {
    pub data: Metadata,
    pub segments: Segments,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Folder(SyncTree),
    Leaf(SyncItem),
}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Folder(tree) => {
                0u8.hash(state);
                tree.hash(state);
            }
            Self::Leaf(item) => {
                1u8.hash(state);
                item.hash(state);
            }
        }
    }
}

/// A folder of the destination: named children plus its own metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncTree {
    metadata: Metadata,
    children: BTreeMap<String, Node>,
}

impl SyncTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn children(&self) -> &BTreeMap<String, Node> {
        &self.children
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.children.get(name)
    }

    /// Resolve a path relative to this folder.
    pub fn find(&self, path: &[String]) -> Option<&Node> {
        let (first, rest) = path.split_first()?;
        match (self.children.get(first)?, rest.is_empty()) {
            (node, true) => Some(node),
            (Node::Folder(tree), false) => tree.find(rest),
            (Node::Leaf(_), false) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Place `item` at its segments, creating folders along the way.
    ///
    /// Returns the item previously stored at the same position, if any.
    /// Replacing a folder by an item, or placing an item below another
    /// item, is a [`Error::PathConflict`].
    pub fn insert(&mut self, item: SyncItem) -> Result<Option<SyncItem>> {
        let segments = item.segments().clone();
        if segments.is_root() {
            return Err(Error::MalformedDeclaration {
                kind: item.kind().to_string(),
                path: String::new(),
                reason: "an item cannot be placed at the root".into(),
            });
        }
        self.insert_at(segments.as_slice(), &segments, item)
    }

    fn insert_at(
        &mut self,
        names: &[String],
        full: &Segments,
        item: SyncItem,
    ) -> Result<Option<SyncItem>> {
        let Some((first, rest)) = names.split_first() else {
            return Ok(None);
        };

        if rest.is_empty() {
            return match self.children.entry(first.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(Node::Leaf(item));
                    Ok(None)
                }
                Entry::Occupied(mut slot) => match slot.get_mut() {
                    Node::Leaf(existing) => {
                        warn!(path = %full, old = ?existing, new = ?item, "sync item will be replaced");
                        Ok(Some(std::mem::replace(existing, item)))
                    }
                    Node::Folder(_) => Err(Error::PathConflict {
                        path: full.to_path_string(),
                        existing: "folder",
                        incoming: format!("{item:?}"),
                    }),
                },
            };
        }

        let node = self
            .children
            .entry(first.clone())
            .or_insert_with(|| Node::Folder(SyncTree::new()));
        match node {
            Node::Folder(tree) => tree.insert_at(rest, full, item),
            Node::Leaf(existing) => Err(Error::PathConflict {
                path: existing.segments().to_path_string(),
                existing: "item",
                incoming: format!("{item:?}"),
            }),
        }
    }

    /// Merge metadata into the folder or leaf at `meta.segments`.
    ///
    /// Missing folders are created. Keys already present are overwritten.
    pub fn merge_metadata(&mut self, meta: &MetadataItem) -> Result<()> {
        self.merge_at(meta.segments.as_slice(), meta)
    }

    fn merge_at(&mut self, names: &[String], meta: &MetadataItem) -> Result<()> {
        let Some((first, rest)) = names.split_first() else {
            self.metadata.extend(meta.data.clone());
            return Ok(());
        };

        let node = self
            .children
            .entry(first.clone())
            .or_insert_with(|| Node::Folder(SyncTree::new()));
        match node {
            Node::Folder(tree) => tree.merge_at(rest, meta),
            Node::Leaf(item) if rest.is_empty() => {
                item.metadata_mut().extend(meta.data.clone());
                Ok(())
            }
            Node::Leaf(item) => Err(Error::MetadataThroughLeaf {
                path: meta.segments.to_path_string(),
                leaf: item.segments().to_path_string(),
            }),
        }
    }

    /// Number of `(folders, leaves)` below this folder, excluding itself.
    pub fn count(&self) -> (usize, usize) {
        self.children
            .values()
            .fold((0, 0), |(folders, leaves), node| match node {
                Node::Folder(tree) => {
                    let (f, l) = tree.count();
                    (folders + 1 + f, leaves + l)
                }
                Node::Leaf(_) => (folders, leaves + 1),
            })
    }

    fn write_children(&self, f: &mut fmt::Formatter<'_>, prefix: &str) -> fmt::Result {
        let total = self.children.len();
        for (index, (name, node)) in self.children.iter().enumerate() {
            let last = index + 1 == total;
            let (branch, indent) = if last {
                ("└── ", "    ")
            } else {
                ("├── ", "│   ")
            };
            let child_prefix = format!("{prefix}{indent}");
            match node {
                Node::Folder(tree) => {
                    let rail = if tree.is_empty() { "    " } else { "│   " };
                    write_label(
                        f,
                        &format!("{prefix}{branch}"),
                        &format!("{child_prefix}{rail}"),
                        &label_lines(name.clone(), &tree.metadata),
                    )?;
                    tree.write_children(f, &child_prefix)?;
                }
                Node::Leaf(item) => write_label(
                    f,
                    &format!("{prefix}{branch}"),
                    &format!("{child_prefix}    "),
                    &label_lines(format!("{name} --> {item:?}"), item.metadata()),
                )?,
            }
        }
        Ok(())
    }
}

fn label_lines(title: String, metadata: &Metadata) -> Vec<String> {
    let mut lines = vec![title];
    if !metadata.is_empty() {
        lines.push("[Metadata]".to_string());
        let mut keys: Vec<&String> = metadata.keys().collect();
        keys.sort();
        lines.extend(keys.into_iter().map(|key| format!("{key}: {}", metadata[key])));
    }
    lines
}

fn write_label(
    f: &mut fmt::Formatter<'_>,
    first: &str,
    rest: &str,
    lines: &[String],
) -> fmt::Result {
    for (index, line) in lines.iter().enumerate() {
        let prefix = if index == 0 { first } else { rest };
        writeln!(f, "{prefix}{line}")?;
    }
    Ok(())
}

impl Hash for SyncTree {
    fn hash<H: Hasher>(&self, state: &mut H) {
        canonical_json(&self.metadata).hash(state);
        self.children.hash(state);
    }
}

impl fmt::Display for SyncTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rail = if self.is_empty() { "" } else { "│   " };
        write_label(f, "", rail, &label_lines("<root>".into(), &self.metadata))?;
        self.write_children(f, "")
    }
}

/// Result of [`TreeBuilder::build`].
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub tree: SyncTree,
    /// Number of items replaced by a later declaration at the same path
    pub replaced: usize,
}

/// Folds a resource's declarations into a [`SyncTree`].
#[derive(Debug, Clone, Copy)]
pub struct TreeBuilder<'r> {
    registry: &'r KindRegistry,
}

impl<'r> TreeBuilder<'r> {
    pub fn new(registry: &'r KindRegistry) -> Self {
        Self { registry }
    }

    pub fn build<R: Resource + ?Sized>(&self, resource: &mut R) -> Result<BuildOutcome> {
        let mut operations = resource.operations()?;
        let mut tree = SyncTree::new();
        let mut pending: Vec<MetadataItem> = Vec::new();
        let mut replaced = 0;

        for declaration in resource.grab()? {
            let declaration = declaration?;
            let segments = normalize(declaration.path.clone())?;

            if declaration.kind == "metadata" {
                let data = declaration.value.as_object().cloned().ok_or_else(|| {
                    Error::MalformedDeclaration {
                        kind: declaration.kind.clone(),
                        path: segments.to_path_string(),
                        reason: format!(
                            "metadata must be an object, got {}",
                            declaration.value.type_name()
                        ),
                    }
                })?;
                if let Some(attached) = declaration.attached.as_ref().filter(|a| !a.is_empty()) {
                    warn!(
                        path = %segments,
                        attached = %serde_json::Value::Object(attached.clone()),
                        "attached data is ignored when defining metadata"
                    );
                }
                pending.push(MetadataItem { data, segments });
            } else if let Some(handler) = operations.get_mut(&declaration.kind) {
                handler(&declaration, &segments).map_err(|err| match err {
                    err @ Error::Operation { .. } => err,
                    other => Error::Operation {
                        operation: declaration.kind.clone(),
                        path: segments.to_path_string(),
                        reason: other.to_string(),
                    },
                })?;
            } else {
                let item = self.registry.create(
                    &declaration.kind,
                    declaration.value,
                    declaration.attached.unwrap_or_default(),
                    segments,
                )?;
                if tree.insert(item)?.is_some() {
                    replaced += 1;
                }
            }
        }

        for meta in &pending {
            tree.merge_metadata(meta)?;
        }

        let (folders, leaves) = tree.count();
        debug!(folders, leaves, replaced, "built sync tree");
        Ok(BuildOutcome { tree, replaced })
    }
}
