//! Sync items, resources and sync trees for Resource Mirror.
//!
//! A [`Resource`] enumerates declarations ("this item lives at this path",
//! "this metadata belongs to that folder"). The [`TreeBuilder`] folds them
//! into a [`SyncTree`] whose leaves are [`SyncItem`]s created through a
//! [`KindRegistry`]. The sync engine in `mirror-core` walks that tree.
//!
//! ```text
//!   Resource --declarations--> TreeBuilder --SyncTree--> SyncEngine
//!                                   |
//!                              KindRegistry
//!                      (remote, text, custom, local, ...)
//! ```

pub mod declaration;
pub mod directory;
pub mod error;
pub mod http;
pub mod item;
pub mod registry;
pub mod tree;
pub mod version;

pub use declaration::{Declaration, DeclarationStream, OperationHandler, Operations, Resource};
pub use directory::LocalDirectoryResource;
pub use error::{Error, Result};
pub use http::{Fetcher, HeadInfo, HeadOutcome, HttpConfig};
pub use item::{
    CustomItem, Freshness, Generator, ItemBehavior, ItemSource, LocalItem, Mark, Metadata,
    Payload, RemoteItem, SyncItem, TextItem, empty_mark,
};
pub use registry::{KindRegistry, RESERVED_KINDS};
pub use tree::{BuildOutcome, MetadataItem, Node, SyncTree, TreeBuilder};
pub use version::{
    DEFAULT_VERSION_PATTERN, POINTER_PREFIX, VersionSource, VersionedResource, latest_pointers,
    version_pattern,
};
