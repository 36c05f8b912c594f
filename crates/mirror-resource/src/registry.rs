//! Sync item kind registry
//!
//! Maps a kind tag to a factory turning a declaration payload into an
//! [`ItemSource`]. Registries are plain values: build one per engine (or per
//! test) instead of sharing global state.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use mirror_fs::Segments;

use crate::http::Fetcher;
use crate::item::{
    CustomItem, ItemBehavior, ItemSource, LocalItem, Metadata, Payload, RemoteItem, SyncItem,
    TextItem,
};
use crate::{Error, Result};

/// Declaration kinds interpreted by the tree builder itself.
pub const RESERVED_KINDS: &[&str] = &["metadata", "version"];

type Factory = Arc<dyn Fn(&Payload) -> Result<ItemSource> + Send + Sync>;

/// Append-only table of constructible item kinds.
#[derive(Clone, Default)]
pub struct KindRegistry {
    factories: HashMap<String, Factory>,
}

fn expect_string<'a>(kind: &str, payload: &'a Payload) -> Result<&'a str> {
    payload.as_str().ok_or_else(|| Error::MalformedDeclaration {
        kind: kind.to_string(),
        path: String::new(),
        reason: format!("expected a string value, got {}", payload.type_name()),
    })
}

impl KindRegistry {
    /// Create a registry without any kinds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in kinds registered.
    ///
    /// - `remote`: URL string, fetched through `fetcher`
    /// - `text`: literal content string
    /// - `custom`: a [`Generator`](crate::Generator)
    /// - `local`: path of an existing local file
    pub fn with_builtins(fetcher: Arc<Fetcher>) -> Self {
        let mut registry = Self::new();
        let builtins: [(&str, Factory); 4] = [
            (
                "remote",
                Arc::new(move |payload: &Payload| {
                    let url = expect_string("remote", payload)?;
                    Ok(ItemSource::Remote(RemoteItem::new(url, Arc::clone(&fetcher))))
                }),
            ),
            (
                "text",
                Arc::new(|payload: &Payload| {
                    let content = expect_string("text", payload)?;
                    Ok(ItemSource::Text(TextItem::new(content)))
                }),
            ),
            (
                "custom",
                Arc::new(|payload: &Payload| match payload.as_generator() {
                    Some(generator) => Ok(ItemSource::Custom(CustomItem::new(generator.clone()))),
                    None => Err(Error::MalformedDeclaration {
                        kind: "custom".into(),
                        path: String::new(),
                        reason: format!("expected a generator, got {}", payload.type_name()),
                    }),
                }),
            ),
            (
                "local",
                Arc::new(|payload: &Payload| {
                    let path = expect_string("local", payload)?;
                    Ok(ItemSource::Local(LocalItem::new(PathBuf::from(path))))
                }),
            ),
        ];
        for (kind, factory) in builtins {
            registry.factories.insert(kind.to_string(), factory);
        }
        registry
    }

    /// Register a factory for `kind`.
    ///
    /// Fails when the tag is empty, reserved, or already taken.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(&Payload) -> Result<ItemSource> + Send + Sync + 'static,
    {
        let kind = kind.into();
        if kind.is_empty() {
            return Err(Error::EmptyKind);
        }
        if RESERVED_KINDS.contains(&kind.as_str()) {
            return Err(Error::ReservedKind { kind });
        }
        if self.factories.contains_key(&kind) {
            return Err(Error::DuplicateKind { kind });
        }
        self.factories.insert(kind, Arc::new(factory));
        Ok(())
    }

    /// Register a kind whose items are produced by an [`ItemBehavior`]
    /// implementation.
    pub fn register_behavior<F, B>(&mut self, kind: impl Into<String>, make: F) -> Result<()>
    where
        F: Fn(&Payload) -> Result<B> + Send + Sync + 'static,
        B: ItemBehavior + 'static,
    {
        self.register(kind, move |payload| {
            Ok(ItemSource::Extension(Arc::new(make(payload)?)))
        })
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kind tags, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Construct the item declared as `kind` with `value` at `segments`.
    pub fn create(
        &self,
        kind: &str,
        value: Payload,
        metadata: Metadata,
        segments: Segments,
    ) -> Result<SyncItem> {
        let factory = self.factories.get(kind).ok_or_else(|| Error::UnknownKind {
            kind: kind.to_string(),
        })?;
        let source = factory(&value).map_err(|err| match err {
            Error::MalformedDeclaration { kind, reason, .. } => Error::MalformedDeclaration {
                kind,
                path: segments.to_path_string(),
                reason,
            },
            other => Error::MalformedDeclaration {
                kind: kind.to_string(),
                path: segments.to_path_string(),
                reason: other.to_string(),
            },
        })?;
        Ok(SyncItem::new(kind, value, metadata, segments, source))
    }
}

impl fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
