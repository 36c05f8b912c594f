//! Sync items
//!
//! A [`SyncItem`] is one leaf of a sync tree: a file that should exist in
//! the destination. Its content is produced on demand by the item's
//! [`ItemSource`], and its freshness is tracked through an opaque, kind
//! specific [`Mark`] recorded in the destination manifest.

mod custom;
mod local;
mod remote;
mod text;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use mirror_fs::{ScopedFile, Segments};
use serde::Serialize;
use serde_json::Value;

use crate::Result;

pub use custom::CustomItem;
pub use local::LocalItem;
pub use remote::RemoteItem;
pub use text::TextItem;

/// Auxiliary attributes attached to items and folders.
pub type Metadata = serde_json::Map<String, Value>;

/// Kind specific fingerprint used to skip redundant transfers.
pub type Mark = Value;

/// Outcome of [`SyncItem::refresh_mark`].
#[derive(Debug, Clone, PartialEq)]
pub enum Freshness {
    /// The remote representation provably did not change since the
    /// previous mark was recorded.
    Unchanged,
    /// The item must be reloaded; carries the mark to record.
    Changed(Mark),
}

/// Serialize a value with sorted object keys, for hashing.
pub(crate) fn canonical_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// An empty JSON object, the mark of an item that has none.
pub fn empty_mark() -> Mark {
    Value::Object(Metadata::new())
}

/// Caller supplied function producing a scoped local file.
#[derive(Clone)]
pub struct Generator(Arc<dyn Fn() -> Result<ScopedFile> + Send + Sync>);

impl Generator {
    pub fn new(f: impl Fn() -> Result<ScopedFile> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn generate(&self) -> Result<ScopedFile> {
        (self.0)()
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for Generator {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for Generator {}

impl Hash for Generator {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Generator({:p})", self.addr())
    }
}

/// The value carried by a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Json(Value),
    Generator(Generator),
}

impl Payload {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Json(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Metadata> {
        match self {
            Self::Json(Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    pub fn as_generator(&self) -> Option<&Generator> {
        match self {
            Self::Generator(generator) => Some(generator),
            _ => None,
        }
    }

    /// Short human readable description of the payload type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Json(Value::Null) => "null",
            Self::Json(Value::Bool(_)) => "boolean",
            Self::Json(Value::Number(_)) => "number",
            Self::Json(Value::String(_)) => "string",
            Self::Json(Value::Array(_)) => "array",
            Self::Json(Value::Object(_)) => "object",
            Self::Generator(_) => "generator",
        }
    }
}

impl Hash for Payload {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Json(value) => {
                0u8.hash(state);
                canonical_json(value).hash(state);
            }
            Self::Generator(generator) => {
                1u8.hash(state);
                generator.hash(state);
            }
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self::Json(Value::String(s.to_string()))
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self::Json(Value::String(s))
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Metadata> for Payload {
    fn from(map: Metadata) -> Self {
        Self::Json(Value::Object(map))
    }
}

impl From<Generator> for Payload {
    fn from(generator: Generator) -> Self {
        Self::Generator(generator)
    }
}

/// Behavior every item kind provides.
///
/// Built-in kinds implement this directly; user registered kinds return an
/// implementation wrapped in [`ItemSource::Extension`].
pub trait ItemBehavior: Send + Sync + fmt::Debug {
    /// Materialize the content as a local file for the lifetime of the guard.
    fn load_file(&self) -> Result<ScopedFile>;

    /// Decide whether the item changed since `previous` was recorded.
    ///
    /// The default has no freshness signal and always reports a change,
    /// keeping the previous mark.
    fn refresh_mark(&self, previous: Option<&Mark>) -> Result<Freshness> {
        Ok(Freshness::Changed(previous.cloned().unwrap_or_else(empty_mark)))
    }
}

/// The concrete producer behind an item.
#[derive(Debug, Clone)]
pub enum ItemSource {
    Remote(RemoteItem),
    Text(TextItem),
    Custom(CustomItem),
    Local(LocalItem),
    Extension(Arc<dyn ItemBehavior>),
}

impl ItemSource {
    fn behavior(&self) -> &dyn ItemBehavior {
        match self {
            Self::Remote(item) => item,
            Self::Text(item) => item,
            Self::Custom(item) => item,
            Self::Local(item) => item,
            Self::Extension(item) => item.as_ref(),
        }
    }
}

/// One file to materialize in the destination.
///
/// Equality and hashing are structural over kind, value, metadata and
/// segments, so two declarations of the same file compare equal.
#[derive(Clone)]
pub struct SyncItem {
    kind: String,
    value: Payload,
    metadata: Metadata,
    segments: Segments,
    source: ItemSource,
}

impl SyncItem {
    pub fn new(
        kind: impl Into<String>,
        value: Payload,
        metadata: Metadata,
        segments: Segments,
        source: ItemSource,
    ) -> Self {
        Self {
            kind: kind.into(),
            value,
            metadata,
            segments,
            source,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn value(&self) -> &Payload {
        &self.value
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn segments(&self) -> &Segments {
        &self.segments
    }

    pub fn source(&self) -> &ItemSource {
        &self.source
    }

    /// See [`ItemBehavior::load_file`].
    pub fn load_file(&self) -> Result<ScopedFile> {
        self.source.behavior().load_file()
    }

    /// See [`ItemBehavior::refresh_mark`].
    pub fn refresh_mark(&self, previous: Option<&Mark>) -> Result<Freshness> {
        self.source.behavior().refresh_mark(previous)
    }
}

impl PartialEq for SyncItem {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.value == other.value
            && self.metadata == other.metadata
            && self.segments == other.segments
    }
}

impl Eq for SyncItem {}

impl Hash for SyncItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.value.hash(state);
        canonical_json(&self.metadata).hash(state);
        self.segments.hash(state);
    }
}

impl fmt::Debug for SyncItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} ", self.kind)?;
        match &self.value {
            Payload::Json(Value::String(s)) if s.chars().count() > 40 => {
                let head: String = s.chars().take(25).collect();
                write!(f, "{head:?}... ({} chars)", s.chars().count())?;
            }
            Payload::Json(value) => write!(f, "{value}")?,
            Payload::Generator(generator) => write!(f, "{generator:?}")?,
        }
        write!(f, " at {:?}>", self.segments.to_path_string())
    }
}
