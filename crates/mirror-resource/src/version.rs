//! Version pointer files
//!
//! A [`VersionedResource`] wraps a collector that declares the versions it
//! publishes. Once the wrapped enumeration is exhausted it appends `text`
//! leaves named `LATEST_RELEASE` and `LATEST_RELEASE_<prefix>`, each holding
//! the highest version sharing that numeric prefix.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::declaration::{Declaration, DeclarationStream, Operations, Resource};
use crate::{Error, Result};

/// Optional alphabetic tag, an optional `.` or `-`, then dotted digits.
pub const DEFAULT_VERSION_PATTERN: &str = r"^([a-zA-Z]+(\.|-)?)?(?P<version>[\d.]+)$";

/// File name prefix of every pointer leaf.
pub const POINTER_PREFIX: &str = "LATEST_RELEASE";

static DEFAULT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEFAULT_VERSION_PATTERN).expect("Invalid default version regex"));

/// One dotted component. Numbers sort before text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Part {
    Num(u64),
    Text(String),
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

fn parse_version(version: &str, pattern: &Regex) -> Option<Vec<Part>> {
    let captures = pattern.captures(version)?;
    let whole = captures.get(0)?;
    if whole.start() != 0 || whole.end() != version.len() {
        return None;
    }
    let text = captures.name("version").unwrap_or(whole).as_str();
    Some(
        text.split('.')
            .map(|part| match part.parse() {
                Ok(n) => Part::Num(n),
                Err(_) => Part::Text(part.to_string()),
            })
            .collect(),
    )
}

fn pointer_name(prefix: &[Part]) -> String {
    if prefix.is_empty() {
        return POINTER_PREFIX.to_string();
    }
    let joined: Vec<String> = prefix.iter().map(Part::to_string).collect();
    format!("{POINTER_PREFIX}_{}", joined.join("."))
}

/// Compile `pattern` so that it only accepts a whole version string.
///
/// Alternations are retried until one spans the full input, so
/// `\d+|\d+\.\d+` accepts `1.2`.
pub fn version_pattern(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(&format!("^(?:{pattern})$"))?)
}

/// Map every pointer file name to the version it should contain.
///
/// For each prefix of each parsed version the highest full version wins;
/// on equal versions the first one seen is kept. Versions not matching
/// `pattern` over their whole length are skipped with a warning.
pub fn latest_pointers(versions: &[String], pattern: &Regex) -> BTreeMap<String, String> {
    let pattern = version_pattern(pattern.as_str()).unwrap_or_else(|_| pattern.clone());
    let mut best: HashMap<Vec<Part>, (Vec<Part>, &str)> = HashMap::new();

    for version in versions {
        let Some(parts) = parse_version(version, &pattern) else {
            warn!(version = %version, "version does not match the pattern, ignored in version indexing");
            continue;
        };
        for len in 0..=parts.len() {
            let prefix = parts[..len].to_vec();
            let replace = match best.get(&prefix) {
                Some((existing, _)) => parts > *existing,
                None => true,
            };
            if replace {
                best.insert(prefix, (parts.clone(), version.as_str()));
            }
        }
    }

    best.into_iter()
        .map(|(prefix, (_, version))| (pointer_name(&prefix), version.to_string()))
        .collect()
}

/// A collector that may declare `version` entries.
pub trait VersionSource {
    fn grab_items(&mut self) -> Result<DeclarationStream<'_>>;

    /// Additional operations handled by the collector itself.
    fn operations(&self) -> Result<Operations> {
        Ok(Operations::new())
    }
}

/// Decorates a [`VersionSource`] with derived version pointer files.
pub struct VersionedResource<S> {
    inner: S,
    versions: Rc<RefCell<Vec<String>>>,
    pattern: Regex,
    pointers: bool,
}

impl<S: VersionSource> VersionedResource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            versions: Rc::default(),
            pattern: DEFAULT_PATTERN.clone(),
            pointers: true,
        }
    }

    /// Use a custom version pattern. A `version` named group selects the
    /// dotted part; without it the whole match is used.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        self.pattern = version_pattern(pattern)?;
        Ok(self)
    }

    /// Enable or disable pointer emission.
    pub fn with_pointers(mut self, enabled: bool) -> Self {
        self.pointers = enabled;
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Versions collected during the last build.
    pub fn versions(&self) -> Vec<String> {
        self.versions.borrow().clone()
    }
}

impl<S: VersionSource> Resource for VersionedResource<S> {
    fn grab(&mut self) -> Result<DeclarationStream<'_>> {
        self.versions.borrow_mut().clear();
        let versions = Rc::clone(&self.versions);
        let pattern = &self.pattern;
        let enabled = self.pointers;
        let items = self.inner.grab_items()?;

        let tail = std::iter::once_with(move || {
            if !enabled {
                return Vec::new();
            }
            latest_pointers(&versions.borrow(), pattern)
                .into_iter()
                .map(|(name, version)| Ok(Declaration::text(version, name)))
                .collect::<Vec<Result<Declaration>>>()
        })
        .flatten();

        Ok(Box::new(items.chain(tail)))
    }

    fn operations(&self) -> Result<Operations> {
        let mut operations = self.inner.operations()?;
        let versions = Rc::clone(&self.versions);
        operations.register("version", move |declaration, segments| {
            let version = declaration.value.as_str().ok_or_else(|| Error::MalformedDeclaration {
                kind: declaration.kind.clone(),
                path: segments.to_path_string(),
                reason: format!("version must be a string, got {}", declaration.value.type_name()),
            })?;
            versions.borrow_mut().push(version.to_string());
            Ok(())
        })?;
        Ok(operations)
    }
}
