//! Path segmentation for destination-independent tree positions
//!
//! Every position in a sync tree is addressed by an ordered list of path
//! components. Segmentation accepts slash/backslash delimited strings or
//! already split component lists, validates each component against names
//! that cannot exist on common filesystems, and resolves `.`/`..` relative
//! to a virtual root so a path can never escape the tree.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Device names that cannot be used as file names on Windows.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn is_forbidden_char(ch: char) -> bool {
    matches!(ch, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || (ch as u32) < 32
}

/// Raw path input before segmentation.
///
/// Collectors may declare positions either as a delimited string
/// (`"a/b\\c"`) or as a list of components (`["a", "b", "c"]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathInput {
    /// A string delimited by one or more `/` or `\`.
    Text(String),
    /// Components that are already split.
    Parts(Vec<String>),
}

impl PathInput {
    /// Build a component list from anything displayable.
    pub fn parts<I, T>(parts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        Self::Parts(parts.into_iter().map(|p| p.to_string()).collect())
    }

    fn into_components(self) -> Vec<String> {
        match self {
            Self::Text(text) => text
                .split(['/', '\\'])
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Self::Parts(parts) => parts.into_iter().filter(|s| !s.is_empty()).collect(),
        }
    }
}

impl From<&str> for PathInput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for PathInput {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&String> for PathInput {
    fn from(s: &String) -> Self {
        Self::Text(s.clone())
    }
}

impl From<Vec<String>> for PathInput {
    fn from(parts: Vec<String>) -> Self {
        Self::Parts(parts)
    }
}

impl From<Vec<&str>> for PathInput {
    fn from(parts: Vec<&str>) -> Self {
        Self::parts(parts)
    }
}

impl From<&[&str]> for PathInput {
    fn from(parts: &[&str]) -> Self {
        Self::parts(parts)
    }
}

impl<const N: usize> From<[&str; N]> for PathInput {
    fn from(parts: [&str; N]) -> Self {
        Self::parts(parts)
    }
}

impl From<Segments> for PathInput {
    fn from(segments: Segments) -> Self {
        Self::Parts(segments.0)
    }
}

impl From<&Segments> for PathInput {
    fn from(segments: &Segments) -> Self {
        Self::Parts(segments.0.clone())
    }
}

/// A normalized, validated list of path components.
///
/// The empty list addresses the root of a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Segments(Vec<String>);

impl Segments {
    /// The root position.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    /// Position of a direct child.
    ///
    /// `name` is expected to be a single component that already passed
    /// [`validate_segment`], e.g. a key taken from a sync tree.
    pub fn child(&self, name: &str) -> Self {
        let mut inner = self.0.clone();
        inner.push(name.to_string());
        Self(inner)
    }

    /// Position of the parent, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.0.split_last()?;
        Some(Self(init.to_vec()))
    }

    /// The last component, or `None` at the root.
    pub fn file_name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Components joined with `/`.
    pub fn to_path_string(&self) -> String {
        self.0.join("/")
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl AsRef<[String]> for Segments {
    fn as_ref(&self) -> &[String] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a Segments {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Segments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_path_string())
    }
}

/// Check that a single component is usable as a file or folder name.
///
/// `index` is only used for error reporting.
pub fn validate_segment(index: usize, segment: &str) -> Result<()> {
    if segment.chars().any(is_forbidden_char) {
        return Err(Error::InvalidCharacter {
            index,
            segment: segment.to_string(),
        });
    }
    if RESERVED_NAMES
        .iter()
        .any(|name| name.eq_ignore_ascii_case(segment))
    {
        return Err(Error::ReservedSegment {
            index,
            segment: segment.to_string(),
        });
    }
    Ok(())
}

/// Normalize a path into validated segments.
///
/// `..` above the root is absorbed, so `"../a"` becomes `["a"]`.
///
/// # Errors
///
/// Returns an error naming the offending index if any component contains a
/// forbidden character or is a reserved device name.
pub fn normalize(path: impl Into<PathInput>) -> Result<Segments> {
    let components = path.into().into_components();
    for (index, segment) in components.iter().enumerate() {
        validate_segment(index, segment)?;
    }

    let mut resolved: Vec<String> = Vec::with_capacity(components.len());
    for segment in components {
        match segment.as_str() {
            "." => {}
            ".." => {
                resolved.pop();
            }
            _ => resolved.push(segment),
        }
    }
    Ok(Segments(resolved))
}
