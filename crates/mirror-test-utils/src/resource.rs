//! [`StaticResource`]: a resource replaying a fixed list of declarations.

use mirror_fs::{PathInput, normalize};
use mirror_resource::{Declaration, DeclarationStream, Error, Operations, Resource, Result};

/// Replays its declarations on every `grab`.
///
/// ```rust
/// use mirror_resource::Declaration;
/// use mirror_test_utils::StaticResource;
///
/// let resource = StaticResource::new(vec![Declaration::text("hi", "a.txt")])
///     .failing_after(1, "listing interrupted");
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticResource {
    declarations: Vec<Declaration>,
    failure: Option<(usize, String)>,
    grabs: usize,
}

impl StaticResource {
    pub fn new(declarations: Vec<Declaration>) -> Self {
        Self {
            declarations,
            ..Self::default()
        }
    }

    /// Yield an error after `count` declarations.
    pub fn failing_after(mut self, count: usize, reason: impl Into<String>) -> Self {
        self.failure = Some((count, reason.into()));
        self
    }

    pub fn push(&mut self, declaration: Declaration) {
        self.declarations.push(declaration);
    }

    /// Replace the declarations at the same path, or append.
    pub fn set(&mut self, declaration: Declaration) {
        let path = declaration.path.clone();
        self.remove(path);
        self.declarations.push(declaration);
    }

    /// Drop every declaration placed at `path`.
    pub fn remove(&mut self, path: impl Into<PathInput>) {
        let path = normalize(path).ok();
        self.declarations
            .retain(|existing| normalize(existing.path.clone()).ok() != path);
    }

    /// How many times the resource was enumerated.
    pub fn grabs(&self) -> usize {
        self.grabs
    }
}

impl Resource for StaticResource {
    fn grab(&mut self) -> Result<DeclarationStream<'_>> {
        self.grabs += 1;
        let items = self.declarations.iter().cloned().map(Ok);
        match &self.failure {
            Some((count, reason)) => {
                let failure = Error::Operation {
                    operation: "grab".into(),
                    path: String::new(),
                    reason: reason.clone(),
                };
                Ok(Box::new(
                    items.take(*count).chain(std::iter::once(Err(failure))),
                ))
            }
            None => Ok(Box::new(items)),
        }
    }

    fn operations(&self) -> Result<Operations> {
        Ok(Operations::new())
    }
}
