//! An item kind that records how often its items are loaded.
//!
//! Its mark is the content itself, so an item is reused exactly when its
//! content did not change since the last run.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use mirror_fs::ScopedFile;
use mirror_resource::{Error, Freshness, ItemBehavior, KindRegistry, Mark, Payload, Result};
use serde_json::json;

/// Tag the counted kind is registered under.
pub const COUNTED_KIND: &str = "counted";

/// Shared load counter of every item of the counted kind.
#[derive(Debug, Clone, Default)]
pub struct LoadCounter(Arc<AtomicUsize>);

impl LoadCounter {
    pub fn loads(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

#[derive(Debug)]
struct CountedItem {
    content: String,
    counter: LoadCounter,
}

impl ItemBehavior for CountedItem {
    fn load_file(&self) -> Result<ScopedFile> {
        self.counter.0.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.content.strip_prefix("panic:") {
            panic!("{message}");
        }
        if let Some(reason) = self.content.strip_prefix("fail:") {
            return Err(Error::Generator {
                path: String::new(),
                reason: reason.to_string(),
            });
        }
        Ok(ScopedFile::from_text("file", &self.content)?)
    }

    fn refresh_mark(&self, previous: Option<&Mark>) -> Result<Freshness> {
        let mark = json!({ "content": self.content });
        if previous == Some(&mark) {
            Ok(Freshness::Unchanged)
        } else {
            Ok(Freshness::Changed(mark))
        }
    }
}

/// Register [`COUNTED_KIND`] on `registry`. Values are content strings;
/// content starting with `"panic:"` panics on load, `"fail:"` errors.
pub fn register_counted(registry: &mut KindRegistry) -> Result<LoadCounter> {
    let counter = LoadCounter::default();
    let shared = counter.clone();
    registry.register_behavior(COUNTED_KIND, move |payload: &Payload| {
        let content = payload.as_str().ok_or_else(|| Error::MalformedDeclaration {
            kind: COUNTED_KIND.into(),
            path: String::new(),
            reason: format!("expected a string value, got {}", payload.type_name()),
        })?;
        Ok(CountedItem {
            content: content.to_string(),
            counter: shared.clone(),
        })
    })?;
    Ok(counter)
}
