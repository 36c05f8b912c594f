//! Change detection and synchronization
//!
//! - **engine**: walk a sync tree, diff it against the stored manifests
//! - **batch**: group directory change sets according to the batch mode
//! - **report**: what a run did, or would do

mod batch;
mod engine;
mod report;

pub use engine::{SyncEngine, SyncOptions};
pub use report::{DirectoryReport, ItemFailure, SyncReport};
