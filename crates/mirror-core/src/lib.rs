//! Synchronization engine for Resource Mirror
//!
//! This crate ties the lower layers together:
//!
//! - **Manifests**: the `.meta.json` stored in every synchronized directory
//! - **SyncEngine**: change detection against those manifests, with
//!   immediate, threshold or deferred batch submission
//! - **Configuration**: batch mode, worker count and item error policy
//!
//! # Architecture
//!
//! ```text
//!                  mirror-core
//!                       |
//!          +------------+------------+
//!          |                         |
//!   mirror-resource           mirror-storage
//!          |                         |
//!          +------- mirror-fs -------+
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mirror_core::{SyncConfig, SyncEngine};
//! use mirror_resource::{Declaration, Fetcher, HttpConfig, KindRegistry};
//! use mirror_storage::LocalStorage;
//!
//! fn example() -> mirror_core::Result<()> {
//!     let fetcher = Arc::new(Fetcher::new(HttpConfig::default())?);
//!     let registry = KindRegistry::with_builtins(fetcher);
//!     let storage = LocalStorage::new("/srv/mirror");
//!
//!     let mut resource = vec![
//!         Declaration::text("hello", "greetings/hello.txt"),
//!         Declaration::remote("https://example.com/logo.png", "assets/logo.png"),
//!     ];
//!     let report = SyncEngine::new(&registry, &storage, SyncConfig::default())
//!         .sync(&mut resource)?;
//!     println!("uploaded {} files", report.uploaded());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod sync;

pub use config::{BatchMode, ItemErrorPolicy, SyncConfig};
pub use error::{Error, Result};
pub use manifest::{FileEntry, FolderEntry, MANIFEST_FILENAME, Manifest};
pub use mirror_resource::HttpConfig;
pub use sync::{DirectoryReport, ItemFailure, SyncEngine, SyncOptions, SyncReport};
