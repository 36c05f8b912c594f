//! Filesystem layer for Resource Mirror
//!
//! Provides path segmentation, scoped temporary files, a staging file pool
//! and safe I/O operations shared by the resource, storage and sync crates.

pub mod checksum;
pub mod config;
pub mod error;
pub mod io;
pub mod pool;
pub mod scoped;
pub mod segments;

pub use config::ConfigStore;
pub use error::{Error, Result};
pub use pool::FilePool;
pub use scoped::{ScopedFile, ScopedFiles};
pub use segments::{PathInput, Segments, normalize, validate_segment};
