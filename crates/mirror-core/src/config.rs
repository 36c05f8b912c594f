//! Sync engine configuration
//!
//! ```toml
//! batch = { threshold = 50 }   # or "immediate" / "deferred"
//! workers = 4
//! on_item_error = "skip"       # or "abort"
//!
//! [http]
//! timeout_secs = 30
//! max_retries = 3
//! ```

use std::path::Path;

use mirror_fs::ConfigStore;
use mirror_resource::HttpConfig;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// When computed changes are handed to the storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// One batch per directory, as soon as it is computed
    #[default]
    Immediate,
    /// Accumulate across directories, flush once this many changes are pending
    Threshold(usize),
    /// A single batch after the whole tree was walked
    Deferred,
}

impl BatchMode {
    /// Interpret a numeric batch size: `0` is immediate, a positive number is
    /// a threshold and `-1` defers everything to the end of the run.
    pub fn from_batch_size(size: i64) -> Result<Self> {
        match size {
            0 => Ok(Self::Immediate),
            -1 => Ok(Self::Deferred),
            n if n > 0 => Ok(Self::Threshold(n as usize)),
            n => Err(Error::Config {
                message: format!("invalid batch size {n}, expected -1, 0 or a positive number"),
            }),
        }
    }
}

/// What to do when a single item cannot be probed or loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemErrorPolicy {
    /// Fail the whole run
    #[default]
    Abort,
    /// Record the failure, keep the previous manifest entry, continue
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub batch: BatchMode,
    /// Concurrent probes per directory
    pub workers: usize,
    pub on_item_error: ItemErrorPolicy,
    pub http: HttpConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch: BatchMode::default(),
            workers: 4,
            on_item_error: ItemErrorPolicy::default(),
            http: HttpConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Load from a TOML, JSON or YAML file, chosen by extension.
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = ConfigStore::new().load(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        Ok(ConfigStore::new().save(path, self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config {
                message: "workers must be at least 1".into(),
            });
        }
        if self.batch == BatchMode::Threshold(0) {
            return Err(Error::Config {
                message: "batch threshold must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn with_batch(mut self, batch: BatchMode) -> Self {
        self.batch = batch;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_item_errors(mut self, policy: ItemErrorPolicy) -> Self {
        self.on_item_error = policy;
        self
    }
}
