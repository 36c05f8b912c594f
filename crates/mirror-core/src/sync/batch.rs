//! Batch submission according to the configured [`BatchMode`]

use mirror_fs::FilePool;
use mirror_storage::{BatchSummary, Change, Storage};
use tracing::{debug, info};

use crate::Result;
use crate::config::BatchMode;

/// Collects directory change sets and commits them to the storage.
///
/// In the accumulating modes every uploaded file is copied into a private
/// pool right away, because the scoped file it came from is released as
/// soon as its directory is done.
pub(crate) struct Batcher<'s, S: Storage + ?Sized> {
    storage: &'s S,
    mode: BatchMode,
    pending: Vec<Change>,
    pool: Option<FilePool>,
    batches: usize,
}

impl<'s, S: Storage + ?Sized> Batcher<'s, S> {
    pub(crate) fn new(storage: &'s S, mode: BatchMode) -> Result<Self> {
        let pool = match mode {
            BatchMode::Immediate => None,
            BatchMode::Threshold(_) | BatchMode::Deferred => Some(FilePool::new()?),
        };
        Ok(Self {
            storage,
            mode,
            pending: Vec::new(),
            pool,
            batches: 0,
        })
    }

    /// Hand over the changes of one directory.
    pub(crate) fn submit(&mut self, changes: Vec<Change>) -> Result<()> {
        let Some(pool) = self.pool.as_mut() else {
            if !changes.is_empty() {
                self.commit(&changes)?;
            }
            return Ok(());
        };

        for change in changes {
            let local = match &change.local {
                Some(path) => Some(pool.put_file(path)?),
                None => None,
            };
            self.pending.push(Change {
                local,
                target: change.target,
            });
        }
        debug!(pending = self.pending.len(), staged = pool.len(), "changes staged");

        if let BatchMode::Threshold(threshold) = self.mode
            && self.pending.len() >= threshold
        {
            self.flush()?;
        }
        Ok(())
    }

    /// Commit everything pending and discard staged copies.
    pub(crate) fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let changes = std::mem::take(&mut self.pending);
        self.commit(&changes)?;
        if let Some(pool) = self.pool.as_mut() {
            pool.cleanup()?;
        }
        Ok(())
    }

    /// Flush the remainder and return how many batches were committed.
    pub(crate) fn finish(mut self) -> Result<usize> {
        self.flush()?;
        Ok(self.batches)
    }

    fn commit(&mut self, changes: &[Change]) -> Result<BatchSummary> {
        let summary = self.storage.batch_change_files(changes)?;
        self.batches += 1;
        info!(
            batch = self.batches,
            changes = changes.len(),
            uploaded = summary.uploaded,
            deleted = summary.deleted,
            "batch submitted"
        );
        Ok(summary)
    }
}
