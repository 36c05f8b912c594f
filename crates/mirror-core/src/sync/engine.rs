//! SyncEngine implementation
//!
//! The engine walks a [`SyncTree`] depth first, children before parents.
//! For every directory it compares the leaves against the manifest stored
//! by the previous run, reloads only what changed, deletes what vanished and
//! writes a fresh manifest. Changes are handed to a [`Batcher`].

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use mirror_fs::{ScopedFile, ScopedFiles, Segments, validate_segment};
use mirror_resource::{
    Freshness, KindRegistry, Mark, Node, Resource, SyncItem, SyncTree, TreeBuilder, empty_mark,
};
use mirror_storage::{Change, Storage};
use tracing::{debug, info, warn};

use super::batch::Batcher;
use super::report::{DirectoryReport, ItemFailure, SyncReport};
use crate::config::{ItemErrorPolicy, SyncConfig};
use crate::manifest::{FileEntry, FolderEntry, MANIFEST_FILENAME, Manifest};
use crate::{Error, Result};

/// Options for a single run
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Compute the plan without loading items or writing to the storage.
    pub dry_run: bool,
}

/// Outcome of probing one leaf.
enum Probed {
    /// The stored copy is current; keep its mark.
    Reuse(Mark),
    /// The item must be uploaded again. The file is absent in dry runs.
    Reload(Mark, Option<ScopedFile>),
}

fn probe_item(item: &SyncItem, previous: Option<&FileEntry>, dry_run: bool) -> Result<Probed> {
    let item_error = |source| Error::Item {
        path: item.segments().to_path_string(),
        source,
    };

    let previous = previous.filter(|entry| entry.kind == item.kind());
    let mark = match item.refresh_mark(previous.map(|entry| &entry.mark)) {
        Ok(Freshness::Unchanged) => match previous {
            Some(entry) => {
                debug!(path = %item.segments(), "unchanged, reusing stored copy");
                return Ok(Probed::Reuse(entry.mark.clone()));
            }
            None => empty_mark(),
        },
        Ok(Freshness::Changed(mark)) => mark,
        Err(err) => return Err(item_error(err)),
    };

    if dry_run {
        return Ok(Probed::Reload(mark, None));
    }
    let file = item.load_file().map_err(item_error)?;
    debug!(path = %item.segments(), "reloaded");
    Ok(Probed::Reload(mark, Some(file)))
}

/// Engine for synchronizing a resource into a storage
pub struct SyncEngine<'a, S: Storage + ?Sized> {
    registry: &'a KindRegistry,
    storage: &'a S,
    config: SyncConfig,
}

impl<'a, S: Storage + ?Sized> SyncEngine<'a, S> {
    pub fn new(registry: &'a KindRegistry, storage: &'a S, config: SyncConfig) -> Self {
        Self {
            registry,
            storage,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Build the tree of `resource` and synchronize it.
    pub fn sync<R: Resource + ?Sized>(&self, resource: &mut R) -> Result<SyncReport> {
        self.run(resource, SyncOptions::default())
    }

    /// Report what [`sync`](Self::sync) would do without changing anything.
    ///
    /// Items are still probed, which may involve network requests.
    pub fn plan<R: Resource + ?Sized>(&self, resource: &mut R) -> Result<SyncReport> {
        self.run(resource, SyncOptions { dry_run: true })
    }

    pub fn run<R: Resource + ?Sized>(
        &self,
        resource: &mut R,
        options: SyncOptions,
    ) -> Result<SyncReport> {
        self.config.validate()?;
        let outcome = TreeBuilder::new(self.registry).build(resource)?;
        debug!(replaced = outcome.replaced, "tree built");
        self.sync_tree(&outcome.tree, options)
    }

    /// Synchronize an already built tree.
    pub fn sync_tree(&self, tree: &SyncTree, options: SyncOptions) -> Result<SyncReport> {
        self.config.validate()?;
        let (folders, leaves) = tree.count();
        debug!(folders, leaves, dry_run = options.dry_run, "starting sync");

        let mut report = SyncReport {
            dry_run: options.dry_run,
            folders,
            leaves,
            ..SyncReport::default()
        };
        let mut batcher = if options.dry_run {
            None
        } else {
            Some(Batcher::new(self.storage, self.config.batch)?)
        };

        self.sync_folder(tree, &Segments::root(), &mut batcher, &mut report)?;

        if let Some(batcher) = batcher {
            report.batches = batcher.finish()?;
        }
        info!(
            uploaded = report.uploaded(),
            deleted = report.deleted(),
            reused = report.reused(),
            failed = report.failures.len(),
            batches = report.batches,
            "sync finished"
        );
        Ok(report)
    }

    fn sync_folder(
        &self,
        tree: &SyncTree,
        path: &Segments,
        batcher: &mut Option<Batcher<'a, S>>,
        report: &mut SyncReport,
    ) -> Result<()> {
        let old = Manifest::load(self.storage, path)?;
        let mut manifest = Manifest::new(path, tree.metadata().clone());
        let mut leaves: Vec<(&str, &SyncItem)> = Vec::new();

        for (name, node) in tree.children() {
            validate_segment(path.len(), name)?;
            match node {
                Node::Folder(child) => {
                    self.sync_folder(child, &path.child(name), batcher, report)?;
                    manifest.folders.push(FolderEntry {
                        name: name.clone(),
                        metadata: child.metadata().clone(),
                    });
                }
                Node::Leaf(_) if name == MANIFEST_FILENAME => {
                    return Err(Error::ReservedName {
                        path: path.to_path_string(),
                        name: name.clone(),
                    });
                }
                Node::Leaf(item) => leaves.push((name, item)),
            }
        }

        let dry_run = batcher.is_none();
        let probes = self.probe_all(&leaves, old.as_ref(), dry_run);

        let mut directory = DirectoryReport::new(path.to_path_string());
        let mut files = ScopedFiles::new();
        let mut changes: Vec<Change> = Vec::new();

        for ((name, item), probed) in leaves.iter().zip(probes) {
            let mark = match probed {
                Ok(Probed::Reuse(mark)) => {
                    directory.reused.push(name.to_string());
                    mark
                }
                Ok(Probed::Reload(mark, file)) => {
                    if let Some(file) = file {
                        let local = files.push(file);
                        changes.push(Change::upload(local, path.child(name)));
                    }
                    directory.uploaded.push(name.to_string());
                    mark
                }
                Err(err) => {
                    self.handle_failure(item, err, report)?;
                    if let Some(entry) = old.as_ref().and_then(|m| m.file(name)) {
                        manifest.files.push(entry.clone());
                    }
                    continue;
                }
            };
            manifest.files.push(FileEntry {
                name: name.to_string(),
                kind: item.kind().to_string(),
                mark,
                metadata: item.metadata().clone(),
            });
        }

        if let Some(old) = &old {
            let current = manifest.names();
            for stale in old.names().difference(&current) {
                changes.push(Change::delete(path.child(stale)));
                directory.deleted.push(stale.to_string());
            }
        }

        manifest.sort();
        directory.manifest_changed = old.as_ref() != Some(&manifest);

        if let Some(batcher) = batcher.as_mut() {
            let text = manifest.to_json()?;
            let local = files.push(ScopedFile::from_text(MANIFEST_FILENAME, &text)?);
            changes.push(Change::upload(local, Manifest::location(path)));
            batcher.submit(changes)?;
        }
        drop(files);

        info!(
            path = %path,
            uploaded = directory.uploaded.len(),
            deleted = directory.deleted.len(),
            reused = directory.reused.len(),
            "directory processed"
        );
        report.directories.push(directory);
        Ok(())
    }

    fn handle_failure(&self, item: &SyncItem, err: Error, report: &mut SyncReport) -> Result<()> {
        match self.config.on_item_error {
            ItemErrorPolicy::Abort => Err(err),
            ItemErrorPolicy::Skip => {
                warn!(path = %item.segments(), error = %err, "skipping failed item");
                report.failures.push(ItemFailure {
                    path: item.segments().to_path_string(),
                    kind: item.kind().to_string(),
                    error: err.to_string(),
                });
                Ok(())
            }
        }
    }

    /// Probe every leaf on up to `workers` threads. Results keep the order
    /// of `leaves`.
    fn probe_all(
        &self,
        leaves: &[(&str, &SyncItem)],
        old: Option<&Manifest>,
        dry_run: bool,
    ) -> Vec<Result<Probed>> {
        let next = AtomicUsize::new(0);
        let slots: Vec<Mutex<Option<Result<Probed>>>> =
            leaves.iter().map(|_| Mutex::new(None)).collect();
        let workers = self.config.workers.clamp(1, leaves.len().max(1));

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some((name, item)) = leaves.get(index) else {
                            break;
                        };
                        let previous = old.and_then(|m| m.file(name));
                        let outcome =
                            catch_unwind(AssertUnwindSafe(|| probe_item(item, previous, dry_run)))
                                .unwrap_or_else(|_| {
                                    Err(Error::ProbePanicked {
                                        path: item.segments().to_path_string(),
                                    })
                                });
                        if let Ok(mut slot) = slots[index].lock() {
                            *slot = Some(outcome);
                        }
                    }
                });
            }
        });

        slots
            .into_iter()
            .zip(leaves)
            .map(|(slot, (_, item))| {
                slot.into_inner().ok().flatten().unwrap_or_else(|| {
                    Err(Error::ProbePanicked {
                        path: item.segments().to_path_string(),
                    })
                })
            })
            .collect()
    }
}
