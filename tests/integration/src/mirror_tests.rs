//! Whole-mirror scenarios across resources, storage and the sync engine

use std::cell::Cell;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use mirror_core::{BatchMode, Error, Manifest, SyncConfig, SyncEngine};
use mirror_fs::Segments;
use mirror_resource::{
    Declaration, DeclarationStream, Fetcher, HttpConfig, KindRegistry, LocalDirectoryResource,
    Metadata, VersionSource, VersionedResource,
};
use mirror_storage::{BatchSummary, Change, LocalStorage, Storage};
use serde_json::json;
use tempfile::TempDir;
use walkdir::WalkDir;

fn registry() -> KindRegistry {
    KindRegistry::with_builtins(Arc::new(Fetcher::new(HttpConfig::default()).unwrap()))
}

/// Relative paths of every file below `root`, sorted.
fn listing(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

struct Releases(Vec<String>);

impl VersionSource for Releases {
    fn grab_items(&mut self) -> mirror_resource::Result<DeclarationStream<'_>> {
        Ok(Box::new(self.0.iter().flat_map(|version| {
            let mut meta = Metadata::new();
            meta.insert("release".into(), json!(version));
            [
                Ok(Declaration::version(version.clone(), [version.as_str()])),
                Ok(Declaration::text(
                    format!("changelog of {version}"),
                    [version.as_str(), "CHANGELOG.md"],
                )),
                Ok(Declaration::metadata(meta, [version.as_str()])),
            ]
        })))
    }
}

#[test]
fn versioned_releases_get_pointer_files() {
    let dest = TempDir::new().unwrap();
    let storage = LocalStorage::new(dest.path());
    let registry = registry();
    let engine = SyncEngine::new(&registry, &storage, SyncConfig::default());
    let mut resource = VersionedResource::new(Releases(vec![
        "1.9.0".into(),
        "1.10.0".into(),
        "2.0.0".into(),
    ]));

    engine.sync(&mut resource).unwrap();

    let read = |name: &str| fs::read_to_string(dest.path().join(name)).unwrap();
    assert_eq!(read("LATEST_RELEASE"), "2.0.0");
    assert_eq!(read("LATEST_RELEASE_1"), "1.10.0");
    assert_eq!(read("LATEST_RELEASE_1.9"), "1.9.0");
    assert_eq!(read("1.10.0/CHANGELOG.md"), "changelog of 1.10.0");

    let root = Manifest::load(&storage, &Segments::root()).unwrap().unwrap();
    let release = root.folders.iter().find(|f| f.name == "2.0.0").unwrap();
    assert_eq!(release.metadata.get("release"), Some(&json!("2.0.0")));
}

#[test]
fn new_release_moves_the_pointers() {
    let dest = TempDir::new().unwrap();
    let storage = LocalStorage::new(dest.path());
    let registry = registry();
    let engine = SyncEngine::new(&registry, &storage, SyncConfig::default());
    let mut resource = VersionedResource::new(Releases(vec!["1.0.0".into()]));
    engine.sync(&mut resource).unwrap();

    let mut resource = VersionedResource::new(Releases(vec!["1.0.0".into(), "1.1.0".into()]));
    let report = engine.sync(&mut resource).unwrap();

    assert_eq!(
        fs::read_to_string(dest.path().join("LATEST_RELEASE")).unwrap(),
        "1.1.0"
    );
    assert!(dest.path().join("LATEST_RELEASE_1.1.0").is_file());
    assert!(report.directory("1.1.0").is_some());
}

#[test]
fn local_directory_is_mirrored_incrementally() {
    let source = TempDir::new().unwrap();
    fs::create_dir_all(source.path().join("img")).unwrap();
    fs::write(source.path().join("readme.md"), "# hi").unwrap();
    fs::write(source.path().join("img/a.png"), "aaaa").unwrap();
    fs::write(source.path().join("img/b.png"), "bbbb").unwrap();

    let dest = TempDir::new().unwrap();
    let storage = LocalStorage::new(dest.path());
    let registry = registry();
    let engine = SyncEngine::new(&registry, &storage, SyncConfig::default());
    let mut resource = LocalDirectoryResource::new(source.path());

    engine.sync(&mut resource).unwrap();
    assert_eq!(
        listing(dest.path()),
        vec![".meta.json", "img/.meta.json", "img/a.png", "img/b.png", "readme.md"]
    );

    let report = engine.sync(&mut resource).unwrap();
    assert!(report.is_noop(), "{report:#?}");

    fs::write(source.path().join("img/a.png"), "AAAA!").unwrap();
    fs::remove_file(source.path().join("img/b.png")).unwrap();
    let report = engine.sync(&mut resource).unwrap();

    let img = report.directory("img").unwrap();
    assert_eq!(img.uploaded, vec!["a.png"]);
    assert_eq!(img.deleted, vec!["b.png"]);
    assert_eq!(fs::read_to_string(dest.path().join("img/a.png")).unwrap(), "AAAA!");
    assert!(!dest.path().join("img/b.png").exists());
}

/// Fails the n-th batch, passing everything else to a local storage.
struct FlakyStorage {
    inner: LocalStorage,
    fail_at: usize,
    seen: Cell<usize>,
}

impl Storage for FlakyStorage {
    fn path_join(&self, segments: &[String]) -> String {
        self.inner.path_join(segments)
    }

    fn file_exists(&self, file: &Segments) -> bool {
        self.inner.file_exists(file)
    }

    fn read_text(&self, file: &Segments) -> mirror_storage::Result<String> {
        self.inner.read_text(file)
    }

    fn batch_change_files(&self, changes: &[Change]) -> mirror_storage::Result<BatchSummary> {
        self.seen.set(self.seen.get() + 1);
        if self.seen.get() == self.fail_at {
            return Err(mirror_storage::Error::Backend {
                message: "connection reset".into(),
            });
        }
        self.inner.batch_change_files(changes)
    }
}

#[test]
fn interrupted_run_converges_on_retry() {
    let dest = TempDir::new().unwrap();
    let registry = registry();
    let mut resource = vec![
        Declaration::text("one", "a/one.txt"),
        Declaration::text("two", "b/two.txt"),
        Declaration::text("root", "root.txt"),
    ];

    let flaky = FlakyStorage {
        inner: LocalStorage::new(dest.path()),
        fail_at: 2,
        seen: Cell::new(0),
    };
    let engine = SyncEngine::new(&registry, &flaky, SyncConfig::default());
    let err = engine.sync(&mut resource).unwrap_err();
    assert!(matches!(err, Error::Storage(_)), "{err}");
    // The first directory was committed, the rest never reached the storage.
    assert_eq!(listing(dest.path()), vec!["a/.meta.json", "a/one.txt"]);

    let storage = LocalStorage::new(dest.path());
    let engine = SyncEngine::new(&registry, &storage, SyncConfig::default());
    engine.sync(&mut resource).unwrap();

    assert_eq!(
        listing(dest.path()),
        vec![
            ".meta.json",
            "a/.meta.json",
            "a/one.txt",
            "b/.meta.json",
            "b/two.txt",
            "root.txt",
        ]
    );
}

#[test]
fn deferred_mode_leaves_nothing_behind_on_failure() {
    let dest = TempDir::new().unwrap();
    let registry = registry();
    let mut resource = vec![
        Declaration::text("one", "a/one.txt"),
        Declaration::text("root", "root.txt"),
    ];
    let flaky = FlakyStorage {
        inner: LocalStorage::new(dest.path()),
        fail_at: 1,
        seen: Cell::new(0),
    };
    let engine = SyncEngine::new(
        &registry,
        &flaky,
        SyncConfig::default().with_batch(BatchMode::Deferred),
    );

    assert!(engine.sync(&mut resource).is_err());
    assert!(listing(dest.path()).is_empty());
}
