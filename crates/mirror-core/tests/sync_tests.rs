//! End-to-end tests of the sync engine against a local storage

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use mirror_core::{
    BatchMode, Error, ItemErrorPolicy, MANIFEST_FILENAME, Manifest, SyncConfig, SyncEngine,
};
use mirror_fs::{Segments, normalize};
use mirror_resource::{Declaration, Fetcher, HttpConfig, KindRegistry, Metadata};
use mirror_storage::LocalStorage;
use mirror_test_utils::{COUNTED_KIND, LoadCounter, StaticResource, register_counted};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;
use tempfile::TempDir;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

struct Fixture {
    dest: TempDir,
    registry: KindRegistry,
    counter: LoadCounter,
}

impl Fixture {
    fn new() -> Self {
        let fetcher = Arc::new(Fetcher::new(HttpConfig::default()).unwrap());
        let mut registry = KindRegistry::with_builtins(fetcher);
        let counter = register_counted(&mut registry).unwrap();
        Self {
            dest: TempDir::new().unwrap(),
            registry,
            counter,
        }
    }

    fn storage(&self) -> LocalStorage {
        LocalStorage::new(self.dest.path())
    }

    fn root(&self) -> &Path {
        self.dest.path()
    }

    fn read(&self, path: &str) -> String {
        fs::read_to_string(self.root().join(path)).unwrap()
    }

    fn manifest(&self, dir: &str) -> Manifest {
        let dir = normalize(dir).unwrap();
        Manifest::load(&self.storage(), &dir).unwrap().unwrap()
    }
}

fn counted(content: &str, path: &str) -> Declaration {
    Declaration::new(COUNTED_KIND, content, path)
}

fn sample() -> StaticResource {
    let mut folder_meta = Metadata::new();
    folder_meta.insert("title".into(), json!("Docs"));
    StaticResource::new(vec![
        counted("root", "index.txt"),
        counted("guide", "docs/guide.txt"),
        counted("deep", "docs/api/deep.txt"),
        Declaration::metadata(folder_meta, "docs"),
    ])
}

#[test]
fn first_run_writes_files_and_manifests() {
    let fx = Fixture::new();
    let storage = fx.storage();
    let engine = SyncEngine::new(&fx.registry, &storage, SyncConfig::default());

    let report = engine.sync(&mut sample()).unwrap();

    assert_eq!(fx.read("index.txt"), "root");
    assert_eq!(fx.read("docs/guide.txt"), "guide");
    assert_eq!(fx.read("docs/api/deep.txt"), "deep");
    assert_eq!(report.uploaded(), 3);
    assert_eq!(report.folders, 2);
    assert_eq!(report.leaves, 3);
    assert_eq!(fx.counter.loads(), 3);

    // Children complete before their parents.
    let order: Vec<&str> = report.directories.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(order, vec!["docs/api", "docs", ""]);

    let root = fx.manifest("");
    assert_eq!(root.files.len(), 1);
    assert_eq!(root.files[0].kind, COUNTED_KIND);
    assert_eq!(root.folders[0].name, "docs");
    assert_eq!(root.folders[0].metadata.get("title"), Some(&json!("Docs")));

    let docs = fx.manifest("docs");
    assert_eq!(docs.path, "docs");
    assert_eq!(docs.metadata.get("title"), Some(&json!("Docs")));
    assert_eq!(docs.file("guide.txt").unwrap().mark, json!({"content": "guide"}));
}

#[test]
fn second_run_reuses_everything() {
    let fx = Fixture::new();
    let storage = fx.storage();
    let engine = SyncEngine::new(&fx.registry, &storage, SyncConfig::default());
    let mut resource = sample();

    engine.sync(&mut resource).unwrap();
    fx.counter.reset();
    let report = engine.sync(&mut resource).unwrap();

    assert_eq!(fx.counter.loads(), 0);
    assert_eq!(report.reused(), 3);
    assert!(report.is_noop(), "{report:#?}");
}

#[test]
fn only_changed_items_are_reloaded() {
    let fx = Fixture::new();
    let storage = fx.storage();
    let engine = SyncEngine::new(&fx.registry, &storage, SyncConfig::default());
    let mut resource = sample();
    engine.sync(&mut resource).unwrap();
    fx.counter.reset();

    resource.set(counted("guide v2", "docs/guide.txt"));
    let report = engine.sync(&mut resource).unwrap();

    assert_eq!(fx.counter.loads(), 1);
    assert_eq!(report.directory("docs").unwrap().uploaded, vec!["guide.txt"]);
    assert_eq!(fx.read("docs/guide.txt"), "guide v2");
    assert!(report.directory("docs").unwrap().manifest_changed);
    assert!(!report.directory("docs/api").unwrap().manifest_changed);
}

#[test]
fn removed_items_and_folders_are_deleted() {
    let fx = Fixture::new();
    let storage = fx.storage();
    let engine = SyncEngine::new(&fx.registry, &storage, SyncConfig::default());
    let mut resource = sample();
    engine.sync(&mut resource).unwrap();

    resource.remove("docs/api/deep.txt");
    resource.remove("index.txt");
    let report = engine.sync(&mut resource).unwrap();

    assert_eq!(report.directory("docs").unwrap().deleted, vec!["api"]);
    assert_eq!(report.directory("").unwrap().deleted, vec!["index.txt"]);
    assert!(!fx.root().join("docs/api").exists());
    assert!(!fx.root().join("index.txt").exists());
    assert_eq!(fx.read("docs/guide.txt"), "guide");
    assert!(fx.manifest("").file("index.txt").is_none());
}

#[rstest]
#[case(BatchMode::Immediate, 3)]
#[case(BatchMode::Threshold(1), 3)]
#[case(BatchMode::Threshold(100), 1)]
#[case(BatchMode::Deferred, 1)]
fn batch_modes_produce_the_same_destination(#[case] mode: BatchMode, #[case] batches: usize) {
    let fx = Fixture::new();
    let storage = fx.storage();
    let engine = SyncEngine::new(
        &fx.registry,
        &storage,
        SyncConfig::default().with_batch(mode),
    );

    let report = engine.sync(&mut sample()).unwrap();

    assert_eq!(report.batches, batches);
    assert_eq!(fx.read("docs/api/deep.txt"), "deep");
    assert!(fx.root().join(MANIFEST_FILENAME).is_file());
    assert!(fx.root().join("docs/api").join(MANIFEST_FILENAME).is_file());
}

#[rstest]
#[case(1)]
#[case(8)]
fn worker_count_does_not_change_the_outcome(#[case] workers: usize) {
    let fx = Fixture::new();
    let storage = fx.storage();
    let engine = SyncEngine::new(
        &fx.registry,
        &storage,
        SyncConfig::default().with_workers(workers),
    );
    let declarations = (0..20)
        .map(|i| counted(&format!("file {i}"), &format!("bulk/f{i:02}.txt")))
        .collect();

    let report = engine.sync(&mut StaticResource::new(declarations)).unwrap();

    let bulk = report.directory("bulk").unwrap();
    assert_eq!(bulk.uploaded.len(), 20);
    assert_eq!(bulk.uploaded[0], "f00.txt");
    assert_eq!(fx.read("bulk/f13.txt"), "file 13");
}

#[test]
fn abort_policy_fails_the_run() {
    let fx = Fixture::new();
    let storage = fx.storage();
    let engine = SyncEngine::new(
        &fx.registry,
        &storage,
        SyncConfig::default().with_batch(BatchMode::Deferred),
    );
    let mut resource = sample();
    resource.push(counted("fail:unreachable", "broken.txt"));

    let err = engine.sync(&mut resource).unwrap_err();

    assert!(matches!(err, Error::Item { ref path, .. } if path == "broken.txt"), "{err}");
    // Deferred: nothing was committed.
    assert_eq!(fs::read_dir(fx.root()).unwrap().count(), 0);
}

#[test]
fn skip_policy_records_failure_and_continues() {
    let fx = Fixture::new();
    let storage = fx.storage();
    let engine = SyncEngine::new(
        &fx.registry,
        &storage,
        SyncConfig::default().with_item_errors(ItemErrorPolicy::Skip),
    );
    let mut resource = sample();
    resource.push(counted("fail:unreachable", "broken.txt"));

    let report = engine.sync(&mut resource).unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, "broken.txt");
    assert_eq!(report.failures[0].kind, COUNTED_KIND);
    assert_eq!(fx.read("index.txt"), "root");
    assert!(!fx.root().join("broken.txt").exists());
    assert!(fx.manifest("").file("broken.txt").is_none());
}

#[test]
fn skipped_item_keeps_previous_copy() {
    let fx = Fixture::new();
    let storage = fx.storage();
    let engine = SyncEngine::new(
        &fx.registry,
        &storage,
        SyncConfig::default().with_item_errors(ItemErrorPolicy::Skip),
    );
    let mut resource = sample();
    engine.sync(&mut resource).unwrap();

    resource.set(counted("fail:offline", "index.txt"));
    let report = engine.sync(&mut resource).unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(fx.read("index.txt"), "root");
    assert_eq!(
        fx.manifest("").file("index.txt").unwrap().mark,
        json!({"content": "root"})
    );
    assert!(report.directory("").unwrap().deleted.is_empty());
}

#[test]
fn panicking_item_becomes_an_error() {
    let fx = Fixture::new();
    let storage = fx.storage();
    let engine = SyncEngine::new(&fx.registry, &storage, SyncConfig::default());
    let mut resource = StaticResource::new(vec![counted("panic:boom", "a/boom.txt")]);

    let err = engine.sync(&mut resource).unwrap_err();

    assert!(matches!(err, Error::ProbePanicked { ref path } if path == "a/boom.txt"), "{err}");
}

#[test]
fn plan_changes_nothing() {
    let fx = Fixture::new();
    let storage = fx.storage();
    let engine = SyncEngine::new(&fx.registry, &storage, SyncConfig::default());

    let report = engine.plan(&mut sample()).unwrap();

    assert!(report.dry_run);
    assert_eq!(report.uploaded(), 3);
    assert_eq!(report.batches, 0);
    assert_eq!(fx.counter.loads(), 0);
    assert_eq!(fs::read_dir(fx.root()).unwrap().count(), 0);
}

#[test]
fn plan_after_sync_reports_deletions() {
    let fx = Fixture::new();
    let storage = fx.storage();
    let engine = SyncEngine::new(&fx.registry, &storage, SyncConfig::default());
    let mut resource = sample();
    engine.sync(&mut resource).unwrap();

    resource.remove("index.txt");
    let report = engine.plan(&mut resource).unwrap();

    assert_eq!(report.directory("").unwrap().deleted, vec!["index.txt"]);
    assert!(fx.root().join("index.txt").exists());
}

#[test]
fn manifest_name_is_reserved() {
    let fx = Fixture::new();
    let storage = fx.storage();
    let engine = SyncEngine::new(&fx.registry, &storage, SyncConfig::default());
    let mut resource = StaticResource::new(vec![Declaration::text("{}", "dir/.meta.json")]);

    let err = engine.sync(&mut resource).unwrap_err();

    assert!(matches!(err, Error::ReservedName { ref path, .. } if path == "dir"), "{err}");
}

#[test]
fn file_and_folder_can_swap_places() {
    let fx = Fixture::new();
    let storage = fx.storage();
    let engine = SyncEngine::new(&fx.registry, &storage, SyncConfig::default());

    engine
        .sync(&mut StaticResource::new(vec![counted("file", "swap")]))
        .unwrap();
    assert_eq!(fx.read("swap"), "file");

    engine
        .sync(&mut StaticResource::new(vec![counted("inner", "swap/inner.txt")]))
        .unwrap();
    assert_eq!(fx.read("swap/inner.txt"), "inner");
    assert_eq!(fx.manifest("").folders[0].name, "swap");

    engine
        .sync(&mut StaticResource::new(vec![counted("file again", "swap")]))
        .unwrap();
    assert_eq!(fx.read("swap"), "file again");
}

#[test]
fn resource_error_aborts_before_writing() {
    let fx = Fixture::new();
    let storage = fx.storage();
    let engine = SyncEngine::new(&fx.registry, &storage, SyncConfig::default());
    let mut resource = sample().failing_after(1, "listing interrupted");

    let err = engine.sync(&mut resource).unwrap_err();

    assert!(matches!(err, Error::Resource(_)), "{err}");
    assert_eq!(fs::read_dir(fx.root()).unwrap().count(), 0);
}

#[test]
fn namespace_keeps_manifests_inside() {
    let fx = Fixture::new();
    let storage = fx.storage().with_namespace("mirror/v1").unwrap();
    let engine = SyncEngine::new(&fx.registry, &storage, SyncConfig::default());

    engine.sync(&mut sample()).unwrap();

    assert_eq!(fx.read("mirror/v1/docs/guide.txt"), "guide");
    assert!(fx.root().join("mirror/v1").join(MANIFEST_FILENAME).is_file());
    let root = Manifest::load(&storage, &Segments::root()).unwrap().unwrap();
    assert_eq!(root.folders[0].name, "docs");
}

#[test]
fn invalid_config_is_rejected() {
    let fx = Fixture::new();
    let storage = fx.storage();
    let engine = SyncEngine::new(&fx.registry, &storage, SyncConfig::default().with_workers(0));

    assert!(matches!(engine.sync(&mut sample()), Err(Error::Config { .. })));
}

/// Counts WARN events seen by the current thread's subscriber.
struct WarnCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn replaced_leaf_warns_exactly_once() {
    let fx = Fixture::new();
    let storage = fx.storage();
    let engine = SyncEngine::new(&fx.registry, &storage, SyncConfig::default());
    let mut resource = vec![
        Declaration::text("first", "f.txt"),
        Declaration::text("second", "f.txt"),
    ];
    let warnings = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(WarnCounter(Arc::clone(&warnings)));

    tracing::subscriber::with_default(subscriber, || engine.sync(&mut resource).unwrap());

    assert_eq!(warnings.load(Ordering::SeqCst), 1);
    assert_eq!(fx.read("f.txt"), "second");
}
