//! Remote items synchronized from a local HTTP fixture server
//!
//! Exercises the freshness protocol end to end: ETag revalidation, Expires
//! short-circuits and failing endpoints.

use std::fs;
use std::sync::Arc;

use chrono::{Duration, Utc};
use mirror_core::{Error, ItemErrorPolicy, SyncConfig, SyncEngine};
use mirror_resource::{Declaration, Fetcher, HttpConfig, KindRegistry};
use mirror_storage::LocalStorage;
use mirror_test_utils::{FixtureServer, Route, StaticResource};
use tempfile::TempDir;

fn registry() -> KindRegistry {
    let config = HttpConfig {
        timeout_secs: 5,
        max_retries: 0,
        ..HttpConfig::default()
    };
    KindRegistry::with_builtins(Arc::new(Fetcher::new(config).unwrap()))
}

fn http_date(offset: Duration) -> String {
    (Utc::now() + offset)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

#[test]
fn etag_revalidation_skips_the_download() {
    let server = FixtureServer::start();
    server.route("/logo.png", Route::new("png v1").with_etag("\"v1\""));
    let dest = TempDir::new().unwrap();
    let storage = LocalStorage::new(dest.path());
    let registry = registry();
    let engine = SyncEngine::new(&registry, &storage, SyncConfig::default());
    let mut resource =
        StaticResource::new(vec![Declaration::remote(server.url("/logo.png"), "assets/logo.png")]);

    engine.sync(&mut resource).unwrap();
    assert_eq!(fs::read_to_string(dest.path().join("assets/logo.png")).unwrap(), "png v1");
    assert_eq!(server.hits("GET", "/logo.png"), 1);

    let report = engine.sync(&mut resource).unwrap();

    assert_eq!(server.hits("HEAD", "/logo.png"), 2);
    assert_eq!(server.hits("GET", "/logo.png"), 1);
    assert_eq!(report.reused(), 1);
    assert!(report.is_noop());
}

#[test]
fn new_etag_triggers_a_download() {
    let server = FixtureServer::start();
    server.route("/data.csv", Route::new("a,b").with_etag("\"1\""));
    let dest = TempDir::new().unwrap();
    let storage = LocalStorage::new(dest.path());
    let registry = registry();
    let engine = SyncEngine::new(&registry, &storage, SyncConfig::default());
    let mut resource =
        StaticResource::new(vec![Declaration::remote(server.url("/data.csv"), "data.csv")]);
    engine.sync(&mut resource).unwrap();

    server.route("/data.csv", Route::new("a,b,c").with_etag("\"2\""));
    let report = engine.sync(&mut resource).unwrap();

    assert_eq!(report.uploaded(), 1);
    assert_eq!(server.hits("GET", "/data.csv"), 2);
    assert_eq!(fs::read_to_string(dest.path().join("data.csv")).unwrap(), "a,b,c");
}

#[test]
fn unexpired_response_is_not_revalidated() {
    let server = FixtureServer::start();
    server.route(
        "/cached.txt",
        Route::new("cached").with_expires(http_date(Duration::hours(1))),
    );
    let dest = TempDir::new().unwrap();
    let storage = LocalStorage::new(dest.path());
    let registry = registry();
    let engine = SyncEngine::new(&registry, &storage, SyncConfig::default());
    let mut resource =
        StaticResource::new(vec![Declaration::remote(server.url("/cached.txt"), "cached.txt")]);

    engine.sync(&mut resource).unwrap();
    engine.sync(&mut resource).unwrap();

    assert_eq!(server.hits("HEAD", "/cached.txt"), 1);
    assert_eq!(server.hits("GET", "/cached.txt"), 1);
}

#[test]
fn expired_response_without_etag_is_downloaded_again() {
    let server = FixtureServer::start();
    server.route(
        "/stale.txt",
        Route::new("stale").with_expires(http_date(Duration::hours(-1))),
    );
    let dest = TempDir::new().unwrap();
    let storage = LocalStorage::new(dest.path());
    let registry = registry();
    let engine = SyncEngine::new(&registry, &storage, SyncConfig::default());
    let mut resource =
        StaticResource::new(vec![Declaration::remote(server.url("/stale.txt"), "stale.txt")]);

    engine.sync(&mut resource).unwrap();
    engine.sync(&mut resource).unwrap();

    assert_eq!(server.hits("GET", "/stale.txt"), 2);
}

#[test]
fn missing_remote_aborts_by_default() {
    let server = FixtureServer::start();
    let dest = TempDir::new().unwrap();
    let storage = LocalStorage::new(dest.path());
    let registry = registry();
    let engine = SyncEngine::new(&registry, &storage, SyncConfig::default());
    let mut resource =
        StaticResource::new(vec![Declaration::remote(server.url("/gone"), "gone.bin")]);

    let err = engine.sync(&mut resource).unwrap_err();

    match err {
        Error::Item { path, source } => {
            assert_eq!(path, "gone.bin");
            assert!(matches!(
                source,
                mirror_resource::Error::HttpStatus { status: 404, .. }
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_remote_is_skipped_when_configured() {
    let server = FixtureServer::start();
    server.route("/ok.txt", Route::new("ok"));
    let dest = TempDir::new().unwrap();
    let storage = LocalStorage::new(dest.path());
    let registry = registry();
    let config = SyncConfig::default().with_item_errors(ItemErrorPolicy::Skip);
    let engine = SyncEngine::new(&registry, &storage, config);
    let mut resource = StaticResource::new(vec![
        Declaration::remote(server.url("/gone"), "gone.bin"),
        Declaration::remote(server.url("/ok.txt"), "ok.txt"),
    ]);

    let report = engine.sync(&mut resource).unwrap();

    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].error.contains("404"), "{:?}", report.failures);
    assert_eq!(fs::read_to_string(dest.path().join("ok.txt")).unwrap(), "ok");
}

#[test]
fn short_body_fails_the_item_and_writes_nothing() {
    let server = FixtureServer::start();
    server.route(
        "/archive.zip",
        Route::new("only part of it").with_content_length(4096),
    );
    let dest = TempDir::new().unwrap();
    let storage = LocalStorage::new(dest.path());
    let registry = registry();
    let engine = SyncEngine::new(&registry, &storage, SyncConfig::default());
    let mut resource = StaticResource::new(vec![Declaration::remote(
        server.url("/archive.zip"),
        "dist/archive.zip",
    )]);

    let err = engine.sync(&mut resource).unwrap_err();

    match err {
        Error::Item { path, source } => {
            assert_eq!(path, "dist/archive.zip");
            assert!(
                matches!(
                    source,
                    mirror_resource::Error::SizeMismatch { expected: 4096, .. }
                ),
                "{source}"
            );
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!dest.path().join("dist/archive.zip").exists());
}

#[test]
fn partial_download_is_removed() {
    let server = FixtureServer::start();
    server.route("/blob", Route::new("0123456789").with_content_length(1000));
    let fetcher = Fetcher::new(HttpConfig::default()).unwrap();
    let scratch = TempDir::new().unwrap();
    let target = scratch.path().join("blob");

    let err = fetcher.download(&server.url("/blob"), &target).unwrap_err();

    assert!(
        matches!(
            err,
            mirror_resource::Error::SizeMismatch {
                expected: 1000,
                actual,
                ..
            } if actual <= 10
        ),
        "{err}"
    );
    assert!(!target.exists());
}

#[test]
fn unavailable_server_is_retried_then_fails() {
    let server = FixtureServer::start();
    server.route("/busy", Route::new("later").with_status(503));
    let config = HttpConfig {
        timeout_secs: 5,
        max_retries: 2,
        ..HttpConfig::default()
    };
    let fetcher = Fetcher::new(config).unwrap();

    let err = fetcher.head(&server.url("/busy"), None).unwrap_err();

    assert!(err.is_transient());
    assert!(matches!(
        err,
        mirror_resource::Error::HttpStatus { status: 503, .. }
    ));
    assert_eq!(server.hits("HEAD", "/busy"), 3);
}

#[test]
fn client_errors_are_not_retried() {
    let server = FixtureServer::start();
    let config = HttpConfig {
        timeout_secs: 5,
        max_retries: 3,
        ..HttpConfig::default()
    };
    let fetcher = Fetcher::new(config).unwrap();

    assert!(fetcher.head(&server.url("/gone"), None).is_err());
    assert_eq!(server.hits("HEAD", "/gone"), 1);
}
