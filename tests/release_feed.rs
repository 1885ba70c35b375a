//! Integration tests for the release feed lifecycle: construct, list, filter, dispose.
//!
//! Each test builds its own update source over an in-memory listing client,
//! so no network access is needed. These tests exercise the public surface
//! end-to-end, verifying ordering, filtering, deduplication, cancellation,
//! and disposal semantics.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use drive_update_source::{
    FileMetadata, ListQuery, ListingError, RemoteListing, SourceOptions, UpdateSource,
    UpdateSourceError,
};
use pretty_assertions::assert_eq;
use semver::Version;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::Span;

/// Listing client serving a fixed set of files.
#[derive(Default)]
struct StaticListing {
    files: Vec<FileMetadata>,
    fail_with: Option<u16>,
    calls: AtomicUsize,
    closed: AtomicBool,
}

impl StaticListing {
    fn with_files(files: Vec<FileMetadata>) -> Arc<Self> {
        Arc::new(Self {
            files,
            ..Default::default()
        })
    }

    fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            fail_with: Some(status),
            ..Default::default()
        })
    }
}

#[async_trait]
impl RemoteListing for StaticListing {
    async fn list_files(
        &self,
        _folder_id: &str,
        _query: &ListQuery,
    ) -> Result<Vec<FileMetadata>, ListingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.fail_with {
            Some(status) => Err(ListingError::HttpStatus(status)),
            None => Ok(self.files.clone()),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Listing client that blocks until released, for in-flight scenarios.
#[derive(Default)]
struct GatedListing {
    entered: Notify,
    gate: Notify,
    files: Vec<FileMetadata>,
}

#[async_trait]
impl RemoteListing for GatedListing {
    async fn list_files(
        &self,
        _folder_id: &str,
        _query: &ListQuery,
    ) -> Result<Vec<FileMetadata>, ListingError> {
        self.entered.notify_one();
        self.gate.notified().await;
        Ok(self.files.clone())
    }
}

fn source_over(client: Arc<dyn RemoteListing>) -> UpdateSource {
    UpdateSource::with_client(
        "folder-id",
        "test-api-key",
        "pkg",
        client,
        SourceOptions::default(),
    )
    .unwrap()
}

fn file(id: &str, name: &str) -> FileMetadata {
    FileMetadata::new(id, name).with_size(1024)
}

fn versions(feed: &[drive_update_source::ReleaseEntry]) -> Vec<String> {
    feed.iter().map(|e| e.version.to_string()).collect()
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_constructor_rejects_each_empty_argument() {
    let cases = [
        ("", "test-api-key", "pkg", "folder_path"),
        ("folder-id", "", "pkg", "api_key"),
        ("folder-id", "test-api-key", "", "package_id"),
    ];
    for (folder, key, package, expected) in cases {
        let err = UpdateSource::new(folder, key, package).unwrap_err();
        match &err {
            UpdateSourceError::InvalidArgument { param } => assert_eq!(*param, expected),
            other => panic!("Expected InvalidArgument, got {:?}", other),
        }
        assert!(err.to_string().contains(expected));
    }
}

#[test]
fn test_injected_constructor_validates_too() {
    let err = UpdateSource::with_client(
        "folder-id",
        "test-api-key",
        "",
        StaticListing::with_files(vec![]),
        SourceOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        UpdateSourceError::InvalidArgument { param: "package_id" }
    ));
}

#[test]
fn test_constructor_accepts_valid_arguments() {
    let source = UpdateSource::new("folder-id", "test-api-key", "test-package").unwrap();
    assert_eq!(source.folder_path(), "folder-id");
    assert_eq!(source.package_id(), "test-package");
    assert!(!source.is_disposed());
}

// ============================================================================
// Feed assembly
// ============================================================================

#[tokio::test]
async fn test_empty_folder_yields_empty_feed() {
    let source = source_over(StaticListing::with_files(vec![]));
    let feed = source.get_release_feed(&Span::none(), "stable").await.unwrap();
    assert!(feed.is_empty());
}

#[tokio::test]
async fn test_folder_without_matching_files_yields_empty_feed() {
    let source = source_over(StaticListing::with_files(vec![
        file("1", "readme.md"),
        file("2", "setup.exe"),
        file("3", "pkg-latest.nupkg"),
    ]));
    let feed = source.get_release_feed(&Span::none(), "stable").await.unwrap();
    assert!(feed.is_empty());
}

#[tokio::test]
async fn test_versions_sorted_numerically() {
    let source = source_over(StaticListing::with_files(vec![
        file("a", "pkg-1.2.0-stable.nupkg"),
        file("b", "pkg-1.10.0-stable.nupkg"),
        file("c", "pkg-1.3.0-stable.nupkg"),
    ]));
    let feed = source.get_release_feed(&Span::none(), "stable").await.unwrap();
    assert_eq!(versions(&feed), vec!["1.2.0", "1.3.0", "1.10.0"]);
    assert_eq!(feed[2].remote_id, "b");
    assert_eq!(feed[2].file_name, "pkg-1.10.0-stable.nupkg");
    assert_eq!(feed[2].size_bytes, 1024);
}

#[tokio::test]
async fn test_prerelease_sorts_before_release() {
    let source = source_over(StaticListing::with_files(vec![
        file("a", "pkg-2.0.0.nupkg"),
        file("b", "pkg-2.0.0-rc.1.nupkg"),
        file("c", "pkg-1.9.9.nupkg"),
    ]));
    let feed = source.get_release_feed(&Span::none(), "").await.unwrap();
    assert_eq!(versions(&feed), vec!["1.9.9", "2.0.0-rc.1", "2.0.0"]);
}

#[tokio::test]
async fn test_other_packages_and_channels_excluded() {
    let source = source_over(StaticListing::with_files(vec![
        file("a", "pkg-1.0.0.nupkg"),
        file("b", "pkg-9.0.0-beta.nupkg"),
        file("c", "other-99.0.0.nupkg"),
        file("d", "pkg-extra-5.0.0.nupkg"),
        file("e", "pkg-1.1.0-stable.nupkg"),
    ]));

    let stable = source.get_release_feed(&Span::none(), "stable").await.unwrap();
    assert_eq!(versions(&stable), vec!["1.0.0", "1.1.0"]);

    let beta = source.get_release_feed(&Span::none(), "beta").await.unwrap();
    assert_eq!(versions(&beta), vec!["9.0.0"]);
    assert_eq!(beta[0].channel, "beta");
}

#[tokio::test]
async fn test_empty_channel_means_stable() {
    let source = source_over(StaticListing::with_files(vec![
        file("a", "pkg-1.0.0.nupkg"),
        file("b", "pkg-2.0.0-beta.nupkg"),
    ]));
    let feed = source.get_release_feed(&Span::none(), "").await.unwrap();
    assert_eq!(versions(&feed), vec!["1.0.0"]);
    assert_eq!(feed[0].channel, "stable");
}

#[tokio::test]
async fn test_duplicate_release_keeps_latest_modified() {
    let older = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let newer = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

    // Same triple in both listing orders must resolve identically
    for files in [
        vec![
            file("old", "pkg-1.0.0-stable.nupkg").modified_at(older),
            file("new", "pkg-1.0.0-stable.nupkg").modified_at(newer),
        ],
        vec![
            file("new", "pkg-1.0.0-stable.nupkg").modified_at(newer),
            file("old", "pkg-1.0.0-stable.nupkg").modified_at(older),
        ],
    ] {
        let source = source_over(StaticListing::with_files(files));
        let feed = source.get_release_feed(&Span::none(), "stable").await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].remote_id, "new");
        assert_eq!(feed[0].modified_time, Some(newer));
    }
}

#[tokio::test]
async fn test_check_for_update_returns_newest_above_current() {
    let source = source_over(StaticListing::with_files(vec![
        file("a", "pkg-1.0.0.nupkg"),
        file("b", "pkg-1.2.0.nupkg"),
        file("c", "pkg-1.1.0.nupkg"),
    ]));

    let update = source
        .check_for_update(&Span::none(), "stable", &Version::new(1, 0, 0))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.version, Version::new(1, 2, 0));
    assert_eq!(update.remote_id, "b");

    let none = source
        .check_for_update(&Span::none(), "stable", &Version::new(1, 2, 0))
        .await
        .unwrap();
    assert!(none.is_none());
}

// ============================================================================
// Failures and cancellation
// ============================================================================

#[tokio::test]
async fn test_listing_failure_is_source_unavailable() {
    let source = source_over(StaticListing::failing(503));
    let err = source
        .get_release_feed(&Span::none(), "stable")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        UpdateSourceError::SourceUnavailable(ListingError::HttpStatus(503))
    ));
    assert!(err.is_retryable());
    assert!(err.to_string().contains("will retry later"));
}

#[tokio::test]
async fn test_cancel_aborts_pending_listing() {
    let listing = Arc::new(GatedListing::default());
    let source = source_over(listing);

    let err = source
        .get_release_feed_with_cancel(
            &Span::none(),
            "stable",
            tokio::time::sleep(Duration::from_millis(20)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, UpdateSourceError::Canceled));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_unfired_cancel_returns_feed() {
    let source = source_over(StaticListing::with_files(vec![file("a", "pkg-1.0.0.nupkg")]));
    let feed = source
        .get_release_feed_with_cancel(&Span::none(), "stable", std::future::pending::<()>())
        .await
        .unwrap();
    assert_eq!(versions(&feed), vec!["1.0.0"]);
}

// ============================================================================
// Concurrency and disposal
// ============================================================================

#[tokio::test]
async fn test_concurrent_requests_share_source() {
    let listing = StaticListing::with_files(vec![
        file("a", "pkg-1.0.0.nupkg"),
        file("b", "pkg-2.0.0.nupkg"),
        file("c", "pkg-3.0.0-beta.nupkg"),
    ]);
    let source = Arc::new(source_over(listing.clone()));

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let source = Arc::clone(&source);
            tokio::spawn(async move {
                let channel = if i % 2 == 0 { "stable" } else { "beta" };
                (channel, source.get_release_feed(&Span::none(), channel).await)
            })
        })
        .collect();

    for task in futures::future::join_all(tasks).await {
        let (channel, result) = task.unwrap();
        let feed = result.unwrap();
        match channel {
            "stable" => assert_eq!(versions(&feed), vec!["1.0.0", "2.0.0"]),
            _ => assert_eq!(versions(&feed), vec!["3.0.0"]),
        }
    }
    assert_eq!(listing.calls.load(Ordering::SeqCst), 16);
}

#[tokio::test]
async fn test_disposed_source_rejects_every_channel() {
    let listing = StaticListing::with_files(vec![file("a", "pkg-1.0.0.nupkg")]);
    let source = source_over(listing.clone());
    source.dispose();

    for channel in ["stable", "beta", "", "  "] {
        let err = source
            .get_release_feed(&Span::none(), channel)
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateSourceError::Disposed));
    }
    assert!(matches!(
        source
            .get_release_feed_with_cancel(&Span::none(), "stable", std::future::ready(()))
            .await,
        Err(UpdateSourceError::Disposed)
    ));
    assert!(matches!(
        source
            .check_for_update(&Span::none(), "stable", &Version::new(0, 1, 0))
            .await,
        Err(UpdateSourceError::Disposed)
    ));
    // Nothing reached the client after disposal
    assert_eq!(listing.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_dispose_twice_is_noop() {
    let source = UpdateSource::new("folder-id", "test-api-key", "test-package").unwrap();
    source.dispose();
    source.dispose();
    assert!(source.is_disposed());
}

#[tokio::test]
async fn test_dispose_never_closes_injected_client() {
    let listing = StaticListing::with_files(vec![]);
    let source = source_over(listing.clone());
    source.dispose();
    drop(source);
    assert!(!listing.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_dispose_during_inflight_request() {
    let listing = Arc::new(GatedListing {
        files: vec![file("a", "pkg-1.0.0.nupkg")],
        ..Default::default()
    });
    let source = Arc::new(source_over(listing.clone()));

    let task = {
        let source = Arc::clone(&source);
        tokio::spawn(async move { source.get_release_feed(&Span::none(), "stable").await })
    };

    listing.entered.notified().await;
    source.dispose();
    listing.gate.notify_one();

    // The in-flight call completes with the client it already held
    let feed = task.await.unwrap().unwrap();
    assert_eq!(versions(&feed), vec!["1.0.0"]);

    // New calls observe the disposal
    assert!(matches!(
        source.get_release_feed(&Span::none(), "stable").await,
        Err(UpdateSourceError::Disposed)
    ));
}
