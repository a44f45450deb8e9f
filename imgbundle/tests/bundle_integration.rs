//! End-to-end tests: fetch through a fake fetcher, write to a temporary
//! directory, read the result back.
//!
//! Run with: `cargo test --test bundle_integration`

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use imgbundle::fetch::{FetchError, FetchFuture, Fetcher};
use imgbundle::{BundleConfig, BundleError, BundleRequest, Bundler, DirectorySink};

// ============================================================================
// Helper Functions
// ============================================================================

/// Fetcher serving canned bodies after a per-URL delay.
#[derive(Default)]
struct FakeFetcher {
    routes: HashMap<String, (u64, Option<Vec<u8>>)>,
}

impl FakeFetcher {
    fn serve(mut self, url: &str, delay_ms: u64, body: &[u8]) -> Self {
        self.routes
            .insert(url.to_string(), (delay_ms, Some(body.to_vec())));
        self
    }

    fn missing(mut self, url: &str, delay_ms: u64) -> Self {
        self.routes.insert(url.to_string(), (delay_ms, None));
        self
    }
}

impl Fetcher for FakeFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            let (delay, body) = self.routes.get(url).cloned().unwrap_or((0, None));
            tokio::time::sleep(Duration::from_millis(delay)).await;
            body.map(Bytes::from).ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        })
    }
}

fn url(name: &str) -> String {
    format!("https://images.example.com/gallery/{}", name)
}

fn bundler(fetcher: FakeFetcher, dir: &Path) -> Bundler {
    Bundler::with_parts(
        BundleConfig::default().with_output_dir(dir),
        Arc::new(fetcher),
        Arc::new(DirectorySink::new(dir)),
    )
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn zip_entries(path: &Path) -> Vec<(String, Vec<u8>)> {
    let bytes = std::fs::read(path).unwrap();
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..zip.len())
        .map(|i| {
            let mut file = zip.by_index(i).unwrap();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            (file.name().to_string(), data)
        })
        .collect()
}

// ============================================================================
// Integration Tests
// ============================================================================

/// Three sources, the middle one failing: the archive holds the other two
/// in input order and progress counts only the successes.
#[tokio::test(start_paused = true)]
async fn test_archive_skips_failed_source() {
    let dir = TempDir::new().unwrap();
    let fetcher = FakeFetcher::default()
        .serve(&url("a.png"), 40, b"first image")
        .missing(&url("b.png"), 5)
        .serve(&url("c.png"), 1, b"third image");

    let progress = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let (progress_log, error_log) = (Arc::clone(&progress), Arc::clone(&errors));

    let report = bundler(fetcher, dir.path())
        .run(
            BundleRequest::new([url("a.png"), url("b.png"), url("c.png")])
                .on_progress(move |done, total| progress_log.lock().push((done, total)))
                .on_error(move |u, e| error_log.lock().push((u.to_string(), e.clone()))),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(*progress.lock(), vec![(1, 3), (2, 3)]);
    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, url("b.png"));
    assert!(matches!(errors[0].1, FetchError::Status { status: 404, .. }));

    let output = report.output.unwrap();
    assert_eq!(output.path, dir.path().join("images.zip"));
    assert_eq!(files_in(dir.path()), vec!["images.zip"]);
    assert_eq!(
        zip_entries(&output.path),
        vec![
            ("a.png".to_string(), b"first image".to_vec()),
            ("c.png".to_string(), b"third image".to_vec()),
        ]
    );
}

/// One source is saved under its own name, no archive.
#[tokio::test(start_paused = true)]
async fn test_single_source_shortcut() {
    let dir = TempDir::new().unwrap();
    let fetcher = FakeFetcher::default().serve(&url("only.jpg"), 0, b"jpeg");

    let report = bundler(fetcher, dir.path())
        .run(BundleRequest::new([url("only.jpg")]), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(files_in(dir.path()), vec!["only.jpg"]);
    assert_eq!(std::fs::read(dir.path().join("only.jpg")).unwrap(), b"jpeg");
}

/// Sources sharing a file name get numbered entries.
#[tokio::test(start_paused = true)]
async fn test_duplicate_names_in_archive() {
    let dir = TempDir::new().unwrap();
    let fetcher = FakeFetcher::default()
        .serve("https://a.example/x", 3, b"1")
        .serve("https://b.example/x", 2, b"2")
        .serve("https://c.example/x", 1, b"3");

    bundler(fetcher, dir.path())
        .run(
            BundleRequest::new([
                "https://a.example/x",
                "https://b.example/x",
                "https://c.example/x",
            ])
            .with_archive_name("My Album"),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let entries = zip_entries(&dir.path().join("My Album.zip"));
    assert_eq!(
        entries,
        vec![
            ("x".to_string(), b"1".to_vec()),
            ("x (1)".to_string(), b"2".to_vec()),
            ("x (2)".to_string(), b"3".to_vec()),
        ]
    );
}

/// Many sources completing in scrambled order still land in input order.
#[tokio::test(start_paused = true)]
async fn test_many_sources_keep_input_order() {
    let dir = TempDir::new().unwrap();
    let mut fetcher = FakeFetcher::default();
    let mut urls = Vec::new();
    for i in 0..25u64 {
        let u = url(&format!("{:02}.png", i));
        fetcher = fetcher.serve(&u, (i * 7919) % 53, format!("body {}", i).as_bytes());
        urls.push(u);
    }

    let report = bundler(fetcher, dir.path())
        .run(BundleRequest::new(urls), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.succeeded, 25);
    let entries = zip_entries(&dir.path().join("images.zip"));
    for (i, (name, data)) in entries.iter().enumerate() {
        assert_eq!(name, &format!("{:02}.png", i));
        assert_eq!(data, format!("body {}", i).as_bytes());
    }
}

/// Cancelling mid-run leaves no file behind, partial or otherwise.
#[tokio::test(start_paused = true)]
async fn test_cancel_removes_partial_output() {
    let dir = TempDir::new().unwrap();
    let fetcher = FakeFetcher::default()
        .serve(&url("a.png"), 0, b"a")
        .serve(&url("b.png"), 10_000, b"b");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = bundler(fetcher, dir.path())
        .run(BundleRequest::new([url("a.png"), url("b.png")]), cancel)
        .await;

    assert!(matches!(result, Err(BundleError::Cancelled)));
    assert!(files_in(dir.path()).is_empty());
}

/// An existing archive is never overwritten.
#[tokio::test(start_paused = true)]
async fn test_existing_archive_is_kept() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("images.zip"), b"keep me").unwrap();
    let fetcher = FakeFetcher::default()
        .serve(&url("a.png"), 0, b"a")
        .serve(&url("b.png"), 0, b"b");

    let report = bundler(fetcher, dir.path())
        .run(
            BundleRequest::new([url("a.png"), url("b.png")]),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        report.output.unwrap().path,
        dir.path().join("images (1).zip")
    );
    assert_eq!(
        std::fs::read(dir.path().join("images.zip")).unwrap(),
        b"keep me"
    );
}
