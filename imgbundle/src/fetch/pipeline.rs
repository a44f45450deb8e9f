//! Bounded, order-preserving concurrent retrieval.
//!
//! Sources are fetched on spawned tasks, at most `concurrency` at a time,
//! but handed back strictly in input order. The window of admitted sources
//! is anchored at the next source to be delivered: source `i` is admitted
//! only while `i < delivered + concurrency`, so a slow source at the head
//! holds back admission rather than letting completed bodies pile up.
//!
//! ```text
//!   delivered        window (in flight or ready)        pending
//!  [0 .. d)    |  d  d+1  ...  d+concurrency-1  |  d+concurrency ..
//! ```
//!
//! Each window slot owns the task for one source, so the slot at the front
//! is simply awaited; later slots keep running in the background.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::error::{FetchError, FetchResult};
use super::http::Fetcher;

/// Default number of sources fetched at once.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// One source's outcome, delivered in input order.
#[derive(Debug)]
pub struct Fetched {
    /// Position of the source in the input list.
    pub index: usize,
    /// The source URL.
    pub url: String,
    /// The body, or why it could not be retrieved.
    pub result: FetchResult<Bytes>,
}

/// Runs fetches for a list of sources.
#[derive(Clone)]
pub struct FetchPipeline {
    fetcher: Arc<dyn Fetcher>,
    concurrency: usize,
}

impl FetchPipeline {
    /// Create a pipeline with the default concurrency.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self::with_concurrency(fetcher, DEFAULT_CONCURRENCY)
    }

    /// Create a pipeline fetching at most `concurrency` sources at once.
    ///
    /// Values below 1 are clamped to 1.
    pub fn with_concurrency(fetcher: Arc<dyn Fetcher>, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    /// Configured concurrency.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Start fetching `urls`.
    ///
    /// Nothing is spawned until the first call to [`OrderedFetches::next`].
    pub fn start(&self, urls: Vec<String>) -> OrderedFetches {
        debug!(
            sources = urls.len(),
            concurrency = self.concurrency,
            "fetch pipeline started"
        );
        OrderedFetches {
            fetcher: Arc::clone(&self.fetcher),
            concurrency: self.concurrency,
            total: urls.len(),
            pending: urls.into_iter().enumerate().collect(),
            window: VecDeque::with_capacity(self.concurrency),
            delivered: 0,
        }
    }
}

impl std::fmt::Debug for FetchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchPipeline")
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

/// Slot for an admitted source.
struct Slot {
    index: usize,
    url: String,
    task: JoinHandle<FetchResult<Bytes>>,
}

/// In-order results of a pipeline run.
///
/// Dropping it aborts every fetch still in flight.
pub struct OrderedFetches {
    fetcher: Arc<dyn Fetcher>,
    concurrency: usize,
    total: usize,
    pending: VecDeque<(usize, String)>,
    window: VecDeque<Slot>,
    delivered: usize,
}

impl OrderedFetches {
    /// Number of sources in the run.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of admitted sources not yet delivered.
    pub fn in_window(&self) -> usize {
        self.window.len()
    }

    fn admit(&mut self) {
        while self.window.len() < self.concurrency {
            let Some((index, url)) = self.pending.pop_front() else {
                break;
            };

            let fetcher = Arc::clone(&self.fetcher);
            let task_url = url.clone();
            let task = tokio::spawn(async move { fetcher.fetch(&task_url).await });

            trace!(index, url = %url, "fetch admitted");
            self.window.push_back(Slot { index, url, task });
        }
    }

    /// Wait for the next source in input order.
    ///
    /// Returns `None` once every source has been delivered. Cancel safe:
    /// dropping the returned future loses nothing.
    pub async fn next(&mut self) -> Option<Fetched> {
        self.admit();

        let head = self.window.front_mut()?;
        let joined = (&mut head.task).await;

        let slot = self.window.pop_front()?;
        let result = match joined {
            Ok(result) => result,
            Err(e) => Err(FetchError::Request {
                url: slot.url.clone(),
                reason: format!("fetch task failed: {}", e),
            }),
        };

        self.delivered += 1;
        self.admit();

        trace!(index = slot.index, ok = result.is_ok(), "fetch delivered");
        Some(Fetched {
            index: slot.index,
            url: slot.url,
            result,
        })
    }
}

impl Drop for OrderedFetches {
    fn drop(&mut self) {
        if !self.window.is_empty() {
            debug!(in_flight = self.window.len(), "aborting outstanding fetches");
        }
        for slot in &self.window {
            slot.task.abort();
        }
    }
}

impl std::fmt::Debug for OrderedFetches {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedFetches")
            .field("total", &self.total)
            .field("delivered", &self.delivered)
            .field("in_window", &self.window.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::http::tests::MockFetcher;
    use crate::fetch::http::FetchFuture;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn urls(names: &[&str]) -> Vec<String> {
        names
            .iter()
            .map(|n| format!("http://example.com/{}", n))
            .collect()
    }

    async fn drain(fetches: &mut OrderedFetches) -> Vec<Fetched> {
        let mut out = Vec::new();
        while let Some(fetched) = fetches.next().await {
            out.push(fetched);
        }
        out
    }

    /// Fetcher that records the peak number of concurrent fetches.
    #[derive(Default)]
    struct GaugeFetcher {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Fetcher for GaugeFetcher {
        fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
            Box::pin(async move {
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                self.active.fetch_sub(1, Ordering::SeqCst);
                Ok(Bytes::from(url.to_string()))
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivers_in_input_order_when_completion_is_reversed() {
        let mock = MockFetcher::new()
            .ok("http://example.com/a", 30, b"a")
            .ok("http://example.com/b", 20, b"b")
            .ok("http://example.com/c", 10, b"c");
        let completed = Arc::clone(&mock.completed);
        let pipeline = FetchPipeline::with_concurrency(Arc::new(mock), 3);

        let mut fetches = pipeline.start(urls(&["a", "b", "c"]));
        let delivered = drain(&mut fetches).await;

        let indices: Vec<usize> = delivered.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(delivered[0].result.as_deref().unwrap(), b"a");
        assert_eq!(
            *completed.lock(),
            urls(&["c", "b", "a"]),
            "fetches should have completed out of order"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_delivered_in_place() {
        let mock = MockFetcher::new()
            .ok("http://example.com/a", 5, b"a")
            .status("http://example.com/b", 1, 404)
            .ok("http://example.com/c", 1, b"c");
        let pipeline = FetchPipeline::with_concurrency(Arc::new(mock), 5);

        let mut fetches = pipeline.start(urls(&["a", "b", "c"]));
        let delivered = drain(&mut fetches).await;

        assert_eq!(delivered.len(), 3);
        assert!(delivered[0].result.is_ok());
        assert!(matches!(
            delivered[1].result,
            Err(FetchError::Status { status: 404, .. })
        ));
        assert_eq!(delivered[1].url, "http://example.com/b");
        assert!(delivered[2].result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let gauge = Arc::new(GaugeFetcher::default());
        let pipeline = FetchPipeline::with_concurrency(gauge.clone(), 3);

        let names: Vec<String> = (0..10).map(|i| format!("{}.png", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut fetches = pipeline.start(urls(&refs));
        let delivered = drain(&mut fetches).await;

        assert_eq!(delivered.len(), 10);
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_head_holds_back_admission() {
        let mock = MockFetcher::new()
            .ok("http://example.com/a", 100, b"a")
            .ok("http://example.com/b", 0, b"b")
            .ok("http://example.com/c", 0, b"c")
            .ok("http://example.com/d", 10, b"d");
        let completed = Arc::clone(&mock.completed);
        let pipeline = FetchPipeline::with_concurrency(Arc::new(mock), 2);

        let mut fetches = pipeline.start(urls(&["a", "b", "c", "d"]));
        let first = fetches.next().await.unwrap();
        assert_eq!(first.index, 0);

        // c was only admitted once a left the window
        let order = completed.lock().clone();
        assert_eq!(order[..2], urls(&["b", "a"])[..]);

        let rest = drain(&mut fetches).await;
        assert_eq!(rest.len(), 3);
        assert_eq!(*completed.lock(), urls(&["b", "a", "c", "d"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_concurrency_is_clamped() {
        let mock = MockFetcher::new().ok("http://example.com/a", 0, b"a");
        let pipeline = FetchPipeline::with_concurrency(Arc::new(mock), 0);
        assert_eq!(pipeline.concurrency(), 1);

        let mut fetches = pipeline.start(urls(&["a"]));
        assert!(fetches.next().await.is_some());
        assert!(fetches.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_run() {
        let pipeline = FetchPipeline::new(Arc::new(MockFetcher::new()));
        let mut fetches = pipeline.start(Vec::new());
        assert_eq!(fetches.total(), 0);
        assert!(fetches.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_in_flight_fetches() {
        let mock = MockFetcher::new()
            .ok("http://example.com/a", 0, b"a")
            .ok("http://example.com/b", 1000, b"b")
            .ok("http://example.com/c", 1000, b"c");
        let completed = Arc::clone(&mock.completed);
        let pipeline = FetchPipeline::with_concurrency(Arc::new(mock), 3);

        let mut fetches = pipeline.start(urls(&["a", "b", "c"]));
        assert_eq!(fetches.next().await.unwrap().index, 0);
        assert_eq!(fetches.in_window(), 2);
        drop(fetches);

        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(*completed.lock(), urls(&["a"]));
    }

    proptest! {
        #[test]
        fn prop_delivery_order_matches_input(
            delays in proptest::collection::vec(0u64..50, 0..20),
            concurrency in 1usize..8,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();

            let mut mock = MockFetcher::new();
            let mut list = Vec::new();
            for (i, delay) in delays.iter().enumerate() {
                let url = format!("http://example.com/{}", i);
                mock = mock.ok(&url, *delay, url.as_bytes());
                list.push(url);
            }

            let delivered = runtime.block_on(async {
                let pipeline = FetchPipeline::with_concurrency(Arc::new(mock), concurrency);
                let mut fetches = pipeline.start(list.clone());
                drain(&mut fetches).await
            });

            let indices: Vec<usize> = delivered.iter().map(|f| f.index).collect();
            prop_assert_eq!(indices, (0..list.len()).collect::<Vec<_>>());
            for fetched in &delivered {
                prop_assert_eq!(
                    fetched.result.as_deref().unwrap(),
                    list[fetched.index].as_bytes()
                );
            }
        }
    }
}
