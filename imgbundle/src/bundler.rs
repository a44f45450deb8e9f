//! Fetch a list of sources and save them as one output.
//!
//! A single source is saved as is. Several sources are streamed into a
//! zip archive while they are still being fetched: the fetch pipeline
//! feeds the archive writer in input order and the sink drains the archive
//! stream concurrently, so neither the full set of bodies nor the full
//! archive is ever held in memory.
//!
//! Sources that fail are reported and skipped; the run only fails when
//! the output itself cannot be produced.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::archive::{ArchiveError, ArchiveWriter, EntryDescriptor};
use crate::config::BundleConfig;
use crate::error::{BundleError, BundleResult};
use crate::fetch::{
    archive_file_name, file_name_from_url, ErrorCallback, FailedSource, FetchError, FetchPipeline,
    FetchState, Fetched, Fetcher, NameAllocator, ProgressCallback, ProgressReporter,
    ReqwestFetcher,
};
use crate::sink::{DirectorySink, SavedFile, Sink};

/// What to bundle and whom to tell about it.
#[derive(Default)]
pub struct BundleRequest {
    urls: Vec<String>,
    archive_name: Option<String>,
    on_progress: Option<ProgressCallback>,
    on_error: Option<ErrorCallback>,
}

impl BundleRequest {
    /// Bundle `urls`, in this order.
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Archive base name for this run, overriding the configured one.
    pub fn with_archive_name(mut self, name: impl Into<String>) -> Self {
        self.archive_name = Some(name.into());
        self
    }

    /// Called with `(completed, total)` after each source is added.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Called with the URL and cause for each source that is skipped.
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &FetchError) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Sources in this request.
    pub fn urls(&self) -> &[String] {
        &self.urls
    }
}

impl fmt::Debug for BundleRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleRequest")
            .field("urls", &self.urls)
            .field("archive_name", &self.archive_name)
            .finish_non_exhaustive()
    }
}

/// Outcome of a bundle run.
#[derive(Debug, Clone, Default)]
pub struct BundleReport {
    /// Number of sources requested.
    pub requested: usize,
    /// Sources saved or added to the archive.
    pub succeeded: usize,
    /// Body bytes received.
    pub bytes_fetched: u64,
    /// Sources skipped, in input order.
    pub failed: Vec<FailedSource>,
    /// The file written, if any.
    pub output: Option<SavedFile>,
}

impl BundleReport {
    fn from_state(state: FetchState, output: Option<SavedFile>) -> Self {
        Self {
            requested: state.total,
            succeeded: state.succeeded,
            bytes_fetched: state.bytes_fetched,
            failed: state.failed,
            output,
        }
    }

    /// Whether any source was skipped.
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Runs bundle requests against a fetcher and a sink.
pub struct Bundler {
    config: BundleConfig,
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn Sink>,
}

impl Bundler {
    /// Create a bundler fetching over HTTP and writing into the
    /// configured output directory.
    pub fn new(config: BundleConfig) -> BundleResult<Self> {
        let fetcher = ReqwestFetcher::with_options(config.timeout, &config.user_agent)?;
        let sink = DirectorySink::new(&config.output_dir);
        Ok(Self::with_parts(config, Arc::new(fetcher), Arc::new(sink)))
    }

    /// Create a bundler from explicit parts.
    pub fn with_parts(config: BundleConfig, fetcher: Arc<dyn Fetcher>, sink: Arc<dyn Sink>) -> Self {
        Self {
            config,
            fetcher,
            sink,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    /// Fetch every source in `request` and save the result.
    ///
    /// - no sources: nothing is fetched or written
    /// - one source: saved under its own name, no archive
    /// - several: saved as `<archive name>.zip`, entries in input order
    ///
    /// # Errors
    ///
    /// - [`BundleError::Cancelled`] if `cancel` fires; partial output is removed
    /// - [`BundleError::Sink`] if the output could not be written
    /// - [`BundleError::Archive`] if the archive could not be encoded
    pub async fn run(
        &self,
        request: BundleRequest,
        cancel: CancellationToken,
    ) -> BundleResult<BundleReport> {
        let BundleRequest {
            urls,
            archive_name,
            on_progress,
            on_error,
        } = request;
        let reporter = ProgressReporter::new().with_callbacks(on_progress, on_error);

        match urls.len() {
            0 => {
                warn!("no sources to bundle");
                Ok(BundleReport::default())
            }
            1 => self.save_single(&urls[0], &reporter, &cancel).await,
            _ => {
                let base = archive_name.unwrap_or_else(|| self.config.archive_name.clone());
                self.save_archive(urls, &base, &reporter, &cancel).await
            }
        }
    }

    async fn save_single(
        &self,
        url: &str,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> BundleResult<BundleReport> {
        info!(url = %url, "fetching single source");

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BundleError::Cancelled),
            fetched = self.fetcher.fetch(url) => fetched,
        };

        let mut state = FetchState::new(1);
        match fetched {
            Ok(bytes) => {
                let name = file_name_from_url(url);
                let len = bytes.len() as u64;
                let saved = self.sink.save_blob(&name, bytes).await?;
                reporter.success(&mut state, len);
                Ok(BundleReport::from_state(state, Some(saved)))
            }
            Err(e) => {
                warn!(url = %url, error = %e, "source failed");
                reporter.failure(&mut state, 0, url.to_string(), e);
                Ok(BundleReport::from_state(state, None))
            }
        }
    }

    async fn save_archive(
        &self,
        urls: Vec<String>,
        base_name: &str,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> BundleResult<BundleReport> {
        let file_name = archive_file_name(base_name);
        info!(
            sources = urls.len(),
            archive = %file_name,
            concurrency = self.config.concurrency,
            "bundling sources"
        );

        let (writer, stream) = ArchiveWriter::new();
        let produce = self.produce(urls, &writer, reporter, cancel);
        let consume = self.sink.save_stream(&file_name, stream);
        let (produced, consumed) = tokio::join!(produce, consume);

        match (produced, consumed) {
            (Err(BundleError::Cancelled), _) => {
                info!(archive = %file_name, "bundle cancelled");
                Err(BundleError::Cancelled)
            }
            // The producer only sees an aborted archive when the sink quit.
            (Err(BundleError::Archive(ArchiveError::Aborted { .. })), Err(sink))
            | (Ok(_), Err(sink)) => Err(sink.into()),
            (Err(e), _) => Err(e),
            (Ok(state), Ok(saved)) => {
                info!(
                    archive = %saved.path.display(),
                    entries = state.succeeded,
                    skipped = state.failure_count(),
                    bytes = saved.bytes_written,
                    "bundle complete"
                );
                Ok(BundleReport::from_state(state, Some(saved)))
            }
        }
    }

    /// Feed fetched sources into the archive, closing it when done and
    /// aborting it on any failure.
    async fn produce(
        &self,
        urls: Vec<String>,
        writer: &ArchiveWriter,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> BundleResult<FetchState> {
        let result = self.fill(urls, writer, reporter, cancel).await;
        if let Err(e) = &result {
            writer.abort(e.to_string());
        }
        result
    }

    async fn fill(
        &self,
        urls: Vec<String>,
        writer: &ArchiveWriter,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> BundleResult<FetchState> {
        let concurrency = self.config.concurrency;
        let pipeline = FetchPipeline::with_concurrency(Arc::clone(&self.fetcher), concurrency);
        let mut fetches = pipeline.start(urls);
        let mut names = NameAllocator::new();
        let mut state = FetchState::new(fetches.total());

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(BundleError::Cancelled),
                next = fetches.next() => next,
            };
            let Some(Fetched { index, url, result }) = next else {
                break;
            };

            match result {
                Ok(bytes) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(BundleError::Cancelled),
                        ready = writer.wait_for_capacity(concurrency) => ready?,
                    }

                    let name = names.allocate(&file_name_from_url(&url));
                    let len = bytes.len() as u64;
                    debug!(
                        index,
                        url = %url,
                        name = %name,
                        bytes = len,
                        in_flight = fetches.in_window(),
                        "adding entry"
                    );
                    writer.enqueue(EntryDescriptor::from_bytes(name, bytes))?;
                    reporter.success(&mut state, len);
                }
                Err(e) => {
                    warn!(index, url = %url, error = %e, "source failed, skipping");
                    reporter.failure(&mut state, index, url, e);
                }
            }
        }

        writer.close()?;
        Ok(state)
    }
}

impl fmt::Debug for Bundler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bundler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
