//! Progress and error reporting for a fetch run.
//!
//! Callbacks fire from the delivery side of the pipeline, so they are
//! invoked in source order and never concurrently. Counts come from the
//! run's [`FetchState`], which the reporter updates before each callback.

use std::fmt;

use super::error::FetchError;
use super::state::FetchState;

/// Progress callback, invoked once per successfully completed source.
///
/// # Arguments
///
/// * `completed` - Number of sources completed so far
/// * `total` - Number of sources in the run
pub type ProgressCallback = Box<dyn Fn(usize, usize) + Send + Sync>;

/// Error callback, invoked once per source that could not be retrieved.
///
/// # Arguments
///
/// * `url` - The failed source
/// * `error` - Why it failed
pub type ErrorCallback = Box<dyn Fn(&str, &FetchError) + Send + Sync>;

/// Records per-source outcomes and routes them to the caller's callbacks.
#[derive(Default)]
pub struct ProgressReporter {
    on_progress: Option<ProgressCallback>,
    on_error: Option<ErrorCallback>,
}

impl ProgressReporter {
    /// Create a reporter with no callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the progress callback.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Set the error callback.
    pub fn with_error(mut self, callback: ErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }

    /// Install callbacks if present.
    pub fn with_callbacks(
        mut self,
        on_progress: Option<ProgressCallback>,
        on_error: Option<ErrorCallback>,
    ) -> Self {
        self.on_progress = on_progress;
        self.on_error = on_error;
        self
    }

    /// Record a completed source of `bytes` length and report progress.
    pub fn success(&self, state: &mut FetchState, bytes: u64) {
        state.record_success(bytes);
        if let Some(callback) = &self.on_progress {
            callback(state.succeeded, state.total);
        }
    }

    /// Report a failed source and record it.
    pub fn failure(&self, state: &mut FetchState, index: usize, url: String, error: FetchError) {
        if let Some(callback) = &self.on_error {
            callback(&url, &error);
        }
        state.record_failure(index, url, error);
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("on_progress", &self.on_progress.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
