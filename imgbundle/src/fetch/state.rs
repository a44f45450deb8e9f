//! Outcome tracking for a fetch run.

use super::error::FetchError;

/// A source that could not be retrieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedSource {
    /// Position of the source in the input list.
    pub index: usize,
    /// The source URL.
    pub url: String,
    /// Why it failed.
    pub error: FetchError,
}

/// State of a fetch run.
#[derive(Debug, Clone, Default)]
pub struct FetchState {
    /// Number of sources in the run.
    pub total: usize,
    /// Sources retrieved and handed on.
    pub succeeded: usize,
    /// Body bytes received from retrieved sources.
    pub bytes_fetched: u64,
    /// Sources that failed, in input order.
    pub failed: Vec<FailedSource>,
}

impl FetchState {
    /// Create a new state for `total` sources.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Get the number of failed sources.
    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    /// Record a retrieved source.
    pub fn record_success(&mut self, bytes: u64) {
        self.succeeded += 1;
        self.bytes_fetched += bytes;
    }

    /// Record a failed source.
    pub fn record_failure(&mut self, index: usize, url: impl Into<String>, error: FetchError) {
        self.failed.push(FailedSource {
            index,
            url: url.into(),
            error,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found(url: &str) -> FetchError {
        FetchError::Status {
            url: url.to_string(),
            status: 404,
        }
    }

    #[test]
    fn test_fetch_state_new() {
        let state = FetchState::new(2);

        assert_eq!(state.total, 2);
        assert_eq!(state.succeeded, 0);
        assert_eq!(state.failure_count(), 0);
    }

    #[test]
    fn test_fetch_state_records_outcomes() {
        let mut state = FetchState::new(2);

        state.record_success(100);
        state.record_failure(1, "http://b", not_found("http://b"));

        assert_eq!(state.succeeded, 1);
        assert_eq!(state.failure_count(), 1);
        assert_eq!(state.bytes_fetched, 100);
        assert_eq!(state.failed[0].index, 1);
        assert_eq!(state.failed[0].url, "http://b");
    }
}
