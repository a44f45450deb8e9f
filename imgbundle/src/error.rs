//! Top-level error type.

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::config::ConfigError;
use crate::fetch::FetchError;
use crate::sink::SinkError;

/// Result type for bundle operations.
pub type BundleResult<T> = Result<T, BundleError>;

/// A bundle run failed as a whole.
///
/// Per-source fetch failures are not errors at this level; they are
/// reported through the error callback and listed in the report.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The HTTP client could not be set up.
    #[error(transparent)]
    Client(#[from] FetchError),

    #[error("bundle cancelled")]
    Cancelled,
}

impl BundleError {
    /// Whether the run stopped because it was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BundleError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_error_is_transparent() {
        let err: BundleError = ArchiveError::DuplicateName {
            name: "x".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            ArchiveError::DuplicateName {
                name: "x".to_string()
            }
            .to_string()
        );
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_cancelled() {
        assert!(BundleError::Cancelled.is_cancelled());
        assert_eq!(BundleError::Cancelled.to_string(), "bundle cancelled");
    }
}
