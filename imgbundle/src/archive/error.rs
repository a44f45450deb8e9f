//! Error types for archive encoding.

use std::io;

use thiserror::Error;

/// Result type for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors raised by the streaming archive encoder.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// An entry with the same normalized name was already enqueued.
    #[error("an entry named '{name}' already exists in the archive")]
    DuplicateName { name: String },

    /// `enqueue` or `close` was called after the archive was closed.
    #[error("cannot {operation}: the archive has already been closed")]
    Closed { operation: &'static str },

    /// The entry descriptor cannot be represented in the archive.
    #[error("invalid entry '{name}': {reason}")]
    InvalidEntry { name: String, reason: String },

    /// An entry's byte source failed while it was being drained.
    #[error("failed to read source for entry '{name}': {source}")]
    Source {
        name: String,
        #[source]
        source: io::Error,
    },

    /// An entry grew past the 32-bit size fields of a non-zip64 archive.
    #[error("entry '{name}' is too large for a zip archive ({size} bytes)")]
    TooLarge { name: String, size: u64 },

    /// The archive grew past the 32-bit offset fields of a non-zip64 archive.
    #[error("archive is too large: offset {offset} exceeds 4 GiB")]
    ArchiveTooLarge { offset: u64 },

    /// More entries than the 16-bit entry count field can hold.
    #[error("too many entries for a zip archive ({count})")]
    TooManyEntries { count: usize },

    /// The archive was torn down before it completed.
    #[error("archive aborted: {reason}")]
    Aborted { reason: String },
}

impl ArchiveError {
    /// Whether this error is caller misuse rather than an I/O or size failure.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::DuplicateName { .. } | Self::Closed { .. } | Self::InvalidEntry { .. }
        )
    }
}
