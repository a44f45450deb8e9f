//! Archive entries and their lifecycle.
//!
//! An [`EntryDescriptor`] is what callers hand to
//! [`ArchiveWriter::enqueue`](super::ArchiveWriter::enqueue). The encoder turns
//! it into an [`ArchiveEntry`], which it owns until the archive is finished.
//!
//! # Lifecycle
//!
//! ```text
//! Declared ──► Active ──► Headered ──► Draining ──► Finalized ──► Closed
//!                              │                        ▲
//!                              └── (directory / empty) ─┘
//! ```

use std::fmt;
use std::io;
use std::task::{Context, Poll};

use bytes::Bytes;
use chrono::NaiveDateTime;
use futures::stream::{self, BoxStream, Stream, StreamExt};

use super::error::{ArchiveError, ArchiveResult};
use super::format::{self, CentralRecord, HeaderFields};
use crate::checksum::Crc32;

/// A stream of data chunks for one entry.
pub type ByteSource = BoxStream<'static, io::Result<Bytes>>;

/// Where an entry is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Enqueued, waiting for its turn.
    Declared,
    /// Chosen as the current pull target.
    Active,
    /// Local header emitted.
    Headered,
    /// Data chunks are being forwarded.
    Draining,
    /// Data descriptor emitted; CRC and sizes are final.
    Finalized,
    /// Written to the central directory.
    Closed,
}

/// Description of an entry to add to an archive.
pub struct EntryDescriptor {
    pub(crate) name: String,
    pub(crate) directory: bool,
    pub(crate) comment: Vec<u8>,
    pub(crate) modified_at: Option<NaiveDateTime>,
    pub(crate) source: Option<ByteSource>,
}

impl EntryDescriptor {
    /// A file entry whose content is pulled from `source`.
    pub fn file<S>(name: impl Into<String>, source: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            name: name.into(),
            directory: false,
            comment: Vec::new(),
            modified_at: None,
            source: Some(source.boxed()),
        }
    }

    /// A file entry with content already in memory.
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self::file(name, stream::once(async move { Ok(data) }))
    }

    /// A file entry with no byte source; written with zero length.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            directory: false,
            comment: Vec::new(),
            modified_at: None,
            source: None,
        }
    }

    /// A directory entry. A trailing `/` is added if missing.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            directory: true,
            ..Self::empty(name)
        }
    }

    /// Attach a per-entry comment. Any bytes are accepted; only the
    /// name is covered by the UTF-8 flag.
    pub fn with_comment(mut self, comment: impl Into<Vec<u8>>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Set the modification time; defaults to the encoder's creation time.
    pub fn with_modified_at(mut self, modified_at: NaiveDateTime) -> Self {
        self.modified_at = Some(modified_at);
        self
    }

    /// The entry name as given (before normalization).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is a directory entry.
    pub fn is_directory(&self) -> bool {
        self.directory
    }
}

impl fmt::Debug for EntryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryDescriptor")
            .field("name", &self.name)
            .field("directory", &self.directory)
            .field("comment", &String::from_utf8_lossy(&self.comment))
            .field("modified_at", &self.modified_at)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

/// Normalize an entry name: surrounding whitespace is trimmed and
/// directories end with `/`.
pub fn normalize_name(name: &str, directory: bool) -> String {
    let mut name = name.trim().to_string();
    if directory && !name.ends_with('/') {
        name.push('/');
    }
    name
}

/// Per-entry bookkeeping owned by the encoder.
pub struct ArchiveEntry {
    name: String,
    directory: bool,
    comment: Vec<u8>,
    crc: Crc32,
    compressed_length: u64,
    uncompressed_length: u64,
    local_header_offset: u64,
    header: HeaderFields,
    state: EntryState,
    source: Option<ByteSource>,
}

impl ArchiveEntry {
    /// Declare an entry from a descriptor.
    ///
    /// `default_time` is used when the descriptor carries no timestamp.
    pub(crate) fn declare(
        descriptor: EntryDescriptor,
        default_time: NaiveDateTime,
    ) -> ArchiveResult<Self> {
        let name = normalize_name(&descriptor.name, descriptor.directory);

        if name.is_empty() || name == "/" {
            return Err(ArchiveError::InvalidEntry {
                name,
                reason: "entry name is empty".to_string(),
            });
        }
        let name_len = u16::try_from(name.len()).map_err(|_| ArchiveError::InvalidEntry {
            name: name.clone(),
            reason: format!("name is {} bytes, limit is {}", name.len(), u16::MAX),
        })?;
        if descriptor.comment.len() > u16::MAX as usize {
            return Err(ArchiveError::InvalidEntry {
                name,
                reason: format!(
                    "comment is {} bytes, limit is {}",
                    descriptor.comment.len(),
                    u16::MAX
                ),
            });
        }

        let modified_at = descriptor.modified_at.unwrap_or(default_time);
        // Directories never drain, even if a source was supplied.
        let source = if descriptor.directory {
            None
        } else {
            descriptor.source
        };

        Ok(Self {
            header: HeaderFields::streamed(modified_at, name_len),
            name,
            directory: descriptor.directory,
            comment: descriptor.comment,
            crc: Crc32::new(),
            compressed_length: 0,
            uncompressed_length: 0,
            local_header_offset: 0,
            state: EntryState::Declared,
            source,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_directory(&self) -> bool {
        self.directory
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn crc32(&self) -> u32 {
        self.crc.value()
    }

    pub fn compressed_length(&self) -> u64 {
        self.compressed_length
    }

    pub fn uncompressed_length(&self) -> u64 {
        self.uncompressed_length
    }

    pub fn local_header_offset(&self) -> u64 {
        self.local_header_offset
    }

    pub fn header(&self) -> &HeaderFields {
        &self.header
    }

    /// Whether the entry has data to drain after its header.
    pub(crate) fn drains(&self) -> bool {
        self.source.is_some()
    }

    pub(crate) fn activate(&mut self) {
        debug_assert_eq!(self.state, EntryState::Declared);
        self.state = EntryState::Active;
    }

    /// Emit the local header at output position `offset`.
    pub(crate) fn write_header(&mut self, offset: u64) -> Bytes {
        debug_assert_eq!(self.state, EntryState::Active);
        self.local_header_offset = offset;
        self.state = EntryState::Headered;
        format::local_header(&self.header, self.name.as_bytes())
    }

    /// Poll the entry's source for the next chunk.
    pub(crate) fn poll_chunk(&mut self, cx: &mut Context<'_>) -> Poll<Option<io::Result<Bytes>>> {
        match self.source.as_mut() {
            Some(source) => source.poll_next_unpin(cx),
            None => Poll::Ready(None),
        }
    }

    /// Fold a chunk into the checksum and length counters.
    pub(crate) fn absorb(&mut self, chunk: &[u8]) -> ArchiveResult<()> {
        let size = self.uncompressed_length + chunk.len() as u64;
        if size > u32::MAX as u64 {
            return Err(ArchiveError::TooLarge {
                name: self.name.clone(),
                size,
            });
        }

        self.state = EntryState::Draining;
        self.crc.append(chunk);
        self.uncompressed_length = size;
        // Stored: compressed and uncompressed lengths are the same.
        self.compressed_length = size;
        Ok(())
    }

    /// Emit the data descriptor and patch the header snapshot.
    ///
    /// The local header already in the stream keeps its placeholder zeros;
    /// only the snapshot used for the central directory is updated.
    pub(crate) fn finalize(&mut self) -> Bytes {
        debug_assert!(matches!(
            self.state,
            EntryState::Headered | EntryState::Draining
        ));
        self.source = None;

        let crc = self.crc.value();
        let compressed = self.compressed_length as u32;
        let uncompressed = self.uncompressed_length as u32;
        self.header.patch(crc, compressed, uncompressed);
        self.state = EntryState::Finalized;

        format::data_descriptor(crc, compressed, uncompressed)
    }

    /// The central directory view of this entry.
    pub(crate) fn central_record(&self) -> ArchiveResult<CentralRecord<'_>> {
        let local_header_offset = u32::try_from(self.local_header_offset).map_err(|_| {
            ArchiveError::ArchiveTooLarge {
                offset: self.local_header_offset,
            }
        })?;

        Ok(CentralRecord {
            fields: &self.header,
            name: self.name.as_bytes(),
            comment: &self.comment,
            directory: self.directory,
            local_header_offset,
        })
    }

    pub(crate) fn close(&mut self) {
        debug_assert_eq!(self.state, EntryState::Finalized);
        self.state = EntryState::Closed;
    }
}

impl fmt::Debug for ArchiveEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveEntry")
            .field("name", &self.name)
            .field("directory", &self.directory)
            .field("state", &self.state)
            .field("crc32", &self.crc.value())
            .field("uncompressed_length", &self.uncompressed_length)
            .field("local_header_offset", &self.local_header_offset)
            .finish()
    }
}
