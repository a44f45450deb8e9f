//! Streaming zip archive encoder.
//!
//! Produces a stored (uncompressed) zip archive incrementally: entries are
//! written one at a time as the consumer pulls, with sizes and CRCs carried
//! in trailing data descriptors, so neither entry count nor entry sizes need
//! to be known up front and the archive is never buffered whole.
//!
//! - Record layout and MS-DOS timestamps (`format`)
//! - Entry descriptors and per-entry state (`entry`)
//! - The pull-driven encoder and its writer/stream halves (`encoder`)
//! - Error types (`error`)
//!
//! # Example
//!
//! ```ignore
//! use futures::StreamExt;
//! use imgbundle::archive::{ArchiveWriter, EntryDescriptor};
//!
//! let (writer, mut stream) = ArchiveWriter::new();
//! writer.enqueue(EntryDescriptor::from_bytes("hello.txt", "hello"))?;
//! writer.enqueue(EntryDescriptor::directory("photos"))?;
//! writer.close()?;
//!
//! while let Some(chunk) = stream.next().await {
//!     file.write_all(&chunk?).await?;
//! }
//! ```

mod encoder;
mod entry;
mod error;
pub mod format;

pub use encoder::{ArchiveStream, ArchiveWriter};
pub use entry::{normalize_name, ArchiveEntry, ByteSource, EntryDescriptor, EntryState};
pub use error::{ArchiveError, ArchiveResult};
pub use format::HeaderFields;
