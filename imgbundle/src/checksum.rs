//! CRC-32 checksum calculation for archive entries.
//!
//! The archive format stores the standard IEEE CRC-32 (reflected polynomial
//! `0xEDB88320`, seeded with all ones and complemented on read) of each
//! entry's uncompressed bytes. Entries are streamed, so the checksum is
//! folded in chunk by chunk as bytes pass through the encoder.

use crc32fast::Hasher;

/// Incremental CRC-32 over arbitrarily chunked input.
///
/// Feeding the same bytes in one call or split across many calls yields the
/// same value; only the order of the bytes matters.
#[derive(Debug, Clone, Default)]
pub struct Crc32 {
    hasher: Hasher,
}

impl Crc32 {
    /// Create a checksum over zero bytes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a chunk into the running checksum.
    pub fn append(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Checksum of every byte appended so far.
    ///
    /// Reading does not reset the running state.
    pub fn value(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

/// Calculate the CRC-32 of a complete byte slice.
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.append(bytes);
    crc.value()
}
