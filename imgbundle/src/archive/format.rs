//! Byte layout of the zip records produced by the encoder.
//!
//! All multi-byte fields are little-endian. Signatures are written as
//! little-endian `u32`s so the bytes on disk read `PK\x03\x04` and friends.
//!
//! ```text
//! local header      : sig(4) | HeaderFields(26) | name
//! data descriptor   : sig(4) | crc(4) | compressed(4) | uncompressed(4)
//! central record    : sig(4) | made-by(2) | HeaderFields(26) | comment len(2)
//!                     | disk start(2) | internal attrs(2) | external attrs(4)
//!                     | local header offset(4) | name | comment
//! end of directory  : sig(4) | disk(2) | directory disk(2) | entries on disk(2)
//!                     | total entries(2) | directory size(4) | directory offset(4)
//!                     | comment len(2)
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

/// Local file header signature (`PK\x03\x04`).
pub const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;

/// Data descriptor signature (`PK\x07\x08`).
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x0807_4b50;

/// Central directory record signature (`PK\x01\x02`).
pub const CENTRAL_RECORD_SIGNATURE: u32 = 0x0201_4b50;

/// End of central directory signature (`PK\x05\x06`).
pub const END_OF_DIRECTORY_SIGNATURE: u32 = 0x0605_4b50;

/// Version needed to extract, and version made by: 2.0.
pub const VERSION: u16 = 20;

/// Bit 3: CRC and sizes are zero in the local header and follow the data.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// Bit 11: file names are UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;

/// Compression method 0: stored.
pub const METHOD_STORED: u16 = 0;

/// MS-DOS directory attribute, placed in the external attributes field.
pub const DOS_DIRECTORY_ATTRIBUTE: u32 = 0x10;

/// Length of the fixed header fields shared by local and central records.
pub const HEADER_FIELDS_LEN: usize = 26;

/// Length of a local header before the name.
pub const LOCAL_HEADER_LEN: usize = 4 + HEADER_FIELDS_LEN;

/// Length of a data descriptor.
pub const DATA_DESCRIPTOR_LEN: usize = 16;

/// Length of a central record before the name and comment.
pub const CENTRAL_RECORD_LEN: usize = 46;

/// Length of the end of central directory record (no archive comment).
pub const END_OF_DIRECTORY_LEN: usize = 22;

/// The 26 fixed-format fields of an entry header.
///
/// Written once into the local header with placeholder CRC and sizes, then
/// patched when the entry is finalized and copied into the central record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderFields {
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub dos_time: u16,
    pub dos_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name_len: u16,
    pub extra_len: u16,
}

impl HeaderFields {
    /// Header for a stored entry whose sizes follow in a data descriptor.
    pub fn streamed(modified_at: NaiveDateTime, name_len: u16) -> Self {
        let (dos_time, dos_date) = dos_date_time(modified_at);
        Self {
            version_needed: VERSION,
            flags: FLAG_DATA_DESCRIPTOR | FLAG_UTF8,
            method: METHOD_STORED,
            dos_time,
            dos_date,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            name_len,
            extra_len: 0,
        }
    }

    /// Fill in the values that were unknown when the local header was written.
    pub fn patch(&mut self, crc32: u32, compressed_size: u32, uncompressed_size: u32) {
        self.crc32 = crc32;
        self.compressed_size = compressed_size;
        self.uncompressed_size = uncompressed_size;
    }

    /// Append the 26 field bytes to `buf`.
    pub fn put(&self, buf: &mut impl BufMut) {
        buf.put_u16_le(self.version_needed);
        buf.put_u16_le(self.flags);
        buf.put_u16_le(self.method);
        buf.put_u16_le(self.dos_time);
        buf.put_u16_le(self.dos_date);
        buf.put_u32_le(self.crc32);
        buf.put_u32_le(self.compressed_size);
        buf.put_u32_le(self.uncompressed_size);
        buf.put_u16_le(self.name_len);
        buf.put_u16_le(self.extra_len);
    }
}

/// Build a local file header.
pub fn local_header(fields: &HeaderFields, name: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(LOCAL_HEADER_LEN + name.len());
    buf.put_u32_le(LOCAL_HEADER_SIGNATURE);
    fields.put(&mut buf);
    buf.put_slice(name);
    buf.freeze()
}

/// Build a data descriptor.
pub fn data_descriptor(crc32: u32, compressed_size: u32, uncompressed_size: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(DATA_DESCRIPTOR_LEN);
    buf.put_u32_le(DATA_DESCRIPTOR_SIGNATURE);
    buf.put_u32_le(crc32);
    buf.put_u32_le(compressed_size);
    buf.put_u32_le(uncompressed_size);
    buf.freeze()
}

/// One entry's view for the central directory.
#[derive(Debug, Clone, Copy)]
pub struct CentralRecord<'a> {
    pub fields: &'a HeaderFields,
    pub name: &'a [u8],
    pub comment: &'a [u8],
    pub directory: bool,
    pub local_header_offset: u32,
}

impl CentralRecord<'_> {
    /// Encoded length of this record.
    pub fn encoded_len(&self) -> usize {
        CENTRAL_RECORD_LEN + self.name.len() + self.comment.len()
    }

    /// Append the record to `buf`.
    pub fn put(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(CENTRAL_RECORD_SIGNATURE);
        buf.put_u16_le(VERSION);
        self.fields.put(buf);
        buf.put_u16_le(self.comment.len() as u16);
        // disk number start, internal attributes
        buf.put_u16_le(0);
        buf.put_u16_le(0);
        buf.put_u32_le(if self.directory {
            DOS_DIRECTORY_ATTRIBUTE
        } else {
            0
        });
        buf.put_u32_le(self.local_header_offset);
        buf.put_slice(self.name);
        buf.put_slice(self.comment);
    }
}

/// Append the end of central directory record.
///
/// Multi-disk archives are unsupported, so the entry count is written to
/// both the "this disk" and "total" fields.
pub fn put_end_of_directory(
    buf: &mut impl BufMut,
    entry_count: u16,
    directory_size: u32,
    directory_offset: u32,
) {
    buf.put_u32_le(END_OF_DIRECTORY_SIGNATURE);
    buf.put_u16_le(0);
    buf.put_u16_le(0);
    buf.put_u16_le(entry_count);
    buf.put_u16_le(entry_count);
    buf.put_u32_le(directory_size);
    buf.put_u32_le(directory_offset);
    buf.put_u16_le(0);
}

/// Convert a timestamp to MS-DOS `(time, date)`.
///
/// DOS dates cover 1980 through 2107 with two-second resolution; values
/// outside that range are clamped to its ends.
pub fn dos_date_time(at: NaiveDateTime) -> (u16, u16) {
    let at = clamp_dos_range(at);
    let time = ((at.hour() as u16) << 11) | ((at.minute() as u16) << 5) | (at.second() as u16 / 2);
    let date =
        (((at.year() - 1980) as u16) << 9) | ((at.month() as u16) << 5) | at.day() as u16;
    (time, date)
}

fn clamp_dos_range(at: NaiveDateTime) -> NaiveDateTime {
    let min = NaiveDate::from_ymd_opt(1980, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0));
    let max = NaiveDate::from_ymd_opt(2107, 12, 31).and_then(|d| d.and_hms_opt(23, 59, 58));
    match (min, max) {
        (Some(min), _) if at < min => min,
        (_, Some(max)) if at > max => max,
        _ => at,
    }
}
