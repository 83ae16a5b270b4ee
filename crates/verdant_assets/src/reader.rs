//! # Byte Reader / Writer
//!
//! Little-endian cursor over an in-memory asset file. Records are read as
//! fixed-size `Pod` blocks; every read is bounds-checked and reports
//! truncation as [`AssetError::Malformed`].

use std::path::Path;

use bytemuck::Pod;

use crate::error::{AssetError, AssetResult};
use crate::header::FileHeader;

/// Upper bound on any single record count. Guards against allocating
/// gigabytes for a corrupt length prefix.
pub const MAX_RECORD_COUNT: u32 = 1 << 24;

/// Bounds-checked cursor over asset bytes.
pub struct ByteReader<'a> {
    /// File being read, for error messages.
    path: &'a Path,
    /// Whole file.
    bytes: &'a [u8],
    /// Cursor.
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader at the start of `bytes`.
    #[must_use]
    pub const fn new(path: &'a Path, bytes: &'a [u8]) -> Self {
        Self { path, bytes, pos: 0 }
    }

    /// File being read.
    #[must_use]
    pub const fn path(&self) -> &'a Path {
        self.path
    }

    /// Bytes left after the cursor.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Cursor position.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Builds a [`AssetError::Malformed`] for this file.
    pub fn malformed(&self, reason: impl Into<String>) -> AssetError {
        AssetError::malformed(self.path, reason)
    }

    fn take(&mut self, len: usize, what: &str) -> AssetResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(self.malformed(format!(
                "truncated reading {what}: need {len} bytes at offset {}, {} left",
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Reads one `Pod` value.
    pub fn read_pod<T: Pod>(&mut self, what: &str) -> AssetResult<T> {
        let bytes = self.take(std::mem::size_of::<T>(), what)?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Reads a `u32`.
    pub fn read_u32(&mut self, what: &str) -> AssetResult<u32> {
        self.read_pod::<u32>(what)
    }

    /// Reads a record count and rejects absurd values.
    pub fn read_count(&mut self, what: &str) -> AssetResult<u32> {
        let count = self.read_u32(what)?;
        if count > MAX_RECORD_COUNT {
            return Err(self.malformed(format!("{what} count {count} exceeds {MAX_RECORD_COUNT}")));
        }
        Ok(count)
    }

    /// Reads `count` consecutive `Pod` records.
    pub fn read_pod_vec<T: Pod>(&mut self, count: u32, what: &str) -> AssetResult<Vec<T>> {
        let len = (count as usize)
            .checked_mul(std::mem::size_of::<T>())
            .ok_or_else(|| self.malformed(format!("{what} size overflows")))?;
        let bytes = self.take(len, what)?;
        Ok(bytemuck::pod_collect_to_vec(bytes))
    }

    /// Reads a `u32` count followed by that many records.
    pub fn read_counted_vec<T: Pod>(&mut self, what: &str) -> AssetResult<Vec<T>> {
        let count = self.read_count(what)?;
        self.read_pod_vec(count, what)
    }

    /// Skips `len` bytes, still requiring them to be present.
    pub fn skip(&mut self, len: usize, what: &str) -> AssetResult<()> {
        self.take(len, what).map(|_| ())
    }

    /// Reads and checks the file header.
    pub fn read_header(&mut self, token: u32, version: u32) -> AssetResult<FileHeader> {
        let header: FileHeader = self.read_pod("file header")?;
        header.check(self.path, token, version)?;
        Ok(header)
    }
}

/// Little-endian writer producing the same layouts [`ByteReader`] consumes.
#[derive(Debug, Default)]
pub struct ByteWriter {
    /// Output.
    bytes: Vec<u8>,
}

impl ByteWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a header.
    pub fn write_header(&mut self, token: u32, version: u32) {
        self.write_pod(&FileHeader { token, version });
    }

    /// Writes one `Pod` value.
    pub fn write_pod<T: Pod>(&mut self, value: &T) {
        self.bytes.extend_from_slice(bytemuck::bytes_of(value));
    }

    /// Writes a `u32`.
    pub fn write_u32(&mut self, value: u32) {
        self.write_pod(&value);
    }

    /// Writes records without a count.
    pub fn write_slice<T: Pod>(&mut self, values: &[T]) {
        self.bytes.extend_from_slice(bytemuck::cast_slice(values));
    }

    /// Writes a `u32` count followed by the records.
    pub fn write_counted_slice<T: Pod>(&mut self, values: &[T]) {
        self.write_u32(values.len() as u32);
        self.write_slice(values);
    }

    /// Finishes and returns the bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
