//! Bounds-checked reader over a chunk body.
//!
//! This module provides [`ChunkReader`], a cursor over a byte slice that
//! knows the absolute file offset of its first byte, so every truncation
//! error can name the exact position in the source buffer.

use zerocopy::FromBytes;

use crate::{Error, Result};

/// A little-endian cursor over one chunk of a CDB stream.
///
/// # Example
///
/// ```
/// use matdb_common::ChunkReader;
///
/// let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
/// let mut reader = ChunkReader::new(&data, 100);
///
/// assert_eq!(reader.read_u32().unwrap(), 0x04030201);
/// assert_eq!(reader.offset(), 104);
/// assert!(reader.read_u32().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ChunkReader<'a> {
    data: &'a [u8],
    position: usize,
    base: usize,
}

impl<'a> ChunkReader<'a> {
    /// Create a reader whose first byte sits at absolute offset `base`.
    #[inline]
    pub const fn new(data: &'a [u8], base: usize) -> Self {
        Self {
            data,
            position: 0,
            base,
        }
    }

    /// Position relative to the start of the chunk body.
    #[inline]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Absolute offset in the source buffer.
    #[inline]
    pub const fn offset(&self) -> usize {
        self.base + self.position
    }

    /// Total length of the chunk body.
    #[inline]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Number of bytes remaining to read.
    #[inline]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Check if the body has been fully consumed.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }

    /// The unread part of the body.
    #[inline]
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.position.min(self.data.len())..]
    }

    /// Skip `count` bytes, failing if they are not present.
    #[inline]
    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.read_bytes(count).map(|_| ())
    }

    /// Read bytes and advance the position.
    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(Error::Truncated {
                offset: self.offset(),
                needed: count,
                available: self.remaining(),
            });
        }
        let bytes = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }

    #[inline]
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Read a four-byte chunk tag.
    #[inline]
    pub fn read_tag(&mut self) -> Result<[u8; 4]> {
        self.read_array()
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_array::<1>().map(|b| b[0])
    }

    #[inline]
    pub fn read_i8(&mut self) -> Result<i8> {
        self.read_u8().map(|b| b as i8)
    }

    /// Read a boolean stored as a single byte (non-zero = true).
    #[inline]
    pub fn read_bool(&mut self) -> Result<bool> {
        self.read_u8().map(|b| b != 0)
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    #[inline]
    pub fn read_i16(&mut self) -> Result<i16> {
        self.read_array().map(i16::from_le_bytes)
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    #[inline]
    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_array().map(i32::from_le_bytes)
    }

    #[inline]
    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    #[inline]
    pub fn read_i64(&mut self) -> Result<i64> {
        self.read_array().map(i64::from_le_bytes)
    }

    /// Read an IEEE-754 single by reinterpreting its bit pattern.
    #[inline]
    pub fn read_f32(&mut self) -> Result<f32> {
        self.read_u32().map(f32::from_bits)
    }

    /// Read an IEEE-754 double by reinterpreting its bit pattern.
    #[inline]
    pub fn read_f64(&mut self) -> Result<f64> {
        self.read_u64().map(f64::from_bits)
    }

    /// Read a fixed-layout record using zerocopy.
    #[inline]
    pub fn read_struct<T: FromBytes>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let offset = self.offset();
        let bytes = self.read_bytes(size)?;
        T::read_from_bytes(bytes).map_err(|_| Error::Truncated {
            offset,
            needed: size,
            available: bytes.len(),
        })
    }

    /// Split off the next `count` bytes as an independent reader.
    pub fn sub_reader(&mut self, count: usize) -> Result<ChunkReader<'a>> {
        let base = self.offset();
        let bytes = self.read_bytes(count)?;
        Ok(ChunkReader::new(bytes, base))
    }
}
