//! Content-addressed storage for string values.
//!
//! Every distinct byte string is stored once in an append-only buffer as a
//! `u32` length prefix followed by the bytes. A [`StrRef`] is the offset
//! of the bytes, so equal strings always compare equal by reference.

use matdb_common::crc::hash_bytes;

use crate::error::{Error, Result};
use crate::hash_table::{OpenTable, Probe};

/// Handle to an interned string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrRef(u32);

impl StrRef {
    #[inline]
    pub fn offset(self) -> u32 {
        self.0
    }
}

const PREFIX_SIZE: usize = 4;

#[derive(Debug, Clone)]
pub struct InternTable {
    bytes: Vec<u8>,
    table: OpenTable<StrRef>,
}

impl InternTable {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(strings: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(strings * 16),
            table: OpenTable::with_capacity(strings * 3 / 2),
        }
    }

    /// Number of distinct strings stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    /// Bytes held by the backing buffer, prefixes included.
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.bytes.len()
    }

    /// Return the handle for `value`, storing it first if it is new.
    pub fn intern(&mut self, value: &[u8]) -> Result<StrRef> {
        let hash = hash_bytes(value);
        if let Some(found) = self.lookup(hash, value) {
            return Ok(found);
        }

        if self.table.needs_grow() {
            let bytes = &self.bytes;
            self.table.grow(|r| hash_bytes(slice(bytes, *r)));
        }

        let len = u32::try_from(value.len()).map_err(|_| Error::OutOfMemory("string too long"))?;
        let offset = self.bytes.len() + PREFIX_SIZE;
        let handle = StrRef(u32::try_from(offset).map_err(|_| Error::OutOfMemory("string pool"))?);

        let bytes = &self.bytes;
        let slot = match self.table.probe(hash, |r| slice(bytes, *r) == value) {
            Probe::Vacant(slot) => slot,
            Probe::Found(_) | Probe::Full => return Err(Error::OutOfMemory("string table")),
        };

        self.bytes.extend_from_slice(&len.to_le_bytes());
        self.bytes.extend_from_slice(value);
        self.table.set(slot, handle);
        Ok(handle)
    }

    /// Find `value` without storing it.
    pub fn find(&self, value: &[u8]) -> Option<StrRef> {
        self.lookup(hash_bytes(value), value)
    }

    fn lookup(&self, hash: u32, value: &[u8]) -> Option<StrRef> {
        let bytes = &self.bytes;
        match self.table.probe(hash, |r| slice(bytes, *r) == value) {
            Probe::Found(slot) => self.table.get(slot).copied(),
            _ => None,
        }
    }

    /// Get the bytes of an interned string.
    #[inline]
    pub fn get(&self, handle: StrRef) -> &[u8] {
        slice(&self.bytes, handle)
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.table.clear();
    }
}

impl Default for InternTable {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn slice(bytes: &[u8], handle: StrRef) -> &[u8] {
    let start = handle.0 as usize;
    let mut prefix = [0u8; PREFIX_SIZE];
    prefix.copy_from_slice(&bytes[start - PREFIX_SIZE..start]);
    let len = u32::from_le_bytes(prefix) as usize;
    &bytes[start..start + len]
}
