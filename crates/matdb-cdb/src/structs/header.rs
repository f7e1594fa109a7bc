//! Chunk, file and class headers.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Header preceding every chunk body.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct ChunkHeader {
    /// Four ASCII bytes, e.g. `BETH`. An all-zero tag ends the stream.
    pub tag: [u8; 4],
    /// Body size in bytes, excluding this header.
    pub size: u32,
}

/// Body of the `BETH` chunk.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct FileHeader {
    pub version: u32,
    /// Number of chunks that follow, as recorded by the writer.
    pub chunk_count: u32,
}

/// Fixed part of a `CLAS` body; `field_count` [`FieldRecord`]s follow.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct ClassHeader {
    /// String reference to the class name.
    pub name: u32,
    pub version: u32,
    pub flags: u16,
    pub field_count: u16,
}

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct FieldRecord {
    /// String reference to the field name.
    pub name: u32,
    /// String reference to the field type.
    pub type_name: u32,
    /// Offset of the field in the writer's in-memory layout; unused.
    pub data_offset: u16,
    /// Size of the field in the writer's in-memory layout; unused.
    pub data_size: u16,
}
