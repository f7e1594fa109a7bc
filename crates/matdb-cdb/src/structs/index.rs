//! Records of the `ObjectInfo`, `ComponentInfo` and `EdgeInfo` index lists.

use matdb_common::ResourceId;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// One object declaration.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct ObjectInfoRecord {
    pub persistent_id: ResourceId,
    /// File-local id; `1..=0xFFFFFF`.
    pub db_id: u32,
    /// File-local id of the base object, or 0.
    pub base_db_id: u32,
    pub has_data: u8,
}

/// Object declaration with the persistent id of its base, for bases that
/// live in another file.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct ObjectInfoRecordExt {
    pub persistent_id: ResourceId,
    pub db_id: u32,
    pub base_db_id: u32,
    pub parent_persistent_id: ResourceId,
    pub has_data: u8,
}

impl From<ObjectInfoRecordExt> for ObjectInfoRecord {
    fn from(r: ObjectInfoRecordExt) -> Self {
        Self {
            persistent_id: r.persistent_id,
            db_id: r.db_id,
            base_db_id: r.base_db_id,
            has_data: r.has_data,
        }
    }
}

/// Binds the next component chunk to an object.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct ComponentInfoRecord {
    pub db_id: u32,
    /// Per-class component index.
    pub index: u16,
    /// Writer-side type index; unused.
    pub type_index: u16,
}

/// Parent edge: `source` becomes a child of `target`.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct EdgeInfoRecord {
    pub source_db_id: u32,
    pub target_db_id: u32,
}
