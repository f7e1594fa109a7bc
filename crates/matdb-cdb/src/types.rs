//! Built-in value kinds and the static node layout table.

use std::fmt;

/// Identifier of a string in a database's [`StringTable`](crate::StringTable).
///
/// Class names, field names and built-in type names all share this id
/// space. Ids `0..16` are the built-in value kinds, in [`ValueKind`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NameId(pub u32);

impl NameId {
    pub const NULL: Self = Self(ValueKind::Null as u32);
    pub const STRING: Self = Self(ValueKind::String as u32);
    pub const LIST: Self = Self(ValueKind::List as u32);
    pub const MAP: Self = Self(ValueKind::Map as u32);
    pub const REF: Self = Self(ValueKind::Ref as u32);
    pub const INT8: Self = Self(ValueKind::Int8 as u32);
    pub const UINT8: Self = Self(ValueKind::UInt8 as u32);
    pub const INT16: Self = Self(ValueKind::Int16 as u32);
    pub const UINT16: Self = Self(ValueKind::UInt16 as u32);
    pub const INT32: Self = Self(ValueKind::Int32 as u32);
    pub const UINT32: Self = Self(ValueKind::UInt32 as u32);
    pub const INT64: Self = Self(ValueKind::Int64 as u32);
    pub const UINT64: Self = Self(ValueKind::UInt64 as u32);
    pub const BOOL: Self = Self(ValueKind::Bool as u32);
    pub const FLOAT: Self = Self(ValueKind::Float as u32);
    pub const DOUBLE: Self = Self(ValueKind::Double as u32);

    /// Class ids must be at or above this value.
    pub const FIRST_CLASS_ID: u32 = 16;

    // Well-known classes the engine special-cases.
    pub const COMPONENT_ID: Self = Self(16);
    pub const CONTROLLER_COMPONENT: Self = Self(17);
    pub const OBJECT_INFO: Self = Self(18);
    pub const COMPONENT_INFO: Self = Self(19);
    pub const EDGE_INFO: Self = Self(20);
    pub const BLENDER_ID: Self = Self(21);
    pub const LOD_MATERIAL_ID: Self = Self(22);
    pub const LAYER_ID: Self = Self(23);
    pub const MATERIAL_ID: Self = Self(24);
    pub const TEXTURE_SET_ID: Self = Self(25);
    pub const UV_STREAM_ID: Self = Self(26);

    /// Check if this id names a built-in value kind rather than a class.
    #[inline]
    pub fn is_builtin(self) -> bool {
        self.0 < Self::FIRST_CLASS_ID
    }

    /// Get the built-in kind, if this id is one.
    #[inline]
    pub fn kind(self) -> Option<ValueKind> {
        ValueKind::from_id(self.0)
    }

    /// Check if this is one of the material cross-reference classes whose
    /// links are followed by material export.
    pub fn is_cross_reference(self) -> bool {
        matches!(
            self,
            Self::BLENDER_ID
                | Self::LOD_MATERIAL_ID
                | Self::LAYER_ID
                | Self::MATERIAL_ID
                | Self::TEXTURE_SET_ID
                | Self::UV_STREAM_ID
        )
    }
}

/// Names pre-seeded into every string table, indexed by [`NameId`].
pub(crate) const BUILTIN_NAMES: &[&str] = &[
    "Null",
    "String",
    "List",
    "Map",
    "Ref",
    "Int8",
    "UInt8",
    "Int16",
    "UInt16",
    "Int32",
    "UInt32",
    "Int64",
    "UInt64",
    "Bool",
    "Float",
    "Double",
    "BSComponentDB2::ID",
    "BSBind::ControllerComponent",
    "BSComponentDB2::DBFileIndex::ObjectInfo",
    "BSComponentDB2::DBFileIndex::ComponentInfo",
    "BSComponentDB2::DBFileIndex::EdgeInfo",
    "BSMaterial::BlenderID",
    "BSMaterial::LODMaterialID",
    "BSMaterial::LayerID",
    "BSMaterial::MaterialID",
    "BSMaterial::TextureSetID",
    "BSMaterial::UVStreamID",
];

/// Built-in value kinds.
///
/// The discriminants are the [`NameId`]s of the kinds' names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ValueKind {
    Null = 0,
    String = 1,
    List = 2,
    Map = 3,
    Ref = 4,
    Int8 = 5,
    UInt8 = 6,
    Int16 = 7,
    UInt16 = 8,
    Int32 = 9,
    UInt32 = 10,
    Int64 = 11,
    UInt64 = 12,
    Bool = 13,
    Float = 14,
    Double = 15,
}

/// Size of the fixed node header (type id, ref count, child count).
pub const NODE_HEADER_SIZE: usize = 8;

/// Size of one child slot in a compound node.
pub const CHILD_SLOT_SIZE: usize = 8;

/// `(payload size, alignment)` of scalar nodes, indexed by kind.
/// Compound kinds report a single slot; [`compound_size`] adds the rest.
const LAYOUTS: [(usize, usize); 16] = [
    (0, 4),  // Null
    (8, 8),  // String
    (8, 8),  // List
    (8, 8),  // Map
    (8, 8),  // Ref
    (1, 4),  // Int8
    (1, 4),  // UInt8
    (2, 4),  // Int16
    (2, 4),  // UInt16
    (4, 4),  // Int32
    (4, 4),  // UInt32
    (8, 8),  // Int64
    (8, 8),  // UInt64
    (1, 4),  // Bool
    (4, 4),  // Float
    (8, 8),  // Double
];

impl ValueKind {
    /// Parse from a name id.
    pub fn from_id(id: u32) -> Option<Self> {
        Some(match id {
            0 => Self::Null,
            1 => Self::String,
            2 => Self::List,
            3 => Self::Map,
            4 => Self::Ref,
            5 => Self::Int8,
            6 => Self::UInt8,
            7 => Self::Int16,
            8 => Self::UInt16,
            9 => Self::Int32,
            10 => Self::UInt32,
            11 => Self::Int64,
            12 => Self::UInt64,
            13 => Self::Bool,
            14 => Self::Float,
            15 => Self::Double,
            _ => return None,
        })
    }

    #[inline]
    pub fn id(self) -> NameId {
        NameId(self as u32)
    }

    /// Get the built-in name of this kind.
    #[inline]
    pub fn as_str(self) -> &'static str {
        BUILTIN_NAMES[self as usize]
    }

    /// Width in bytes of this kind's inline wire encoding, for fixed-size scalars.
    pub fn wire_size(self) -> Option<usize> {
        match self {
            Self::Int8 | Self::UInt8 | Self::Bool => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int32 | Self::UInt32 | Self::Float => Some(4),
            Self::Int64 | Self::UInt64 | Self::Double => Some(8),
            _ => None,
        }
    }

    /// Check if values of this kind hold child nodes.
    #[inline]
    pub fn is_compound(self) -> bool {
        matches!(self, Self::List | Self::Map | Self::Ref)
    }

    /// Arena footprint of a scalar node of this kind.
    pub fn node_size(self) -> (usize, usize) {
        let (payload, align) = LAYOUTS[self as usize];
        (round_up(NODE_HEADER_SIZE + payload, align), align)
    }
}

/// Arena footprint of a compound node with `child_count` slots: the header
/// holds one slot and the remaining `child_count - 1` trail it.
#[inline]
pub fn compound_size(child_count: usize) -> (usize, usize) {
    let extra = child_count.saturating_sub(1) * CHILD_SLOT_SIZE;
    (NODE_HEADER_SIZE + CHILD_SLOT_SIZE + extra, 8)
}

#[inline]
pub(crate) fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_ids_match_names() {
        for id in 0..NameId::FIRST_CLASS_ID {
            let kind = ValueKind::from_id(id).unwrap();
            assert_eq!(kind.id(), NameId(id));
            assert_eq!(kind.as_str(), BUILTIN_NAMES[id as usize]);
        }
        assert!(ValueKind::from_id(NameId::FIRST_CLASS_ID).is_none());
    }

    #[test]
    fn test_well_known_names() {
        assert_eq!(BUILTIN_NAMES[NameId::COMPONENT_ID.0 as usize], "BSComponentDB2::ID");
        assert_eq!(BUILTIN_NAMES[NameId::UV_STREAM_ID.0 as usize], "BSMaterial::UVStreamID");
        assert!(NameId::LAYER_ID.is_cross_reference());
        assert!(!NameId::COMPONENT_ID.is_cross_reference());
    }

    #[test]
    fn test_layouts() {
        assert_eq!(ValueKind::Int8.node_size(), (12, 4));
        assert_eq!(ValueKind::Double.node_size(), (16, 8));
        assert_eq!(compound_size(0), (16, 8));
        assert_eq!(compound_size(1), (16, 8));
        assert_eq!(compound_size(4), (40, 8));
    }
}
