//! Node arena with reference-counted sharing.
//!
//! Every value in the database is a [`CdbObject`] node stored in one pool
//! and addressed by [`NodeId`]. Nodes are never freed individually; a
//! node that loses its last owner simply becomes unreachable until the
//! database is cleared or compacted with
//! [`MaterialDatabase::copy_from`](crate::MaterialDatabase::copy_from).
//!
//! `ref_count` counts owners beyond the first, so a freshly allocated node
//! has a count of zero and may be mutated in place.

use crate::error::{Error, Result};
use crate::graph::ObjectId;
use crate::intern::StrRef;
use crate::types::{compound_size, NameId, ValueKind, NODE_HEADER_SIZE};

/// Handle to a node in an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Payload of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectData {
    String(StrRef),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Bool(bool),
    Float(f32),
    Double(f64),
    /// One slot per class field, in declaration order.
    Struct(Vec<Option<NodeId>>),
    List {
        element_type: NameId,
        items: Vec<Option<NodeId>>,
    },
    /// Keys and values interleaved: `[k0, v0, k1, v1, ...]`.
    Map {
        key_type: NameId,
        value_type: NameId,
        items: Vec<Option<NodeId>>,
    },
    Ref(Option<NodeId>),
    /// Resolved `BSComponentDB2::ID` link to another object.
    Link(Option<ObjectId>),
}

/// A value node.
#[derive(Debug, Clone, PartialEq)]
pub struct CdbObject {
    /// Built-in kind or class id.
    pub type_id: NameId,
    /// Number of additional owners.
    pub ref_count: u16,
    pub data: ObjectData,
}

impl CdbObject {
    #[inline]
    pub fn new(type_id: NameId, data: ObjectData) -> Self {
        Self {
            type_id,
            ref_count: 0,
            data,
        }
    }

    /// Child slots of a compound node; empty for scalars.
    pub fn children(&self) -> &[Option<NodeId>] {
        match &self.data {
            ObjectData::Struct(items)
            | ObjectData::List { items, .. }
            | ObjectData::Map { items, .. } => items,
            ObjectData::Ref(child) => std::slice::from_ref(child),
            _ => &[],
        }
    }

    pub fn children_mut(&mut self) -> &mut [Option<NodeId>] {
        match &mut self.data {
            ObjectData::Struct(items)
            | ObjectData::List { items, .. }
            | ObjectData::Map { items, .. } => items,
            ObjectData::Ref(child) => std::slice::from_mut(child),
            _ => &mut [],
        }
    }

    /// Bytes this node occupies under the fixed layout table.
    pub fn footprint(&self) -> usize {
        let kind = match &self.data {
            ObjectData::Struct(_)
            | ObjectData::List { .. }
            | ObjectData::Map { .. }
            | ObjectData::Ref(_) => return compound_size(self.children().len()).0,
            ObjectData::Link(_) => return NODE_HEADER_SIZE + 8,
            ObjectData::String(_) => ValueKind::String,
            ObjectData::Int8(_) => ValueKind::Int8,
            ObjectData::UInt8(_) => ValueKind::UInt8,
            ObjectData::Int16(_) => ValueKind::Int16,
            ObjectData::UInt16(_) => ValueKind::UInt16,
            ObjectData::Int32(_) => ValueKind::Int32,
            ObjectData::UInt32(_) => ValueKind::UInt32,
            ObjectData::Int64(_) => ValueKind::Int64,
            ObjectData::UInt64(_) => ValueKind::UInt64,
            ObjectData::Bool(_) => ValueKind::Bool,
            ObjectData::Float(_) => ValueKind::Float,
            ObjectData::Double(_) => ValueKind::Double,
        };
        kind.node_size().0
    }
}

/// Allocation counters of an [`Arena`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Nodes allocated, reachable or not.
    pub nodes: usize,
    /// Bytes accounted under the layout table.
    pub bytes: usize,
    /// Nodes created by copy-on-write.
    pub cow_copies: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Arena {
    nodes: Vec<CdbObject>,
    stats: ArenaStats,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(nodes: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(nodes),
            stats: ArenaStats::default(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn stats(&self) -> ArenaStats {
        self.stats
    }

    pub fn alloc(&mut self, node: CdbObject) -> Result<NodeId> {
        let id = u32::try_from(self.nodes.len()).map_err(|_| Error::OutOfMemory("node arena"))?;
        self.stats.nodes += 1;
        self.stats.bytes += node.footprint();
        self.nodes.push(node);
        Ok(NodeId(id))
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> &CdbObject {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> &mut CdbObject {
        &mut self.nodes[id.index()]
    }

    /// Account for `slots` extra child slots appended to a compound node.
    #[inline]
    pub(crate) fn note_growth(&mut self, slots: usize) {
        self.stats.bytes += slots * crate::types::CHILD_SLOT_SIZE;
    }

    /// Add an owner to a node.
    ///
    /// A node whose count is saturated is copied instead, and the copy is
    /// returned.
    pub fn share(&mut self, id: NodeId) -> Result<NodeId> {
        let node = &mut self.nodes[id.index()];
        if node.ref_count < u16::MAX {
            node.ref_count += 1;
            return Ok(id);
        }
        self.duplicate(id)
    }

    /// Drop one owner of a node.
    ///
    /// Releasing the last owner releases the node's children in turn.
    pub fn release(&mut self, id: NodeId) {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let node = &mut self.nodes[id.index()];
            if node.ref_count > 0 {
                node.ref_count -= 1;
            } else {
                pending.extend(node.children().iter().flatten().copied());
            }
        }
    }

    #[inline]
    pub fn release_opt(&mut self, id: Option<NodeId>) {
        if let Some(id) = id {
            self.release(id);
        }
    }

    /// Get a node that can be mutated without affecting other owners.
    ///
    /// An unshared node is returned as is. A shared node is copied: the
    /// copy takes ownership of one reference to each child, and the
    /// original loses one owner.
    pub fn make_unique(&mut self, id: NodeId) -> Result<NodeId> {
        if self.nodes[id.index()].ref_count == 0 {
            return Ok(id);
        }
        let copy = self.duplicate(id)?;
        self.nodes[id.index()].ref_count -= 1;
        self.stats.cow_copies += 1;
        Ok(copy)
    }

    /// Shallow copy with shared children.
    fn duplicate(&mut self, id: NodeId) -> Result<NodeId> {
        let mut copy = self.nodes[id.index()].clone();
        copy.ref_count = 0;
        for slot in copy.children_mut() {
            if let Some(child) = *slot {
                *slot = Some(self.share(child)?);
            }
        }
        self.alloc(copy)
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.stats = ArenaStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float(arena: &mut Arena, v: f32) -> NodeId {
        arena
            .alloc(CdbObject::new(NameId::FLOAT, ObjectData::Float(v)))
            .unwrap()
    }

    fn pair(arena: &mut Arena, a: NodeId, b: NodeId) -> NodeId {
        arena
            .alloc(CdbObject::new(NameId(40), ObjectData::Struct(vec![Some(a), Some(b)])))
            .unwrap()
    }

    #[test]
    fn test_footprints() {
        let mut arena = Arena::new();
        let a = float(&mut arena, 1.0);
        let b = float(&mut arena, 2.0);
        pair(&mut arena, a, b);

        let stats = arena.stats();
        assert_eq!(stats.nodes, 3);
        assert_eq!(stats.bytes, 12 + 12 + 24);
    }

    #[test]
    fn test_make_unique_on_unshared_is_identity() {
        let mut arena = Arena::new();
        let a = float(&mut arena, 1.0);
        assert_eq!(arena.make_unique(a).unwrap(), a);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_copy_on_write_shares_children() {
        let mut arena = Arena::new();
        let a = float(&mut arena, 1.0);
        let b = float(&mut arena, 2.0);
        let s = pair(&mut arena, a, b);
        let shared = arena.share(s).unwrap();
        assert_eq!(shared, s);
        assert_eq!(arena.get(s).ref_count, 1);

        let copy = arena.make_unique(s).unwrap();
        assert_ne!(copy, s);
        assert_eq!(arena.get(s).ref_count, 0);
        assert_eq!(arena.get(copy).ref_count, 0);
        assert_eq!(arena.get(copy).children(), &[Some(a), Some(b)]);
        assert_eq!(arena.get(a).ref_count, 1);

        // Patching the copy's child copies it in turn and leaves the original value.
        let child = arena.make_unique(a).unwrap();
        arena.get_mut(child).data = ObjectData::Float(9.0);
        arena.get_mut(copy).children_mut()[0] = Some(child);
        assert_eq!(arena.get(a).data, ObjectData::Float(1.0));
        assert_eq!(arena.get(child).data, ObjectData::Float(9.0));
        assert_eq!(arena.stats().cow_copies, 2);
    }

    #[test]
    fn test_release_recurses_for_last_owner() {
        let mut arena = Arena::new();
        let a = float(&mut arena, 1.0);
        let b = float(&mut arena, 2.0);
        arena.share(a).unwrap();
        let s = pair(&mut arena, a, b);

        arena.release(s);
        assert_eq!(arena.get(a).ref_count, 0);
        assert_eq!(arena.get(b).ref_count, 0);
    }

    #[test]
    fn test_saturated_share_copies() {
        let mut arena = Arena::new();
        let a = float(&mut arena, 1.0);
        arena.get_mut(a).ref_count = u16::MAX;
        let other = arena.share(a).unwrap();
        assert_ne!(other, a);
        assert_eq!(arena.get(a).ref_count, u16::MAX);
        assert_eq!(arena.get(other).data, ObjectData::Float(1.0));
    }
}
