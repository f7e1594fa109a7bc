//! Value decoding and copy-on-write patching.
//!
//! `OBJT` chunks rebuild a component from scratch. `DIFF` chunks patch the
//! existing value: struct fields are addressed by index, lists and maps
//! are extended, and every shared node on the path to a change is copied
//! first so other owners keep their value.

use std::sync::Arc;

use matdb_common::ChunkReader;

use crate::arena::{Arena, CdbObject, NodeId, ObjectData};
use crate::chunk;
use crate::error::{Error, Result};
use crate::parser::ChunkParser;
use crate::types::{NameId, ValueKind};

/// Most child slots a collection node may hold.
pub const MAX_COLLECTION_ITEMS: usize = 0xFFFF;

/// Struct diff terminator.
const END_OF_FIELDS: u16 = 0xFFFF;

impl<'a> ChunkParser<'a, '_> {
    /// Decode a value of `type_id`, unwrapping user classes from their chunk.
    pub(crate) fn read_item(
        &mut self,
        body: &mut ChunkReader<'a>,
        current: Option<NodeId>,
        type_id: NameId,
        diff: bool,
    ) -> Result<Option<NodeId>> {
        if self.db.classes.get(type_id).is_some_and(|c| c.is_user()) {
            return self.read_user(current, type_id);
        }
        self.read_value(body, current, type_id, diff)
    }

    /// Decode a value of `type_id` from `body`, patching `current` when it
    /// is a compatible node.
    pub(crate) fn read_value(
        &mut self,
        body: &mut ChunkReader<'a>,
        current: Option<NodeId>,
        type_id: NameId,
        diff: bool,
    ) -> Result<Option<NodeId>> {
        let data = match type_id.kind() {
            None if type_id == NameId::COMPONENT_ID => {
                let db_id = body.read_u32()?;
                ObjectData::Link(self.db.store.find_by_db_id(db_id))
            }
            None => return self.read_struct(body, current, type_id, diff),
            Some(ValueKind::Null) => {
                self.db.arena.release_opt(current);
                return Ok(None);
            }
            Some(ValueKind::List) => return self.read_list(current, diff),
            Some(ValueKind::Map) => return self.read_map(current, diff),
            Some(ValueKind::Ref) => return self.read_ref(body, current, diff),
            Some(ValueKind::String) => {
                let text = read_string(body)?;
                ObjectData::String(self.db.intern.intern(text)?)
            }
            Some(kind) => read_scalar(body, kind)?,
        };
        store_value(&mut self.db.arena, current, type_id, data).map(Some)
    }

    fn read_struct(
        &mut self,
        body: &mut ChunkReader<'a>,
        current: Option<NodeId>,
        class_id: NameId,
        diff: bool,
    ) -> Result<Option<NodeId>> {
        let fields = match self.db.classes.get(class_id) {
            Some(class) => Arc::clone(&class.fields),
            None => {
                return Err(Error::UnknownType {
                    offset: body.offset(),
                    type_id: class_id.0,
                })
            }
        };
        let count = fields.len();
        let node = struct_base(&mut self.db.arena, current, class_id, count)?;

        if diff {
            loop {
                let offset = body.offset();
                let index = body.read_u16()?;
                if index == END_OF_FIELDS {
                    break;
                }
                let index = index as usize;
                if index >= count {
                    return Err(Error::FieldIndexOutOfRange {
                        offset,
                        index,
                        count,
                    });
                }
                self.read_field(body, node, index, fields[index].type_id, true)?;
            }
        } else {
            for (index, field) in fields.iter().enumerate() {
                self.read_field(body, node, index, field.type_id, false)?;
            }
        }
        Ok(Some(node))
    }

    fn read_field(
        &mut self,
        body: &mut ChunkReader<'a>,
        node: NodeId,
        index: usize,
        type_id: NameId,
        diff: bool,
    ) -> Result<()> {
        let old = self.db.arena.get_mut(node).children_mut()[index].take();
        let new = self.read_item(body, old, type_id, diff)?;
        self.db.arena.get_mut(node).children_mut()[index] = new;
        Ok(())
    }

    fn read_list(&mut self, current: Option<NodeId>, diff: bool) -> Result<Option<NodeId>> {
        let chunk = self.stream.expect_chunk(&[chunk::LIST], "LIST")?;
        let mut body = chunk.body;
        let element_type = self.read_type_name(&mut body)?;
        let count = body.read_u32()? as usize;
        if count > MAX_COLLECTION_ITEMS {
            return Err(Error::CollectionTooLarge {
                offset: chunk.offset,
                count,
            });
        }

        let arena = &mut self.db.arena;
        let node = match current {
            Some(id) if diff && appends_to(arena, id, NameId::LIST, element_type) => {
                arena.make_unique(id)?
            }
            other => {
                arena.release_opt(other);
                let items = Vec::with_capacity(count);
                arena.alloc(CdbObject::new(
                    NameId::LIST,
                    ObjectData::List {
                        element_type,
                        items,
                    },
                ))?
            }
        };

        for _ in 0..count {
            let item = self.read_item(&mut body, None, element_type, diff)?;
            if let ObjectData::List { items, .. } = &mut self.db.arena.get_mut(node).data {
                items.push(item);
            }
        }
        self.db.arena.note_growth(count);

        let total = self.db.arena.get(node).children().len();
        if total > MAX_COLLECTION_ITEMS {
            return Err(Error::CollectionTooLarge {
                offset: chunk.offset,
                count: total,
            });
        }
        Ok(Some(node))
    }

    fn read_map(&mut self, current: Option<NodeId>, diff: bool) -> Result<Option<NodeId>> {
        let chunk = self.stream.expect_chunk(&[chunk::MAPC], "MAPC")?;
        let mut body = chunk.body;
        let key_type = self.read_type_name(&mut body)?;
        let value_type = self.read_type_name(&mut body)?;
        let count = body.read_u32()? as usize;
        if count * 2 > MAX_COLLECTION_ITEMS {
            return Err(Error::CollectionTooLarge {
                offset: chunk.offset,
                count,
            });
        }

        let arena = &mut self.db.arena;
        let node = match current {
            Some(id) if diff && appends_to(arena, id, NameId::MAP, key_type) => {
                arena.make_unique(id)?
            }
            other => {
                arena.release_opt(other);
                arena.alloc(CdbObject::new(
                    NameId::MAP,
                    ObjectData::Map {
                        key_type,
                        value_type,
                        items: Vec::with_capacity(count * 2),
                    },
                ))?
            }
        };

        for _ in 0..count {
            let key = self.read_item(&mut body, None, key_type, diff)?;
            let existing = if diff {
                find_map_slot(&self.db.arena, node, key)
            } else {
                None
            };

            match existing {
                Some(slot) => {
                    // Patch the value already stored under an equal key.
                    let old = self.db.arena.get_mut(node).children_mut()[slot + 1].take();
                    let value = self.read_item(&mut body, old, value_type, true)?;
                    self.db.arena.get_mut(node).children_mut()[slot + 1] = value;
                    self.db.arena.release_opt(key);
                }
                None => {
                    let value = self.read_item(&mut body, None, value_type, diff)?;
                    insert_map_item(&mut self.db.arena, node, key, value);
                }
            }
        }

        let total = self.db.arena.get(node).children().len();
        if total > MAX_COLLECTION_ITEMS {
            return Err(Error::CollectionTooLarge {
                offset: chunk.offset,
                count: total / 2,
            });
        }
        Ok(Some(node))
    }

    fn read_ref(
        &mut self,
        body: &mut ChunkReader<'a>,
        current: Option<NodeId>,
        diff: bool,
    ) -> Result<Option<NodeId>> {
        let raw = body.read_u32()?;
        let actual = self.resolve(raw).filter(|t| *t != NameId::NULL);

        let arena = &mut self.db.arena;
        let node = match current {
            Some(id) if arena.get(id).type_id == NameId::REF => arena.make_unique(id)?,
            other => {
                arena.release_opt(other);
                arena.alloc(CdbObject::new(NameId::REF, ObjectData::Ref(None)))?
            }
        };
        let old = arena.get_mut(node).children_mut()[0].take();

        let child = match actual {
            None => {
                arena.release_opt(old);
                None
            }
            Some(type_id) => {
                let base = if diff {
                    old
                } else {
                    arena.release_opt(old);
                    None
                };
                self.read_value(body, base, type_id, diff)?
            }
        };
        self.db.arena.get_mut(node).children_mut()[0] = child;
        Ok(Some(node))
    }

    fn read_user(&mut self, current: Option<NodeId>, declared: NameId) -> Result<Option<NodeId>> {
        let chunk = self
            .stream
            .expect_chunk(&[chunk::USER, chunk::USRD], "USER or USRD")?;
        let mut body = chunk.body;

        let found = body.read_u32()?;
        let found = self.resolve(found);
        if found != Some(declared) {
            return Err(Error::UserClassMismatch {
                offset: chunk.offset,
                expected: declared.0,
                found: found.map_or(u32::MAX, |n| n.0),
            });
        }
        let actual = self.read_type_name(&mut body)?;

        let diff = chunk.tag == chunk::USRD;
        let base = if diff {
            current
        } else {
            self.db.arena.release_opt(current);
            None
        };
        self.read_value(&mut body, base, actual, diff)
    }
}

/// Store a scalar, overwriting `current` in place when it has the same type.
fn store_value(arena: &mut Arena, current: Option<NodeId>, type_id: NameId, data: ObjectData) -> Result<NodeId> {
    if let Some(id) = current {
        if arena.get(id).type_id == type_id {
            let id = arena.make_unique(id)?;
            arena.get_mut(id).data = data;
            return Ok(id);
        }
        arena.release(id);
    }
    arena.alloc(CdbObject::new(type_id, data))
}

/// Reuse `current` if it is a struct of `class_id`, or allocate an empty one.
fn struct_base(arena: &mut Arena, current: Option<NodeId>, class_id: NameId, count: usize) -> Result<NodeId> {
    if let Some(id) = current {
        let node = arena.get(id);
        if node.type_id == class_id && matches!(&node.data, ObjectData::Struct(s) if s.len() == count) {
            return arena.make_unique(id);
        }
        arena.release(id);
    }
    arena.alloc(CdbObject::new(class_id, ObjectData::Struct(vec![None; count])))
}

/// Check if a diff should extend the collection at `id` rather than replace it:
/// it must be a non-empty collection of `kind` with a first item of `item_type`.
fn appends_to(arena: &Arena, id: NodeId, kind: NameId, item_type: NameId) -> bool {
    let node = arena.get(id);
    let items = match (&node.data, kind) {
        (ObjectData::List { items, .. }, NameId::LIST) | (ObjectData::Map { items, .. }, NameId::MAP) => items,
        _ => return false,
    };
    matches!(items.first(), Some(Some(first)) if arena.get(*first).type_id == item_type)
}

/// Slot of the key equal to `key` in the map at `map`.
fn find_map_slot(arena: &Arena, map: NodeId, key: Option<NodeId>) -> Option<usize> {
    arena
        .get(map)
        .children()
        .chunks_exact(2)
        .position(|pair| values_equal(arena, pair[0], key))
        .map(|pair| pair * 2)
}

/// Add a key/value pair to a map, replacing the value of an equal key.
///
/// Returns `true` if an existing entry was replaced. The duplicate key node
/// and the replaced value are released.
pub fn insert_map_item(arena: &mut Arena, map: NodeId, key: Option<NodeId>, value: Option<NodeId>) -> bool {
    if let Some(slot) = find_map_slot(arena, map, key) {
        let old = std::mem::replace(&mut arena.get_mut(map).children_mut()[slot + 1], value);
        arena.release_opt(old);
        arena.release_opt(key);
        return true;
    }
    if let ObjectData::Map { items, .. } = &mut arena.get_mut(map).data {
        items.push(key);
        items.push(value);
    }
    arena.note_growth(2);
    false
}

/// Structural equality of two values.
pub fn values_equal(arena: &Arena, a: Option<NodeId>, b: Option<NodeId>) -> bool {
    let (a, b) = match (a, b) {
        (None, None) => return true,
        (Some(a), Some(b)) => (a, b),
        _ => return false,
    };
    if a == b {
        return true;
    }
    let (na, nb) = (arena.get(a), arena.get(b));
    if na.type_id != nb.type_id {
        return false;
    }
    let same_shape = match (&na.data, &nb.data) {
        (ObjectData::Struct(_), ObjectData::Struct(_)) | (ObjectData::Ref(_), ObjectData::Ref(_)) => true,
        (ObjectData::List { element_type: x, .. }, ObjectData::List { element_type: y, .. }) => x == y,
        (
            ObjectData::Map {
                key_type: kx,
                value_type: vx,
                ..
            },
            ObjectData::Map {
                key_type: ky,
                value_type: vy,
                ..
            },
        ) => kx == ky && vx == vy,
        (x, y) => return x == y,
    };
    same_shape
        && na.children().len() == nb.children().len()
        && na
            .children()
            .iter()
            .zip(nb.children())
            .all(|(x, y)| values_equal(arena, *x, *y))
}

/// A `u16`-prefixed string with one trailing NUL stripped.
fn read_string<'a>(body: &mut ChunkReader<'a>) -> Result<&'a [u8]> {
    let len = body.read_u16()? as usize;
    let bytes = body.read_bytes(len)?;
    Ok(bytes.strip_suffix(&[0]).unwrap_or(bytes))
}

fn read_scalar(body: &mut ChunkReader<'_>, kind: ValueKind) -> Result<ObjectData> {
    Ok(match kind {
        ValueKind::Int8 => ObjectData::Int8(body.read_i8()?),
        ValueKind::UInt8 => ObjectData::UInt8(body.read_u8()?),
        ValueKind::Int16 => ObjectData::Int16(body.read_i16()?),
        ValueKind::UInt16 => ObjectData::UInt16(body.read_u16()?),
        ValueKind::Int32 => ObjectData::Int32(body.read_i32()?),
        ValueKind::UInt32 => ObjectData::UInt32(body.read_u32()?),
        ValueKind::Int64 => ObjectData::Int64(body.read_i64()?),
        ValueKind::UInt64 => ObjectData::UInt64(body.read_u64()?),
        ValueKind::Bool => ObjectData::Bool(body.read_bool()?),
        ValueKind::Float => ObjectData::Float(body.read_f32()?),
        ValueKind::Double => ObjectData::Double(body.read_f64()?),
        other => {
            return Err(Error::format(
                body.offset(),
                format!("{} is not a scalar kind", other),
            ))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MaterialDatabase;
    use crate::registry::CLASS_FLAG_USER;
    use crate::writer::{ChunkWriter, ObjectDecl};
    use matdb_common::ResourceId;

    const PATH: &str = "materials/test.mat";

    fn writer(classes: &[(&str, u16, &[(&str, &str)])]) -> ChunkWriter {
        let mut w = ChunkWriter::new();
        for (name, flags, fields) in classes {
            w.declare_class(name, *flags, fields);
        }
        w
    }

    fn single(w: &mut ChunkWriter, with_data: bool) {
        let decl = ObjectDecl::new(ResourceId::from_path(PATH), 1);
        w.object_info(&[if with_data { decl } else { decl.without_data() }]);
        w.component_info(&[(1, 0)]);
    }

    fn component(db: &MaterialDatabase, path: &str, class: &str) -> NodeId {
        let id = db.object_by_path(path).unwrap();
        let class = db.strings().find(class).unwrap();
        db.component_value(id, class, 0).unwrap()
    }

    fn child(db: &MaterialDatabase, node: NodeId, index: usize) -> Option<NodeId> {
        db.node(node).children()[index]
    }

    fn data(db: &MaterialDatabase, node: Option<NodeId>) -> &ObjectData {
        &db.node(node.unwrap()).data
    }

    const TAGS: (&str, u16, &[(&str, &str)]) = ("BSMaterial::Tags", 0, &[("Items", "List"), ("Table", "Map")]);

    fn tags_file(items: &[i32], table: &[(&str, f32)], diff: bool) -> Vec<u8> {
        let mut w = writer(&[TAGS]);
        single(&mut w, !diff);
        if diff {
            w.begin_diff("BSMaterial::Tags").field(0);
        } else {
            w.begin_object("BSMaterial::Tags");
        }
        w.begin_list("Int32", items.len() as u32);
        for &v in items {
            w.i32(v);
        }
        w.end_chunk();
        if diff {
            w.field(1);
        }
        w.begin_map("String", "Float", table.len() as u32);
        for &(k, v) in table {
            w.string(k).f32(v);
        }
        w.end_chunk();
        if diff {
            w.end_fields();
        }
        w.end_chunk();
        w.finish()
    }

    fn list_values(db: &MaterialDatabase, list: Option<NodeId>) -> Vec<i32> {
        db.node(list.unwrap())
            .children()
            .iter()
            .map(|item| match data(db, *item) {
                ObjectData::Int32(v) => *v,
                other => panic!("unexpected item {:?}", other),
            })
            .collect()
    }

    fn map_entries(db: &MaterialDatabase, map: Option<NodeId>) -> Vec<(String, f32)> {
        db.node(map.unwrap())
            .children()
            .chunks_exact(2)
            .map(|pair| {
                let key = match data(db, pair[0]) {
                    ObjectData::String(s) => String::from_utf8_lossy(db.string(*s)).into_owned(),
                    other => panic!("unexpected key {:?}", other),
                };
                let value = match data(db, pair[1]) {
                    ObjectData::Float(v) => *v,
                    other => panic!("unexpected value {:?}", other),
                };
                (key, value)
            })
            .collect()
    }

    #[test]
    fn test_full_object_decodes_collections() {
        let mut db = MaterialDatabase::new();
        db.load(&tags_file(&[1, 2], &[("a", 1.0)], false)).unwrap();

        let tags = component(&db, PATH, "BSMaterial::Tags");
        assert_eq!(list_values(&db, child(&db, tags, 0)), vec![1, 2]);
        assert_eq!(map_entries(&db, child(&db, tags, 1)), vec![("a".to_string(), 1.0)]);
    }

    #[test]
    fn test_diff_appends_to_list() {
        let mut db = MaterialDatabase::new();
        db.load(&tags_file(&[1, 2], &[], false)).unwrap();
        db.load(&tags_file(&[3], &[], true)).unwrap();

        let tags = component(&db, PATH, "BSMaterial::Tags");
        assert_eq!(list_values(&db, child(&db, tags, 0)), vec![1, 2, 3]);
    }

    #[test]
    fn test_diff_replaces_empty_list() {
        let mut db = MaterialDatabase::new();
        db.load(&tags_file(&[], &[], false)).unwrap();
        db.load(&tags_file(&[7], &[], true)).unwrap();

        let tags = component(&db, PATH, "BSMaterial::Tags");
        assert_eq!(list_values(&db, child(&db, tags, 0)), vec![7]);
    }

    #[test]
    fn test_duplicate_map_keys_keep_last_value() {
        let mut db = MaterialDatabase::new();
        db.load(&tags_file(&[], &[("k1", 1.0), ("k2", 2.0), ("k1", 3.0)], false))
            .unwrap();

        let tags = component(&db, PATH, "BSMaterial::Tags");
        assert_eq!(
            map_entries(&db, child(&db, tags, 1)),
            vec![("k1".to_string(), 3.0), ("k2".to_string(), 2.0)]
        );
    }

    #[test]
    fn test_diff_patches_map_by_key() {
        let mut db = MaterialDatabase::new();
        db.load(&tags_file(&[], &[("a", 1.0), ("b", 2.0)], false)).unwrap();
        db.load(&tags_file(&[], &[("b", 5.0), ("c", 6.0)], true)).unwrap();

        let tags = component(&db, PATH, "BSMaterial::Tags");
        assert_eq!(
            map_entries(&db, child(&db, tags, 1)),
            vec![
                ("a".to_string(), 1.0),
                ("b".to_string(), 5.0),
                ("c".to_string(), 6.0)
            ]
        );
    }

    #[test]
    fn test_collection_too_large() {
        let mut w = writer(&[TAGS]);
        single(&mut w, true);
        w.begin_object("BSMaterial::Tags");
        w.begin_list("Int32", 0x1_0000).end_chunk();
        w.end_chunk();

        let mut db = MaterialDatabase::new();
        assert!(matches!(
            db.load(&w.finish()),
            Err(Error::CollectionTooLarge { count: 0x1_0000, .. })
        ));
    }

    #[test]
    fn test_map_count_counts_both_slots() {
        let mut w = writer(&[TAGS]);
        single(&mut w, true);
        w.begin_object("BSMaterial::Tags");
        w.begin_list("Int32", 0).end_chunk();
        w.begin_map("String", "Float", 0x8000).end_chunk();
        w.end_chunk();

        let mut db = MaterialDatabase::new();
        assert!(matches!(
            db.load(&w.finish()),
            Err(Error::CollectionTooLarge { count: 0x8000, .. })
        ));
    }

    const COLOR: (&str, u16, &[(&str, &str)]) = ("BSMaterial::Color", 0, &[("R", "Float"), ("Name", "String")]);

    #[test]
    fn test_struct_diff_touches_only_named_fields() {
        let mut w = writer(&[COLOR]);
        single(&mut w, true);
        w.begin_object("BSMaterial::Color").f32(0.5).string("red").end_chunk();
        let mut db = MaterialDatabase::new();
        db.load(&w.finish()).unwrap();

        let mut w = writer(&[COLOR]);
        single(&mut w, false);
        w.begin_diff("BSMaterial::Color")
            .field(0)
            .f32(0.25)
            .end_fields()
            .end_chunk();
        db.load(&w.finish()).unwrap();

        let color = component(&db, PATH, "BSMaterial::Color");
        assert_eq!(data(&db, child(&db, color, 0)), &ObjectData::Float(0.25));
        match data(&db, child(&db, color, 1)) {
            ObjectData::String(s) => assert_eq!(db.string(*s), b"red"),
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_field_index_out_of_range() {
        let mut w = writer(&[COLOR]);
        single(&mut w, true);
        w.begin_diff("BSMaterial::Color").field(2).f32(1.0).end_fields().end_chunk();

        let mut db = MaterialDatabase::new();
        assert!(matches!(
            db.load(&w.finish()),
            Err(Error::FieldIndexOutOfRange { index: 2, count: 2, .. })
        ));
    }

    #[test]
    fn test_inherited_value_is_copied_before_patch() {
        let mut w = writer(&[COLOR]);
        w.object_info(&[
            ObjectDecl::new(ResourceId::from_path("materials/root.mat"), 1),
            ObjectDecl::new(ResourceId::from_path("materials/base.mat"), 2).with_base(1),
            ObjectDecl::new(ResourceId::from_path(PATH), 3).with_base(2),
        ]);
        w.component_info(&[(2, 0), (3, 0)]);
        w.begin_object("BSMaterial::Color").f32(1.0).string("base").end_chunk();
        w.begin_diff("BSMaterial::Color").field(0).f32(2.0).end_fields().end_chunk();

        let mut db = MaterialDatabase::new();
        db.load(&w.finish()).unwrap();

        let base = component(&db, "materials/base.mat", "BSMaterial::Color");
        let derived = component(&db, PATH, "BSMaterial::Color");
        assert_ne!(base, derived);
        assert_eq!(data(&db, child(&db, base, 0)), &ObjectData::Float(1.0));
        assert_eq!(data(&db, child(&db, derived, 0)), &ObjectData::Float(2.0));
        // The untouched field is still shared.
        assert_eq!(child(&db, base, 1), child(&db, derived, 1));
        assert!(db.arena().stats().cow_copies >= 2);
    }

    #[test]
    fn test_user_class_chunk() {
        let classes: &[(&str, u16, &[(&str, &str)])] = &[
            ("BSMaterial::Scalar", CLASS_FLAG_USER, &[("V", "Float")]),
            ("BSMaterial::Holder", 0, &[("Inner", "BSMaterial::Scalar")]),
        ];

        let mut w = writer(classes);
        single(&mut w, true);
        w.begin_object("BSMaterial::Holder");
        w.begin_user(false, "BSMaterial::Scalar", "BSMaterial::Scalar")
            .f32(4.0)
            .end_chunk();
        w.end_chunk();
        let mut db = MaterialDatabase::new();
        db.load(&w.finish()).unwrap();

        let holder = component(&db, PATH, "BSMaterial::Holder");
        let inner = child(&db, holder, 0).unwrap();
        assert_eq!(data(&db, child(&db, inner, 0)), &ObjectData::Float(4.0));

        let mut w = writer(classes);
        single(&mut w, true);
        w.begin_object("BSMaterial::Holder");
        w.begin_user(false, "BSMaterial::Holder", "BSMaterial::Scalar")
            .f32(4.0)
            .end_chunk();
        w.end_chunk();
        let mut db = MaterialDatabase::new();
        assert!(matches!(
            db.load(&w.finish()),
            Err(Error::UserClassMismatch { .. })
        ));
    }

    const SLOT: (&str, u16, &[(&str, &str)]) = ("BSMaterial::Slot", 0, &[("Target", "Ref")]);

    #[test]
    fn test_ref_holds_inline_class() {
        let mut w = writer(&[SLOT, COLOR]);
        single(&mut w, true);
        w.begin_object("BSMaterial::Slot")
            .str_ref("BSMaterial::Color")
            .f32(0.5)
            .string("x")
            .end_chunk();
        let mut db = MaterialDatabase::new();
        db.load(&w.finish()).unwrap();

        let mut w = writer(&[SLOT, COLOR]);
        single(&mut w, false);
        w.begin_diff("BSMaterial::Slot")
            .field(0)
            .str_ref("BSMaterial::Color")
            .field(0)
            .f32(0.75)
            .end_fields()
            .end_fields()
            .end_chunk();
        db.load(&w.finish()).unwrap();

        let slot = component(&db, PATH, "BSMaterial::Slot");
        let target = child(&db, slot, 0).unwrap();
        assert_eq!(db.node(target).type_id, NameId::REF);
        let color = child(&db, target, 0).unwrap();
        assert_eq!(data(&db, child(&db, color, 0)), &ObjectData::Float(0.75));
    }

    #[test]
    fn test_ref_diff_replaces_list_with_map() {
        let mut w = writer(&[SLOT]);
        single(&mut w, true);
        w.begin_object("BSMaterial::Slot").str_ref("List");
        w.begin_list("Int32", 1).i32(5).end_chunk();
        w.end_chunk();
        let mut db = MaterialDatabase::new();
        db.load(&w.finish()).unwrap();

        let mut w = writer(&[SLOT]);
        single(&mut w, false);
        w.begin_diff("BSMaterial::Slot").field(0).str_ref("Map");
        w.begin_map("Int32", "Float", 1).i32(7).f32(2.5).end_chunk();
        w.end_fields().end_chunk();
        db.load(&w.finish()).unwrap();

        let slot = component(&db, PATH, "BSMaterial::Slot");
        let payload = child(&db, child(&db, slot, 0).unwrap(), 0).unwrap();
        assert_eq!(db.node(payload).type_id, NameId::MAP);
        let items = db.node(payload).children();
        assert_eq!(items.len(), 2);
        assert_eq!(data(&db, items[0]), &ObjectData::Int32(7));
        assert_eq!(data(&db, items[1]), &ObjectData::Float(2.5));
    }

    #[test]
    fn test_diff_list_replaces_map() {
        let classes: &[(&str, u16, &[(&str, &str)])] = &[SLOT];
        let mut w = writer(classes);
        single(&mut w, true);
        w.begin_object("BSMaterial::Slot").str_ref("Map");
        w.begin_map("Int32", "Float", 1).i32(7).f32(2.5).end_chunk();
        w.end_chunk();
        let mut db = MaterialDatabase::new();
        db.load(&w.finish()).unwrap();

        let mut w = writer(classes);
        single(&mut w, false);
        w.begin_diff("BSMaterial::Slot").field(0).str_ref("List");
        w.begin_list("Int32", 1).i32(9).end_chunk();
        w.end_fields().end_chunk();
        db.load(&w.finish()).unwrap();

        let slot = component(&db, PATH, "BSMaterial::Slot");
        let payload = child(&db, slot, 0).and_then(|r| child(&db, r, 0));
        assert_eq!(db.node(payload.unwrap()).type_id, NameId::LIST);
        assert_eq!(list_values(&db, payload), vec![9]);
    }

    #[test]
    fn test_null_ref_is_empty() {
        let mut w = writer(&[SLOT]);
        single(&mut w, true);
        w.begin_object("BSMaterial::Slot").null_ref().end_chunk();
        let mut db = MaterialDatabase::new();
        db.load(&w.finish()).unwrap();

        let slot = component(&db, PATH, "BSMaterial::Slot");
        assert_eq!(data(&db, child(&db, slot, 0)), &ObjectData::Ref(None));
    }

    #[test]
    fn test_component_id_links() {
        let mut w = writer(&[("BSMaterial::LayerID", 0, &[("ID", "BSComponentDB2::ID")])]);
        w.object_info(&[
            ObjectDecl::new(ResourceId::from_path(PATH), 1),
            ObjectDecl::new(ResourceId::from_path("materials/test/layer.layer"), 2),
        ]);
        w.component_info(&[(1, 0), (2, 0)]);
        w.begin_object("BSMaterial::LayerID").u32(2).end_chunk();
        w.begin_object("BSMaterial::LayerID").u32(99).end_chunk();
        let mut db = MaterialDatabase::new();
        db.load(&w.finish()).unwrap();

        let layer = db.object_by_path("materials/test/layer.layer");
        let id = component(&db, PATH, "BSMaterial::LayerID");
        assert_eq!(data(&db, child(&db, id, 0)), &ObjectData::Link(layer));

        let dangling = component(&db, "materials/test/layer.layer", "BSMaterial::LayerID");
        assert_eq!(data(&db, child(&db, dangling, 0)), &ObjectData::Link(None));
    }

    #[test]
    fn test_values_equal_is_structural() {
        let mut arena = Arena::new();
        let a = arena.alloc(CdbObject::new(NameId::INT32, ObjectData::Int32(5))).unwrap();
        let b = arena.alloc(CdbObject::new(NameId::INT32, ObjectData::Int32(5))).unwrap();
        let c = arena.alloc(CdbObject::new(NameId::UINT32, ObjectData::UInt32(5))).unwrap();
        assert!(values_equal(&arena, Some(a), Some(b)));
        assert!(!values_equal(&arena, Some(a), Some(c)));
        assert!(!values_equal(&arena, Some(a), None));
        assert!(values_equal(&arena, None, None));

        let list = |arena: &mut Arena, item| {
            arena
                .alloc(CdbObject::new(
                    NameId::LIST,
                    ObjectData::List {
                        element_type: NameId::INT32,
                        items: vec![Some(item)],
                    },
                ))
                .unwrap()
        };
        let la = list(&mut arena, a);
        let lb = list(&mut arena, b);
        assert!(values_equal(&arena, Some(la), Some(lb)));
    }

    #[test]
    fn test_insert_map_item_replaces_equal_key() {
        let mut arena = Arena::new();
        let map = arena
            .alloc(CdbObject::new(
                NameId::MAP,
                ObjectData::Map {
                    key_type: NameId::INT32,
                    value_type: NameId::BOOL,
                    items: Vec::new(),
                },
            ))
            .unwrap();
        let mut node = |data: ObjectData| {
            let type_id = match data {
                ObjectData::Int32(_) => NameId::INT32,
                _ => NameId::BOOL,
            };
            Some(arena.alloc(CdbObject::new(type_id, data)).unwrap())
        };
        let (k1, v1, k2, v2) = (
            node(ObjectData::Int32(1)),
            node(ObjectData::Bool(false)),
            node(ObjectData::Int32(2)),
            node(ObjectData::Bool(true)),
        );
        let (k1_again, v3) = (node(ObjectData::Int32(1)), node(ObjectData::Bool(true)));

        assert!(!insert_map_item(&mut arena, map, k1, v1));
        assert!(!insert_map_item(&mut arena, map, k2, v2));
        assert!(insert_map_item(&mut arena, map, k1_again, v3));
        assert_eq!(arena.get(map).children(), &[k1, v3, k2, v2]);
    }
}
