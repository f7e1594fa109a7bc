//! Top-level chunk dispatch: header, strings, classes, index tables and
//! component chunks. Value decoding lives in [`crate::diff`].

use matdb_common::{ChunkReader, ResourceId};
use tracing::{debug, trace, warn};

use crate::chunk::{self, Chunk, ChunkStream};
use crate::database::MaterialDatabase;
use crate::error::{Error, Result};
use crate::graph::{ComponentKey, EdgeResult, ObjectId, MAX_DB_ID};
use crate::registry::{ClassDef, FieldDef};
use crate::strings::FileStrings;
use crate::structs::{
    ClassHeader, ComponentInfoRecord, EdgeInfoRecord, FieldRecord, FileHeader, ObjectInfoRecord,
    ObjectInfoRecordExt,
};
use crate::types::NameId;

const OBJECT_INFO_SIZE: usize = std::mem::size_of::<ObjectInfoRecord>();
const OBJECT_INFO_EXT_SIZE: usize = std::mem::size_of::<ObjectInfoRecordExt>();

/// Counters for one parsed buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub version: u32,
    pub classes: usize,
    pub objects: usize,
    pub components: usize,
    pub edges: usize,
}

/// Normalised `ObjectInfo` record.
#[derive(Debug, Clone, Copy)]
struct ObjectEntry {
    offset: usize,
    persistent_id: ResourceId,
    db_id: u32,
    base_db_id: u32,
    base_persistent_id: ResourceId,
    has_data: bool,
}

pub(crate) struct ChunkParser<'a, 'db> {
    pub(crate) stream: ChunkStream<'a>,
    pub(crate) db: &'db mut MaterialDatabase,
    pub(crate) strings: FileStrings,
    components: Vec<ComponentInfoRecord>,
    next_component: usize,
    summary: LoadSummary,
}

impl<'a, 'db> ChunkParser<'a, 'db> {
    pub fn new(data: &'a [u8], db: &'db mut MaterialDatabase) -> Self {
        db.store.reset_db_table(0);
        Self {
            stream: ChunkStream::new(data),
            db,
            strings: FileStrings::default(),
            components: Vec::new(),
            next_component: 0,
            summary: LoadSummary::default(),
        }
    }

    pub fn parse(mut self) -> Result<LoadSummary> {
        let mut first = true;
        while let Some(chunk) = self.stream.next_chunk()? {
            let leading = std::mem::replace(&mut first, false);
            match chunk.tag {
                chunk::BETH if leading => self.read_header(chunk)?,
                chunk::STRT => {
                    self.strings = FileStrings::parse(chunk.body.rest(), &mut self.db.strings);
                }
                chunk::TYPE => self.read_types(chunk)?,
                chunk::LIST => self.read_index_list(chunk)?,
                chunk::OBJT => self.read_component(chunk, false)?,
                chunk::DIFF => self.read_component(chunk, true)?,
                chunk::BETH | chunk::CLAS | chunk::MAPC | chunk::USER | chunk::USRD => {
                    return Err(Error::UnexpectedChunk {
                        offset: chunk.offset,
                        expected: "top-level chunk",
                        found: chunk.tag_name(),
                    });
                }
                _ => {
                    warn!("skipping unknown chunk '{}' at offset {}", chunk.tag_name(), chunk.offset);
                }
            }
        }

        if self.next_component < self.components.len() {
            debug!(
                "{} ComponentInfo entries had no component chunk",
                self.components.len() - self.next_component
            );
        }
        Ok(self.summary)
    }

    /// Resolve a string reference of the current file.
    #[inline]
    pub(crate) fn resolve(&self, offset: u32) -> Option<NameId> {
        self.strings.find_string(offset)
    }

    /// Read a string reference that must name a kind or class.
    pub(crate) fn read_type_name(&self, body: &mut ChunkReader<'a>) -> Result<NameId> {
        let offset = body.offset();
        let raw = body.read_u32()?;
        self.resolve(raw).ok_or(Error::UnknownType {
            offset,
            type_id: raw,
        })
    }

    fn read_header(&mut self, chunk: Chunk<'a>) -> Result<()> {
        let mut body = chunk.body;
        let header: FileHeader = body.read_struct()?;
        let version = header.version;
        if version > chunk::MAX_VERSION {
            return Err(Error::UnsupportedVersion {
                offset: chunk.offset,
                version,
            });
        }
        trace!("CDB version {}, {} chunks", version, { header.chunk_count });
        self.summary.version = version;
        Ok(())
    }

    fn read_types(&mut self, chunk: Chunk<'a>) -> Result<()> {
        let mut body = chunk.body;
        let count = body.read_u32()?;
        for _ in 0..count {
            let class = self.stream.expect_chunk(&[chunk::CLAS], "CLAS")?;
            self.read_class(class)?;
        }
        Ok(())
    }

    fn read_class(&mut self, chunk: Chunk<'a>) -> Result<()> {
        let mut body = chunk.body;
        let header: ClassHeader = body.read_struct()?;

        let Some(class_id) = self.resolve(header.name) else {
            debug!("skipping class with unresolved name at offset {}", chunk.offset);
            return Ok(());
        };
        if class_id.0 < NameId::FIRST_CLASS_ID {
            return Err(Error::InvalidClassId {
                offset: chunk.offset,
                class_id: class_id.0,
            });
        }

        let field_count = header.field_count as usize;
        let mut fields = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            let offset = body.offset();
            let record: FieldRecord = body.read_struct()?;
            let name = self
                .resolve(record.name)
                .ok_or_else(|| Error::format(offset, "unresolved field name"))?;
            let type_id = self.resolve(record.type_name).ok_or(Error::UnknownType {
                offset,
                type_id: record.type_name,
            })?;
            fields.push(FieldDef { name, type_id });
        }

        if let Some(existing) = self.db.classes.get(class_id) {
            if existing.field_count() != field_count {
                return Err(Error::FieldCountMismatch {
                    offset: chunk.offset,
                    class: self.db.strings.name(class_id).unwrap_or_default().to_string(),
                    expected: existing.field_count(),
                    found: field_count,
                });
            }
            return Ok(());
        }

        self.db.classes.insert(ClassDef {
            class_id,
            version: header.version,
            flags: header.flags,
            fields: fields.into(),
        })?;
        self.summary.classes += 1;
        Ok(())
    }

    fn read_index_list(&mut self, chunk: Chunk<'a>) -> Result<()> {
        let mut body = chunk.body;
        let element = body.read_u32()?;
        let count = body.read_u32()? as usize;

        let Some(element) = self.resolve(element) else {
            debug!("skipping index list with unresolved element type at offset {}", chunk.offset);
            return Ok(());
        };
        if count == 0 {
            return Ok(());
        }
        let record_size = body.remaining() / count;

        match element {
            NameId::OBJECT_INFO => self.read_object_infos(&mut body, count, record_size),
            NameId::COMPONENT_INFO => self.read_component_infos(&mut body, count, record_size),
            NameId::EDGE_INFO => self.read_edges(&mut body, count, record_size),
            other => {
                debug!(
                    "skipping index list of {} at offset {}",
                    self.db.strings.name(other).unwrap_or("?"),
                    chunk.offset
                );
                Ok(())
            }
        }
    }

    fn read_object_infos(
        &mut self,
        body: &mut ChunkReader<'a>,
        count: usize,
        record_size: usize,
    ) -> Result<()> {
        if record_size != OBJECT_INFO_SIZE && record_size != OBJECT_INFO_EXT_SIZE {
            return Err(Error::format(
                body.offset(),
                format!("ObjectInfo record of {} bytes", record_size),
            ));
        }

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let mut record = body.sub_reader(record_size)?;
            let offset = record.offset();
            let entry = if record_size == OBJECT_INFO_EXT_SIZE {
                let r: ObjectInfoRecordExt = record.read_struct()?;
                ObjectEntry {
                    offset,
                    persistent_id: r.persistent_id,
                    db_id: r.db_id,
                    base_db_id: r.base_db_id,
                    base_persistent_id: r.parent_persistent_id,
                    has_data: r.has_data != 0,
                }
            } else {
                let r: ObjectInfoRecord = record.read_struct()?;
                ObjectEntry {
                    offset,
                    persistent_id: r.persistent_id,
                    db_id: r.db_id,
                    base_db_id: r.base_db_id,
                    base_persistent_id: ResourceId::NULL,
                    has_data: r.has_data != 0,
                }
            };
            if entry.db_id == 0 || entry.db_id > MAX_DB_ID {
                return Err(Error::DbIdOutOfRange {
                    offset,
                    db_id: entry.db_id,
                });
            }
            entries.push(entry);
        }

        let max_db_id = entries.iter().map(|e| e.db_id).max().unwrap_or(0) as usize;
        let store = &mut self.db.store;
        let mut seen = vec![false; max_db_id + 1];
        let mut pending: Vec<(ObjectId, ObjectEntry)> = Vec::with_capacity(count);

        for entry in entries {
            let slot = entry.db_id as usize;
            if seen[slot] || store.find_by_db_id(entry.db_id).is_some() {
                return Err(Error::DuplicateDbId {
                    offset: entry.offset,
                    db_id: entry.db_id,
                });
            }
            seen[slot] = true;

            match store.find_by_persistent_id(&entry.persistent_id) {
                Some(existing) if entry.has_data && store.object(existing).has_data => {
                    debug!(
                        "ignoring second declaration of {} (db id {})",
                        entry.persistent_id, entry.db_id
                    );
                }
                Some(existing) => {
                    store.bind_db_id(entry.db_id, existing);
                    if entry.has_data {
                        let object = store.object_mut(existing);
                        object.has_data = true;
                        object.db_id = entry.db_id;
                        pending.push((existing, entry));
                    }
                }
                None => {
                    let id = store.create(entry.persistent_id)?;
                    store.bind_db_id(entry.db_id, id);
                    let object = store.object_mut(id);
                    object.db_id = entry.db_id;
                    object.has_data = entry.has_data;
                    pending.push((id, entry));
                    self.summary.objects += 1;
                }
            }
        }

        // Bases may point forward in the table, so they resolve after every
        // object exists.
        for (id, entry) in pending {
            let base = if entry.base_db_id != 0 {
                let base = store.find_by_db_id(entry.base_db_id);
                if base.is_none() {
                    warn!(
                        "object {} names undeclared base {}",
                        entry.db_id, entry.base_db_id
                    );
                }
                base
            } else if !entry.base_persistent_id.is_null() {
                store.find_by_persistent_id(&entry.base_persistent_id)
            } else {
                None
            };
            store.object_mut(id).base_object = base.filter(|b| *b != id);
        }
        Ok(())
    }

    fn read_component_infos(
        &mut self,
        body: &mut ChunkReader<'a>,
        count: usize,
        record_size: usize,
    ) -> Result<()> {
        if record_size < std::mem::size_of::<ComponentInfoRecord>() {
            return Err(Error::format(
                body.offset(),
                format!("ComponentInfo record of {} bytes", record_size),
            ));
        }
        self.components.reserve(count);
        for _ in 0..count {
            let mut record = body.sub_reader(record_size)?;
            self.components.push(record.read_struct()?);
        }
        Ok(())
    }

    fn read_edges(&mut self, body: &mut ChunkReader<'a>, count: usize, record_size: usize) -> Result<()> {
        if record_size < std::mem::size_of::<EdgeInfoRecord>() {
            return Err(Error::format(
                body.offset(),
                format!("EdgeInfo record of {} bytes", record_size),
            ));
        }
        let store = &mut self.db.store;
        for _ in 0..count {
            let mut record = body.sub_reader(record_size)?;
            let offset = record.offset();
            let edge: EdgeInfoRecord = record.read_struct()?;
            let (source_db_id, target_db_id) = (edge.source_db_id, edge.target_db_id);

            let (Some(source), Some(target)) = (
                store.find_by_db_id(source_db_id),
                store.find_by_db_id(target_db_id),
            ) else {
                warn!(
                    "edge {} -> {} references an undeclared object",
                    source_db_id, target_db_id
                );
                continue;
            };

            match store.add_edge(source, target) {
                EdgeResult::Linked => self.summary.edges += 1,
                EdgeResult::AlreadyLinked => {}
                EdgeResult::Conflict => {
                    return Err(Error::MultipleParents {
                        offset,
                        db_id: source_db_id,
                    });
                }
            }
        }
        Ok(())
    }

    fn read_component(&mut self, chunk: Chunk<'a>, diff: bool) -> Result<()> {
        let mut body = chunk.body;
        let class_id = self.read_type_name(&mut body)?;

        let Some(entry) = self.components.get(self.next_component).copied() else {
            return Err(Error::ComponentTableExhausted {
                offset: chunk.offset,
            });
        };
        self.next_component += 1;
        let (db_id, index) = (entry.db_id, entry.index);

        let Some(object) = self.db.store.find_by_db_id(db_id) else {
            warn!("component chunk at offset {} for undeclared object {}", chunk.offset, db_id);
            // Decode anyway so nested chunks are consumed.
            let value = self.read_value(&mut body, None, class_id, diff)?;
            self.db.arena.release_opt(value);
            return Ok(());
        };

        let db = &mut *self.db;
        db.store.flatten_base(object, &mut db.arena, &db.classes)?;

        let key = ComponentKey::new(class_id, index);
        let slot = db.store.find_component(object, key, class_id);
        let current = db.store.object_mut(object).components[slot].value.take();
        let base = if diff {
            current
        } else {
            db.arena.release_opt(current);
            None
        };

        let value = self.read_value(&mut body, base, class_id, diff)?;
        self.db.store.object_mut(object).components[slot].value = value;
        self.summary.components += 1;

        if !body.is_empty() {
            trace!(
                "{} trailing bytes in component chunk at offset {}",
                body.remaining(),
                chunk.offset
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{ChunkWriter, ObjectDecl};

    fn pid(path: &str) -> ResourceId {
        ResourceId::from_path(path)
    }

    fn color_writer() -> ChunkWriter {
        let mut w = ChunkWriter::new();
        w.declare_class("BSMaterial::Color", 0, &[("Value", "Float")]);
        w
    }

    #[test]
    fn test_header_is_optional_but_leading() {
        let mut data = Vec::new();
        data.extend_from_slice(b"STRT\0\0\0\0");
        let mut db = MaterialDatabase::new();
        assert_eq!(db.load(&data).unwrap().version, 0);

        data.extend_from_slice(b"BETH\x08\0\0\0");
        data.extend_from_slice(&[4, 0, 0, 0, 1, 0, 0, 0]);
        assert!(matches!(db.load(&data), Err(Error::UnexpectedChunk { .. })));
    }

    #[test]
    fn test_object_info_record_size() {
        let mut w = ChunkWriter::new();
        w.begin_chunk(chunk::LIST)
            .str_ref("BSComponentDB2::DBFileIndex::ObjectInfo")
            .u32(1)
            .raw(&[0; 25])
            .end_chunk();
        let mut db = MaterialDatabase::new();
        assert!(matches!(db.load(&w.finish()), Err(Error::Format { .. })));
    }

    #[test]
    fn test_rejects_future_version() {
        let w = ChunkWriter::with_version(5);
        let mut db = MaterialDatabase::new();
        assert!(matches!(
            db.load(&w.finish()),
            Err(Error::UnsupportedVersion { version: 5, .. })
        ));
    }

    #[test]
    fn test_class_declarations() {
        let mut w = color_writer();
        w.declare_class("BSMaterial::Pair", 0, &[("A", "BSMaterial::Color"), ("B", "String")]);
        let mut db = MaterialDatabase::new();
        let summary = db.load(&w.finish()).unwrap();

        assert_eq!(summary.classes, 2);
        let pair = db.strings().find("BSMaterial::Pair").unwrap();
        let class = db.classes().get(pair).unwrap();
        assert_eq!(class.field_count(), 2);
        assert_eq!(class.fields[0].type_id, db.strings().find("BSMaterial::Color").unwrap());
        assert_eq!(class.fields[1].type_id, NameId::STRING);
    }

    #[test]
    fn test_redeclared_class_must_match() {
        let mut db = MaterialDatabase::new();
        db.load(&color_writer().finish()).unwrap();
        db.load(&color_writer().finish()).unwrap();

        let mut w = ChunkWriter::new();
        w.declare_class("BSMaterial::Color", 0, &[("Value", "Float"), ("Extra", "Float")]);
        assert!(matches!(
            db.load(&w.finish()),
            Err(Error::FieldCountMismatch {
                expected: 1,
                found: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_builtin_class_id_rejected() {
        let mut w = ChunkWriter::new();
        w.declare_class("Float", 0, &[]);
        let mut db = MaterialDatabase::new();
        assert!(matches!(
            db.load(&w.finish()),
            Err(Error::InvalidClassId { class_id: 14, .. })
        ));
    }

    #[test]
    fn test_db_id_range() {
        for db_id in [0, 0x0100_0000] {
            let mut w = ChunkWriter::new();
            w.object_info(&[ObjectDecl::new(pid("materials/a.mat"), db_id)]);
            let mut db = MaterialDatabase::new();
            assert!(matches!(
                db.load(&w.finish()),
                Err(Error::DbIdOutOfRange { .. })
            ));
        }
    }

    #[test]
    fn test_duplicate_db_id() {
        let mut w = ChunkWriter::new();
        w.object_info(&[
            ObjectDecl::new(pid("materials/a.mat"), 3),
            ObjectDecl::new(pid("materials/b.mat"), 3),
        ]);
        let mut db = MaterialDatabase::new();
        assert!(matches!(
            db.load(&w.finish()),
            Err(Error::DuplicateDbId { db_id: 3, .. })
        ));
    }

    #[test]
    fn test_duplicate_persistent_id_keeps_first_with_data() {
        let a = pid("materials/a.mat");
        let mut w = color_writer();
        w.object_info(&[
            ObjectDecl::new(a, 1),
            ObjectDecl::new(a, 2).without_data(),
        ]);
        let mut db = MaterialDatabase::new();
        db.load(&w.finish()).unwrap();

        assert_eq!(db.object_count(), 1);
        let id = db.find_by_persistent_id(&a).unwrap();
        assert_eq!(db.object(id).db_id, 1);
        assert!(db.object(id).has_data);
    }

    #[test]
    fn test_second_record_with_data_is_ignored() {
        let a = pid("materials/a.mat");
        let mut w = color_writer();
        w.object_info(&[ObjectDecl::new(a, 1), ObjectDecl::new(a, 2)]);
        w.component_info(&[(1, 0), (2, 0)]);
        w.begin_object("BSMaterial::Color").f32(1.0).end_chunk();
        w.begin_object("BSMaterial::Color").f32(2.0).end_chunk();

        let mut db = MaterialDatabase::new();
        db.load(&w.finish()).unwrap();

        let id = db.find_by_persistent_id(&a).unwrap();
        assert_eq!(db.object(id).db_id, 1);
        assert_eq!(db.object(id).components.len(), 1);
        let color = db.strings().find("BSMaterial::Color").unwrap();
        let value = db.component_value(id, color, 0).unwrap();
        let field = db.node(value).children()[0].unwrap();
        assert_eq!(db.node(field).data, crate::ObjectData::Float(1.0));
    }

    #[test]
    fn test_reuse_across_files() {
        let a = pid("materials/a.mat");
        let mut db = MaterialDatabase::new();

        let mut w = ChunkWriter::new();
        w.object_info(&[ObjectDecl::new(a, 1).without_data()]);
        db.load(&w.finish()).unwrap();
        let first = db.find_by_persistent_id(&a).unwrap();
        assert!(!db.object(first).has_data);

        let mut w = ChunkWriter::new();
        w.object_info(&[ObjectDecl::new(a, 7)]);
        db.load(&w.finish()).unwrap();
        assert_eq!(db.find_by_persistent_id(&a), Some(first));
        assert_eq!(db.object_count(), 1);
        assert!(db.object(first).has_data);
        assert_eq!(db.object(first).db_id, 7);
    }

    #[test]
    fn test_base_resolution() {
        let root = pid("materials/root.mat");
        let child = pid("materials/child.mat");
        let remote = pid("materials/remote.mat");

        let mut db = MaterialDatabase::new();
        let mut w = ChunkWriter::new();
        w.object_info(&[ObjectDecl::new(remote, 1)]);
        db.load(&w.finish()).unwrap();

        let mut w = ChunkWriter::new();
        w.object_info(&[
            // Forward reference to a later record.
            ObjectDecl::new(child, 1).with_base(2),
            ObjectDecl::new(root, 2).with_base_persistent(remote),
        ]);
        db.load(&w.finish()).unwrap();

        let child = db.find_by_persistent_id(&child).unwrap();
        let root = db.find_by_persistent_id(&root).unwrap();
        let remote = db.find_by_persistent_id(&remote).unwrap();
        assert_eq!(db.object(root).base_object, Some(remote));
        // The post-load pass collapses child -> root -> remote.
        assert_eq!(db.object(child).base_object, Some(remote));
    }

    #[test]
    fn test_edges() {
        let mut w = ChunkWriter::new();
        w.object_info(&[
            ObjectDecl::new(pid("materials/m.mat"), 1),
            ObjectDecl::new(pid("materials/m/layer.layer"), 2),
        ]);
        w.edge_info(&[(2, 1), (2, 1), (5, 1)]);
        let mut db = MaterialDatabase::new();
        let summary = db.load(&w.finish()).unwrap();

        assert_eq!(summary.edges, 1);
        let m = db.object_by_path("materials/m.mat").unwrap();
        let layer = db.object_by_path("materials/m/layer.layer").unwrap();
        assert_eq!(db.object(layer).parent, Some(m));
        assert_eq!(db.object(m).children, Some(layer));
    }

    #[test]
    fn test_second_parent_is_fatal() {
        let mut w = ChunkWriter::new();
        w.object_info(&[
            ObjectDecl::new(pid("materials/a.mat"), 1),
            ObjectDecl::new(pid("materials/b.mat"), 2),
            ObjectDecl::new(pid("materials/c.mat"), 3),
        ]);
        w.edge_info(&[(3, 1), (3, 2)]);
        let mut db = MaterialDatabase::new();
        assert!(matches!(
            db.load(&w.finish()),
            Err(Error::MultipleParents { db_id: 3, .. })
        ));

        let a = db.object_by_path("materials/a.mat").unwrap();
        let c = db.object_by_path("materials/c.mat").unwrap();
        assert_eq!(db.object(c).parent, Some(a));
    }

    #[test]
    fn test_component_table_exhausted() {
        let mut w = color_writer();
        w.object_info(&[ObjectDecl::new(pid("materials/a.mat"), 1)]);
        w.component_info(&[(1, 0)]);
        w.begin_object("BSMaterial::Color").f32(1.0).end_chunk();
        w.begin_object("BSMaterial::Color").f32(2.0).end_chunk();
        let mut db = MaterialDatabase::new();
        assert!(matches!(
            db.load(&w.finish()),
            Err(Error::ComponentTableExhausted { .. })
        ));
    }

    #[test]
    fn test_component_for_undeclared_object_is_skipped() {
        let mut w = color_writer();
        w.declare_class("BSMaterial::Names", 0, &[("Items", "List")]);
        w.object_info(&[ObjectDecl::new(pid("materials/a.mat"), 1)]);
        w.component_info(&[(9, 0), (1, 0)]);
        w.begin_object("BSMaterial::Names");
        w.begin_list("String", 1).string("x").end_chunk();
        w.end_chunk();
        w.begin_object("BSMaterial::Color").f32(1.0).end_chunk();

        let mut db = MaterialDatabase::new();
        let summary = db.load(&w.finish()).unwrap();
        assert_eq!(summary.components, 1);
        let a = db.object_by_path("materials/a.mat").unwrap();
        assert_eq!(db.object(a).components.len(), 1);
    }

    #[test]
    fn test_misplaced_chunk() {
        let mut w = ChunkWriter::new();
        w.begin_map("String", "Float", 0).end_chunk();
        let mut db = MaterialDatabase::new();
        assert!(matches!(
            db.load(&w.finish()),
            Err(Error::UnexpectedChunk { .. })
        ));
    }
}
