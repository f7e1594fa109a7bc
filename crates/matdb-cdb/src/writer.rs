//! Chunk stream writer.
//!
//! Builds CDB buffers the way the reader consumes them: nested `LIST`,
//! `MAPC` and `USER` chunks are emitted after the chunk that opened them,
//! in the order they were opened.
//!
//! ```
//! use matdb_cdb::writer::{ChunkWriter, ObjectDecl};
//! use matdb_cdb::MaterialDatabase;
//! use matdb_common::ResourceId;
//!
//! let mut w = ChunkWriter::new();
//! w.declare_class("BSMaterial::Color", 0, &[("Value", "Float")]);
//! w.object_info(&[ObjectDecl::new(ResourceId::from_path("materials/a.mat"), 1)]);
//! w.component_info(&[(1, 0)]);
//! w.begin_object("BSMaterial::Color").f32(0.5).end_chunk();
//!
//! let mut db = MaterialDatabase::new();
//! db.load(&w.finish()).unwrap();
//! assert_eq!(db.object_count(), 1);
//! ```

use matdb_common::ResourceId;
use zerocopy::IntoBytes;

use crate::chunk::{BETH, CLAS, DIFF, LIST, MAPC, OBJT, STRT, TYPE, USER, USRD};
use crate::strings::FxHashMap;
use crate::structs::{ComponentInfoRecord, EdgeInfoRecord, ObjectInfoRecord, ObjectInfoRecordExt};

/// An `ObjectInfo` entry to write.
#[derive(Debug, Clone, Copy)]
pub struct ObjectDecl {
    pub persistent_id: ResourceId,
    pub db_id: u32,
    pub base_db_id: u32,
    /// When set on any entry, the table is written with 33-byte records.
    pub base_persistent_id: Option<ResourceId>,
    pub has_data: bool,
}

impl ObjectDecl {
    pub fn new(persistent_id: ResourceId, db_id: u32) -> Self {
        Self {
            persistent_id,
            db_id,
            base_db_id: 0,
            base_persistent_id: None,
            has_data: true,
        }
    }

    pub fn with_base(mut self, base_db_id: u32) -> Self {
        self.base_db_id = base_db_id;
        self
    }

    pub fn with_base_persistent(mut self, pid: ResourceId) -> Self {
        self.base_persistent_id = Some(pid);
        self
    }

    pub fn without_data(mut self) -> Self {
        self.has_data = false;
        self
    }
}

#[derive(Debug, Default)]
struct PendingChunk {
    tag: [u8; 4],
    body: Vec<u8>,
    children: Vec<PendingChunk>,
}

impl PendingChunk {
    fn new(tag: [u8; 4]) -> Self {
        Self {
            tag,
            ..Default::default()
        }
    }

    fn count(&self) -> usize {
        1 + self.children.iter().map(Self::count).sum::<usize>()
    }

    fn emit(&self, out: &mut Vec<u8>) {
        emit_chunk(out, self.tag, &self.body);
        for child in &self.children {
            child.emit(out);
        }
    }
}

fn emit_chunk(out: &mut Vec<u8>, tag: [u8; 4], body: &[u8]) {
    out.extend_from_slice(&tag);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
}

#[derive(Debug)]
pub struct ChunkWriter {
    version: u32,
    strings: Vec<u8>,
    string_offsets: FxHashMap<String, u32>,
    classes: Vec<PendingChunk>,
    /// Top-level chunks; bytes written outside any chunk trail the stream.
    root: PendingChunk,
    open: Vec<PendingChunk>,
}

impl ChunkWriter {
    pub fn new() -> Self {
        Self::with_version(crate::chunk::MAX_VERSION)
    }

    pub fn with_version(version: u32) -> Self {
        Self {
            version,
            strings: Vec::new(),
            string_offsets: FxHashMap::default(),
            classes: Vec::new(),
            root: PendingChunk::default(),
            open: Vec::new(),
        }
    }

    /// Offset of `s` in the string table, appending it if new.
    pub fn string_ref(&mut self, s: &str) -> u32 {
        if let Some(&offset) = self.string_offsets.get(s) {
            return offset;
        }
        let offset = self.strings.len() as u32;
        self.strings.extend_from_slice(s.as_bytes());
        self.strings.push(0);
        self.string_offsets.insert(s.to_string(), offset);
        offset
    }

    /// Queue a `CLAS` declaration for the `TYPE` block.
    pub fn declare_class(&mut self, name: &str, flags: u16, fields: &[(&str, &str)]) -> &mut Self {
        let mut chunk = PendingChunk::new(CLAS);
        let name = self.string_ref(name);
        chunk.body.extend_from_slice(&name.to_le_bytes());
        chunk.body.extend_from_slice(&0u32.to_le_bytes());
        chunk.body.extend_from_slice(&flags.to_le_bytes());
        chunk.body.extend_from_slice(&(fields.len() as u16).to_le_bytes());
        for (field, type_name) in fields {
            let field = self.string_ref(field);
            let type_name = self.string_ref(type_name);
            chunk.body.extend_from_slice(&field.to_le_bytes());
            chunk.body.extend_from_slice(&type_name.to_le_bytes());
            chunk.body.extend_from_slice(&[0; 4]);
        }
        self.classes.push(chunk);
        self
    }

    fn index_list(&mut self, element: &str, count: usize, records: &[u8]) -> &mut Self {
        self.begin_chunk(LIST);
        self.str_ref(element).u32(count as u32).raw(records);
        self.end_chunk()
    }

    pub fn object_info(&mut self, objects: &[ObjectDecl]) -> &mut Self {
        let extended = objects.iter().any(|o| o.base_persistent_id.is_some());
        let mut records = Vec::new();
        for o in objects {
            let record = ObjectInfoRecordExt {
                persistent_id: o.persistent_id,
                db_id: o.db_id,
                base_db_id: o.base_db_id,
                parent_persistent_id: o.base_persistent_id.unwrap_or(ResourceId::NULL),
                has_data: o.has_data as u8,
            };
            if extended {
                records.extend_from_slice(record.as_bytes());
            } else {
                records.extend_from_slice(ObjectInfoRecord::from(record).as_bytes());
            }
        }
        self.index_list("BSComponentDB2::DBFileIndex::ObjectInfo", objects.len(), &records)
    }

    /// Write the `ComponentInfo` table as `(dbID, index)` pairs.
    pub fn component_info(&mut self, components: &[(u32, u16)]) -> &mut Self {
        let mut records = Vec::new();
        for &(db_id, index) in components {
            let record = ComponentInfoRecord {
                db_id,
                index,
                type_index: 0,
            };
            records.extend_from_slice(record.as_bytes());
        }
        self.index_list("BSComponentDB2::DBFileIndex::ComponentInfo", components.len(), &records)
    }

    /// Write the `EdgeInfo` table as `(source, target)` pairs.
    pub fn edge_info(&mut self, edges: &[(u32, u32)]) -> &mut Self {
        let mut records = Vec::new();
        for &(source_db_id, target_db_id) in edges {
            let record = EdgeInfoRecord {
                source_db_id,
                target_db_id,
            };
            records.extend_from_slice(record.as_bytes());
        }
        self.index_list("BSComponentDB2::DBFileIndex::EdgeInfo", edges.len(), &records)
    }

    pub fn begin_chunk(&mut self, tag: [u8; 4]) -> &mut Self {
        self.open.push(PendingChunk::new(tag));
        self
    }

    pub fn end_chunk(&mut self) -> &mut Self {
        if let Some(chunk) = self.open.pop() {
            self.current().children.push(chunk);
        }
        self
    }

    /// Open an `OBJT` chunk: the next component, fully encoded.
    pub fn begin_object(&mut self, class: &str) -> &mut Self {
        self.begin_chunk(OBJT).str_ref(class)
    }

    /// Open a `DIFF` chunk: a patch of the next component.
    pub fn begin_diff(&mut self, class: &str) -> &mut Self {
        self.begin_chunk(DIFF).str_ref(class)
    }

    pub fn begin_list(&mut self, element: &str, count: u32) -> &mut Self {
        self.begin_chunk(LIST).str_ref(element).u32(count)
    }

    pub fn begin_map(&mut self, key: &str, value: &str, count: u32) -> &mut Self {
        self.begin_chunk(MAPC).str_ref(key).str_ref(value).u32(count)
    }

    pub fn begin_user(&mut self, diff: bool, declared: &str, actual: &str) -> &mut Self {
        self.begin_chunk(if diff { USRD } else { USER })
            .str_ref(declared)
            .str_ref(actual)
    }

    /// Field index of the next value in a struct diff.
    pub fn field(&mut self, index: u16) -> &mut Self {
        self.u16(index)
    }

    /// Terminate a struct diff.
    pub fn end_fields(&mut self) -> &mut Self {
        self.u16(0xFFFF)
    }

    pub fn str_ref(&mut self, s: &str) -> &mut Self {
        let offset = self.string_ref(s);
        self.u32(offset)
    }

    /// Placeholder string reference that resolves to nothing.
    pub fn null_ref(&mut self) -> &mut Self {
        self.u32(u32::MAX)
    }

    /// A `u16`-prefixed string value with its trailing NUL.
    pub fn string(&mut self, s: &str) -> &mut Self {
        self.u16(s.len() as u16 + 1).raw(s.as_bytes()).u8(0)
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.current().body.extend_from_slice(bytes);
        self
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.raw(&[v])
    }

    pub fn i8(&mut self, v: i8) -> &mut Self {
        self.raw(&v.to_le_bytes())
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.u8(v as u8)
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.raw(&v.to_le_bytes())
    }

    pub fn i16(&mut self, v: i16) -> &mut Self {
        self.raw(&v.to_le_bytes())
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.raw(&v.to_le_bytes())
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.raw(&v.to_le_bytes())
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.raw(&v.to_le_bytes())
    }

    pub fn i64(&mut self, v: i64) -> &mut Self {
        self.raw(&v.to_le_bytes())
    }

    pub fn f32(&mut self, v: f32) -> &mut Self {
        self.raw(&v.to_le_bytes())
    }

    pub fn f64(&mut self, v: f64) -> &mut Self {
        self.raw(&v.to_le_bytes())
    }

    fn current(&mut self) -> &mut PendingChunk {
        self.open.last_mut().unwrap_or(&mut self.root)
    }

    /// Close any open chunks and assemble the buffer.
    pub fn finish(mut self) -> Vec<u8> {
        while !self.open.is_empty() {
            self.end_chunk();
        }

        let body_chunks: usize = self.root.children.iter().map(PendingChunk::count).sum();
        let type_chunks = if self.classes.is_empty() { 0 } else { 1 + self.classes.len() };
        let chunk_count = 1 + type_chunks + body_chunks;

        let mut out = Vec::new();
        let mut header = Vec::with_capacity(8);
        header.extend_from_slice(&self.version.to_le_bytes());
        header.extend_from_slice(&(chunk_count as u32).to_le_bytes());
        emit_chunk(&mut out, BETH, &header);
        emit_chunk(&mut out, STRT, &self.strings);

        if !self.classes.is_empty() {
            emit_chunk(&mut out, TYPE, &(self.classes.len() as u32).to_le_bytes());
            for class in &self.classes {
                class.emit(&mut out);
            }
        }
        for chunk in &self.root.children {
            chunk.emit(&mut out);
        }
        out.extend_from_slice(&self.root.body);
        out.extend_from_slice(&[0; 4]);
        out
    }
}

impl Default for ChunkWriter {
    fn default() -> Self {
        Self::new()
    }
}
