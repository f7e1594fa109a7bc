//! The material database: owner of every table, entry point for loading.
//!
//! A [`MaterialDatabase`] accumulates any number of CDB buffers. Names,
//! classes, objects and interned strings persist across loads, while
//! `dbID`s are scoped to the buffer that declared them.

use std::path::Path;

use matdb_common::ResourceId;
use memmap2::Mmap;
use tracing::{debug, info};

use crate::arena::{Arena, ArenaStats, CdbObject, NodeId};
use crate::error::Result;
use crate::graph::{ComponentKey, MaterialObject, ObjectId, ObjectStore};
use crate::intern::{InternTable, StrRef};
use crate::parser::{ChunkParser, LoadSummary};
use crate::registry::ClassRegistry;
use crate::strings::{FxHashMap, StringTable};
use crate::types::NameId;

/// Construction parameters of a [`MaterialDatabase`].
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Name table to start from; must contain the built-in names.
    pub strings: StringTable,
    /// Expected total input size in bytes, used to pre-size the class registry.
    pub expected_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            strings: StringTable::builtin(),
            expected_size: 0,
        }
    }
}

/// Size counters of a database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatabaseStats {
    pub objects: usize,
    pub components: usize,
    pub classes: usize,
    pub names: usize,
    pub strings: usize,
    pub string_bytes: usize,
    pub arena: ArenaStats,
}

#[derive(Debug, Clone, Default)]
pub struct MaterialDatabase {
    pub(crate) strings: StringTable,
    pub(crate) intern: InternTable,
    pub(crate) classes: ClassRegistry,
    pub(crate) arena: Arena,
    pub(crate) store: ObjectStore,
}

impl MaterialDatabase {
    pub fn new() -> Self {
        Self::with_config(DatabaseConfig::default())
    }

    pub fn with_config(config: DatabaseConfig) -> Self {
        Self {
            strings: config.strings,
            intern: InternTable::new(),
            classes: ClassRegistry::with_capacity_for(config.expected_size),
            arena: Arena::new(),
            store: ObjectStore::new(),
        }
    }

    /// Parse one CDB buffer into the database.
    ///
    /// On error the database keeps whatever was committed before the failure
    /// and should be treated as invalid.
    pub fn load(&mut self, data: &[u8]) -> Result<LoadSummary> {
        self.classes.reserve_for(data.len());
        let summary = ChunkParser::new(data, self).parse()?;
        self.store.flatten_all(&mut self.arena, &self.classes)?;

        info!(
            "loaded {} bytes: {} classes, {} objects, {} components, {} edges",
            data.len(),
            summary.classes,
            summary.objects,
            summary.components,
            summary.edges
        );
        Ok(summary)
    }

    /// Memory-map a file and load it.
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<LoadSummary> {
        let path = path.as_ref();
        debug!("mapping {}", path.display());
        let file = std::fs::File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        self.load(&mmap)
    }

    /// Drop every object, class, node and string.
    pub fn clear(&mut self) {
        self.strings = StringTable::builtin();
        self.intern.clear();
        self.classes.clear();
        self.arena.clear();
        self.store.clear();
    }

    /// Replace this database with an independent copy of `other`.
    ///
    /// Only nodes reachable from components are copied. Sub-trees shared in
    /// `other` stay shared in the copy, with reference counts recomputed.
    pub fn copy_from(&mut self, other: &MaterialDatabase) -> Result<()> {
        let mut arena = Arena::with_capacity(other.arena.len());
        let mut memo: FxHashMap<NodeId, NodeId> = FxHashMap::default();
        let mut store = other.store.clone();

        for id in store.ids().collect::<Vec<_>>() {
            for component in &mut store.object_mut(id).components {
                if let Some(value) = component.value {
                    component.value = Some(copy_node(&other.arena, &mut arena, &mut memo, value)?);
                }
            }
        }
        store.reset_db_table(0);
        store.reindex()?;

        debug!(
            "copied {} objects, {} of {} nodes reachable",
            store.len(),
            arena.len(),
            other.arena.len()
        );

        self.strings = other.strings.clone();
        self.intern = other.intern.clone();
        self.classes = other.classes.clone();
        self.arena = arena;
        self.store = store;
        Ok(())
    }

    #[inline]
    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    #[inline]
    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    #[inline]
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    #[inline]
    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    #[inline]
    pub fn object_count(&self) -> usize {
        self.store.len()
    }

    #[inline]
    pub fn object(&self, id: ObjectId) -> &MaterialObject {
        self.store.object(id)
    }

    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &MaterialObject)> {
        self.store.iter()
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &CdbObject {
        self.arena.get(id)
    }

    /// Bytes of an interned string value.
    #[inline]
    pub fn string(&self, handle: StrRef) -> &[u8] {
        self.intern.get(handle)
    }

    /// Text of a class, field or type name; empty if unknown.
    #[inline]
    pub fn name(&self, id: NameId) -> &str {
        self.strings.name(id).unwrap_or_default()
    }

    #[inline]
    pub fn find_by_persistent_id(&self, pid: &ResourceId) -> Option<ObjectId> {
        self.store.find_by_persistent_id(pid)
    }

    /// Look up an object by resource path or `res:` text.
    pub fn object_by_path(&self, path: &str) -> Option<ObjectId> {
        self.store.find_by_persistent_id(&ResourceId::from_path(path))
    }

    /// Objects with the `mat` extension and no parent edge.
    pub fn top_level_materials(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.store
            .iter()
            .filter(|(_, o)| o.persistent_id.ext == ResourceId::EXT_MAT && o.parent.is_none())
            .map(|(id, _)| id)
    }

    /// Value of the component `(class, index)` of an object.
    pub fn component_value(&self, id: ObjectId, class: NameId, index: u16) -> Option<NodeId> {
        self.store
            .object(id)
            .component(ComponentKey::new(class, index))
            .and_then(|c| c.value)
    }

    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            objects: self.store.len(),
            components: self.store.iter().map(|(_, o)| o.components.len()).sum(),
            classes: self.classes.len(),
            names: self.strings.len(),
            strings: self.intern.len(),
            string_bytes: self.intern.byte_size(),
            arena: self.arena.stats(),
        }
    }

    /// Render the material at `path` and everything it pulls in as JSON.
    #[cfg(feature = "json-export")]
    pub fn material_json(&self, path: &str) -> Result<Option<String>> {
        match self.object_by_path(path) {
            Some(id) => crate::export::JsonExporter::new(self).material_json(id).map(Some),
            None => Ok(None),
        }
    }

    /// Render a single object as JSON.
    #[cfg(feature = "json-export")]
    pub fn object_json(&self, id: ObjectId) -> Result<String> {
        crate::export::JsonExporter::new(self).object_json(id)
    }
}

fn copy_node(
    src: &Arena,
    dst: &mut Arena,
    memo: &mut FxHashMap<NodeId, NodeId>,
    id: NodeId,
) -> Result<NodeId> {
    if let Some(&copy) = memo.get(&id) {
        return dst.share(copy);
    }
    let mut copy = src.get(id).clone();
    copy.ref_count = 0;
    for slot in copy.children_mut() {
        if let Some(child) = *slot {
            *slot = Some(copy_node(src, dst, memo, child)?);
        }
    }
    let new = dst.alloc(copy)?;
    memo.insert(id, new);
    Ok(new)
}
