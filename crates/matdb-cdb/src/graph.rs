//! Object graph: material objects, their components and their edges.

use matdb_common::ResourceId;
use tracing::{trace, warn};

use crate::arena::{Arena, CdbObject, NodeId, ObjectData};
use crate::error::{Error, Result};
use crate::hash_table::{OpenTable, Probe};
use crate::registry::ClassRegistry;
use crate::types::NameId;

/// Largest `dbID` an `ObjectInfo` record may use.
pub const MAX_DB_ID: u32 = 0x00FF_FFFF;

/// Handle to a [`MaterialObject`] in an [`ObjectStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

impl ObjectId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Component key: class id in the upper bits, per-class index in the low 16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentKey(u64);

impl ComponentKey {
    #[inline]
    pub fn new(class_id: NameId, index: u16) -> Self {
        Self(((class_id.0 as u64) << 16) | index as u64)
    }

    #[inline]
    pub fn class_id(self) -> NameId {
        NameId((self.0 >> 16) as u32)
    }

    #[inline]
    pub fn index(self) -> u16 {
        self.0 as u16
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialComponent {
    pub key: ComponentKey,
    pub class_name: NameId,
    pub value: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialObject {
    /// Id of the record that last supplied data; file-local.
    pub db_id: u32,
    pub persistent_id: ResourceId,
    pub base_object: Option<ObjectId>,
    pub parent: Option<ObjectId>,
    /// First child; siblings continue through `next`.
    pub children: Option<ObjectId>,
    pub next: Option<ObjectId>,
    pub components: Vec<MaterialComponent>,
    pub has_data: bool,
}

impl MaterialObject {
    fn new(persistent_id: ResourceId) -> Self {
        Self {
            db_id: 0,
            persistent_id,
            base_object: None,
            parent: None,
            children: None,
            next: None,
            components: Vec::new(),
            has_data: false,
        }
    }

    pub fn component(&self, key: ComponentKey) -> Option<&MaterialComponent> {
        self.components.iter().find(|c| c.key == key)
    }
}

/// Outcome of [`ObjectStore::add_edge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeResult {
    Linked,
    /// The source already had this parent.
    AlreadyLinked,
    /// The source already had another parent; nothing was changed.
    Conflict,
}

#[derive(Debug, Clone)]
pub struct ObjectStore {
    objects: Vec<MaterialObject>,
    by_db_id: Vec<Option<ObjectId>>,
    by_persistent_id: OpenTable<ObjectId>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            by_db_id: Vec::new(),
            by_persistent_id: OpenTable::with_capacity(1024),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    #[inline]
    pub fn object(&self, id: ObjectId) -> &MaterialObject {
        &self.objects[id.index()]
    }

    #[inline]
    pub fn object_mut(&mut self, id: ObjectId) -> &mut MaterialObject {
        &mut self.objects[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &MaterialObject)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(i, o)| (ObjectId(i as u32), o))
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> {
        (0..self.objects.len() as u32).map(ObjectId)
    }

    /// Replace the file-local `dbID` table with an empty one of `len` slots.
    pub fn reset_db_table(&mut self, len: usize) {
        self.by_db_id.clear();
        self.by_db_id.resize(len, None);
    }

    pub fn find_by_db_id(&self, db_id: u32) -> Option<ObjectId> {
        if db_id == 0 {
            return None;
        }
        self.by_db_id.get(db_id as usize).copied().flatten()
    }

    pub(crate) fn bind_db_id(&mut self, db_id: u32, id: ObjectId) {
        let slot = db_id as usize;
        if slot >= self.by_db_id.len() {
            self.by_db_id.resize(slot + 1, None);
        }
        self.by_db_id[slot] = Some(id);
    }

    pub fn find_by_persistent_id(&self, pid: &ResourceId) -> Option<ObjectId> {
        let objects = &self.objects;
        match self
            .by_persistent_id
            .probe(pid.table_hash(), |id| objects[id.index()].persistent_id == *pid)
        {
            Probe::Found(slot) => self.by_persistent_id.get(slot).copied(),
            _ => None,
        }
    }

    /// Create a new object and index it by persistent id.
    pub fn create(&mut self, pid: ResourceId) -> Result<ObjectId> {
        let id = ObjectId(
            u32::try_from(self.objects.len()).map_err(|_| Error::OutOfMemory("object store"))?,
        );
        if self.by_persistent_id.needs_grow() {
            let objects = &self.objects;
            self.by_persistent_id
                .grow(|id| objects[id.index()].persistent_id.table_hash());
        }
        self.objects.push(MaterialObject::new(pid));
        self.index_persistent(id)?;
        Ok(id)
    }

    fn index_persistent(&mut self, id: ObjectId) -> Result<()> {
        let pid = self.objects[id.index()].persistent_id;
        let objects = &self.objects;
        match self
            .by_persistent_id
            .probe(pid.table_hash(), |other| objects[other.index()].persistent_id == pid)
        {
            Probe::Vacant(slot) | Probe::Found(slot) => {
                self.by_persistent_id.set(slot, id);
                Ok(())
            }
            Probe::Full => Err(Error::OutOfMemory("persistent id table")),
        }
    }

    /// Rebuild the persistent-id table from the object list.
    pub(crate) fn reindex(&mut self) -> Result<()> {
        self.by_persistent_id = OpenTable::with_capacity(self.objects.len() * 3 / 2 + 1);
        for id in self.ids().collect::<Vec<_>>() {
            self.index_persistent(id)?;
        }
        Ok(())
    }

    /// Make `target` the parent of `source`, prepending `source` to its children.
    pub fn add_edge(&mut self, source: ObjectId, target: ObjectId) -> EdgeResult {
        match self.objects[source.index()].parent {
            Some(parent) if parent == target => return EdgeResult::AlreadyLinked,
            Some(_) => return EdgeResult::Conflict,
            None => {}
        }
        let first = self.objects[target.index()].children;
        let node = &mut self.objects[source.index()];
        node.parent = Some(target);
        node.next = first;
        self.objects[target.index()].children = Some(source);
        EdgeResult::Linked
    }

    /// Step a depth-first pre-order walk of the subtree under `root`.
    pub fn next_child_object(&self, root: ObjectId, current: ObjectId) -> Option<ObjectId> {
        if let Some(child) = self.objects[current.index()].children {
            return Some(child);
        }
        let mut node = current;
        loop {
            if node == root {
                return None;
            }
            let obj = &self.objects[node.index()];
            if let Some(next) = obj.next {
                return Some(next);
            }
            node = obj.parent?;
        }
    }

    /// Position of the component with `key`, creating an empty one if absent.
    pub fn find_component(&mut self, id: ObjectId, key: ComponentKey, class_name: NameId) -> usize {
        let components = &mut self.objects[id.index()].components;
        if let Some(pos) = components.iter().position(|c| c.key == key) {
            return pos;
        }
        components.insert(
            0,
            MaterialComponent {
                key,
                class_name,
                value: None,
            },
        );
        0
    }

    /// Collapse a multi-level base chain so `id` inherits directly from the root.
    ///
    /// Components found on the intermediate base and missing here are copied
    /// in, sharing their values. Objects whose base has no base of its own
    /// are left as they are.
    pub fn flatten_base(&mut self, id: ObjectId, arena: &mut Arena, classes: &ClassRegistry) -> Result<()> {
        self.flatten_inner(id, arena, classes, 0)
    }

    fn flatten_inner(
        &mut self,
        id: ObjectId,
        arena: &mut Arena,
        classes: &ClassRegistry,
        depth: usize,
    ) -> Result<()> {
        let Some(base) = self.objects[id.index()].base_object else {
            return Ok(());
        };
        if self.objects[base.index()].base_object.is_none() {
            return Ok(());
        }
        if depth > self.objects.len() {
            return Err(Error::InheritanceCycle {
                db_id: self.objects[id.index()].db_id,
            });
        }

        self.flatten_inner(base, arena, classes, depth + 1)?;

        let root = self.objects[base.index()].base_object;
        self.objects[id.index()].base_object = root;

        let inherited = self.objects[base.index()].components.clone();
        let mut copied = 0usize;
        for component in inherited {
            if self.objects[id.index()].component(component.key).is_some() {
                continue;
            }
            let value = if component.class_name == NameId::CONTROLLER_COMPONENT {
                fresh_instance(arena, classes, component.class_name)?
            } else {
                component.value.map(|v| arena.share(v)).transpose()?
            };
            self.objects[id.index()].components.push(MaterialComponent { value, ..component });
            copied += 1;
        }

        trace!(
            "flattened {} onto {:?}: {} components inherited",
            self.objects[id.index()].persistent_id,
            root.map(|r| self.objects[r.index()].persistent_id),
            copied
        );
        Ok(())
    }

    /// Flatten every object.
    pub fn flatten_all(&mut self, arena: &mut Arena, classes: &ClassRegistry) -> Result<()> {
        for id in self.ids().collect::<Vec<_>>() {
            self.flatten_base(id, arena, classes)?;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.objects.clear();
        self.by_db_id.clear();
        self.by_persistent_id.clear();
    }
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocate an empty instance of `class`, or `None` if it is not registered.
fn fresh_instance(arena: &mut Arena, classes: &ClassRegistry, class: NameId) -> Result<Option<NodeId>> {
    match classes.get(class) {
        Some(def) => {
            let slots = vec![None; def.field_count()];
            arena.alloc(CdbObject::new(class, ObjectData::Struct(slots))).map(Some)
        }
        None => {
            warn!("no definition for {:?}, inherited component left empty", class);
            Ok(None)
        }
    }
}
