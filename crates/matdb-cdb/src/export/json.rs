//! JSON rendering of material objects.
//!
//! Output shape:
//!
//! ```text
//! {
//!   "Objects": [
//!     { "Components": [ { "Data": {..}, "Index": 0, "Type": "BSMaterial::..." } ],
//!       "ID": "res:...", "Parent": "materials\\layered\\root\\layers.mat" }
//!   ],
//!   "Version": 1
//! }
//! ```
//!
//! Scalars are quoted strings. Struct fields appear in ascending name-id
//! order and empty fields are omitted.

use matdb_common::ResourceId;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::arena::{NodeId, ObjectData};
use crate::database::MaterialDatabase;
use crate::error::Result;
use crate::export::MaterialWalker;
use crate::graph::{MaterialComponent, ObjectId};

pub const JSON_VERSION: u32 = 1;

/// Well-known base materials, named in the `Parent` field.
pub const PARENT_PATHS: [&str; 6] = [
    "materials\\layered\\root\\layeredmaterials.mat",
    "materials\\layered\\root\\blenders.mat",
    "materials\\layered\\root\\layers.mat",
    "materials\\layered\\root\\materials.mat",
    "materials\\layered\\root\\texturesets.mat",
    "materials\\layered\\root\\uvstreams.mat",
];

const COLLECTION_TYPE: &str = "<collection>";
const REF_TYPE: &str = "<ref>";
const PAIR_TYPE: &str = "StdMapType::Pair";

pub struct JsonExporter<'a> {
    database: &'a MaterialDatabase,
    parents: [(ResourceId, &'static str); 6],
}

impl<'a> JsonExporter<'a> {
    pub fn new(database: &'a MaterialDatabase) -> Self {
        let parents = PARENT_PATHS.map(|path| (ResourceId::from_path(path), path));
        Self { database, parents }
    }

    /// Render one object, including its `ID`.
    pub fn object_json(&self, id: ObjectId) -> Result<String> {
        self.render(&[id], false)
    }

    /// Render a material: the root without an `ID`, then its subtree and
    /// cross-referenced objects.
    pub fn material_json(&self, root: ObjectId) -> Result<String> {
        let objects = MaterialWalker::walk(self.database, root);
        self.render(&objects, true)
    }

    fn render(&self, objects: &[ObjectId], anonymous_root: bool) -> Result<String> {
        let document = Document {
            exporter: self,
            objects,
            anonymous_root,
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    /// Display path of an object's base, or `""` for other bases.
    pub fn parent_path(&self, id: ObjectId) -> &'static str {
        let Some(base) = self.database.object(id).base_object else {
            return "";
        };
        let pid = self.database.object(base).persistent_id;
        self.parents
            .iter()
            .find(|(root, _)| *root == pid)
            .map_or("", |(_, path)| path)
    }
}

struct Document<'e, 'a> {
    exporter: &'e JsonExporter<'a>,
    objects: &'e [ObjectId],
    anonymous_root: bool,
}

impl Serialize for Document<'_, '_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("Objects", &ObjectList(self))?;
        map.serialize_entry("Version", &JSON_VERSION)?;
        map.end()
    }
}

struct ObjectList<'d, 'e, 'a>(&'d Document<'e, 'a>);

impl Serialize for ObjectList<'_, '_, '_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let doc = self.0;
        let mut seq = serializer.serialize_seq(Some(doc.objects.len()))?;
        for (i, &id) in doc.objects.iter().enumerate() {
            seq.serialize_element(&ObjectView {
                exporter: doc.exporter,
                id,
                with_id: !(doc.anonymous_root && i == 0),
            })?;
        }
        seq.end()
    }
}

struct ObjectView<'e, 'a> {
    exporter: &'e JsonExporter<'a>,
    id: ObjectId,
    with_id: bool,
}

impl Serialize for ObjectView<'_, '_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let db = self.exporter.database;
        let object = db.object(self.id);

        let mut components: Vec<&MaterialComponent> = object.components.iter().collect();
        components.sort_by_key(|c| c.key);

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("Components", &ComponentList { db, components })?;
        if self.with_id {
            map.serialize_entry("ID", &object.persistent_id.to_string())?;
        }
        map.serialize_entry("Parent", self.exporter.parent_path(self.id))?;
        map.end()
    }
}

struct ComponentList<'a> {
    db: &'a MaterialDatabase,
    components: Vec<&'a MaterialComponent>,
}

impl Serialize for ComponentList<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.components.len()))?;
        for component in &self.components {
            seq.serialize_element(&ComponentView {
                db: self.db,
                component,
            })?;
        }
        seq.end()
    }
}

struct ComponentView<'a> {
    db: &'a MaterialDatabase,
    component: &'a MaterialComponent,
}

impl Serialize for ComponentView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        match self.component.value {
            Some(node) if matches!(self.db.node(node).data, ObjectData::Struct(_)) => {
                map.serialize_entry("Data", &Fields { db: self.db, node })?;
            }
            Some(node) => map.serialize_entry("Data", &NodeView { db: self.db, node })?,
            None => map.serialize_entry("Data", &Empty)?,
        }
        map.serialize_entry("Index", &self.component.key.index())?;
        map.serialize_entry("Type", self.db.name(self.component.class_name))?;
        map.end()
    }
}

struct Empty;

impl Serialize for Empty {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_map(Some(0))?.end()
    }
}

/// The non-empty fields of a struct node, keyed by name.
struct Fields<'a> {
    db: &'a MaterialDatabase,
    node: NodeId,
}

impl Serialize for Fields<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let object = self.db.node(self.node);
        let class = self.db.classes().get(object.type_id);

        let mut fields: Vec<_> = object
            .children()
            .iter()
            .enumerate()
            .filter_map(|(i, child)| {
                let name = class?.fields.get(i)?.name;
                Some((name, (*child)?))
            })
            .collect();
        fields.sort_by_key(|(name, _)| *name);

        let mut map = serializer.serialize_map(Some(fields.len()))?;
        for (name, node) in fields {
            map.serialize_entry(self.db.name(name), &NodeView { db: self.db, node })?;
        }
        map.end()
    }
}

struct NodeView<'a> {
    db: &'a MaterialDatabase,
    node: NodeId,
}

impl Serialize for NodeView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let db = self.db;
        let object = db.node(self.node);
        match &object.data {
            ObjectData::String(s) => serializer.serialize_str(&String::from_utf8_lossy(db.string(*s))),
            ObjectData::Int8(v) => serializer.collect_str(v),
            ObjectData::UInt8(v) => serializer.collect_str(v),
            ObjectData::Int16(v) => serializer.collect_str(v),
            ObjectData::UInt16(v) => serializer.collect_str(v),
            ObjectData::Int32(v) => serializer.collect_str(v),
            ObjectData::UInt32(v) => serializer.collect_str(v),
            ObjectData::Int64(v) => serializer.collect_str(v),
            ObjectData::UInt64(v) => serializer.collect_str(v),
            ObjectData::Bool(v) => serializer.serialize_str(if *v { "true" } else { "false" }),
            ObjectData::Float(v) => serializer.collect_str(v),
            ObjectData::Double(v) => serializer.collect_str(v),
            ObjectData::Link(target) => match target {
                Some(target) => serializer.collect_str(&db.object(*target).persistent_id),
                None => serializer.serialize_str(""),
            },
            ObjectData::Struct(_) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("Data", &Fields { db, node: self.node })?;
                map.serialize_entry("Type", db.name(object.type_id))?;
                map.end()
            }
            ObjectData::List { element_type, items } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("Data", &Items { db, items })?;
                map.serialize_entry("ElementType", db.name(*element_type))?;
                map.serialize_entry("Type", COLLECTION_TYPE)?;
                map.end()
            }
            ObjectData::Map { items, .. } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("Data", &Pairs { db, items })?;
                map.serialize_entry("ElementType", PAIR_TYPE)?;
                map.serialize_entry("Type", COLLECTION_TYPE)?;
                map.end()
            }
            ObjectData::Ref(child) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("Data", &child.map(|node| NodeView { db, node }))?;
                map.serialize_entry("Type", REF_TYPE)?;
                map.end()
            }
        }
    }
}

struct Items<'a> {
    db: &'a MaterialDatabase,
    items: &'a [Option<NodeId>],
}

impl Serialize for Items<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.items.len()))?;
        for item in self.items {
            seq.serialize_element(&item.map(|node| NodeView { db: self.db, node }))?;
        }
        seq.end()
    }
}

struct Pairs<'a> {
    db: &'a MaterialDatabase,
    items: &'a [Option<NodeId>],
}

impl Serialize for Pairs<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let db = self.db;
        let mut seq = serializer.serialize_seq(Some(self.items.len() / 2))?;
        for pair in self.items.chunks_exact(2) {
            seq.serialize_element(&Pair {
                db,
                key: pair[0],
                value: pair[1],
            })?;
        }
        seq.end()
    }
}

struct Pair<'a> {
    db: &'a MaterialDatabase,
    key: Option<NodeId>,
    value: Option<NodeId>,
}

impl Serialize for Pair<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let db = self.db;
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("Data", &PairData { db, key: self.key, value: self.value })?;
        map.serialize_entry("Type", PAIR_TYPE)?;
        map.end()
    }
}

struct PairData<'a> {
    db: &'a MaterialDatabase,
    key: Option<NodeId>,
    value: Option<NodeId>,
}

impl Serialize for PairData<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let db = self.db;
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("Key", &self.key.map(|node| NodeView { db, node }))?;
        map.serialize_entry("Value", &self.value.map(|node| NodeView { db, node }))?;
        map.end()
    }
}
