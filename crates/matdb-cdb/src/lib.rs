//! Materials component database (`.cdb`) reader for Starfield.
//!
//! A materials CDB is a chunked binary file describing layered materials as
//! a graph of objects. Each object carries typed components, may inherit
//! components from a base object and may own child objects. Later files
//! patch earlier ones by diffing against the values already loaded.
//!
//! # Quick Start
//!
//! ```no_run
//! use matdb_cdb::MaterialDatabase;
//!
//! let mut db = MaterialDatabase::new();
//! db.load_file("materialsbeta.cdb")?;
//!
//! for id in db.top_level_materials() {
//!     let object = db.object(id);
//!     println!("{} ({} components)", object.persistent_id, object.components.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Architecture
//!
//! - **Database** (`MaterialDatabase`): owns every table and is the load entry point
//! - **Registry** (`ClassRegistry`): class definitions, keyed by name id
//! - **Arena** (`Arena`): reference-counted value nodes with copy-on-write
//! - **Graph** (`ObjectStore`): objects, parent/child edges and inheritance
//! - **Strings** (`StringTable`, `InternTable`): names and interned string values
//!
//! # Patching
//!
//! Loading a second file applies its `DIFF` chunks on top of the values
//! already present:
//!
//! ```no_run
//! use matdb_cdb::MaterialDatabase;
//!
//! let mut db = MaterialDatabase::new();
//! db.load_file("materialsbeta.cdb")?;
//! let summary = db.load_file("patch.cdb")?;
//! println!("patched {} components", summary.components);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # JSON Export
//!
//! Render a material and everything it references (requires the
//! `json-export` feature):
//!
//! ```no_run
//! use matdb_cdb::MaterialDatabase;
//!
//! let mut db = MaterialDatabase::new();
//! db.load_file("materialsbeta.cdb")?;
//!
//! if let Some(json) = db.material_json("materials/terrain/rock01.mat")? {
//!     println!("{}", json);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod arena;
mod chunk;
mod database;
mod diff;
mod error;
mod graph;
mod hash_table;
mod intern;
mod parser;
mod registry;
mod strings;
mod types;

#[cfg(feature = "json-export")]
pub mod export;
pub mod structs;
pub mod writer;

// Primary API
pub use database::{DatabaseConfig, DatabaseStats, MaterialDatabase};
pub use error::{Error, Result};
pub use parser::LoadSummary;

// Object graph
pub use graph::{ComponentKey, EdgeResult, MaterialComponent, MaterialObject, ObjectId, ObjectStore, MAX_DB_ID};

// Value nodes
pub use arena::{Arena, ArenaStats, CdbObject, NodeId, ObjectData};
pub use diff::{insert_map_item, values_equal, MAX_COLLECTION_ITEMS};

// Tables
pub use intern::{InternTable, StrRef};
pub use registry::{ClassDef, ClassRegistry, FieldDef, CLASS_FLAG_USER};
pub use strings::StringTable;
pub use types::{NameId, ValueKind};

pub use matdb_common::ResourceId;
