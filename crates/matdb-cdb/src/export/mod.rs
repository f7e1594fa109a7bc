//! Material export.
//!
//! [`MaterialWalker`] gathers the objects that make up one material and
//! [`JsonExporter`] renders them in the JSON dialect of the material tools.

mod json;
mod walker;

pub use json::{JsonExporter, JSON_VERSION, PARENT_PATHS};
pub use walker::MaterialWalker;
