//! Fixed-layout records of the CDB chunk stream.

mod header;
mod index;

pub use header::{ChunkHeader, ClassHeader, FieldRecord, FileHeader};
pub use index::{ComponentInfoRecord, EdgeInfoRecord, ObjectInfoRecord, ObjectInfoRecordExt};
