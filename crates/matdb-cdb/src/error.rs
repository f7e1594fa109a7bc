//! Error types for Materials CDB loading.

use thiserror::Error;

/// Errors that can occur when loading a component database.
///
/// Every format error carries the absolute byte offset where decoding stopped.
/// After any error the database should be treated as invalid.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error (truncated input, bad resource id text).
    #[error("{0}")]
    Common(#[from] matdb_common::Error),

    /// Generic malformed input.
    #[error("format error at offset {offset}: {message}")]
    Format { offset: usize, message: String },

    /// A chunk of the wrong kind appeared where the decoder needed another.
    #[error("unexpected chunk '{found}' at offset {offset}, expected {expected}")]
    UnexpectedChunk {
        offset: usize,
        expected: &'static str,
        found: String,
    },

    /// Unsupported `BETH` header version.
    #[error("unsupported CDB version {version} at offset {offset}")]
    UnsupportedVersion { offset: usize, version: u32 },

    /// A class declaration used a reserved id.
    #[error("invalid class id {class_id} at offset {offset}")]
    InvalidClassId { offset: usize, class_id: u32 },

    /// A re-declared class disagrees with the registered definition.
    #[error("class '{class}' re-declared with {found} fields (registered with {expected}) at offset {offset}")]
    FieldCountMismatch {
        offset: usize,
        class: String,
        expected: usize,
        found: usize,
    },

    /// A `USER`/`USRD` chunk named a different class than the field declares.
    #[error("user chunk names class {found}, field declares {expected} at offset {offset}")]
    UserClassMismatch {
        offset: usize,
        expected: u32,
        found: u32,
    },

    /// A struct diff addressed a field past the class's field count.
    #[error("field index {index} exceeds field count {count} at offset {offset}")]
    FieldIndexOutOfRange {
        offset: usize,
        index: usize,
        count: usize,
    },

    /// A type reference could not be resolved to a kind or class.
    #[error("unknown type {type_id} at offset {offset}")]
    UnknownType { offset: usize, type_id: u32 },

    /// An `ObjectInfo` record used an id outside the valid range.
    #[error("object id {db_id} out of range at offset {offset}")]
    DbIdOutOfRange { offset: usize, db_id: u32 },

    /// Two `ObjectInfo` records in one file used the same id.
    #[error("duplicate object id {db_id} at offset {offset}")]
    DuplicateDbId { offset: usize, db_id: u32 },

    /// An object received a second parent edge.
    #[error("object {db_id} already has a parent at offset {offset}")]
    MultipleParents { offset: usize, db_id: u32 },

    /// A list or map declared more entries than a node can hold.
    #[error("collection of {count} entries exceeds limit at offset {offset}")]
    CollectionTooLarge { offset: usize, count: usize },

    /// An object's base chain loops back on itself.
    #[error("inheritance cycle through object {db_id}")]
    InheritanceCycle { db_id: u32 },

    /// More component chunks than `ComponentInfo` entries.
    #[error("component table exhausted at offset {offset}")]
    ComponentTableExhausted { offset: usize },

    /// JSON serialization failed.
    #[cfg(feature = "json-export")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A fixed-capacity table or handle space is full.
    #[error("out of memory: {0}")]
    OutOfMemory(&'static str),
}

impl Error {
    pub(crate) fn format(offset: usize, message: impl Into<String>) -> Self {
        Self::Format {
            offset,
            message: message.into(),
        }
    }
}

/// Result type for CDB operations.
pub type Result<T> = std::result::Result<T, Error>;
