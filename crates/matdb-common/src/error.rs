//! Error types for matdb-common.

use thiserror::Error;

/// Common error type for matdb operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A read ran past the end of the chunk or buffer.
    #[error("truncated input at offset {offset}: needed {needed} bytes but only {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Invalid `res:` identifier text.
    #[error("invalid resource id: {0}")]
    InvalidResourceId(String),

    /// UTF-8 decoding error.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
