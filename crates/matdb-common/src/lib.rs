//! Common utilities for matdb.
//!
//! This crate provides foundational types and utilities used across the matdb crates:
//!
//! - [`ChunkReader`] - Bounds-checked little-endian reading from chunk bodies
//! - [`ResourceId`] - The three-word hashed identifier of a material resource
//! - [`crc`] - CRC32C and path hashing utilities

mod error;
mod reader;
mod resource_id;

pub mod crc;

pub use error::{Error, Result};
pub use reader::ChunkReader;
pub use resource_id::ResourceId;

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};
