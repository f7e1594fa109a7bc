//! Database-wide name table and per-file string reference resolution.

use hashbrown::HashMap as FastHashMap;
use rustc_hash::FxHasher;
use tracing::trace;

use crate::types::{NameId, BUILTIN_NAMES};

pub(crate) type FxHashMap<K, V> = FastHashMap<K, V, std::hash::BuildHasherDefault<FxHasher>>;
pub(crate) type FxHashSet<K> = hashbrown::HashSet<K, std::hash::BuildHasherDefault<FxHasher>>;

/// Table of every class, field and type name known to a database.
///
/// Ids are assigned in insertion order and never change, so sorting by
/// [`NameId`] gives the same order no matter which file introduced a name.
#[derive(Debug, Clone)]
pub struct StringTable {
    names: Vec<Box<str>>,
    index: FxHashMap<Box<str>, NameId>,
}

impl StringTable {
    /// Create a table seeded with the built-in kinds and well-known classes.
    pub fn builtin() -> Self {
        let mut table = Self {
            names: Vec::with_capacity(BUILTIN_NAMES.len()),
            index: FxHashMap::default(),
        };
        for name in BUILTIN_NAMES {
            table.intern(name);
        }
        table
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Look up a name without inserting it.
    #[inline]
    pub fn find(&self, name: &str) -> Option<NameId> {
        self.index.get(name).copied()
    }

    /// Get the id of `name`, assigning the next free id if it is new.
    pub fn intern(&mut self, name: &str) -> NameId {
        if let Some(id) = self.find(name) {
            return id;
        }
        let id = NameId(self.names.len() as u32);
        self.names.push(name.into());
        self.index.insert(name.into(), id);
        id
    }

    /// Get the text of a name.
    #[inline]
    pub fn name(&self, id: NameId) -> Option<&str> {
        self.names.get(id.0 as usize).map(|s| &**s)
    }
}

impl Default for StringTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// String references of one file: byte offsets into its `STRT` chunk.
#[derive(Debug, Default)]
pub(crate) struct FileStrings {
    offsets: FxHashMap<u32, NameId>,
}

impl FileStrings {
    /// Scan a `STRT` body, interning every string into `table`.
    pub fn parse(data: &[u8], table: &mut StringTable) -> Self {
        let mut offsets = FxHashMap::default();
        offsets.reserve(data.len() / 24);

        let mut offset = 0;
        while offset < data.len() {
            let end = memchr::memchr(0, &data[offset..])
                .map(|p| offset + p)
                .unwrap_or(data.len());

            if let Ok(s) = std::str::from_utf8(&data[offset..end]) {
                offsets.insert(offset as u32, table.intern(s));
            }

            offset = end + 1;
        }

        trace!("string table: {} entries", offsets.len());
        Self { offsets }
    }

    /// Resolve a string reference; `None` marks a placeholder.
    #[inline]
    pub fn find_string(&self, offset: u32) -> Option<NameId> {
        self.offsets.get(&offset).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_ids() {
        let table = StringTable::builtin();
        assert_eq!(table.find("Null"), Some(NameId::NULL));
        assert_eq!(table.find("Double"), Some(NameId::DOUBLE));
        assert_eq!(table.find("BSComponentDB2::ID"), Some(NameId::COMPONENT_ID));
        assert_eq!(table.name(NameId::MAP), Some("Map"));
    }

    #[test]
    fn test_intern_is_stable() {
        let mut table = StringTable::builtin();
        let before = table.len();
        let a = table.intern("BSMaterial::Color");
        let b = table.intern("BSMaterial::Color");
        assert_eq!(a, b);
        assert_eq!(table.len(), before + 1);
        assert_eq!(table.name(a), Some("BSMaterial::Color"));
    }

    #[test]
    fn test_file_strings_offsets() {
        let mut table = StringTable::builtin();
        let data = b"Float\0Value\0BSMaterial::Color\0";
        let strings = FileStrings::parse(data, &mut table);

        assert_eq!(strings.find_string(0), Some(NameId::FLOAT));
        assert_eq!(strings.find_string(6), table.find("Value"));
        assert_eq!(strings.find_string(12), table.find("BSMaterial::Color"));
        // Offsets inside a string are placeholders.
        assert_eq!(strings.find_string(3), None);
    }
}
