//! Class registry: every class definition known to a database.
//!
//! The registry is a fixed-capacity open-addressing table keyed by the
//! CRC32C of the class id. Capacity is chosen up front from the expected
//! input size and only changes through [`ClassRegistry::reserve_for`].

use std::sync::Arc;

use matdb_common::crc::hash_u32;

use crate::error::{Error, Result};
use crate::hash_table::{OpenTable, Probe};
use crate::types::NameId;

/// Class flag marking a user class, serialised inside a `USER` chunk.
pub const CLASS_FLAG_USER: u16 = 0x0004;

/// Input bytes per expected class when sizing the registry.
const BYTES_PER_CLASS: usize = 256;
const MIN_CAPACITY: usize = 1024;
const MAX_CAPACITY: usize = 1 << 16;

/// One field of a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: NameId,
    pub type_id: NameId,
}

/// A class definition.
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub class_id: NameId,
    pub version: u32,
    pub flags: u16,
    pub fields: Arc<[FieldDef]>,
}

impl ClassDef {
    pub fn new(class_id: NameId, fields: impl Into<Arc<[FieldDef]>>) -> Self {
        Self {
            class_id,
            version: 0,
            flags: 0,
            fields: fields.into(),
        }
    }

    #[inline]
    pub fn is_user(&self) -> bool {
        self.flags & CLASS_FLAG_USER != 0
    }

    #[inline]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Find the position of a field by name.
    pub fn field_index(&self, name: NameId) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct ClassRegistry {
    classes: Vec<ClassDef>,
    table: OpenTable<u32>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::with_capacity_for(0)
    }

    /// Size the registry for an input of `expected_bytes`.
    pub fn with_capacity_for(expected_bytes: usize) -> Self {
        Self {
            classes: Vec::new(),
            table: OpenTable::with_capacity(capacity_for(expected_bytes)),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Grow the table ahead of loading an input of `expected_bytes`.
    pub fn reserve_for(&mut self, expected_bytes: usize) {
        let wanted = capacity_for(expected_bytes);
        if wanted <= self.table.capacity() {
            return;
        }
        while self.table.capacity() < wanted {
            let classes = &self.classes;
            self.table.grow(|i| hash_u32(classes[*i as usize].class_id.0));
        }
    }

    pub fn get(&self, class_id: NameId) -> Option<&ClassDef> {
        match self.probe(class_id) {
            Probe::Found(slot) => self
                .table
                .get(slot)
                .map(|&index| &self.classes[index as usize]),
            _ => None,
        }
    }

    #[inline]
    pub fn contains(&self, class_id: NameId) -> bool {
        self.get(class_id).is_some()
    }

    /// Register a new class. An already registered id is left untouched.
    pub fn insert(&mut self, class: ClassDef) -> Result<()> {
        match self.probe(class.class_id) {
            Probe::Found(_) => Ok(()),
            Probe::Vacant(slot) => {
                self.table.set(slot, self.classes.len() as u32);
                self.classes.push(class);
                Ok(())
            }
            Probe::Full => Err(Error::OutOfMemory("class registry")),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassDef> {
        self.classes.iter()
    }

    pub fn clear(&mut self) {
        self.classes.clear();
        self.table.clear();
    }

    fn probe(&self, class_id: NameId) -> Probe {
        let classes = &self.classes;
        self.table
            .probe(hash_u32(class_id.0), |&i| classes[i as usize].class_id == class_id)
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn capacity_for(expected_bytes: usize) -> usize {
    (expected_bytes / BYTES_PER_CLASS).clamp(MIN_CAPACITY, MAX_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(id: u32, fields: usize) -> ClassDef {
        let fields: Vec<FieldDef> = (0..fields)
            .map(|i| FieldDef {
                name: NameId(100 + i as u32),
                type_id: NameId::FLOAT,
            })
            .collect();
        ClassDef::new(NameId(id), fields)
    }

    #[test]
    fn test_insert_and_get() {
        let mut registry = ClassRegistry::new();
        registry.insert(class(40, 3)).unwrap();
        registry.insert(class(41, 1)).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(NameId(40)).unwrap().field_count(), 3);
        assert_eq!(registry.get(NameId(41)).unwrap().field_index(NameId(100)), Some(0));
        assert!(registry.get(NameId(42)).is_none());
    }

    #[test]
    fn test_first_definition_wins() {
        let mut registry = ClassRegistry::new();
        registry.insert(class(40, 3)).unwrap();
        registry.insert(class(40, 5)).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(NameId(40)).unwrap().field_count(), 3);
    }

    #[test]
    fn test_full_registry_fails() {
        let mut registry = ClassRegistry::new();
        let capacity = registry.capacity() as u32;
        for id in 0..capacity {
            registry.insert(class(16 + id, 0)).unwrap();
        }
        assert!(matches!(
            registry.insert(class(16 + capacity, 0)),
            Err(Error::OutOfMemory(_))
        ));
    }

    #[test]
    fn test_reserve_for_large_input() {
        let mut registry = ClassRegistry::new();
        registry.insert(class(40, 2)).unwrap();
        registry.reserve_for(64 * 1024 * 1024);

        assert_eq!(registry.capacity(), MAX_CAPACITY);
        assert_eq!(registry.get(NameId(40)).unwrap().field_count(), 2);
    }

    #[test]
    fn test_user_flag() {
        let mut def = class(40, 0);
        assert!(!def.is_user());
        def.flags = CLASS_FLAG_USER;
        assert!(def.is_user());
    }
}
