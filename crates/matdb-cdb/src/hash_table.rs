//! Open-addressing slot array with linear probing.
//!
//! Capacity is always a power of two and slots are addressed through a
//! `capacity - 1` mask. Callers own the hashing and equality of entries.

/// Result of probing for an entry.
pub(crate) enum Probe {
    /// The entry lives at this slot.
    Found(usize),
    /// The entry is absent; this is the first empty slot on its probe path.
    Vacant(usize),
    /// The entry is absent and every slot is occupied.
    Full,
}

#[derive(Debug, Clone)]
pub(crate) struct OpenTable<E> {
    slots: Vec<Option<E>>,
    mask: usize,
    len: usize,
}

impl<E: Copy> OpenTable<E> {
    /// Create a table with at least `min_capacity` slots.
    pub fn with_capacity(min_capacity: usize) -> Self {
        let capacity = min_capacity.max(16).next_power_of_two();
        Self {
            slots: vec![None; capacity],
            mask: capacity - 1,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Walk the probe path of `hash` until `eq` matches or an empty slot is hit.
    pub fn probe(&self, hash: u32, mut eq: impl FnMut(&E) -> bool) -> Probe {
        let mut slot = hash as usize & self.mask;
        for _ in 0..=self.mask {
            match &self.slots[slot] {
                None => return Probe::Vacant(slot),
                Some(entry) if eq(entry) => return Probe::Found(slot),
                Some(_) => slot = (slot + 1) & self.mask,
            }
        }
        Probe::Full
    }

    #[inline]
    pub fn get(&self, slot: usize) -> Option<&E> {
        self.slots[slot].as_ref()
    }

    /// Store an entry at a slot returned by [`probe`](Self::probe).
    pub fn set(&mut self, slot: usize, entry: E) {
        if self.slots[slot].replace(entry).is_none() {
            self.len += 1;
        }
    }

    /// Check whether one more entry would push occupancy past two thirds.
    #[inline]
    pub fn needs_grow(&self) -> bool {
        (self.len + 1) * 3 > self.capacity() * 2
    }

    /// Double the capacity and rehash every live entry into a fresh buffer.
    pub fn grow(&mut self, hash: impl Fn(&E) -> u32) {
        let capacity = self.capacity() * 2;
        let old = std::mem::replace(&mut self.slots, vec![None; capacity]);
        self.mask = capacity - 1;

        for entry in old.into_iter().flatten() {
            let mut slot = hash(&entry) as usize & self.mask;
            while self.slots[slot].is_some() {
                slot = (slot + 1) & self.mask;
            }
            self.slots[slot] = Some(entry);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.slots.iter().flatten()
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(table: &mut OpenTable<u32>, value: u32, hash: u32) -> bool {
        match table.probe(hash, |e| *e == value) {
            Probe::Found(_) => false,
            Probe::Vacant(slot) => {
                table.set(slot, value);
                true
            }
            Probe::Full => panic!("table full"),
        }
    }

    #[test]
    fn test_collisions_probe_linearly() {
        let mut table = OpenTable::with_capacity(16);
        assert!(insert(&mut table, 1, 5));
        assert!(insert(&mut table, 2, 5));
        assert!(!insert(&mut table, 1, 5));
        assert_eq!(table.len(), 2);
        assert!(matches!(table.probe(5, |e| *e == 2), Probe::Found(6)));
    }

    #[test]
    fn test_wraparound() {
        let mut table = OpenTable::with_capacity(16);
        assert!(insert(&mut table, 7, 15));
        assert!(insert(&mut table, 8, 15));
        assert!(matches!(table.probe(15, |e| *e == 8), Probe::Found(0)));
    }

    #[test]
    fn test_grow_keeps_entries() {
        let mut table = OpenTable::with_capacity(16);
        let add = |table: &mut OpenTable<u32>, v: u32| {
            if table.needs_grow() {
                table.grow(|e| *e);
            }
            insert(table, v, v);
        };
        for v in 0..10u32 {
            add(&mut table, v);
        }
        // Ten of sixteen slots is still under two thirds.
        assert_eq!(table.capacity(), 16);

        add(&mut table, 10);
        assert_eq!(table.capacity(), 32);
        assert_eq!(table.len(), 11);
        for v in 0..11u32 {
            assert!(matches!(table.probe(v, |e| *e == v), Probe::Found(_)));
        }
    }

    #[test]
    fn test_full_without_growth() {
        let mut table = OpenTable::with_capacity(16);
        for v in 0..16u32 {
            insert(&mut table, v, 0);
        }
        assert!(matches!(table.probe(0, |e| *e == 99), Probe::Full));
    }
}
