//! Generational arena with `Copy` handles.
//!
//! [`Arena<T>`] stores values in slots and hands out [`Index`] values made of
//! a slot number and a generation. Removing a value bumps the slot's
//! generation, so an `Index` taken before the removal never resolves to the
//! value that later reuses the slot.
//!
//! Identity checks between indices are plain integer comparisons, which keeps
//! "is this the same resource?" questions O(1) and independent of whatever
//! owns the stored values.
//!
//! # Example
//!
//! ```
//! use thistle_core::arena::Arena;
//!
//! let mut arena = Arena::new();
//! let a = arena.insert("uniforms");
//! assert_eq!(arena.get(a), Some(&"uniforms"));
//!
//! arena.remove(a);
//! let b = arena.insert("field");
//! assert_eq!(a.slot(), b.slot());
//! assert_ne!(a, b);
//! assert!(arena.get(a).is_none());
//! ```

/// Stable reference into an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Index {
    slot: u32,
    generation: u32,
}

impl Index {
    /// Build an index from raw parts.
    ///
    /// Mostly useful in tests; indices built this way only resolve if an
    /// arena happens to hold a value at that slot and generation.
    pub const fn from_raw_parts(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    /// Slot number inside the arena.
    pub fn slot(self) -> u32 {
        self.slot
    }

    /// Generation of the slot at the time this index was issued.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.slot, self.generation)
    }
}

#[derive(Debug)]
enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32, next_free: Option<u32> },
}

impl<T> Slot<T> {
    fn generation(&self) -> u32 {
        match self {
            Slot::Occupied { generation, .. } | Slot::Vacant { generation, .. } => *generation,
        }
    }
}

/// Slot storage with generation-checked access.
#[derive(Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            len: 0,
        }
    }
}

impl<T> Arena<T> {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no values are stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a value, reusing a vacant slot when one exists.
    pub fn insert(&mut self, value: T) -> Index {
        self.len += 1;
        match self.free_head {
            Some(slot) => {
                let entry = &mut self.slots[slot as usize];
                let (generation, next_free) = match entry {
                    Slot::Vacant {
                        generation,
                        next_free,
                    } => (*generation, *next_free),
                    Slot::Occupied { .. } => unreachable!("free list points at occupied slot"),
                };
                *entry = Slot::Occupied { generation, value };
                self.free_head = next_free;
                Index { slot, generation }
            }
            None => {
                let slot = self.slots.len() as u32;
                self.slots.push(Slot::Occupied {
                    generation: 0,
                    value,
                });
                Index {
                    slot,
                    generation: 0,
                }
            }
        }
    }

    /// Remove the value at `index`, returning it if the index was live.
    pub fn remove(&mut self, index: Index) -> Option<T> {
        let entry = self.slots.get_mut(index.slot as usize)?;
        if !matches!(entry, Slot::Occupied { generation, .. } if *generation == index.generation) {
            return None;
        }
        let vacant = Slot::Vacant {
            generation: index.generation.wrapping_add(1),
            next_free: self.free_head,
        };
        let old = std::mem::replace(entry, vacant);
        self.free_head = Some(index.slot);
        self.len -= 1;
        match old {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    /// Returns `true` if `index` refers to a live value.
    pub fn contains(&self, index: Index) -> bool {
        self.get(index).is_some()
    }

    /// Get the value at `index`.
    pub fn get(&self, index: Index) -> Option<&T> {
        match self.slots.get(index.slot as usize)? {
            Slot::Occupied { generation, value } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    /// Get the value at `index` mutably.
    pub fn get_mut(&mut self, index: Index) -> Option<&mut T> {
        match self.slots.get_mut(index.slot as usize)? {
            Slot::Occupied { generation, value } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    /// Current generation of a slot, live or not.
    pub fn slot_generation(&self, slot: u32) -> Option<u32> {
        self.slots.get(slot as usize).map(Slot::generation)
    }

    /// Iterate over live values together with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (Index, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| match entry {
                Slot::Occupied { generation, value } => Some((
                    Index {
                        slot: slot as u32,
                        generation: *generation,
                    },
                    value,
                )),
                Slot::Vacant { .. } => None,
            })
    }

    /// Remove every value. Generations of occupied slots are bumped.
    pub fn clear(&mut self) {
        let live: Vec<Index> = self.iter().map(|(index, _)| index).collect();
        for index in live {
            self.remove(index);
        }
    }
}

impl<T> std::ops::Index<Index> for Arena<T> {
    type Output = T;

    fn index(&self, index: Index) -> &T {
        self.get(index)
            .unwrap_or_else(|| panic!("stale or invalid arena index {index}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a), Some(&1));
        assert_eq!(arena[b], 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_remove_invalidates_index() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        assert_eq!(arena.remove(a), Some("a"));
        assert!(!arena.contains(a));
        assert_eq!(arena.remove(a), None);
        assert!(arena.is_empty());
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let mut arena = Arena::new();
        let a = arena.insert(10);
        arena.remove(a);
        let b = arena.insert(20);

        assert_eq!(a.slot(), b.slot());
        assert_eq!(b.generation(), a.generation() + 1);
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(b), Some(&20));
        assert_eq!(arena.slot_generation(b.slot()), Some(b.generation()));
    }

    #[test]
    fn test_get_mut() {
        let mut arena = Arena::new();
        let a = arena.insert(vec![1u8]);
        arena.get_mut(a).unwrap().push(2);
        assert_eq!(arena[a], vec![1, 2]);
    }

    #[test]
    fn test_iter_skips_vacant() {
        let mut arena = Arena::new();
        let a = arena.insert('a');
        let b = arena.insert('b');
        let c = arena.insert('c');
        arena.remove(b);

        let items: Vec<_> = arena.iter().collect();
        assert_eq!(items, vec![(a, &'a'), (c, &'c')]);
    }

    #[test]
    fn test_clear() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        arena.insert(2);
        arena.clear();
        assert!(arena.is_empty());
        assert!(!arena.contains(a));
        let b = arena.insert(3);
        assert_ne!(a, b);
    }

    #[test]
    fn test_out_of_range_index() {
        let arena: Arena<u32> = Arena::new();
        assert!(arena.get(Index::from_raw_parts(7, 0)).is_none());
    }

    #[test]
    #[should_panic(expected = "stale or invalid arena index")]
    fn test_index_operator_panics_on_stale() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        arena.remove(a);
        let _ = arena[a];
    }
}
