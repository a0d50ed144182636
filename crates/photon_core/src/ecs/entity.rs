//! # Entity Management
//!
//! Entities are lightweight identifiers consisting of:
//! - An index into component tables
//! - A generation counter for safe reuse
//!
//! The [`EntitySlots`] allocator owns the generation per slot, the alive
//! flags, and the free list. It lives behind a world's structural lock.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for an entity.
///
/// The ID is split into two parts:
/// - Lower 32 bits: Index into component tables
/// - Upper 32 bits: Generation counter for detecting stale references
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Entity(u64);

impl Entity {
    /// Null/invalid entity handle.
    pub const NULL: Self = Self(u64::MAX);

    /// Creates a new entity handle from index and generation.
    ///
    /// # Arguments
    ///
    /// * `index` - The slot index (0 to 2^32-1)
    /// * `generation` - The generation counter (0 to 2^32-1)
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Rebuilds a handle from its packed representation.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns the packed representation.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// Returns the index portion of the handle.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the handle.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Checks if this handle is the null sentinel.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("Entity(NULL)")
        } else {
            write!(f, "Entity({}v{})", self.index(), self.generation())
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Slot table for one world: generation per slot, alive flags, free list.
///
/// Destroy bumps the generation immediately, so every outstanding handle to
/// the slot goes stale before the index can be handed out again.
#[derive(Debug, Default)]
pub struct EntitySlots {
    /// Current generation for every slot ever allocated.
    generations: Vec<u32>,
    /// Whether the slot currently holds a live entity.
    alive: Vec<bool>,
    /// Free indices, reused LIFO.
    free_indices: Vec<u32>,
    /// Number of currently alive entities.
    alive_count: usize,
}

impl EntitySlots {
    /// Creates a slot table with room for `capacity` slots before growing.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            generations: Vec::with_capacity(capacity),
            alive: Vec::with_capacity(capacity),
            free_indices: Vec::new(),
            alive_count: 0,
        }
    }

    /// Returns the number of currently alive entities.
    #[inline]
    #[must_use]
    pub const fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Returns the number of slots ever allocated.
    #[inline]
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.generations.len()
    }

    /// Allocates a slot, recycling a free one if available.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX - 1` slots are allocated.
    pub fn allocate(&mut self) -> Entity {
        let index = if let Some(index) = self.free_indices.pop() {
            self.alive[index as usize] = true;
            index
        } else {
            let index = u32::try_from(self.generations.len())
                .ok()
                .filter(|&i| i != u32::MAX)
                .unwrap_or_else(|| panic!("entity slot table exhausted"));
            self.generations.push(1);
            self.alive.push(true);
            index
        };

        self.alive_count += 1;
        Entity::new(index, self.generations[index as usize])
    }

    /// Frees the slot of `entity` and bumps its generation.
    ///
    /// # Returns
    ///
    /// `false` if the handle was stale, null, or never allocated.
    pub fn free(&mut self, entity: Entity) -> bool {
        if !self.is_valid(entity) {
            return false;
        }

        let idx = entity.index() as usize;
        self.alive[idx] = false;
        self.alive_count -= 1;

        let next = self.generations[idx].wrapping_add(1);
        self.generations[idx] = next;
        // A slot whose generation wrapped is retired instead of reused, so an
        // ancient handle can never alias a new entity.
        if next != 0 {
            self.free_indices.push(entity.index());
        }

        true
    }

    /// O(1) validity check.
    #[inline]
    #[must_use]
    pub fn is_valid(&self, entity: Entity) -> bool {
        if entity.is_null() {
            return false;
        }
        let idx = entity.index() as usize;
        idx < self.generations.len()
            && self.alive[idx]
            && self.generations[idx] == entity.generation()
    }

    /// Returns the live handle currently occupying `index`, if any.
    #[inline]
    #[must_use]
    pub fn entity_at(&self, index: u32) -> Option<Entity> {
        let idx = index as usize;
        (idx < self.alive.len() && self.alive[idx])
            .then(|| Entity::new(index, self.generations[idx]))
    }

    /// Iterates over all alive entities in slot order.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.alive
            .iter()
            .zip(&self.generations)
            .enumerate()
            .filter(|(_, (alive, _))| **alive)
            .map(|(idx, (_, &generation))| {
                #[allow(clippy::cast_possible_truncation)]
                Entity::new(idx as u32, generation)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_roundtrip() {
        let id = Entity::new(12345, 67890);
        assert_eq!(id.index(), 12345);
        assert_eq!(id.generation(), 67890);
        assert_eq!(Entity::from_bits(id.to_bits()), id);
    }

    #[test]
    fn test_null_is_default() {
        assert!(Entity::default().is_null());
        assert_eq!(format!("{}", Entity::NULL), "Entity(NULL)");
    }

    #[test]
    fn test_allocate_and_free() {
        let mut slots = EntitySlots::with_capacity(4);
        let a = slots.allocate();
        let b = slots.allocate();
        assert_ne!(a, b);
        assert_eq!(slots.alive_count(), 2);

        assert!(slots.free(a));
        assert!(!slots.is_valid(a));
        assert!(!slots.free(a), "double free must be a no-op");
        assert_eq!(slots.alive_count(), 1);
    }

    #[test]
    fn test_recycled_slot_gets_new_generation() {
        let mut slots = EntitySlots::default();
        let a = slots.allocate();
        slots.free(a);

        let c = slots.allocate();
        assert_eq!(c.index(), a.index());
        assert_ne!(c.generation(), a.generation());
        assert!(slots.is_valid(c));
        assert!(!slots.is_valid(a));
    }

    #[test]
    fn test_never_allocated_is_invalid() {
        let slots = EntitySlots::default();
        assert!(!slots.is_valid(Entity::new(7, 1)));
        assert!(!slots.is_valid(Entity::NULL));
    }

    #[test]
    fn test_iter_skips_dead_slots() {
        let mut slots = EntitySlots::default();
        let a = slots.allocate();
        let b = slots.allocate();
        let c = slots.allocate();
        slots.free(b);

        let alive: Vec<_> = slots.iter().collect();
        assert_eq!(alive, vec![a, c]);
        assert_eq!(slots.entity_at(b.index()), None);
    }
}
