//! # Component Storage
//!
//! Sparse-set storage for a single component type.
//!
//! - `sparse` maps a slot index to a position in the dense arrays
//! - `dense` holds the values contiguously for cache-friendly iteration
//! - `dense_slots` maps a dense position back to its slot index
//!
//! A value exists for slot S iff the entity in slot S has the component.
//! Absent slots are absent, never defaulted.

use std::any::Any;

use serde_json::Value;

use crate::error::{fatal, EcsError, EcsResult};
use crate::meta::StructMetadata;

use super::component::Component;
use super::name::EntityScope;

const EMPTY: u32 = u32::MAX;

/// Sparse-set storage for one component type.
///
/// # Example
///
/// ```rust,ignore
/// let mut storage = ComponentStorage::<Light>::new();
/// storage.insert(4, Light::default());
/// assert!(storage.contains(4));
/// ```
pub struct ComponentStorage<C: Component> {
    /// Slot index to dense index, or `EMPTY`.
    sparse: Vec<u32>,
    /// Component values.
    dense: Vec<C>,
    /// Slot index for each dense value.
    dense_slots: Vec<u32>,
    /// Reflection table, used by the type-erased operations.
    metadata: StructMetadata<C>,
}

impl<C: Component> ComponentStorage<C> {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sparse: Vec::new(),
            dense: Vec::new(),
            dense_slots: Vec::new(),
            metadata: StructMetadata::of(),
        }
    }

    pub(crate) fn boxed() -> Box<dyn ErasedStorage> {
        Box::new(Self::new())
    }

    /// Number of stored components.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    /// True if no slot holds this component.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    #[inline]
    fn dense_index(&self, index: u32) -> Option<usize> {
        match self.sparse.get(index as usize) {
            Some(&d) if d != EMPTY => Some(d as usize),
            _ => None,
        }
    }

    /// True if `index` holds a value.
    #[inline]
    #[must_use]
    pub fn contains(&self, index: u32) -> bool {
        self.dense_index(index).is_some()
    }

    /// Gets the value in `index`.
    #[inline]
    #[must_use]
    pub fn get(&self, index: u32) -> Option<&C> {
        self.dense_index(index).map(|d| &self.dense[d])
    }

    /// Gets the value in `index` mutably.
    #[inline]
    pub fn get_mut(&mut self, index: u32) -> Option<&mut C> {
        self.dense_index(index).map(|d| &mut self.dense[d])
    }

    /// Stores `value` in `index`.
    ///
    /// # Returns
    ///
    /// The previous value, if the slot was occupied.
    pub fn insert(&mut self, index: u32, value: C) -> Option<C> {
        if let Some(d) = self.dense_index(index) {
            return Some(std::mem::replace(&mut self.dense[d], value));
        }

        let idx = index as usize;
        if idx >= self.sparse.len() {
            self.sparse.resize(idx + 1, EMPTY);
        }
        #[allow(clippy::cast_possible_truncation)]
        {
            self.sparse[idx] = self.dense.len() as u32;
        }
        self.dense.push(value);
        self.dense_slots.push(index);
        None
    }

    /// Stores `value` in `index` and returns a reference to it.
    pub fn insert_mut(&mut self, index: u32, value: C) -> &mut C {
        self.insert(index, value);
        let d = self.sparse[index as usize] as usize;
        &mut self.dense[d]
    }

    /// Removes and returns the value in `index`.
    pub fn remove(&mut self, index: u32) -> Option<C> {
        let d = self.dense_index(index)?;
        self.sparse[index as usize] = EMPTY;

        let value = self.dense.swap_remove(d);
        self.dense_slots.swap_remove(d);
        if let Some(&moved) = self.dense_slots.get(d) {
            #[allow(clippy::cast_possible_truncation)]
            {
                self.sparse[moved as usize] = d as u32;
            }
        }
        Some(value)
    }

    /// Slot indices holding a value, in dense order.
    #[inline]
    #[must_use]
    pub fn slots(&self) -> &[u32] {
        &self.dense_slots
    }

    /// Iterates `(slot, value)` pairs in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &C)> {
        self.dense_slots.iter().copied().zip(self.dense.iter())
    }

    /// Iterates `(slot, value)` pairs mutably in dense order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut C)> {
        self.dense_slots.iter().copied().zip(self.dense.iter_mut())
    }

    /// The reflection table for `C`.
    #[inline]
    #[must_use]
    pub fn metadata(&self) -> &StructMetadata<C> {
        &self.metadata
    }
}

impl<C: Component> Default for ComponentStorage<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased view of a [`ComponentStorage`], used where the component type
/// is only known by id: destroy, scene loading, merging, saving.
pub trait ErasedStorage: Send + Sync {
    /// Upcast for downcasting to the concrete storage.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete storage.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Number of stored components.
    fn len(&self) -> usize;

    /// True if `index` holds a value.
    fn contains(&self, index: u32) -> bool;

    /// Slot indices holding a value.
    fn slots(&self) -> &[u32];

    /// Drops the value in `index`. Returns true if one was present.
    fn remove_slot(&mut self, index: u32) -> bool;

    /// Clones the value in `src` into `dst[dst_index]`, applying `scope` to
    /// the copy. Returns false if `src` is empty.
    fn copy_slot_to(
        &self,
        src: u32,
        dst: &mut dyn ErasedStorage,
        dst_index: u32,
        scope: Option<&EntityScope>,
    ) -> bool;

    /// Loads structured data into `index`, starting from the current value
    /// or the default.
    ///
    /// # Errors
    ///
    /// Returns the metadata error when `src` has the wrong shape.
    fn load_slot(&mut self, index: u32, src: &Value) -> EcsResult<()>;

    /// Saves the value in `index`, omitting default fields.
    fn save_slot(&self, index: u32) -> Option<Value>;

    /// Rewrites relative entity names in `index`.
    fn set_scope_slot(&mut self, index: u32, scope: &EntityScope);
}

impl<C: Component> ErasedStorage for ComponentStorage<C> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn len(&self) -> usize {
        self.dense.len()
    }

    fn contains(&self, index: u32) -> bool {
        Self::contains(self, index)
    }

    fn slots(&self) -> &[u32] {
        &self.dense_slots
    }

    fn remove_slot(&mut self, index: u32) -> bool {
        self.remove(index).is_some()
    }

    fn copy_slot_to(
        &self,
        src: u32,
        dst: &mut dyn ErasedStorage,
        dst_index: u32,
        scope: Option<&EntityScope>,
    ) -> bool {
        let Some(value) = self.get(src) else {
            return false;
        };
        let Some(dst) = dst.as_any_mut().downcast_mut::<Self>() else {
            fatal(EcsError::UnregisteredComponent(C::NAME));
        };

        let mut copy = value.clone();
        if let Some(scope) = scope {
            self.metadata.set_scope(&mut copy, scope);
        }
        dst.insert(dst_index, copy);
        true
    }

    fn load_slot(&mut self, index: u32, src: &Value) -> EcsResult<()> {
        let mut value = self.get(index).cloned().unwrap_or_default();
        self.metadata.load(&mut value, src)?;
        self.insert(index, value);
        Ok(())
    }

    fn save_slot(&self, index: u32) -> Option<Value> {
        self.get(index)
            .map(|value| self.metadata.save(value, Some(&C::default())))
    }

    fn set_scope_slot(&mut self, index: u32, scope: &EntityScope) {
        let Some(d) = self.dense_index(index) else {
            return;
        };
        self.metadata.set_scope(&mut self.dense[d], scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::Name;
    use serde_json::json;

    #[test]
    fn test_insert_get_remove() {
        let mut storage = ComponentStorage::<Name>::new();
        assert!(storage.insert(3, Name::new("a", "x")).is_none());
        assert!(storage.contains(3));
        assert!(!storage.contains(2));
        assert_eq!(storage.get(3), Some(&Name::new("a", "x")));

        let old = storage.insert(3, Name::new("a", "y"));
        assert_eq!(old, Some(Name::new("a", "x")));
        assert_eq!(storage.len(), 1);

        assert_eq!(storage.remove(3), Some(Name::new("a", "y")));
        assert!(storage.is_empty());
        assert!(storage.remove(3).is_none());
    }

    #[test]
    fn test_swap_remove_keeps_index_consistent() {
        let mut storage = ComponentStorage::<Name>::new();
        for i in 0..5 {
            storage.insert(i * 2, Name::new("s", format!("e{i}")));
        }
        storage.remove(2);

        assert_eq!(storage.len(), 4);
        for (slot, name) in storage.iter() {
            assert_eq!(storage.get(slot), Some(name));
        }
        assert_eq!(storage.get(8), Some(&Name::new("s", "e4")));
    }

    #[test]
    fn test_erased_copy_applies_scope() {
        let mut src = ComponentStorage::<Name>::new();
        src.insert(0, Name::new("", "door"));
        let mut dst = ComponentStorage::<Name>::new();

        let scope = Name::new("hall", "");
        assert!(src.copy_slot_to(0, &mut dst, 7, Some(&scope)));
        assert_eq!(dst.get(7), Some(&Name::new("hall", "door")));
        assert_eq!(src.get(0), Some(&Name::new("", "door")));
        assert!(!src.copy_slot_to(1, &mut dst, 8, None));
    }

    #[test]
    fn test_erased_load_and_save() {
        let mut storage = ComponentStorage::<Name>::new();
        storage.load_slot(1, &json!("hall:door")).unwrap();
        assert_eq!(storage.save_slot(1), Some(json!("hall:door")));
        assert_eq!(storage.save_slot(2), None);
    }
}
