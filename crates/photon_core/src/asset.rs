//! # Asset Handles
//!
//! Components never own decoded assets. They hold an [`AsyncPtr`], a shared
//! slot that a loader fills outside any transaction. Readers poll it: neither
//! [`AsyncPtr::ready`] nor [`AsyncPtr::get`] ever blocks.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::debug;

/// Shared, write-once pointer to an asset that may still be loading.
pub struct AsyncPtr<T> {
    slot: Option<Arc<OnceLock<Arc<T>>>>,
}

impl<T> AsyncPtr<T> {
    /// A pointer with nothing behind it. Never becomes ready.
    #[must_use]
    pub const fn null() -> Self {
        Self { slot: None }
    }

    /// A pointer waiting for [`AsyncPtr::fulfill`].
    #[must_use]
    pub fn pending() -> Self {
        Self {
            slot: Some(Arc::new(OnceLock::new())),
        }
    }

    /// A pointer that is already ready.
    #[must_use]
    pub fn ready_with(value: T) -> Self {
        let ptr = Self::pending();
        ptr.fulfill(value);
        ptr
    }

    /// True if this pointer can never resolve.
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.slot.is_none()
    }

    /// True once the asset has been loaded.
    #[inline]
    #[must_use]
    pub fn ready(&self) -> bool {
        self.slot.as_ref().is_some_and(|slot| slot.get().is_some())
    }

    /// The asset, if loaded.
    #[inline]
    #[must_use]
    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.as_ref()?.get().cloned()
    }

    /// Stores the loaded asset. Every clone observes it.
    ///
    /// # Returns
    ///
    /// False if the pointer is null or was already fulfilled.
    pub fn fulfill(&self, value: T) -> bool {
        self.slot
            .as_ref()
            .is_some_and(|slot| slot.set(Arc::new(value)).is_ok())
    }
}

impl<T> Clone for AsyncPtr<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T> Default for AsyncPtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> PartialEq for AsyncPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.slot, &other.slot) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T> fmt::Debug for AsyncPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.slot {
            None => "null",
            Some(slot) if slot.get().is_some() => "ready",
            Some(_) => "pending",
        };
        write!(f, "AsyncPtr({state})")
    }
}

/// Minimal decoded model description.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Model {
    /// Asset name.
    pub name: String,
    /// Number of meshes.
    pub mesh_count: usize,
    /// Radius of a sphere around the origin that bounds every mesh.
    pub bounds_radius: f32,
}

/// Hands out one shared [`AsyncPtr`] per model name.
#[derive(Default)]
pub struct ModelCache {
    models: Mutex<HashMap<String, AsyncPtr<Model>>>,
}

impl ModelCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The pointer for `name`, creating a pending one on first request.
    #[must_use]
    pub fn request(&self, name: &str) -> AsyncPtr<Model> {
        self.models
            .lock()
            .entry(name.to_owned())
            .or_insert_with(|| {
                debug!(target: "photon::asset", model = name, "model requested");
                AsyncPtr::pending()
            })
            .clone()
    }

    /// Fills the pointer for `model.name`.
    ///
    /// # Returns
    ///
    /// False if the model was already loaded.
    pub fn fulfill(&self, model: Model) -> bool {
        let ptr = self.request(&model.name);
        ptr.fulfill(model)
    }

    /// Names requested but not loaded yet.
    #[must_use]
    pub fn pending(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .models
            .lock()
            .iter()
            .filter(|(_, ptr)| !ptr.ready())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCache")
            .field("models", &self.models.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_never_ready() {
        let ptr = AsyncPtr::<Model>::null();
        assert!(ptr.is_null());
        assert!(!ptr.ready());
        assert!(!ptr.fulfill(Model::default()));
        assert!(ptr.get().is_none());
    }

    #[test]
    fn test_clones_observe_fulfill() {
        let ptr = AsyncPtr::<Model>::pending();
        let clone = ptr.clone();
        assert!(!clone.ready());

        assert!(ptr.fulfill(Model {
            name: "box".into(),
            mesh_count: 1,
            bounds_radius: 0.5,
        }));
        assert!(clone.ready());
        assert_eq!(clone.get().unwrap().name, "box");
        assert!(!ptr.fulfill(Model::default()), "write-once");
        assert_eq!(ptr, clone);
    }

    #[test]
    fn test_cache_shares_pointers() {
        let cache = ModelCache::new();
        let a = cache.request("crate");
        let b = cache.request("crate");
        assert_eq!(a, b);
        assert_eq!(cache.pending(), vec!["crate".to_owned()]);

        cache.fulfill(Model {
            name: "crate".into(),
            ..Model::default()
        });
        assert!(a.ready());
        assert!(cache.pending().is_empty());
    }
}
