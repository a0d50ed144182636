//! # Access Requests
//!
//! An [`Access`] is the unopened form of a transaction: which component types
//! it reads or writes and whether it adds or removes entities and components.
//! Opening it against a world resolves it into [`Permissions`], a pair of
//! bitsets over that world's component ids.

use std::any::{type_name, TypeId};
use std::fmt;

use crate::ecs::{Component, ComponentId, ComponentRegistry};
use crate::error::{fatal, EcsError};

/// How a single component type is accessed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessMode {
    /// Shared, read-only access.
    Read,
    /// Exclusive access. Implies read.
    Write,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Request {
    type_id: TypeId,
    type_name: &'static str,
    mode: AccessMode,
}

/// Description of the component types a transaction needs.
///
/// # Example
///
/// ```rust,ignore
/// let access = Access::new()
///     .read::<Name>()
///     .write::<TransformTree>();
/// let txn = world.transaction(access);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Access {
    requests: Vec<Request>,
    all: Option<AccessMode>,
    add_remove: bool,
}

impl Access {
    /// An empty request. A transaction opened with it can only check entity
    /// validity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shared access to `T`.
    #[must_use]
    pub fn read<T: Component>(self) -> Self {
        self.with::<T>(AccessMode::Read)
    }

    /// Requests exclusive access to `T`.
    #[must_use]
    pub fn write<T: Component>(self) -> Self {
        self.with::<T>(AccessMode::Write)
    }

    fn with<T: Component>(mut self, mode: AccessMode) -> Self {
        self.requests.push(Request {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            mode,
        });
        self
    }

    /// Shared access to every registered type.
    #[must_use]
    pub fn read_all() -> Self {
        Self {
            all: Some(AccessMode::Read),
            ..Self::default()
        }
    }

    /// Exclusive access to every registered type.
    #[must_use]
    pub fn write_all() -> Self {
        Self {
            all: Some(AccessMode::Write),
            ..Self::default()
        }
    }

    /// Permission to create and destroy entities and to add and remove
    /// components. Held exclusively against every other transaction on the
    /// world.
    #[must_use]
    pub fn add_remove(mut self) -> Self {
        self.add_remove = true;
        self
    }

    /// [`Access::write_all`] plus [`Access::add_remove`].
    #[must_use]
    pub fn add_remove_all() -> Self {
        Self::write_all().add_remove()
    }

    /// True if the request includes structural changes.
    #[inline]
    #[must_use]
    pub const fn is_add_remove(&self) -> bool {
        self.add_remove
    }

    /// Resolves type requests into id bitsets.
    ///
    /// # Panics
    ///
    /// Requesting an unregistered type is a programmer error and aborts.
    #[must_use]
    pub fn resolve(&self, registry: &ComponentRegistry) -> Permissions {
        let mut permissions = Permissions::empty(registry.len());
        permissions.add_remove = self.add_remove;

        if let Some(mode) = self.all {
            for info in registry.iter() {
                permissions.grant(info.id(), mode);
            }
        }
        for request in &self.requests {
            let Some(id) = registry.id_of_type(request.type_id) else {
                fatal(EcsError::UnregisteredComponent(request.type_name));
            };
            permissions.grant(id, request.mode);
        }
        permissions
    }
}

// ============================================================================
// PERMISSIONS
// ============================================================================

/// Fixed-size bitset over component ids.
#[derive(Clone, Default, PartialEq, Eq)]
struct TypeSet {
    words: Vec<u64>,
}

impl TypeSet {
    fn with_len(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
        }
    }

    fn insert(&mut self, id: ComponentId) {
        let i = id.index();
        if i / 64 >= self.words.len() {
            self.words.resize(i / 64 + 1, 0);
        }
        self.words[i / 64] |= 1 << (i % 64);
    }

    fn contains(&self, id: ComponentId) -> bool {
        let i = id.index();
        self.words
            .get(i / 64)
            .is_some_and(|w| w & (1 << (i % 64)) != 0)
    }

    fn intersects(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(&other.words)
            .any(|(a, b)| a & b != 0)
    }

    fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }
}

/// Resolved access rights of one transaction.
#[derive(Clone, PartialEq, Eq)]
pub struct Permissions {
    /// Readable ids, including every writable id.
    read: TypeSet,
    /// Writable ids.
    write: TypeSet,
    add_remove: bool,
}

impl Permissions {
    fn empty(len: usize) -> Self {
        Self {
            read: TypeSet::with_len(len),
            write: TypeSet::with_len(len),
            add_remove: false,
        }
    }

    fn grant(&mut self, id: ComponentId, mode: AccessMode) {
        self.read.insert(id);
        if mode == AccessMode::Write {
            self.write.insert(id);
        }
    }

    /// True if `id` may be read.
    #[inline]
    #[must_use]
    pub fn can_read(&self, id: ComponentId) -> bool {
        self.read.contains(id)
    }

    /// True if `id` may be written.
    #[inline]
    #[must_use]
    pub fn can_write(&self, id: ComponentId) -> bool {
        self.write.contains(id)
    }

    /// True if entities and components may be added and removed.
    #[inline]
    #[must_use]
    pub const fn can_add_remove(&self) -> bool {
        self.add_remove
    }

    /// Mode for `id`, or `None` if it was not requested.
    #[must_use]
    pub fn mode(&self, id: ComponentId) -> Option<AccessMode> {
        if self.can_write(id) {
            Some(AccessMode::Write)
        } else if self.can_read(id) {
            Some(AccessMode::Read)
        } else {
            None
        }
    }

    /// True if two transactions holding these rights on the same world must
    /// be ordered.
    ///
    /// ```text
    /// A.add_remove OR B.add_remove                      OR
    /// A.writes ∩ (B.reads ∪ B.writes) ≠ ∅               OR
    /// B.writes ∩ (A.reads ∪ A.writes) ≠ ∅
    /// ```
    #[must_use]
    pub fn conflicts_with(&self, other: &Self) -> bool {
        self.add_remove
            || other.add_remove
            || self.write.intersects(&other.read)
            || other.write.intersects(&self.read)
    }

    /// True if `self` only reads types that `outer` holds read-only.
    pub(crate) fn is_shared_subset_of(&self, outer: &Self) -> bool {
        if self.add_remove || outer.add_remove || !self.write.is_empty() {
            return false;
        }
        self.read.words.iter().enumerate().all(|(i, &wanted)| {
            let outer_read = outer.read.words.get(i).copied().unwrap_or(0);
            let outer_write = outer.write.words.get(i).copied().unwrap_or(0);
            wanted & !(outer_read & !outer_write) == 0
        })
    }

    /// True if nothing was requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.add_remove && self.read.is_empty()
    }
}

impl fmt::Debug for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids = |set: &TypeSet| {
            set.words
                .iter()
                .enumerate()
                .flat_map(|(w, &bits)| {
                    (0..64).filter(move |b| bits & (1 << b) != 0).map(move |b| w * 64 + b)
                })
                .collect::<Vec<_>>()
        };
        f.debug_struct("Permissions")
            .field("read", &ids(&self.read))
            .field("write", &ids(&self.write))
            .field("add_remove", &self.add_remove)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::Name;
    use crate::scene::SceneInfo;
    use crate::script::{Scripts, SignalOutput};

    fn registry() -> std::sync::Arc<ComponentRegistry> {
        ComponentRegistry::builder().build()
    }

    #[test]
    fn test_write_implies_read() {
        let registry = registry();
        let p = Access::new().write::<Name>().resolve(&registry);
        let id = registry.id_of::<Name>();
        assert!(p.can_read(id));
        assert!(p.can_write(id));
        assert_eq!(p.mode(id), Some(AccessMode::Write));
        assert_eq!(p.mode(registry.id_of::<SceneInfo>()), None);
    }

    #[test]
    fn test_no_conflict_both_read() {
        let registry = registry();
        let a = Access::new().read::<Name>().resolve(&registry);
        let b = Access::new().read::<Name>().resolve(&registry);
        assert!(!a.conflicts_with(&b));
    }

    #[test]
    fn test_conflict_read_vs_write() {
        let registry = registry();
        let a = Access::new().read::<Name>().resolve(&registry);
        let b = Access::new().write::<Name>().resolve(&registry);
        assert!(a.conflicts_with(&b));
        assert!(b.conflicts_with(&a));
    }

    #[test]
    fn test_disjoint_writes_do_not_conflict() {
        let registry = registry();
        let a = Access::new()
            .read::<Name>()
            .write::<Scripts>()
            .resolve(&registry);
        let b = Access::new()
            .read::<Name>()
            .write::<SignalOutput>()
            .resolve(&registry);
        assert!(!a.conflicts_with(&b));
    }

    #[test]
    fn test_add_remove_conflicts_with_everything() {
        let registry = registry();
        let a = Access::new().add_remove().resolve(&registry);
        let b = Access::new().resolve(&registry);
        assert!(a.conflicts_with(&b));
        assert!(b.is_empty());
    }

    #[test]
    fn test_shared_subset() {
        let registry = registry();
        let outer = Access::new()
            .read::<Name>()
            .write::<Scripts>()
            .resolve(&registry);
        let reread = Access::new().read::<Name>().resolve(&registry);
        let reread_written = Access::new().read::<Scripts>().resolve(&registry);
        let write = Access::new().write::<Name>().resolve(&registry);

        assert!(reread.is_shared_subset_of(&outer));
        assert!(!reread_written.is_shared_subset_of(&outer));
        assert!(!write.is_shared_subset_of(&outer));
    }

    #[test]
    fn test_write_all_covers_registry() {
        let registry = registry();
        let p = Access::add_remove_all().resolve(&registry);
        assert!(p.can_add_remove());
        assert!(registry.iter().all(|info| p.can_write(info.id())));
    }
}
