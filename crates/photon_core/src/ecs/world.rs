//! # ECS World
//!
//! The container for one copy of the game state: the entity slot table, the
//! name index, and one lock-protected table per registered component type.
//!
//! A world is never accessed directly. Every read and write goes through a
//! [`Transaction`] opened with [`World::transaction`].

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::sync::{Access, Transaction};

use super::component::ComponentRegistry;
use super::entity::{Entity, EntitySlots};
use super::name::Name;
use super::storage::ErasedStorage;

static NEXT_WORLD_ID: AtomicU64 = AtomicU64::new(1);

/// Which of the two runtime worlds this is.
///
/// The derive order is the cross-world lock order: a thread holding a live
/// transaction must not open a staging one. Worlds of the same kind lock in
/// creation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WorldKind {
    /// Scenes are built here off the hot path.
    Staging,
    /// The world every subsystem reads each frame.
    Live,
}

/// State guarded by the structural lock.
#[derive(Debug, Default)]
pub(crate) struct Structure {
    pub slots: EntitySlots,
    pub names: HashMap<Name, Entity>,
}

/// The ECS World.
///
/// # Example
///
/// ```rust,ignore
/// let registry = ComponentRegistry::builder().register::<Light>().build();
/// let world = World::new(WorldKind::Live, registry);
///
/// let mut txn = world.transaction(Access::new().write::<Light>().add_remove());
/// let lamp = txn.new_entity();
/// txn.add(lamp, Light::default())?;
/// txn.commit();
/// ```
pub struct World {
    id: u64,
    kind: WorldKind,
    registry: Arc<ComponentRegistry>,
    /// Slot table and name index. Exclusive only for AddRemove transactions.
    pub(crate) structure: RwLock<Structure>,
    /// One table per component id.
    pub(crate) tables: Box<[RwLock<Box<dyn ErasedStorage>>]>,
    commits: AtomicU64,
}

impl World {
    /// Creates an empty world with a table for every registered type.
    #[must_use]
    pub fn new(kind: WorldKind, registry: Arc<ComponentRegistry>) -> Self {
        Self::with_capacity(kind, registry, 0)
    }

    /// Creates an empty world with slot room for `capacity` entities.
    #[must_use]
    pub fn with_capacity(kind: WorldKind, registry: Arc<ComponentRegistry>, capacity: usize) -> Self {
        let tables = registry
            .iter()
            .map(|info| RwLock::new(info.new_storage()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let id = NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            target: "photon::ecs",
            world = id,
            ?kind,
            tables = tables.len(),
            "world created"
        );

        Self {
            id,
            kind,
            registry,
            structure: RwLock::new(Structure {
                slots: EntitySlots::with_capacity(capacity),
                names: HashMap::new(),
            }),
            tables,
            commits: AtomicU64::new(0),
        }
    }

    /// Process-unique id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Staging or live.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> WorldKind {
        self.kind
    }

    /// The registry this world was built from.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Opens a transaction, blocking until every requested lock is granted.
    ///
    /// # Panics
    ///
    /// Panics on a recursive incompatible request from the same thread, on a
    /// request against the world order, or on an unregistered type.
    #[track_caller]
    pub fn transaction(&self, access: Access) -> Transaction<'_> {
        Transaction::acquire(self, &access)
    }

    /// Number of committed transactions that wrote or changed structure.
    #[inline]
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Acquire)
    }

    pub(crate) fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Release);
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("tables", &self.tables.len())
            .field("commits", &self.commit_count())
            .finish_non_exhaustive()
    }
}
