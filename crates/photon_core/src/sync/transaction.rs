//! # Transactions
//!
//! A [`Transaction`] is a scoped grant of access to one world.
//!
//! ## Protocol
//!
//! 1. **Acquiring**: the structural lock is taken first (shared, or exclusive
//!    for AddRemove), then one lock per requested component type in ascending
//!    [`ComponentId`] order. Read is shared, Write is exclusive.
//! 2. **Active**: every access is checked against the granted set. A
//!    violation is a programmer error and aborts.
//! 3. **Committing**: on drop or [`Transaction::commit`], table locks are
//!    released in reverse acquisition order, then the structural lock.
//! 4. **Closed**: the value is gone; ownership prevents use after commit.
//!
//! Because every thread acquires in the same global order, transactions can
//! never deadlock on each other. Acquisition is all-or-nothing: a thread is
//! either blocked in [`World::transaction`] or holds every lock it asked for.

use std::any::{type_name, Any};
use std::fmt;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use serde_json::Value;
use tracing::trace;

use crate::ecs::{
    Component, ComponentId, ComponentStorage, Entity, EntityScope, ErasedStorage, Name, Structure,
    World, WorldKind,
};
use crate::error::{fatal, EcsError, EcsResult};
use crate::meta::FieldType;

use super::access::{Access, Permissions};
use super::held::{self, Ticket};

/// Lifecycle of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    /// Described by an [`Access`], no locks held.
    Unopened,
    /// Blocking on locks.
    Acquiring,
    /// All locks held; reads and writes allowed.
    Active,
    /// Releasing locks.
    Committing,
    /// All locks released.
    Closed,
}

enum StructureGuard<'w> {
    Shared(RwLockReadGuard<'w, Structure>),
    Exclusive(RwLockWriteGuard<'w, Structure>),
}

enum TableGuard<'w> {
    Read(RwLockReadGuard<'w, Box<dyn ErasedStorage>>),
    Write(RwLockWriteGuard<'w, Box<dyn ErasedStorage>>),
}

impl TableGuard<'_> {
    fn get(&self) -> &dyn ErasedStorage {
        match self {
            Self::Read(g) => &***g,
            Self::Write(g) => &***g,
        }
    }

    fn get_mut(&mut self) -> Option<&mut dyn ErasedStorage> {
        match self {
            Self::Read(_) => None,
            Self::Write(g) => Some(&mut ***g),
        }
    }
}

#[cold]
#[track_caller]
fn deny(world: &World, id: ComponentId, access: &'static str) -> ! {
    fatal(EcsError::PermissionDenied {
        component: world.registry().info(id).type_name(),
        access,
    })
}

fn as_name<C: 'static>(value: &C) -> Option<&Name> {
    (value as &dyn Any).downcast_ref::<Name>()
}

/// Scoped access to one world.
///
/// # Example
///
/// ```rust,ignore
/// let mut txn = world.transaction(Access::new().read::<Name>().write::<Light>());
/// let lamp = txn.find_named(&Name::new("hall", "lamp"));
/// if let Some(light) = txn.get_mut::<Light>(lamp) {
///     light.on = !light.on;
/// }
/// txn.commit();
/// ```
pub struct Transaction<'w> {
    world: &'w World,
    permissions: Permissions,
    /// Released after every table lock, when the fields drop.
    structure: StructureGuard<'w>,
    /// One slot per component id; `Some` while the table lock is held.
    tables: Vec<Option<TableGuard<'w>>>,
    /// Ids in acquisition order.
    acquired: Vec<ComponentId>,
    ticket: Ticket,
    wrote: bool,
    state: TransactionState,
}

impl<'w> Transaction<'w> {
    #[track_caller]
    pub(crate) fn acquire(world: &'w World, access: &Access) -> Self {
        let permissions = access.resolve(world.registry());
        let ticket = held::enter(world, &permissions);
        let add_remove = permissions.can_add_remove();

        trace!(
            target: "photon::sync",
            world = world.id(),
            kind = ?world.kind(),
            state = ?TransactionState::Acquiring,
            ?permissions,
            "acquiring"
        );

        let structure = if add_remove {
            StructureGuard::Exclusive(world.structure.write())
        } else if ticket.nested {
            StructureGuard::Shared(world.structure.read_recursive())
        } else {
            StructureGuard::Shared(world.structure.read())
        };

        // With the structural lock exclusive no other transaction is open on
        // this world, so taking every table for AddRemove never waits.
        let mut tables = Vec::with_capacity(world.tables.len());
        let mut acquired = Vec::new();
        for (index, lock) in world.tables.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let id = ComponentId(index as u16);
            let guard = if add_remove || permissions.can_write(id) {
                Some(TableGuard::Write(lock.write()))
            } else if permissions.can_read(id) {
                Some(TableGuard::Read(if ticket.nested {
                    lock.read_recursive()
                } else {
                    lock.read()
                }))
            } else {
                None
            };
            if guard.is_some() {
                acquired.push(id);
            }
            tables.push(guard);
        }

        trace!(
            target: "photon::sync",
            world = world.id(),
            state = ?TransactionState::Active,
            tables = acquired.len(),
            "acquired"
        );

        Self {
            world,
            permissions,
            structure,
            tables,
            acquired,
            ticket,
            wrote: false,
            state: TransactionState::Active,
        }
    }

    // ========================================================================
    // INTROSPECTION
    // ========================================================================

    /// The world this transaction is open on.
    #[inline]
    #[must_use]
    pub const fn world(&self) -> &'w World {
        self.world
    }

    /// Staging or live.
    #[inline]
    #[must_use]
    pub const fn world_kind(&self) -> WorldKind {
        self.world.kind()
    }

    /// The granted rights.
    #[inline]
    #[must_use]
    pub const fn permissions(&self) -> &Permissions {
        &self.permissions
    }

    /// Current lifecycle state. Always [`TransactionState::Active`] while the
    /// value is reachable.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> TransactionState {
        self.state
    }

    /// True if `C` may be read.
    #[must_use]
    pub fn can_read<C: Component>(&self) -> bool {
        self.world
            .registry()
            .try_id_of::<C>()
            .is_some_and(|id| self.permissions.can_read(id))
    }

    /// True if `C` may be written.
    #[must_use]
    pub fn can_write<C: Component>(&self) -> bool {
        self.world
            .registry()
            .try_id_of::<C>()
            .is_some_and(|id| self.permissions.can_write(id))
    }

    /// Releases every lock. Equivalent to dropping the transaction.
    pub fn commit(self) {}

    // ========================================================================
    // INTERNAL ACCESS
    // ========================================================================

    fn structure(&self) -> &Structure {
        match &self.structure {
            StructureGuard::Shared(g) => &**g,
            StructureGuard::Exclusive(g) => &**g,
        }
    }

    #[track_caller]
    fn structure_mut(&mut self) -> &mut Structure {
        match &mut self.structure {
            StructureGuard::Exclusive(g) => &mut **g,
            StructureGuard::Shared(_) => fatal(EcsError::PermissionDenied {
                component: "entity structure",
                access: "add/remove",
            }),
        }
    }

    #[track_caller]
    fn check_read(&self, id: ComponentId) {
        if !self.permissions.can_read(id) {
            deny(self.world, id, "read");
        }
    }

    #[track_caller]
    fn check_write(&self, id: ComponentId) {
        if !self.permissions.can_write(id) {
            deny(self.world, id, "write");
        }
    }

    #[track_caller]
    fn check_add_remove(&self, component: &'static str) {
        if !self.permissions.can_add_remove() {
            fatal(EcsError::PermissionDenied {
                component,
                access: "add/remove",
            });
        }
    }

    #[track_caller]
    fn table(&self, id: ComponentId) -> &dyn ErasedStorage {
        match &self.tables[id.index()] {
            Some(guard) => guard.get(),
            None => deny(self.world, id, "read"),
        }
    }

    #[track_caller]
    fn table_mut(&mut self, id: ComponentId) -> &mut dyn ErasedStorage {
        let world = self.world;
        match self.tables[id.index()].as_mut().and_then(|g| g.get_mut()) {
            Some(table) => table,
            None => deny(world, id, "write"),
        }
    }

    #[track_caller]
    fn storage<C: Component>(&self, id: ComponentId) -> &ComponentStorage<C> {
        self.table(id)
            .as_any()
            .downcast_ref()
            .unwrap_or_else(|| fatal(EcsError::UnregisteredComponent(type_name::<C>())))
    }

    #[track_caller]
    fn storage_mut<C: Component>(&mut self, id: ComponentId) -> &mut ComponentStorage<C> {
        self.table_mut(id)
            .as_any_mut()
            .downcast_mut()
            .unwrap_or_else(|| fatal(EcsError::UnregisteredComponent(type_name::<C>())))
    }

    #[track_caller]
    fn id_of<C: Component>(&self) -> ComponentId {
        self.world.registry().id_of::<C>()
    }

    // ========================================================================
    // NAME INDEX
    // ========================================================================

    fn name_of(&self, e: Entity) -> Option<&Name> {
        self.tables[ComponentId::NAME.index()]
            .as_ref()
            .and_then(|g| g.get().as_any().downcast_ref::<ComponentStorage<Name>>())
            .and_then(|s| s.get(e.index()))
    }

    fn check_name_free(&self, e: Entity, name: &Name) -> EcsResult<()> {
        let structure = self.structure();
        match structure.names.get(name) {
            Some(&other) if other != e && structure.slots.is_valid(other) => {
                Err(EcsError::DuplicateName {
                    name: name.to_string(),
                    entity: other,
                })
            }
            _ => Ok(()),
        }
    }

    fn index_name(&mut self, e: Entity, name: Name) {
        if !name.is_empty() {
            self.structure_mut().names.insert(name, e);
        }
    }

    fn unindex_name(&mut self, e: Entity) {
        let Some(old) = self.name_of(e).cloned() else {
            return;
        };
        let names = &mut self.structure_mut().names;
        if names.get(&old) == Some(&e) {
            names.remove(&old);
        }
    }

    // ========================================================================
    // ENTITIES
    // ========================================================================

    /// O(1) validity check. False for stale, null, or never-allocated handles.
    #[inline]
    #[must_use]
    pub fn valid(&self, e: Entity) -> bool {
        self.structure().slots.is_valid(e)
    }

    /// Number of alive entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.structure().slots.alive_count()
    }

    /// Snapshot of every alive entity.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        self.structure().slots.iter().collect()
    }

    /// Creates an entity with no components.
    ///
    /// # Panics
    ///
    /// Requires AddRemove.
    #[track_caller]
    pub fn new_entity(&mut self) -> Entity {
        self.check_add_remove("entity");
        let e = self.structure_mut().slots.allocate();
        self.wrote = true;
        trace!(target: "photon::ecs", entity = %e, kind = ?self.world.kind(), "entity created");
        e
    }

    /// Destroys `e` and every component it holds.
    ///
    /// # Returns
    ///
    /// `false` if the handle was already stale.
    ///
    /// # Panics
    ///
    /// Requires AddRemove.
    #[track_caller]
    pub fn destroy(&mut self, e: Entity) -> bool {
        self.check_add_remove("entity");
        if !self.valid(e) {
            return false;
        }

        self.unindex_name(e);
        for table in self.tables.iter_mut().filter_map(|g| g.as_mut()?.get_mut()) {
            table.remove_slot(e.index());
        }
        self.structure_mut().slots.free(e);
        self.wrote = true;
        trace!(target: "photon::ecs", entity = %e, kind = ?self.world.kind(), "entity destroyed");
        true
    }

    // ========================================================================
    // TYPED COMPONENT ACCESS
    // ========================================================================

    /// Adds `value` to `e`.
    ///
    /// # Errors
    ///
    /// - [`EcsError::StaleEntity`] if `e` is not valid
    /// - [`EcsError::DuplicateComponent`] if `e` already has `C`
    /// - [`EcsError::DuplicateName`] if `C` is [`Name`] and the name is taken
    ///
    /// # Panics
    ///
    /// Requires Write on `C` and AddRemove.
    #[track_caller]
    pub fn add<C: Component>(&mut self, e: Entity, value: C) -> EcsResult<&mut C> {
        let id = self.id_of::<C>();
        self.check_add_remove(type_name::<C>());
        self.check_write(id);
        if !self.valid(e) {
            return Err(EcsError::StaleEntity(e));
        }
        if self.storage::<C>(id).contains(e.index()) {
            return Err(EcsError::DuplicateComponent {
                component: C::NAME,
                entity: e,
            });
        }
        if let Some(name) = as_name(&value) {
            self.check_name_free(e, name)?;
            let name = name.clone();
            self.index_name(e, name);
        }

        self.wrote = true;
        Ok(self.storage_mut::<C>(id).insert_mut(e.index(), value))
    }

    /// Stores `value` on `e`, replacing any existing `C`.
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::add`], minus the duplicate case.
    ///
    /// # Panics
    ///
    /// Requires Write on `C`. AddRemove is required if `e` does not have `C`
    /// yet, and always for [`Name`].
    #[track_caller]
    pub fn set<C: Component>(&mut self, e: Entity, value: C) -> EcsResult<&mut C> {
        let id = self.id_of::<C>();
        self.check_write(id);
        if !self.valid(e) {
            return Err(EcsError::StaleEntity(e));
        }
        if !self.storage::<C>(id).contains(e.index()) {
            return self.add(e, value);
        }
        if let Some(name) = as_name(&value) {
            self.check_add_remove(type_name::<C>());
            self.check_name_free(e, name)?;
            let name = name.clone();
            self.unindex_name(e);
            self.index_name(e, name);
        }

        self.wrote = true;
        Ok(self.storage_mut::<C>(id).insert_mut(e.index(), value))
    }

    /// Removes `C` from `e` and returns it.
    ///
    /// # Panics
    ///
    /// Requires Write on `C` and AddRemove.
    #[track_caller]
    pub fn remove<C: Component>(&mut self, e: Entity) -> Option<C> {
        let id = self.id_of::<C>();
        self.check_add_remove(type_name::<C>());
        self.check_write(id);
        if !self.valid(e) {
            return None;
        }
        if id == ComponentId::NAME {
            self.unindex_name(e);
        }
        let removed = self.storage_mut::<C>(id).remove(e.index());
        self.wrote |= removed.is_some();
        removed
    }

    /// Reads `C` on `e`.
    ///
    /// # Panics
    ///
    /// Requires Read or Write on `C`.
    #[track_caller]
    #[must_use]
    pub fn get<C: Component>(&self, e: Entity) -> Option<&C> {
        let id = self.id_of::<C>();
        self.check_read(id);
        if !self.valid(e) {
            return None;
        }
        self.storage::<C>(id).get(e.index())
    }

    /// Mutates `C` on `e` in place.
    ///
    /// # Panics
    ///
    /// Requires Write on `C`. [`Name`] cannot be mutated in place because the
    /// name index would go stale; use [`Transaction::set`].
    #[track_caller]
    pub fn get_mut<C: Component>(&mut self, e: Entity) -> Option<&mut C> {
        let id = self.id_of::<C>();
        if id == ComponentId::NAME {
            fatal(EcsError::PermissionDenied {
                component: type_name::<Name>(),
                access: "in-place write (names change through set)",
            });
        }
        self.check_write(id);
        if !self.valid(e) {
            return None;
        }
        self.wrote = true;
        self.storage_mut::<C>(id).get_mut(e.index())
    }

    /// True if `e` has `C`.
    ///
    /// # Panics
    ///
    /// Requires Read or Write on `C`.
    #[track_caller]
    #[must_use]
    pub fn has<C: Component>(&self, e: Entity) -> bool {
        let id = self.id_of::<C>();
        self.check_read(id);
        self.valid(e) && self.storage::<C>(id).contains(e.index())
    }

    /// Snapshot of the entities that have `C`.
    ///
    /// # Panics
    ///
    /// Requires Read or Write on `C`.
    #[track_caller]
    #[must_use]
    pub fn entities_with<C: Component>(&self) -> Vec<Entity> {
        let id = self.id_of::<C>();
        self.check_read(id);
        let slots = &self.structure().slots;
        self.table(id)
            .slots()
            .iter()
            .filter_map(|&index| slots.entity_at(index))
            .collect()
    }

    /// Calls `f` for every entity that has `C`, with mutable access.
    ///
    /// # Panics
    ///
    /// Requires Write on `C`, and `C` must not be [`Name`].
    #[track_caller]
    pub fn for_each_mut<C: Component>(&mut self, mut f: impl FnMut(Entity, &mut C)) {
        let id = self.id_of::<C>();
        if id == ComponentId::NAME {
            deny(self.world, id, "in-place write (names change through set)");
        }
        self.check_write(id);
        self.wrote = true;

        let world = self.world;
        let slots = match &self.structure {
            StructureGuard::Shared(g) => &g.slots,
            StructureGuard::Exclusive(g) => &g.slots,
        };
        let Some(table) = self.tables[id.index()].as_mut().and_then(|g| g.get_mut()) else {
            deny(world, id, "write");
        };
        let Some(storage) = table.as_any_mut().downcast_mut::<ComponentStorage<C>>() else {
            fatal(EcsError::UnregisteredComponent(type_name::<C>()));
        };
        for (index, value) in storage.iter_mut() {
            if let Some(e) = slots.entity_at(index) {
                f(e, value);
            }
        }
    }

    /// Looks up an entity by name in the world's index.
    ///
    /// # Returns
    ///
    /// [`Entity::NULL`] if nothing alive has that name.
    ///
    /// # Panics
    ///
    /// Requires Read on [`Name`].
    #[track_caller]
    #[must_use]
    pub fn find_named(&self, name: &Name) -> Entity {
        self.check_read(ComponentId::NAME);
        let structure = self.structure();
        structure
            .names
            .get(name)
            .copied()
            .filter(|&e| structure.slots.is_valid(e))
            .unwrap_or(Entity::NULL)
    }

    // ========================================================================
    // ERASED COMPONENT ACCESS
    // ========================================================================

    /// Readable component types present on `e`, in id order.
    #[must_use]
    pub fn component_ids(&self, e: Entity) -> Vec<ComponentId> {
        if !self.valid(e) {
            return Vec::new();
        }
        self.tables
            .iter()
            .zip(self.world.registry().iter())
            .filter_map(|(guard, info)| {
                let id = info.id();
                (self.permissions.can_read(id) && guard.as_ref()?.get().contains(e.index()))
                    .then_some(id)
            })
            .collect()
    }

    /// Loads structured data into component `id` of `e`, creating it from the
    /// default if absent.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::StaleEntity`] or the field-load error.
    ///
    /// # Panics
    ///
    /// Requires Write on `id` and AddRemove.
    #[track_caller]
    pub fn load_component(&mut self, e: Entity, id: ComponentId, src: &Value) -> EcsResult<()> {
        self.check_add_remove(self.world.registry().info(id).type_name());
        self.check_write(id);
        if !self.valid(e) {
            return Err(EcsError::StaleEntity(e));
        }

        if id == ComponentId::NAME {
            let mut name = Name::default();
            name.load_field(src).map_err(|reason| EcsError::FieldLoad {
                field: Name::NAME.to_owned(),
                reason,
            })?;
            return self.set(e, name).map(|_| ());
        }

        self.table_mut(id).load_slot(e.index(), src)?;
        self.wrote = true;
        Ok(())
    }

    /// Saves component `id` of `e`, omitting default fields.
    ///
    /// # Panics
    ///
    /// Requires Read on `id`.
    #[track_caller]
    #[must_use]
    pub fn save_component(&self, e: Entity, id: ComponentId) -> Option<Value> {
        self.check_read(id);
        if !self.valid(e) {
            return None;
        }
        self.table(id).save_slot(e.index())
    }

    /// Rewrites relative entity names in component `id` of `e`.
    ///
    /// # Panics
    ///
    /// Requires Write on `id`; for [`Name`] also AddRemove.
    #[track_caller]
    pub fn set_scope_component(&mut self, e: Entity, id: ComponentId, scope: &EntityScope) {
        self.check_write(id);
        if !self.valid(e) {
            return;
        }

        if id == ComponentId::NAME {
            let Some(name) = self.name_of(e).cloned() else {
                return;
            };
            let scoped = name.scoped(scope);
            if scoped != name {
                if let Err(err) = self.set(e, scoped) {
                    tracing::warn!(target: "photon::ecs", entity = %e, error = %err, "name not rescoped");
                }
            }
            return;
        }

        self.wrote = true;
        self.table_mut(id).set_scope_slot(e.index(), scope);
    }

    /// Removes component `id` from `e`.
    ///
    /// # Panics
    ///
    /// Requires Write on `id` and AddRemove.
    #[track_caller]
    pub fn remove_component(&mut self, e: Entity, id: ComponentId) -> bool {
        self.check_add_remove(self.world.registry().info(id).type_name());
        self.check_write(id);
        if !self.valid(e) {
            return false;
        }
        if id == ComponentId::NAME {
            self.unindex_name(e);
        }
        let removed = self.table_mut(id).remove_slot(e.index());
        self.wrote |= removed;
        removed
    }

    /// Makes component `id` of `dst` a copy of the same component on `src_e`
    /// in another world, scoped to `scope`. Removes it from `dst` if `src_e`
    /// does not have it.
    ///
    /// # Returns
    ///
    /// True if `dst` has the component afterwards.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] for invalid handles, or a name conflict.
    ///
    /// # Panics
    ///
    /// Requires Read on `id` in `src`, and Write on `id` plus AddRemove here.
    #[track_caller]
    pub fn copy_component_from(
        &mut self,
        src: &Transaction<'_>,
        src_e: Entity,
        dst: Entity,
        id: ComponentId,
        scope: Option<&EntityScope>,
    ) -> EcsResult<bool> {
        src.check_read(id);
        self.check_add_remove(self.world.registry().info(id).type_name());
        self.check_write(id);
        if !src.valid(src_e) {
            return Err(EcsError::StaleEntity(src_e));
        }
        if !self.valid(dst) {
            return Err(EcsError::StaleEntity(dst));
        }

        if id == ComponentId::NAME {
            let Some(name) = src.name_of(src_e) else {
                self.remove_component(dst, id);
                return Ok(false);
            };
            let name = scope.map_or_else(|| name.clone(), |s| name.scoped(s));
            if self.name_of(dst) != Some(&name) {
                self.set(dst, name)?;
            }
            return Ok(true);
        }

        self.wrote = true;
        let dst_table = self.table_mut(id);
        if src.table(id).copy_slot_to(src_e.index(), dst_table, dst.index(), scope) {
            Ok(true)
        } else {
            dst_table.remove_slot(dst.index());
            Ok(false)
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.state = TransactionState::Committing;
        if self.wrote {
            self.world.record_commit();
        }
        while let Some(id) = self.acquired.pop() {
            self.tables[id.index()] = None;
        }
        held::exit(self.ticket.serial);
        self.state = TransactionState::Closed;

        trace!(
            target: "photon::sync",
            world = self.world.id(),
            kind = ?self.world.kind(),
            wrote = self.wrote,
            "committed"
        );
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("world", &self.world.id())
            .field("kind", &self.world.kind())
            .field("permissions", &self.permissions)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::ComponentRegistry;
    use crate::meta::{Reflect, StructField};
    use std::sync::Arc;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Health {
        value: f32,
    }

    impl Reflect for Health {
        fn fields() -> Vec<StructField<Self>> {
            vec![StructField::<Self>::new("value", |h| &h.value, |h| &mut h.value)]
        }
    }

    impl Component for Health {
        const NAME: &'static str = "health";
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Armor {
        rating: u32,
    }

    impl Reflect for Armor {
        fn fields() -> Vec<StructField<Self>> {
            vec![StructField::<Self>::new("rating", |a| &a.rating, |a| &mut a.rating)]
        }
    }

    impl Component for Armor {
        const NAME: &'static str = "armor";
    }

    fn world(kind: WorldKind) -> World {
        let registry = ComponentRegistry::builder()
            .register::<Health>()
            .register::<Armor>()
            .build();
        World::new(kind, registry)
    }

    #[test]
    fn test_add_get_remove() {
        let world = world(WorldKind::Live);
        let mut txn = world.transaction(Access::new().write::<Health>().add_remove());
        let e = txn.new_entity();

        txn.add(e, Health { value: 10.0 }).unwrap();
        assert!(txn.has::<Health>(e));
        assert_eq!(txn.get::<Health>(e), Some(&Health { value: 10.0 }));

        assert!(matches!(
            txn.add(e, Health::default()),
            Err(EcsError::DuplicateComponent { component: "health", .. })
        ));

        assert_eq!(txn.remove::<Health>(e), Some(Health { value: 10.0 }));
        assert!(!txn.has::<Health>(e));
    }

    #[test]
    fn test_writes_visible_to_next_transaction() {
        let world = world(WorldKind::Live);
        let e = {
            let mut txn = world.transaction(Access::new().write::<Health>().add_remove());
            let e = txn.new_entity();
            txn.add(e, Health { value: 1.0 }).unwrap();
            e
        };
        {
            let mut txn = world.transaction(Access::new().write::<Health>());
            txn.get_mut::<Health>(e).unwrap().value = 2.0;
            txn.commit();
        }
        let txn = world.transaction(Access::new().read::<Health>());
        assert_eq!(txn.get::<Health>(e).unwrap().value, 2.0);
        assert_eq!(world.commit_count(), 2);
    }

    #[test]
    fn test_set_upserts() {
        let world = world(WorldKind::Live);
        let mut txn = world.transaction(Access::new().write::<Health>().add_remove());
        let e = txn.new_entity();
        txn.set(e, Health { value: 1.0 }).unwrap();
        txn.set(e, Health { value: 3.0 }).unwrap();
        assert_eq!(txn.get::<Health>(e).unwrap().value, 3.0);
    }

    #[test]
    fn test_destroy_clears_components_and_name() {
        let world = world(WorldKind::Live);
        let mut txn = world.transaction(Access::add_remove_all());
        let e = txn.new_entity();
        txn.add(e, Health::default()).unwrap();
        txn.add(e, Name::new("test", "hero")).unwrap();
        assert_eq!(txn.find_named(&Name::new("test", "hero")), e);

        assert!(txn.destroy(e));
        assert!(!txn.valid(e));
        assert!(!txn.destroy(e));
        assert_eq!(txn.find_named(&Name::new("test", "hero")), Entity::NULL);

        let reused = txn.new_entity();
        assert_eq!(reused.index(), e.index());
        assert!(!txn.has::<Health>(reused));
    }

    #[test]
    fn test_stale_handle_operations() {
        let world = world(WorldKind::Live);
        let mut txn = world.transaction(Access::add_remove_all());
        let e = txn.new_entity();
        txn.destroy(e);

        assert_eq!(txn.get::<Health>(e), None);
        assert!(!txn.has::<Health>(e));
        assert!(txn.remove::<Health>(e).is_none());
        assert_eq!(txn.add(e, Health::default()).unwrap_err(), EcsError::StaleEntity(e));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let world = world(WorldKind::Live);
        let mut txn = world.transaction(Access::add_remove_all());
        let a = txn.new_entity();
        let b = txn.new_entity();
        txn.add(a, Name::new("s", "door")).unwrap();
        assert!(matches!(
            txn.add(b, Name::new("s", "door")),
            Err(EcsError::DuplicateName { .. })
        ));

        txn.set(a, Name::new("s", "gate")).unwrap();
        assert_eq!(txn.find_named(&Name::new("s", "door")), Entity::NULL);
        txn.add(b, Name::new("s", "door")).unwrap();
        assert_eq!(txn.find_named(&Name::new("s", "door")), b);
    }

    #[test]
    fn test_entities_with_and_for_each() {
        let world = world(WorldKind::Live);
        let mut txn = world.transaction(Access::add_remove_all());
        let a = txn.new_entity();
        let b = txn.new_entity();
        txn.add(a, Health { value: 1.0 }).unwrap();
        txn.add(b, Armor { rating: 2 }).unwrap();

        assert_eq!(txn.entities_with::<Health>(), vec![a]);
        txn.for_each_mut::<Health>(|_, h| h.value *= 4.0);
        assert_eq!(txn.get::<Health>(a).unwrap().value, 4.0);
        assert_eq!(txn.entities().len(), 2);
    }

    #[test]
    fn test_erased_load_save() {
        let world = world(WorldKind::Live);
        let id = world.registry().id_of::<Health>();
        let mut txn = world.transaction(Access::add_remove_all());
        let e = txn.new_entity();

        txn.load_component(e, id, &serde_json::json!({ "value": 5.0 }))
            .unwrap();
        assert_eq!(txn.get::<Health>(e).unwrap().value, 5.0);
        assert_eq!(
            txn.save_component(e, id),
            Some(serde_json::json!({ "value": 5.0 }))
        );
        assert_eq!(txn.component_ids(e), vec![id]);
        assert!(txn.remove_component(e, id));
    }

    #[test]
    #[should_panic(expected = "permission denied")]
    fn test_read_without_permission_is_fatal() {
        let world = world(WorldKind::Live);
        let txn = world.transaction(Access::new().read::<Armor>());
        let _ = txn.get::<Health>(Entity::new(0, 1));
    }

    #[test]
    #[should_panic(expected = "permission denied")]
    fn test_write_with_read_permission_is_fatal() {
        let world = world(WorldKind::Live);
        let mut txn = world.transaction(Access::new().read::<Health>());
        let _ = txn.get_mut::<Health>(Entity::new(0, 1));
    }

    #[test]
    #[should_panic(expected = "permission denied")]
    fn test_add_without_add_remove_is_fatal() {
        let world = world(WorldKind::Live);
        let mut txn = world.transaction(Access::new().write::<Health>());
        let _ = txn.new_entity();
    }

    #[test]
    #[should_panic(expected = "names change through set")]
    fn test_name_cannot_be_mutated_in_place() {
        let world = world(WorldKind::Live);
        let mut txn = world.transaction(Access::add_remove_all());
        let e = txn.new_entity();
        txn.add(e, Name::new("s", "a")).unwrap();
        let _ = txn.get_mut::<Name>(e);
    }

    #[test]
    fn test_nested_shared_read_is_allowed() {
        let world = world(WorldKind::Live);
        let outer = world.transaction(Access::new().read::<Health>().write::<Armor>());
        let inner = world.transaction(Access::new().read::<Health>());
        assert_eq!(held::open_transactions(), 2);
        drop(inner);
        drop(outer);
        assert_eq!(held::open_transactions(), 0);
    }

    #[test]
    #[should_panic(expected = "recursive lock acquisition")]
    fn test_recursive_write_is_fatal() {
        let world = world(WorldKind::Live);
        let _outer = world.transaction(Access::new().read::<Health>());
        let _inner = world.transaction(Access::new().write::<Health>());
    }

    #[test]
    #[should_panic(expected = "lock order violation")]
    fn test_live_then_staging_is_fatal() {
        let registry = ComponentRegistry::builder().register::<Health>().build();
        let staging = World::new(WorldKind::Staging, Arc::clone(&registry));
        let live = World::new(WorldKind::Live, registry);
        let _live = live.transaction(Access::new().read::<Health>());
        let _staging = staging.transaction(Access::new().read::<Health>());
    }

    #[test]
    fn test_staging_then_live_is_allowed() {
        let registry = ComponentRegistry::builder().register::<Health>().build();
        let staging = World::new(WorldKind::Staging, Arc::clone(&registry));
        let live = World::new(WorldKind::Live, registry);
        let s = staging.transaction(Access::read_all());
        let l = live.transaction(Access::add_remove_all());
        assert_eq!(s.state(), TransactionState::Active);
        drop(l);
        drop(s);
    }

    #[test]
    #[should_panic(expected = "lock order violation")]
    fn test_two_live_worlds_newest_first_is_fatal() {
        let registry = ComponentRegistry::builder().register::<Health>().build();
        let older = World::new(WorldKind::Live, Arc::clone(&registry));
        let newer = World::new(WorldKind::Live, registry);
        let _newer = newer.transaction(Access::new().read::<Health>());
        let _older = older.transaction(Access::new().read::<Health>());
    }

    #[test]
    fn test_two_live_worlds_in_creation_order_are_allowed() {
        let registry = ComponentRegistry::builder().register::<Health>().build();
        let older = World::new(WorldKind::Live, Arc::clone(&registry));
        let newer = World::new(WorldKind::Live, registry);
        assert!(older.id() < newer.id());
        let a = older.transaction(Access::new().write::<Health>());
        let b = newer.transaction(Access::new().write::<Health>());
        assert_eq!(b.state(), TransactionState::Active);
        drop(b);
        drop(a);
    }

    #[test]
    fn test_copy_component_between_worlds() {
        let registry = ComponentRegistry::builder().register::<Health>().build();
        let staging = World::new(WorldKind::Staging, Arc::clone(&registry));
        let live = World::new(WorldKind::Live, Arc::clone(&registry));
        let health = registry.id_of::<Health>();

        let mut s = staging.transaction(Access::add_remove_all());
        let src = s.new_entity();
        s.add(src, Health { value: 7.0 }).unwrap();
        s.add(src, Name::new("", "hero")).unwrap();
        s.commit();

        let s = staging.transaction(Access::read_all());
        let mut l = live.transaction(Access::add_remove_all());
        let dst = l.new_entity();
        let scope = Name::new("level", "");
        assert!(l
            .copy_component_from(&s, src, dst, health, Some(&scope))
            .unwrap());
        assert!(l
            .copy_component_from(&s, src, dst, ComponentId::NAME, Some(&scope))
            .unwrap());

        assert_eq!(l.get::<Health>(dst).unwrap().value, 7.0);
        assert_eq!(l.find_named(&Name::new("level", "hero")), dst);
    }
}
