//! # Entity References
//!
//! An [`EntityRef`] names an entity and resolves it lazily. It can be created
//! before the target exists and survives the target being unloaded and loaded
//! again: each lookup revalidates the cached handle and falls back to the
//! world's name index.
//!
//! Clones share one cache. Staging and live keep separate cached handles.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EcsResult;
use crate::meta::FieldType;
use crate::sync::Transaction;

use super::entity::Entity;
use super::name::{EntityScope, Name};
use super::world::WorldKind;

struct RefInner {
    name: Name,
    staging: AtomicU64,
    live: AtomicU64,
}

impl RefInner {
    fn new(name: Name) -> Self {
        Self {
            name,
            staging: AtomicU64::new(Entity::NULL.to_bits()),
            live: AtomicU64::new(Entity::NULL.to_bits()),
        }
    }

    fn cache(&self, kind: WorldKind) -> &AtomicU64 {
        match kind {
            WorldKind::Staging => &self.staging,
            WorldKind::Live => &self.live,
        }
    }
}

/// Lazily resolved, name-based reference to an entity.
#[derive(Clone, Default)]
pub struct EntityRef {
    inner: Option<Arc<RefInner>>,
}

impl EntityRef {
    /// A reference that never resolves.
    pub const NULL: Self = Self { inner: None };

    /// Creates a reference to `name`. No world is needed.
    #[must_use]
    pub fn new(name: Name) -> Self {
        if name.is_empty() {
            return Self::NULL;
        }
        Self {
            inner: Some(Arc::new(RefInner::new(name))),
        }
    }

    /// References the entity `e` by its current name, with the cache for the
    /// transaction's world already pointing at `e`.
    ///
    /// # Returns
    ///
    /// [`EntityRef::NULL`] if `e` is stale or has no [`Name`].
    ///
    /// # Panics
    ///
    /// Requires Read on [`Name`].
    #[track_caller]
    #[must_use]
    pub fn from_entity(txn: &Transaction<'_>, e: Entity) -> Self {
        let Some(name) = txn.get::<Name>(e) else {
            return Self::NULL;
        };
        let reference = Self::new(name.clone());
        if let Some(inner) = &reference.inner {
            inner.cache(txn.world_kind()).store(e.to_bits(), Ordering::Release);
        }
        reference
    }

    /// Parses `text` against `scope` and references the result.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EcsError::InvalidName`] for malformed names.
    pub fn parse(text: &str, scope: &EntityScope) -> EcsResult<Self> {
        Name::parse(text, scope).map(Self::new)
    }

    /// True if this reference names nothing.
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.inner.is_none()
    }

    /// The referenced name.
    #[must_use]
    pub fn name(&self) -> Option<&Name> {
        self.inner.as_ref().map(|inner| &inner.name)
    }

    /// Last handle resolved in the live world, without locking or
    /// revalidation. It may be stale; [`EntityRef::get`] is authoritative.
    #[inline]
    #[must_use]
    pub fn live(&self) -> Entity {
        self.cached(WorldKind::Live)
    }

    /// Last handle resolved in the staging world, without locking or
    /// revalidation.
    #[inline]
    #[must_use]
    pub fn staging(&self) -> Entity {
        self.cached(WorldKind::Staging)
    }

    fn cached(&self, kind: WorldKind) -> Entity {
        self.inner.as_ref().map_or(Entity::NULL, |inner| {
            Entity::from_bits(inner.cache(kind).load(Ordering::Acquire))
        })
    }

    /// Resolves the reference in the transaction's world.
    ///
    /// The cached handle is returned if it is still valid and still carries
    /// the referenced name; otherwise the name index is consulted and the
    /// cache refreshed.
    ///
    /// # Returns
    ///
    /// [`Entity::NULL`] if nothing with that name is alive.
    ///
    /// # Panics
    ///
    /// Requires Read on [`Name`].
    #[track_caller]
    #[must_use]
    pub fn get(&self, txn: &Transaction<'_>) -> Entity {
        let Some(inner) = &self.inner else {
            return Entity::NULL;
        };
        let cache = inner.cache(txn.world_kind());

        let cached = Entity::from_bits(cache.load(Ordering::Acquire));
        if txn.valid(cached) && txn.get::<Name>(cached) == Some(&inner.name) {
            return cached;
        }

        let found = txn.find_named(&inner.name);
        cache.store(found.to_bits(), Ordering::Release);
        if found.is_null() {
            tracing::trace!(target: "photon::ecs", name = %inner.name, "entity ref unresolved");
        }
        found
    }

    /// Rewrites a relative name against `scope`.
    ///
    /// The rescoped reference gets a fresh cache; other clones are unchanged.
    pub fn set_scope(&mut self, scope: &EntityScope) {
        let Some(inner) = &self.inner else {
            return;
        };
        if inner.name.is_relative() {
            *self = Self::new(inner.name.scoped(scope));
        }
    }
}

impl From<Name> for EntityRef {
    fn from(name: Name) -> Self {
        Self::new(name)
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for EntityRef {}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "EntityRef({name})"),
            None => f.write_str("EntityRef(NULL)"),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => fmt::Display::fmt(name, f),
            None => Ok(()),
        }
    }
}

impl Serialize for EntityRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EntityRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        if text.is_empty() {
            return Ok(Self::NULL);
        }
        Self::parse(&text, &EntityScope::default()).map_err(de::Error::custom)
    }
}

impl FieldType for EntityRef {
    fn load_field(&mut self, src: &Value) -> Result<(), String> {
        match src {
            Value::Null => *self = Self::NULL,
            Value::String(text) if text.is_empty() => *self = Self::NULL,
            Value::String(text) => {
                *self = Self::parse(text, &EntityScope::default()).map_err(|e| e.to_string())?;
            }
            other => return Err(format!("expected an entity name, found {other}")),
        }
        Ok(())
    }

    fn save_field(&self) -> Value {
        Value::String(self.to_string())
    }

    fn set_scope(&mut self, scope: &EntityScope) {
        Self::set_scope(self, scope);
    }
}
