//! # Component System
//!
//! Components are data containers with reflected fields. Every component
//! type is registered once in a [`ComponentRegistry`] before any world is
//! built; the registry assigns dense [`ComponentId`]s that define the global
//! lock order.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{fatal, EcsError};
use crate::meta::Reflect;
use crate::scene::SceneInfo;
use crate::script::{EventInput, Scripts, SignalOutput};

use super::name::Name;
use super::storage::{ComponentStorage, ErasedStorage};

/// Marker trait for ECS components.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Default, PartialEq)]
/// struct Health { value: f32 }
///
/// impl Reflect for Health {
///     fn fields() -> Vec<StructField<Self>> {
///         vec![StructField::<Self>::new("value", |h| &h.value, |h| &mut h.value)]
///     }
/// }
///
/// impl Component for Health {
///     const NAME: &'static str = "health";
/// }
/// ```
pub trait Component: Reflect + Clone + Default {
    /// Key used for this component in scene files.
    const NAME: &'static str;
}

/// Dense per-registry identifier of a component type.
///
/// Lock acquisition walks component ids in ascending order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ComponentId(pub(crate) u16);

impl ComponentId {
    /// The id of [`Name`], always registered first.
    pub const NAME: Self = Self(0);

    /// Returns the id as a table index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Registry entry for one component type.
#[derive(Clone)]
pub struct ComponentInfo {
    id: ComponentId,
    name: &'static str,
    type_name: &'static str,
    type_id: TypeId,
    factory: fn() -> Box<dyn ErasedStorage>,
}

impl ComponentInfo {
    /// Dense id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.id
    }

    /// Scene-file key.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Rust type name.
    #[inline]
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn new_storage(&self) -> Box<dyn ErasedStorage> {
        (self.factory)()
    }
}

impl fmt::Debug for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Immutable set of registered component types.
///
/// Both worlds of a runtime are built from the same registry, so component
/// ids agree between staging and live.
#[derive(Debug)]
pub struct ComponentRegistry {
    infos: Vec<ComponentInfo>,
    by_type: HashMap<TypeId, ComponentId>,
    by_name: HashMap<&'static str, ComponentId>,
}

impl ComponentRegistry {
    /// Starts a registry with the components the runtime itself relies on:
    /// [`Name`], [`SceneInfo`], [`Scripts`], [`EventInput`], [`SignalOutput`].
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            infos: Vec::new(),
        }
        .register::<Name>()
        .register::<SceneInfo>()
        .register::<Scripts>()
        .register::<EventInput>()
        .register::<SignalOutput>()
    }

    /// Number of registered types.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Always false: the core components are always present.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Id of `T`, or `None` if unregistered.
    #[inline]
    #[must_use]
    pub fn try_id_of<T: Component>(&self) -> Option<ComponentId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Id of `T`.
    ///
    /// # Panics
    ///
    /// Using an unregistered type is a programmer error and aborts.
    #[inline]
    #[must_use]
    #[track_caller]
    pub fn id_of<T: Component>(&self) -> ComponentId {
        self.try_id_of::<T>()
            .unwrap_or_else(|| fatal(EcsError::UnregisteredComponent(type_name::<T>())))
    }

    pub(crate) fn id_of_type(&self, type_id: TypeId) -> Option<ComponentId> {
        self.by_type.get(&type_id).copied()
    }

    /// Id for a scene-file key.
    #[must_use]
    pub fn id_by_name(&self, name: &str) -> Option<ComponentId> {
        self.by_name.get(name).copied()
    }

    /// Entry for an id.
    ///
    /// # Panics
    ///
    /// Panics if `id` came from a different registry.
    #[inline]
    #[must_use]
    pub fn info(&self, id: ComponentId) -> &ComponentInfo {
        &self.infos[id.index()]
    }

    /// All entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentInfo> {
        self.infos.iter()
    }
}

/// Builder for [`ComponentRegistry`].
#[derive(Debug)]
pub struct RegistryBuilder {
    infos: Vec<ComponentInfo>,
}

impl RegistryBuilder {
    /// Registers `T`. Registering the same type twice is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if another type already uses `T::NAME`, or if more than
    /// `u16::MAX` types are registered.
    #[must_use]
    pub fn register<T: Component>(mut self) -> Self {
        let type_id = TypeId::of::<T>();
        if self.infos.iter().any(|info| info.type_id == type_id) {
            return self;
        }
        if let Some(other) = self.infos.iter().find(|info| info.name == T::NAME) {
            panic!(
                "component name `{}` is used by both {} and {}",
                T::NAME,
                other.type_name,
                type_name::<T>()
            );
        }

        let id = u16::try_from(self.infos.len())
            .unwrap_or_else(|_| panic!("too many component types registered"));
        self.infos.push(ComponentInfo {
            id: ComponentId(id),
            name: T::NAME,
            type_name: type_name::<T>(),
            type_id,
            factory: ComponentStorage::<T>::boxed,
        });
        self
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> Arc<ComponentRegistry> {
        let by_type = self.infos.iter().map(|i| (i.type_id, i.id)).collect();
        let by_name = self.infos.iter().map(|i| (i.name, i.id)).collect();
        tracing::debug!(
            target: "photon::ecs",
            components = self.infos.len(),
            "component registry built"
        );
        Arc::new(ComponentRegistry {
            infos: self.infos,
            by_type,
            by_name,
        })
    }
}
