//! # Entity Component System
//!
//! Entities, component tables, and the two worlds they live in.
//!
//! ## Design Philosophy
//!
//! - Entity handles are index + generation, so stale handles are detectable
//! - Each component type has its own sparse table behind its own lock
//! - Structural state (slots, names) sits behind a separate structural lock
//! - Nothing here is reachable except through a transaction

mod component;
mod entity;
mod entity_ref;
mod name;
mod storage;
mod world;

pub use component::{Component, ComponentId, ComponentInfo, ComponentRegistry, RegistryBuilder};
pub use entity::{Entity, EntitySlots};
pub use entity_ref::EntityRef;
pub use name::{EntityScope, Name};
pub use storage::{ComponentStorage, ErasedStorage};
pub use world::{World, WorldKind};

pub(crate) use world::Structure;
