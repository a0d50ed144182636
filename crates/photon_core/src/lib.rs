//! # PHOTON Core
//!
//! Transactional entity component storage for a real-time 3D engine.
//!
//! Many threads (logic, physics, rendering, input, scripts) share one world
//! of entities without a global frame lock. Each thread opens a transaction
//! naming the component types it reads and writes; the lock manager grants a
//! consistent view, and writes become visible to later transactions when the
//! transaction ends.
//!
//! ## Architecture Rules
//!
//! 1. **Every access goes through a transaction** - worlds expose nothing else
//! 2. **One lock order** - structural lock, then component ids ascending,
//!    staging world before live world
//! 3. **Programmer errors abort** - permission violations and lock-order
//!    violations are fatal; data-file problems warn and continue
//!
//! ## Example
//!
//! ```rust,ignore
//! use photon_core::{Access, ComponentRegistry, SceneManager};
//! use photon_core::components::Light;
//!
//! let registry = ComponentRegistry::builder().with_engine_components().build();
//! let scenes = SceneManager::new(registry);
//!
//! scenes.load_scene("hall", |scene| {
//!     let lamp = scene.new_entity(Some("lamp"))?;
//!     scene.set(lamp, Light::default())
//! })?;
//!
//! let txn = scenes.live().transaction(Access::new().read::<Light>());
//! for lamp in txn.entities_with::<Light>() {
//!     let light = txn.get::<Light>(lamp);
//! }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod asset;
pub mod components;
pub mod config;
pub mod ecs;
pub mod error;
pub mod meta;
pub mod scene;
pub mod script;
pub mod sync;

pub use config::EngineConfig;
pub use ecs::{
    Component, ComponentId, ComponentRegistry, Entity, EntityRef, EntityScope, Name, RegistryBuilder, World,
    WorldKind,
};
pub use error::{EcsError, EcsResult};
pub use meta::{FieldAction, FieldType, Reflect, StructField, StructMetadata};
pub use scene::{MergeStats, SceneBuilder, SceneInfo, SceneManager};
pub use script::{Event, EventData, EventInput, Script, ScriptContext, ScriptLibrary, ScriptRunner, Scripts};
pub use sync::{Access, Transaction};

#[doc(hidden)]
pub use serde_json as __serde_json;
