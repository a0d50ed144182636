//! # Engine Components
//!
//! The component types shared with the subsystems outside the core:
//! transforms for everyone, renderables/lights/views for the renderer, and
//! bodies/queries for physics.

mod physics;
mod renderable;
mod transform;

pub use physics::{ActorHandle, Physics, PhysicsQuery, Raycast, RaycastHit};
pub use renderable::{Light, LightSensor, Renderable, View, VisibilityMask};
pub use transform::{Transform, TransformSnapshot, TransformTree, MAX_TREE_DEPTH};

use crate::ecs::RegistryBuilder;

impl RegistryBuilder {
    /// Registers every engine component on top of the core ones.
    #[must_use]
    pub fn with_engine_components(self) -> Self {
        self.register::<TransformTree>()
            .register::<TransformSnapshot>()
            .register::<Renderable>()
            .register::<Light>()
            .register::<View>()
            .register::<LightSensor>()
            .register::<Physics>()
            .register::<PhysicsQuery>()
    }
}
