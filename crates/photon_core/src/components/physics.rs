//! Components shared with the physics subsystem.

use glam::Vec3;
use serde_json::{Map, Value};

use crate::ecs::{Component, Entity};
use crate::meta::{FieldType, Reflect, StructField};

/// Opaque id of an actor owned by the physics subsystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorHandle(pub u64);

/// A rigid body approximated by a sphere.
#[derive(Clone, Debug, PartialEq)]
pub struct Physics {
    /// Bounding sphere radius.
    pub radius: f32,
    /// Mass in kilograms.
    pub mass: f32,
    /// Moved by the simulation when true; static otherwise.
    pub dynamic: bool,
    /// Scale applied to world gravity.
    pub gravity_scale: f32,
    /// Linear velocity in meters per second.
    pub velocity: Vec3,
    /// Actor created for this body. Only the physics subsystem sets this.
    pub actor: Option<ActorHandle>,
}

impl Default for Physics {
    fn default() -> Self {
        Self {
            radius: 0.5,
            mass: 1.0,
            dynamic: true,
            gravity_scale: 1.0,
            velocity: Vec3::ZERO,
            actor: None,
        }
    }
}

impl Reflect for Physics {
    fn fields() -> Vec<StructField<Self>> {
        vec![
            StructField::<Self>::new("radius", |p| &p.radius, |p| &mut p.radius),
            StructField::<Self>::new("mass", |p| &p.mass, |p| &mut p.mass),
            StructField::<Self>::new("dynamic", |p| &p.dynamic, |p| &mut p.dynamic),
            StructField::<Self>::new("gravity_scale", |p| &p.gravity_scale, |p| &mut p.gravity_scale),
            StructField::<Self>::new("velocity", |p| &p.velocity, |p| &mut p.velocity),
        ]
    }
}

impl Component for Physics {
    const NAME: &'static str = "physics";
}

/// Where a raycast stopped.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RaycastHit {
    /// Entity that was hit.
    pub target: Entity,
    /// World-space hit point.
    pub position: Vec3,
    /// Distance from the ray origin.
    pub distance: f32,
}

/// A ray cast from the entity's global position.
#[derive(Clone, Debug, PartialEq)]
pub struct Raycast {
    /// Direction in world space. Need not be normalized.
    pub direction: Vec3,
    /// Longest distance considered.
    pub max_distance: f32,
    /// Filled by the physics subsystem; `None` for a miss.
    pub result: Option<RaycastHit>,
}

impl Default for Raycast {
    fn default() -> Self {
        Self {
            direction: Vec3::NEG_Z,
            max_distance: 100.0,
            result: None,
        }
    }
}

impl Raycast {
    /// A pending query.
    #[must_use]
    pub fn new(direction: Vec3, max_distance: f32) -> Self {
        Self {
            direction,
            max_distance,
            result: None,
        }
    }
}

/// Only the query inputs are data; results are runtime state.
impl FieldType for Raycast {
    fn load_field(&mut self, src: &Value) -> Result<(), String> {
        let mut next = self.clone();
        next.result = None;
        if let Some(direction) = src.get("direction") {
            next.direction.load_field(direction).map_err(|e| format!("direction: {e}"))?;
        }
        if let Some(max_distance) = src.get("max_distance") {
            next.max_distance
                .load_field(max_distance)
                .map_err(|e| format!("max_distance: {e}"))?;
        }
        *self = next;
        Ok(())
    }

    fn save_field(&self) -> Value {
        let mut out = Map::new();
        out.insert("direction".to_owned(), self.direction.save_field());
        out.insert("max_distance".to_owned(), self.max_distance.save_field());
        Value::Object(out)
    }
}

/// Physics questions asked by scripts, answered once per physics tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PhysicsQuery {
    /// Raycasts from this entity.
    pub raycasts: Vec<Raycast>,
}

impl Reflect for PhysicsQuery {
    fn fields() -> Vec<StructField<Self>> {
        vec![StructField::<Self>::new("raycasts", |q| &q.raycasts, |q| &mut q.raycasts)]
    }
}

impl Component for PhysicsQuery {
    const NAME: &'static str = "physics_query";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::StructMetadata;
    use serde_json::json;

    #[test]
    fn test_actor_is_not_data() {
        let meta = StructMetadata::<Physics>::of();
        let body = Physics {
            actor: Some(ActorHandle(7)),
            mass: 2.0,
            ..Physics::default()
        };
        assert_eq!(meta.save(&body, Some(&Physics::default())), json!({ "mass": 2.0 }));
    }

    #[test]
    fn test_raycast_load_clears_result() {
        let mut ray = Raycast {
            result: Some(RaycastHit {
                target: Entity::new(1, 1),
                position: Vec3::ZERO,
                distance: 1.0,
            }),
            ..Raycast::default()
        };
        ray.load_field(&json!({ "direction": [1.0, 0.0, 0.0] })).unwrap();
        assert_eq!(ray.direction, Vec3::X);
        assert_eq!(ray.max_distance, 100.0);
        assert!(ray.result.is_none());
    }

    #[test]
    fn test_query_loads_list() {
        let meta = StructMetadata::<PhysicsQuery>::of();
        let mut query = PhysicsQuery::default();
        meta.load(&mut query, &json!({ "raycasts": [ { "max_distance": 5.0 }, {} ] }))
            .unwrap();
        assert_eq!(query.raycasts.len(), 2);
        assert_eq!(query.raycasts[0].max_distance, 5.0);
    }
}
