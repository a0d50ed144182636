//! # Physics Bridge
//!
//! The physics thread owns every [`ActorHandle`]. Each step it:
//! - assigns actors to new [`Physics`] bodies and reclaims the actors of
//!   bodies that are gone
//! - integrates velocity and gravity into root [`TransformTree`] poses
//! - answers [`PhysicsQuery`] raycasts against body bounding spheres
//!
//! [`KinematicPhysics`] is the bundled bridge. A full rigid-body engine
//! plugs in through the same [`PhysicsBridge`] trait.

use std::collections::HashMap;
use std::time::Duration;

use glam::Vec3;
use photon_core::components::{ActorHandle, Physics, PhysicsQuery, RaycastHit, TransformTree};
use photon_core::{Access, Entity, Name, Transaction, World};
use tracing::{debug, trace};

/// What one physics step did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhysicsStats {
    /// Bodies seen.
    pub bodies: usize,
    /// Actors created this step.
    pub actors_created: usize,
    /// Actors reclaimed from removed bodies this step.
    pub actors_released: usize,
    /// Raycasts answered.
    pub raycasts: usize,
    /// Raycasts that hit a body.
    pub hits: usize,
}

/// A physics simulation attached to a world.
pub trait PhysicsBridge: Send {
    /// Advances the simulation by `interval` and writes results back.
    fn step(&mut self, world: &World, interval: Duration) -> PhysicsStats;
}

/// Sphere bodies moving under gravity, no collision response.
#[derive(Debug)]
pub struct KinematicPhysics {
    gravity: Vec3,
    next_actor: u64,
    /// Owner of every handed-out actor.
    actors: HashMap<ActorHandle, Entity>,
    /// Released handles, reused before new ones are minted.
    free: Vec<ActorHandle>,
}

impl KinematicPhysics {
    /// Creates a simulation with the given gravity in m/s².
    #[must_use]
    pub fn new(gravity: Vec3) -> Self {
        Self {
            gravity,
            next_actor: 1,
            actors: HashMap::new(),
            free: Vec::new(),
        }
    }

    /// Number of actors currently owned by bodies.
    #[inline]
    #[must_use]
    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// World gravity.
    #[inline]
    #[must_use]
    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    /// Gives every body an actor and reclaims actors whose body is gone.
    ///
    /// A body keeps its actor only while the actor is recorded as its own. A
    /// body copied with another body's actor gets a fresh one.
    fn assign_actors(&mut self, txn: &mut Transaction<'_>) -> (usize, usize) {
        let mut created = 0;
        let mut owners = HashMap::with_capacity(self.actors.len());
        let (actors, free, next) = (&self.actors, &mut self.free, &mut self.next_actor);

        txn.for_each_mut::<Physics>(|e, body| {
            let kept = body
                .actor
                .filter(|handle| actors.get(handle) == Some(&e) && !owners.contains_key(handle));
            let handle = kept.unwrap_or_else(|| {
                created += 1;
                free.pop().unwrap_or_else(|| {
                    let handle = ActorHandle(*next);
                    *next += 1;
                    handle
                })
            });
            body.actor = Some(handle);
            owners.insert(handle, e);
        });

        let released: Vec<ActorHandle> = self
            .actors
            .keys()
            .filter(|handle| !owners.contains_key(handle))
            .copied()
            .collect();
        for &handle in &released {
            debug!(target: "photon::physics", actor = handle.0, "actor released");
        }
        self.free.extend_from_slice(&released);
        self.actors = owners;
        (created, released.len())
    }

    fn integrate(&self, txn: &mut Transaction<'_>, dt: f32) -> usize {
        let bodies = txn.entities_with::<Physics>();
        for &e in &bodies {
            let is_root = txn
                .get::<TransformTree>(e)
                .is_some_and(|tree| tree.parent.is_null());
            let Some(body) = txn.get_mut::<Physics>(e) else {
                continue;
            };
            if !body.dynamic || !is_root {
                continue;
            }
            body.velocity += self.gravity * body.gravity_scale * dt;
            let velocity = body.velocity;
            if let Some(tree) = txn.get_mut::<TransformTree>(e) {
                tree.pose.position += velocity * dt;
            }
        }
        bodies.len()
    }

    fn answer_raycasts(txn: &mut Transaction<'_>) -> (usize, usize) {
        let answers = {
            let view: &Transaction<'_> = txn;
            let spheres: Vec<(Entity, Vec3, f32)> = view
                .entities_with::<Physics>()
                .into_iter()
                .filter_map(|e| Some((e, global_position(view, e)?, view.get::<Physics>(e)?.radius)))
                .collect();

            let mut answers = Vec::new();
            for e in view.entities_with::<PhysicsQuery>() {
                let origin = global_position(view, e).unwrap_or(Vec3::ZERO);
                let Some(query) = view.get::<PhysicsQuery>(e) else {
                    continue;
                };
                let results: Vec<Option<RaycastHit>> = query
                    .raycasts
                    .iter()
                    .map(|ray| {
                        let direction = ray.direction.normalize_or_zero();
                        spheres
                            .iter()
                            .filter(|(target, _, _)| *target != e)
                            .filter_map(|&(target, center, radius)| {
                                let distance = ray_sphere(origin, direction, center, radius)?;
                                (distance <= ray.max_distance).then_some(RaycastHit {
                                    target,
                                    position: origin + direction * distance,
                                    distance,
                                })
                            })
                            .min_by(|a, b| a.distance.total_cmp(&b.distance))
                    })
                    .collect();
                answers.push((e, results));
            }
            answers
        };

        let mut raycasts = 0;
        let mut hits = 0;
        for (e, results) in answers {
            let Some(query) = txn.get_mut::<PhysicsQuery>(e) else {
                continue;
            };
            for (ray, result) in query.raycasts.iter_mut().zip(results) {
                raycasts += 1;
                hits += usize::from(result.is_some());
                ray.result = result;
            }
        }
        (raycasts, hits)
    }
}

impl Default for KinematicPhysics {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, -9.81, 0.0))
    }
}

impl PhysicsBridge for KinematicPhysics {
    fn step(&mut self, world: &World, interval: Duration) -> PhysicsStats {
        let mut txn = world.transaction(
            Access::new()
                .read::<Name>()
                .write::<Physics>()
                .write::<TransformTree>()
                .write::<PhysicsQuery>(),
        );

        let (actors_created, actors_released) = self.assign_actors(&mut txn);
        let bodies = self.integrate(&mut txn, interval.as_secs_f32());
        let (raycasts, hits) = Self::answer_raycasts(&mut txn);

        trace!(
            target: "photon::physics",
            bodies,
            actors_created,
            actors_released,
            raycasts,
            hits,
            "physics step"
        );
        PhysicsStats {
            bodies,
            actors_created,
            actors_released,
            raycasts,
            hits,
        }
    }
}

fn global_position(txn: &Transaction<'_>, e: Entity) -> Option<Vec3> {
    let tree = txn.get::<TransformTree>(e)?;
    Some(tree.global_matrix(txn).w_axis.truncate())
}

/// Distance along a unit `direction` to the first sphere surface in front of
/// `origin`. An origin inside the sphere hits the far side.
fn ray_sphere(origin: Vec3, direction: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    if direction == Vec3::ZERO {
        return None;
    }
    let offset = origin - center;
    let b = offset.dot(direction);
    let c = offset.length_squared() - radius * radius;
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let root = discriminant.sqrt();
    [-b - root, -b + root].into_iter().find(|&t| t >= 0.0)
}
