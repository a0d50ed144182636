//! # Scenes
//!
//! The staging/live dual-world model.
//!
//! Scenes are built in the **staging** world, where loading can take as long
//! as it needs without touching what subsystems see. A separate [`merge`]
//! step copies a scene into the **live** world inside one AddRemove
//! transaction, so readers of the live world see either the previous version
//! of the scene or the new one, never a mix.
//!
//! [`merge`]: SceneManager::merge

mod builder;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::components::{TransformSnapshot, TransformTree};
use crate::ecs::{Component, ComponentId, ComponentRegistry, Entity, Name, World, WorldKind};
use crate::error::{EcsError, EcsResult};
use crate::meta::{Reflect, StructField};
use crate::script::{EventInput, EventQueue, Scripts};
use crate::sync::{Access, Transaction};

pub use builder::{save_entity, SceneBuilder};

// ============================================================================
// SCENE INFO
// ============================================================================

/// Tags an entity with the scene it came from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SceneInfo {
    /// Origin scene name.
    pub scene: String,
    /// Handle of the entity in the staging world.
    pub staging_id: Entity,
    /// Handle of the merged copy in the live world. Null in staging.
    pub live_id: Entity,
}

impl Reflect for SceneInfo {
    fn fields() -> Vec<StructField<Self>> {
        vec![StructField::<Self>::new("scene", |s| &s.scene, |s| &mut s.scene)]
    }
}

impl Component for SceneInfo {
    const NAME: &'static str = "scene_info";
}

// ============================================================================
// SCENE MANAGER
// ============================================================================

/// Bookkeeping for one loaded scene.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SceneRecord {
    /// Scene name.
    pub name: String,
    /// Entities staged by the last `apply_scene`.
    pub staged_entities: usize,
    /// Entities in live after the last merge.
    pub live_entities: usize,
    /// Number of completed merges.
    pub merges: u64,
}

/// What a merge changed in the live world.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Entities new to live.
    pub created: usize,
    /// Entities updated in place.
    pub updated: usize,
    /// Live entities no longer present in staging.
    pub removed: usize,
}

/// Owns the staging and live worlds and moves scenes between them.
pub struct SceneManager {
    registry: Arc<ComponentRegistry>,
    staging: World,
    live: World,
    scenes: Mutex<BTreeMap<String, SceneRecord>>,
}

impl SceneManager {
    /// Creates both worlds from one registry.
    #[must_use]
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self::with_capacity(registry, 0)
    }

    /// Creates both worlds with slot room for `capacity` entities each.
    #[must_use]
    pub fn with_capacity(registry: Arc<ComponentRegistry>, capacity: usize) -> Self {
        Self {
            staging: World::with_capacity(WorldKind::Staging, Arc::clone(&registry), capacity),
            live: World::with_capacity(WorldKind::Live, Arc::clone(&registry), capacity),
            registry,
            scenes: Mutex::new(BTreeMap::new()),
        }
    }

    /// The shared registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// The staging world.
    #[inline]
    #[must_use]
    pub fn staging(&self) -> &World {
        &self.staging
    }

    /// The live world.
    #[inline]
    #[must_use]
    pub fn live(&self) -> &World {
        &self.live
    }

    /// Builds (or rebuilds) scene `name` in staging.
    ///
    /// Previous staging entities of the scene are destroyed first. `build`
    /// runs inside one AddRemove transaction on staging; the live world is not
    /// touched until [`SceneManager::merge`].
    ///
    /// # Returns
    ///
    /// Number of entities created by `build`.
    ///
    /// # Errors
    ///
    /// Whatever `build` returns. Entities created before the error stay in
    /// staging until the scene is applied again or removed.
    pub fn apply_scene<F>(&self, name: &str, build: F) -> EcsResult<usize>
    where
        F: FnOnce(&mut SceneBuilder<'_, '_>) -> EcsResult<()>,
    {
        let mut txn = self.staging.transaction(Access::add_remove_all());
        let cleared = destroy_scene_entities(&mut txn, name);

        let mut builder = SceneBuilder::new(&mut txn, name);
        let result = build(&mut builder);
        let created = builder.entities().len();
        txn.commit();

        debug!(target: "photon::scene", scene = name, created, cleared, "scene applied to staging");

        self.scenes
            .lock()
            .entry(name.to_owned())
            .and_modify(|r| r.staged_entities = created)
            .or_insert_with(|| SceneRecord {
                name: name.to_owned(),
                staged_entities: created,
                live_entities: 0,
                merges: 0,
            });

        result.map(|()| created)
    }

    /// Copies scene `name` from staging into live atomically.
    ///
    /// Holds Read-all on staging and AddRemove on live (staging first). Live
    /// entities of the scene are updated in place when they still exist in
    /// staging, created when new, and destroyed when gone. Relative entity
    /// names are scoped to the scene, and every `TransformTree` gets a fresh
    /// `TransformSnapshot`.
    ///
    /// An entity updated in place keeps its event subscriptions and the
    /// queues of scripts that are still attached, so events posted before the
    /// merge are still delivered.
    ///
    /// # Errors
    ///
    /// [`EcsError::SceneNotFound`] if the scene was never applied.
    pub fn merge(&self, name: &str) -> EcsResult<MergeStats> {
        if !self.scenes.lock().contains_key(name) {
            return Err(EcsError::SceneNotFound(name.to_owned()));
        }

        let scope = Name::new(name, "");
        let scene_info = self.registry.id_of::<SceneInfo>();
        let mut stats = MergeStats::default();

        let staging = self.staging.transaction(Access::read_all());
        let mut live = self.live.transaction(Access::add_remove_all());

        let staged = scene_entities(&staging, name);
        let current = scene_entities(&live, name);

        let mut by_staging_id = HashMap::new();
        let mut by_name = HashMap::new();
        for &e in &current {
            if let Some(info) = live.get::<SceneInfo>(e) {
                by_staging_id.insert(info.staging_id, e);
            }
            if let Some(entity_name) = live.get::<Name>(e) {
                by_name.insert(entity_name.clone(), e);
            }
        }

        // A staged entity updates the live entity it was merged into before,
        // or failing that the live entity with the same name.
        let mut claimed = HashSet::new();
        let matches: Vec<(Entity, Option<Entity>)> = staged
            .iter()
            .map(|&s| {
                let found = by_staging_id
                    .get(&s)
                    .copied()
                    .or_else(|| {
                        let scoped = staging.get::<Name>(s)?.scoped(&scope);
                        by_name.get(&scoped).copied()
                    })
                    .filter(|e| !claimed.contains(e));
                if let Some(e) = found {
                    claimed.insert(e);
                }
                (s, found)
            })
            .collect();

        for e in current {
            if !claimed.contains(&e) && live.destroy(e) {
                stats.removed += 1;
            }
        }

        let targets: Vec<(Entity, Entity)> = matches
            .into_iter()
            .map(|(s, found)| match found {
                Some(e) => {
                    stats.updated += 1;
                    (s, e)
                }
                None => {
                    stats.created += 1;
                    (s, live.new_entity())
                }
            })
            .collect();

        // Names are cleared first so renames within the scene never collide.
        for &(_, t) in &targets {
            live.remove_component(t, ComponentId::NAME);
        }

        for &(s, t) in &targets {
            let queues = RuntimeQueues::take(&mut live, t);
            for info in self.registry.iter() {
                if info.id() == scene_info {
                    continue;
                }
                if let Err(err) = live.copy_component_from(&staging, s, t, info.id(), Some(&scope)) {
                    warn!(
                        target: "photon::scene",
                        scene = name,
                        component = info.name(),
                        error = %err,
                        "component skipped during merge"
                    );
                }
            }
            queues.restore(&mut live, t);
            let info = SceneInfo {
                scene: name.to_owned(),
                staging_id: s,
                live_id: t,
            };
            if let Err(err) = live.set(t, info) {
                warn!(target: "photon::scene", scene = name, entity = %t, error = %err, "scene info not set");
            }
        }

        if self.registry.try_id_of::<TransformTree>().is_some()
            && self.registry.try_id_of::<TransformSnapshot>().is_some()
        {
            for &(_, t) in &targets {
                if live.has::<TransformTree>(t) && !live.has::<TransformSnapshot>(t) {
                    if let Err(err) = live.add(t, TransformSnapshot::default()) {
                        warn!(target: "photon::scene", scene = name, entity = %t, error = %err, "snapshot not added");
                    }
                }
            }
            TransformSnapshot::update_all(&mut live);
        }

        let live_entities = targets.len();
        drop(live);
        drop(staging);

        if let Some(record) = self.scenes.lock().get_mut(name) {
            record.live_entities = live_entities;
            record.merges += 1;
        }

        info!(
            target: "photon::scene",
            scene = name,
            created = stats.created,
            updated = stats.updated,
            removed = stats.removed,
            "scene merged into live"
        );
        Ok(stats)
    }

    /// [`SceneManager::apply_scene`] followed by [`SceneManager::merge`].
    ///
    /// # Errors
    ///
    /// Errors from either step. Nothing is merged if building fails.
    pub fn load_scene<F>(&self, name: &str, build: F) -> EcsResult<MergeStats>
    where
        F: FnOnce(&mut SceneBuilder<'_, '_>) -> EcsResult<()>,
    {
        self.apply_scene(name, build)?;
        self.merge(name)
    }

    /// Loads a scene from a JSON document and merges it.
    ///
    /// The document has the shape
    /// `{ "entities": [ { "name": "door", "<component>": { ... } } ] }`.
    /// Entities and components that fail to load are skipped with a warning.
    ///
    /// # Errors
    ///
    /// [`EcsError::FieldLoad`] if `entities` is missing or not an array.
    pub fn load_scene_json(&self, name: &str, document: &Value) -> EcsResult<MergeStats> {
        let entities = document
            .get("entities")
            .and_then(Value::as_array)
            .ok_or_else(|| EcsError::FieldLoad {
                field: "entities".to_owned(),
                reason: "scene document needs an `entities` array".to_owned(),
            })?;

        self.load_scene(name, |builder| {
            for (index, entity) in entities.iter().enumerate() {
                if let Err(err) = builder.load_entity(entity) {
                    warn!(target: "photon::scene", scene = name, index, error = %err, "entity skipped");
                }
            }
            Ok(())
        })
    }

    /// Destroys every entity of scene `name` in live, then in staging.
    ///
    /// # Returns
    ///
    /// Number of live entities destroyed.
    pub fn remove_scene(&self, name: &str) -> usize {
        let removed = {
            let mut live = self.live.transaction(Access::add_remove_all());
            destroy_scene_entities(&mut live, name)
        };
        {
            let mut staging = self.staging.transaction(Access::add_remove_all());
            destroy_scene_entities(&mut staging, name);
        }
        self.scenes.lock().remove(name);

        info!(target: "photon::scene", scene = name, removed, "scene removed");
        removed
    }

    /// Saves every live entity of scene `name` as a scene document.
    #[must_use]
    pub fn save_scene(&self, name: &str) -> Value {
        let txn = self.live.transaction(Access::read_all());
        let entities = scene_entities(&txn, name)
            .into_iter()
            .map(|e| save_entity(&txn, e))
            .collect();
        serde_json::json!({ "entities": Value::Array(entities) })
    }

    /// Records for every applied scene, sorted by name.
    #[must_use]
    pub fn loaded_scenes(&self) -> Vec<SceneRecord> {
        self.scenes.lock().values().cloned().collect()
    }
}

impl std::fmt::Debug for SceneManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneManager")
            .field("staging", &self.staging)
            .field("live", &self.live)
            .field("scenes", &self.scenes.lock().len())
            .finish_non_exhaustive()
    }
}

/// Event plumbing of a live entity that outlives a merge. Staging copies
/// carry no queues, so the live subscriptions and script queues are moved
/// out before the copy and handed back after it, pending events included.
struct RuntimeQueues {
    input: Option<EventInput>,
    scripts: Vec<(&'static str, Option<Arc<EventQueue>>)>,
}

impl RuntimeQueues {
    fn take(live: &mut Transaction<'_>, e: Entity) -> Self {
        let input = live.get_mut::<EventInput>(e).map(std::mem::take);
        let scripts = live
            .get_mut::<Scripts>(e)
            .map(|scripts| {
                scripts
                    .iter_mut()
                    .map(|state| (state.name(), state.take_queue()))
                    .collect()
            })
            .unwrap_or_default();
        Self { input, scripts }
    }

    /// A script keeps its queue when the script at the same position has the
    /// same name. Queues left without a script are unsubscribed.
    fn restore(self, live: &mut Transaction<'_>, e: Entity) {
        let mut previous = self.scripts.into_iter();
        let mut orphaned = Vec::new();
        if let Some(scripts) = live.get_mut::<Scripts>(e) {
            for state in scripts.iter_mut() {
                match previous.next() {
                    Some((name, Some(queue))) if name == state.name() => state.adopt_queue(queue),
                    Some((_, Some(queue))) => orphaned.push(queue),
                    _ => {}
                }
            }
        }
        orphaned.extend(previous.filter_map(|(_, queue)| queue));

        let Some(mut input) = self.input else {
            return;
        };
        if let Some(slot) = live.get_mut::<EventInput>(e) {
            for queue in &orphaned {
                input.unregister(queue);
            }
            *slot = input;
        }
    }
}

/// Entities of `scene` visible to `txn`, in slot order.
fn scene_entities(txn: &Transaction<'_>, scene: &str) -> Vec<Entity> {
    let mut entities: Vec<Entity> = txn
        .entities_with::<SceneInfo>()
        .into_iter()
        .filter(|&e| txn.get::<SceneInfo>(e).is_some_and(|info| info.scene == scene))
        .collect();
    entities.sort_unstable_by_key(|e| e.index());
    entities
}

fn destroy_scene_entities(txn: &mut Transaction<'_>, scene: &str) -> usize {
    let doomed = scene_entities(txn, scene);
    doomed.into_iter().filter(|&e| txn.destroy(e)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Light;
    use serde_json::json;

    fn manager() -> SceneManager {
        SceneManager::new(ComponentRegistry::builder().with_engine_components().build())
    }

    #[test]
    fn test_apply_does_not_touch_live() {
        let scenes = manager();
        let created = scenes
            .apply_scene("hall", |b| {
                b.new_entity(Some("lamp"))?;
                Ok(())
            })
            .unwrap();
        assert_eq!(created, 1);

        let live = scenes.live().transaction(Access::new().read::<Name>());
        assert_eq!(live.find_named(&Name::new("hall", "lamp")), Entity::NULL);
        drop(live);

        let staging = scenes.staging().transaction(Access::new().read::<Name>());
        assert!(!staging.find_named(&Name::new("hall", "lamp")).is_null());
    }

    #[test]
    fn test_merge_requires_applied_scene() {
        let scenes = manager();
        assert_eq!(
            scenes.merge("nowhere"),
            Err(EcsError::SceneNotFound("nowhere".to_owned()))
        );
    }

    #[test]
    fn test_merge_updates_in_place() {
        let scenes = manager();
        let first = scenes
            .load_scene("hall", |b| {
                let lamp = b.new_entity(Some("lamp"))?;
                b.set(lamp, Light::default())
            })
            .unwrap();
        assert_eq!(first.created, 1);

        let lamp = {
            let txn = scenes.live().transaction(Access::new().read::<Name>());
            txn.find_named(&Name::new("hall", "lamp"))
        };

        let second = scenes
            .load_scene("hall", |b| {
                let lamp = b.new_entity(Some("lamp"))?;
                b.set(
                    lamp,
                    Light {
                        intensity: 4.0,
                        ..Light::default()
                    },
                )
            })
            .unwrap();
        assert_eq!(second, MergeStats { created: 0, updated: 1, removed: 0 });

        let txn = scenes
            .live()
            .transaction(Access::new().read::<Name>().read::<Light>());
        assert_eq!(txn.find_named(&Name::new("hall", "lamp")), lamp);
        assert_eq!(txn.get::<Light>(lamp).unwrap().intensity, 4.0);
    }

    #[test]
    fn test_remerge_without_reapply_updates() {
        let scenes = manager();
        scenes
            .load_scene("hall", |b| b.new_entity(Some("lamp")).map(|_| ()))
            .unwrap();
        let stats = scenes.merge("hall").unwrap();
        assert_eq!(stats, MergeStats { created: 0, updated: 1, removed: 0 });
    }

    #[test]
    fn test_load_scene_json_and_save() {
        let scenes = manager();
        let doc = json!({
            "entities": [
                { "name": "lamp", "light": { "intensity": 2.5 }, "transform": { "translate": [1.0, 2.0, 3.0] } },
                { "name": "bad name!", "light": {} },
                { "name": "switch", "mystery": { "x": 1 } }
            ]
        });
        let stats = scenes.load_scene_json("hall", &doc).unwrap();
        assert_eq!(stats.created, 2);

        let saved = scenes.save_scene("hall");
        let entities = saved["entities"].as_array().unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0]["name"], json!("hall:lamp"));
        assert_eq!(entities[0]["light"], json!({ "intensity": 2.5 }));

        let records = scenes.loaded_scenes();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].live_entities, 2);
        assert_eq!(records[0].merges, 1);
    }

    #[test]
    fn test_merge_adds_snapshots() {
        let scenes = manager();
        scenes
            .load_scene_json(
                "hall",
                &json!({ "entities": [ { "name": "lamp", "transform": { "translate": [0.0, 5.0, 0.0] } } ] }),
            )
            .unwrap();

        let txn = scenes.live().transaction(
            Access::new()
                .read::<Name>()
                .read::<TransformSnapshot>(),
        );
        let lamp = txn.find_named(&Name::new("hall", "lamp"));
        let snapshot = txn.get::<TransformSnapshot>(lamp).unwrap();
        assert_eq!(snapshot.translation(), glam::Vec3::new(0.0, 5.0, 0.0));
    }

    #[test]
    fn test_remove_scene() {
        let scenes = manager();
        scenes
            .load_scene("hall", |b| {
                b.new_entity(Some("a"))?;
                b.new_entity(Some("b"))?;
                Ok(())
            })
            .unwrap();
        scenes
            .load_scene("garden", |b| b.new_entity(Some("a")).map(|_| ()))
            .unwrap();

        assert_eq!(scenes.remove_scene("hall"), 2);
        assert_eq!(scenes.loaded_scenes().len(), 1);

        let txn = scenes.live().transaction(Access::new().read::<Name>());
        assert_eq!(txn.entity_count(), 1);
        assert!(!txn.find_named(&Name::new("garden", "a")).is_null());
    }
}
