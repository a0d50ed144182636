//! Scene construction inside a staging transaction.

use serde_json::{Map, Value};
use tracing::warn;

use crate::ecs::{Component, Entity, EntityScope, Name};
use crate::error::{EcsError, EcsResult};
use crate::sync::Transaction;

use super::SceneInfo;

/// Creates the entities of one scene in the staging world.
///
/// Every entity created here is tagged with [`SceneInfo`] and every component
/// set or loaded is scoped to the scene, so relative names such as `"door"`
/// become `"<scene>:door"`.
pub struct SceneBuilder<'a, 'w> {
    txn: &'a mut Transaction<'w>,
    scene: String,
    scope: EntityScope,
    created: Vec<Entity>,
}

impl<'a, 'w> SceneBuilder<'a, 'w> {
    pub(crate) fn new(txn: &'a mut Transaction<'w>, scene: &str) -> Self {
        Self {
            txn,
            scene: scene.to_owned(),
            scope: Name::new(scene, ""),
            created: Vec::new(),
        }
    }

    /// Scene being built.
    #[inline]
    #[must_use]
    pub fn scene(&self) -> &str {
        &self.scene
    }

    /// Scope applied to relative names.
    #[inline]
    #[must_use]
    pub fn scope(&self) -> &EntityScope {
        &self.scope
    }

    /// The underlying staging transaction, for direct access.
    #[inline]
    pub fn txn(&mut self) -> &mut Transaction<'w> {
        self.txn
    }

    /// Entities created so far, in creation order.
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.created
    }

    /// Creates a scene entity, optionally named.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidName`] for a malformed name, or
    /// [`EcsError::DuplicateName`] if the scene already has it. Nothing is
    /// created in either case.
    pub fn new_entity(&mut self, name: Option<&str>) -> EcsResult<Entity> {
        let name = name.map(|text| Name::parse(text, &self.scope)).transpose()?;
        if let Some(name) = &name {
            let holder = self.txn.find_named(name);
            if !holder.is_null() {
                return Err(EcsError::DuplicateName {
                    name: name.to_string(),
                    entity: holder,
                });
            }
        }

        let e = self.txn.new_entity();
        if let Some(name) = name {
            self.txn.add(e, name)?;
        }
        self.txn.add(
            e,
            SceneInfo {
                scene: self.scene.clone(),
                staging_id: e,
                live_id: Entity::NULL,
            },
        )?;
        self.created.push(e);
        Ok(e)
    }

    /// Sets component `C` on `e` and scopes it to the scene.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] or a name conflict.
    pub fn set<C: Component>(&mut self, e: Entity, value: C) -> EcsResult<()> {
        self.txn.set(e, value)?;
        let id = self.txn.world().registry().id_of::<C>();
        self.txn.set_scope_component(e, id, &self.scope);
        Ok(())
    }

    /// Loads the component registered under `key` from structured data.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownComponent`] for an unregistered key, otherwise the
    /// field-load error.
    pub fn load_component(&mut self, e: Entity, key: &str, src: &Value) -> EcsResult<()> {
        let registry = self.txn.world().registry();
        let Some(id) = registry.id_by_name(key) else {
            return Err(EcsError::UnknownComponent(key.to_owned()));
        };
        if id == registry.id_of::<SceneInfo>() {
            warn!(target: "photon::scene", scene = %self.scene, "scene_info is managed by the scene, ignored");
            return Ok(());
        }

        self.txn.load_component(e, id, src)?;
        self.txn.set_scope_component(e, id, &self.scope);
        Ok(())
    }

    /// Creates an entity from `{ "name": ..., "<component>": { ... } }`.
    ///
    /// Components that fail to load are skipped with a warning; the entity is
    /// still created.
    ///
    /// # Errors
    ///
    /// [`EcsError::FieldLoad`] if `src` is not an object, or the naming error
    /// from [`SceneBuilder::new_entity`].
    pub fn load_entity(&mut self, src: &Value) -> EcsResult<Entity> {
        let Value::Object(fields) = src else {
            return Err(EcsError::FieldLoad {
                field: "entity".to_owned(),
                reason: format!("expected an object, found {src}"),
            });
        };

        let name = match fields.get(Name::NAME) {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text.as_str()),
            Some(other) => {
                return Err(EcsError::InvalidName {
                    name: other.to_string(),
                    reason: "entity names are strings",
                })
            }
        };
        let e = self.new_entity(name)?;

        for (key, value) in fields {
            if key == Name::NAME {
                continue;
            }
            if let Err(err) = self.load_component(e, key, value) {
                warn!(
                    target: "photon::scene",
                    scene = %self.scene,
                    entity = %e,
                    component = %key,
                    error = %err,
                    "component skipped"
                );
            }
        }
        Ok(e)
    }
}

/// Saves every readable component of `e` except [`SceneInfo`], keyed by
/// registry name. Fields equal to their defaults are omitted.
#[must_use]
pub fn save_entity(txn: &Transaction<'_>, e: Entity) -> Value {
    let registry = txn.world().registry();
    let scene_info = registry.try_id_of::<SceneInfo>();

    let mut out = Map::new();
    for id in txn.component_ids(e) {
        if Some(id) == scene_info {
            continue;
        }
        if let Some(value) = txn.save_component(e, id) {
            out.insert(registry.info(id).name().to_owned(), value);
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{ComponentRegistry, World, WorldKind};
    use crate::sync::Access;
    use crate::components::{Light, TransformTree};
    use serde_json::json;

    fn staging() -> World {
        World::new(
            WorldKind::Staging,
            ComponentRegistry::builder().with_engine_components().build(),
        )
    }

    #[test]
    fn test_new_entity_is_named_and_tagged() {
        let world = staging();
        let mut txn = world.transaction(Access::add_remove_all());
        let mut builder = SceneBuilder::new(&mut txn, "hall");

        let lamp = builder.new_entity(Some("lamp")).unwrap();
        let anon = builder.new_entity(None).unwrap();
        assert_eq!(builder.entities(), &[lamp, anon]);

        assert_eq!(txn.get::<Name>(lamp), Some(&Name::new("hall", "lamp")));
        assert_eq!(txn.get::<Name>(anon), None);
        let info = txn.get::<SceneInfo>(anon).unwrap();
        assert_eq!(info.scene, "hall");
        assert_eq!(info.staging_id, anon);
        assert!(info.live_id.is_null());
    }

    #[test]
    fn test_duplicate_and_invalid_names() {
        let world = staging();
        let mut txn = world.transaction(Access::add_remove_all());
        let mut builder = SceneBuilder::new(&mut txn, "hall");

        builder.new_entity(Some("lamp")).unwrap();
        assert!(matches!(
            builder.new_entity(Some("lamp")),
            Err(EcsError::DuplicateName { .. })
        ));
        assert!(matches!(
            builder.new_entity(Some("bad name")),
            Err(EcsError::InvalidName { .. })
        ));
        assert_eq!(builder.entities().len(), 1);
        assert_eq!(builder.txn().entity_count(), 1);
    }

    #[test]
    fn test_set_scopes_entity_refs() {
        let world = staging();
        let mut txn = world.transaction(Access::add_remove_all());
        let mut builder = SceneBuilder::new(&mut txn, "hall");

        let child = builder.new_entity(Some("child")).unwrap();
        let mut tree = TransformTree::default();
        tree.parent = crate::ecs::EntityRef::parse("root", &EntityScope::default()).unwrap();
        builder.set(child, tree).unwrap();

        let parent = txn.get::<TransformTree>(child).unwrap().parent.clone();
        assert_eq!(parent.name(), Some(&Name::new("hall", "root")));
    }

    #[test]
    fn test_load_entity_skips_bad_components() {
        let world = staging();
        let mut txn = world.transaction(Access::add_remove_all());
        let mut builder = SceneBuilder::new(&mut txn, "hall");

        let e = builder
            .load_entity(&json!({
                "name": "lamp",
                "light": { "intensity": 3.0 },
                "nonexistent": {},
                "scene_info": { "scene": "elsewhere" }
            }))
            .unwrap();

        assert!(matches!(
            builder.load_component(e, "nonexistent", &json!({})),
            Err(EcsError::UnknownComponent(_))
        ));
        assert!(builder.load_entity(&json!([1, 2])).is_err());

        assert_eq!(txn.get::<Light>(e).unwrap().intensity, 3.0);
        assert_eq!(txn.get::<SceneInfo>(e).unwrap().scene, "hall");
    }

    #[test]
    fn test_save_entity_omits_scene_info_and_defaults() {
        let world = staging();
        let mut txn = world.transaction(Access::add_remove_all());
        let mut builder = SceneBuilder::new(&mut txn, "hall");
        let e = builder
            .load_entity(&json!({ "name": "lamp", "light": { "on": false } }))
            .unwrap();

        let saved = save_entity(&txn, e);
        assert_eq!(saved, json!({ "name": "hall:lamp", "light": { "on": false } }));
    }
}
