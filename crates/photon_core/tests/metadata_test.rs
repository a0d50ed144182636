//! Integration test for structured-data round trips of every engine component.

use glam::{Quat, UVec2, Vec2, Vec3, Vec4};
use photon_core::components::{
    Light, LightSensor, Physics, PhysicsQuery, Raycast, Renderable, Transform, TransformTree, View,
    VisibilityMask,
};
use photon_core::script::{register_builtin_scripts, Flashlight, SignalOutput};
use photon_core::{
    Access, ComponentId, ComponentRegistry, EntityRef, Name, SceneInfo, Scripts, World, WorldKind,
};

fn populated(world: &World) -> photon_core::Entity {
    let mut txn = world.transaction(Access::add_remove_all());
    let e = txn.new_entity();
    txn.add(e, Name::new("hall", "sensor")).unwrap();

    let mut pose = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
    pose.rotation = Quat::from_rotation_y(0.5);
    pose.scale = Vec3::splat(2.0);
    txn.add(
        e,
        TransformTree {
            pose,
            parent: EntityRef::new(Name::new("hall", "table")),
        },
    )
    .unwrap();

    let renderable = Renderable {
        model_name: "lamp_model".to_owned(),
        mesh_index: 2,
        visibility: VisibilityMask::DIRECT_EYE.union(VisibilityMask::LIGHTING_SHADOW),
        emissive: 0.5,
        color_override: Vec4::new(1.0, 0.0, 0.0, 1.0),
        metallic_roughness_override: Vec2::new(0.25, 0.75),
        ..Renderable::default()
    };
    txn.add(e, renderable).unwrap();

    txn.add(
        e,
        Light {
            intensity: 4.0,
            illuminance: 2.0,
            color: Vec3::new(0.5, 0.5, 1.0),
            spot_angle: 0.25,
            on: false,
        },
    )
    .unwrap();
    txn.add(
        e,
        View {
            extents: UVec2::new(640, 480),
            fov: 1.0,
            clip: Vec2::new(0.5, 50.0),
            visibility: VisibilityMask::DIRECT_CAMERA.union(VisibilityMask::OPTICS),
        },
    )
    .unwrap();
    // Readings are outputs and are never loaded, so they stay default here.
    txn.add(
        e,
        LightSensor {
            position: Vec3::new(0.0, 1.0, 0.0),
            direction: Vec3::Y,
            ..LightSensor::default()
        },
    )
    .unwrap();
    txn.add(
        e,
        Physics {
            radius: 0.25,
            mass: 3.0,
            dynamic: false,
            gravity_scale: 0.5,
            velocity: Vec3::new(0.0, 1.0, 0.0),
            actor: None,
        },
    )
    .unwrap();
    txn.add(
        e,
        PhysicsQuery {
            raycasts: vec![Raycast::new(Vec3::X, 10.0)],
        },
    )
    .unwrap();

    let mut signals = SignalOutput::default();
    signals.set("on", 1.0);
    signals.set("intensity", 0.5);
    txn.add(e, signals).unwrap();

    let mut scripts = Scripts::default();
    scripts.add(Flashlight {
        parent: EntityRef::new(Name::new("player", "hand")),
    });
    txn.add(e, scripts).unwrap();
    e
}

#[test]
fn test_every_component_survives_save_then_load() {
    register_builtin_scripts();
    let registry = ComponentRegistry::builder().with_engine_components().build();
    let world = World::new(WorldKind::Staging, registry);
    let registry = world.registry();
    let source = populated(&world);

    let mut txn = world.transaction(Access::add_remove_all());
    let copy = txn.new_entity();
    let mut checked = 0;

    for info in registry.iter() {
        let id = info.id();
        // Names are unique per world and scene bookkeeping is not scene data.
        if id == ComponentId::NAME || id == registry.id_of::<SceneInfo>() {
            continue;
        }
        let Some(saved) = txn.save_component(source, id) else {
            continue;
        };
        txn.load_component(copy, id, &saved).unwrap();
        assert_eq!(
            txn.save_component(copy, id),
            Some(saved),
            "{} changed across save and load",
            info.name()
        );
        checked += 1;
    }
    assert_eq!(checked, txn.component_ids(source).len() - 1);

    assert_eq!(txn.get::<Light>(copy), txn.get::<Light>(source));
    assert_eq!(txn.get::<Scripts>(copy), txn.get::<Scripts>(source));
    assert_eq!(
        txn.get::<TransformTree>(copy).unwrap().parent.name(),
        Some(&Name::new("hall", "table"))
    );
}

#[test]
fn test_defaults_save_as_empty_objects() {
    let registry = ComponentRegistry::builder().with_engine_components().build();
    let world = World::new(WorldKind::Staging, registry);
    let mut txn = world.transaction(Access::add_remove_all());
    let e = txn.new_entity();
    txn.add(e, Light::default()).unwrap();
    txn.add(e, Physics::default()).unwrap();
    txn.add(e, TransformTree::default()).unwrap();

    for id in txn.component_ids(e) {
        assert_eq!(txn.save_component(e, id), Some(serde_json::json!({})));
    }
}
