//! Integration tests for staging-to-live scene loading.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use glam::Vec3;
use photon_core::components::{Light, Physics, Renderable, Transform, TransformSnapshot, TransformTree, View};
use photon_core::script::{register_builtin_scripts, FLASHLIGHT_TOGGLE};
use photon_core::{
    Access, ComponentRegistry, Entity, EntityRef, Event, EventData, EventInput, Name, SceneInfo, SceneManager,
    ScriptRunner,
};
use serde_json::json;

fn manager() -> SceneManager {
    SceneManager::new(ComponentRegistry::builder().with_engine_components().build())
}

fn lamps(count: usize, intensity: f32) -> serde_json::Value {
    let entities = (0..count)
        .map(|i| {
            json!({
                "name": format!("lamp{i}"),
                "light": { "intensity": intensity },
                "transform": { "translate": [i as f32, 0.0, 0.0] }
            })
        })
        .collect::<Vec<_>>();
    json!({ "entities": entities })
}

#[test]
fn test_merge_is_atomic_for_concurrent_readers() {
    const LAMPS: usize = 50;
    const RELOADS: u32 = 30;
    let scenes = Arc::new(manager());
    let done = Arc::new(AtomicBool::new(false));

    let reader_scenes = Arc::clone(&scenes);
    let reader_done = Arc::clone(&done);
    let reader = thread::spawn(move || {
        let mut observed = 0;
        while !reader_done.load(Ordering::Acquire) {
            let txn = reader_scenes
                .live()
                .transaction(Access::new().read::<Light>().read::<SceneInfo>());
            let intensities = txn
                .entities_with::<Light>()
                .into_iter()
                .filter_map(|e| txn.get::<Light>(e).map(|l| l.intensity))
                .collect::<Vec<_>>();
            if intensities.is_empty() {
                continue;
            }
            assert_eq!(intensities.len(), LAMPS, "saw a partially merged scene");
            assert!(
                intensities.iter().all(|&i| i == intensities[0]),
                "saw lamps from two different loads: {intensities:?}"
            );
            observed += 1;
        }
        observed
    });

    for reload in 1..=RELOADS {
        #[allow(clippy::cast_precision_loss)]
        let stats = scenes
            .load_scene_json("hall", &lamps(LAMPS, reload as f32))
            .unwrap();
        if reload > 1 {
            assert_eq!(stats.created, 0);
            assert_eq!(stats.updated, LAMPS);
        }
    }
    done.store(true, Ordering::Release);
    reader.join().unwrap();

    let txn = scenes.live().transaction(Access::new().read::<Light>());
    for e in txn.entities_with::<Light>() {
        assert_eq!(txn.get::<Light>(e).unwrap().intensity, RELOADS as f32);
    }
}

#[test]
fn test_entity_ref_follows_scene_lifetime() {
    let scenes = manager();
    let door = EntityRef::new(Name::new("hall", "door"));

    {
        let txn = scenes.live().transaction(Access::new().read::<Name>());
        assert!(door.get(&txn).is_null());
    }

    scenes
        .load_scene_json("hall", &json!({ "entities": [ { "name": "door", "light": {} } ] }))
        .unwrap();
    let first = {
        let txn = scenes.live().transaction(Access::new().read::<Name>().read::<Light>());
        let e = door.get(&txn);
        assert!(!e.is_null());
        assert!(txn.has::<Light>(e));
        e
    };

    assert_eq!(scenes.remove_scene("hall"), 1);
    {
        let txn = scenes.live().transaction(Access::new().read::<Name>());
        assert!(door.get(&txn).is_null());
        assert!(!txn.valid(first));
    }

    scenes
        .load_scene_json("hall", &json!({ "entities": [ { "name": "door" } ] }))
        .unwrap();
    let txn = scenes.live().transaction(Access::new().read::<Name>());
    let second = door.get(&txn);
    assert!(!second.is_null());
    assert_ne!(second, first);
}

#[test]
fn test_cross_scene_references_resolve_after_both_load() {
    let scenes = manager();
    scenes
        .load_scene_json(
            "player",
            &json!({ "entities": [ {
                "name": "torch",
                "transform": { "parent": "hall:wall", "translate": [0.0, 1.0, 0.0] }
            } ] }),
        )
        .unwrap();

    let torch = Name::new("player", "torch");
    {
        let txn = scenes.live().transaction(Access::new().read::<Name>().read::<TransformTree>());
        let e = txn.find_named(&torch);
        let tree = txn.get::<TransformTree>(e).unwrap();
        assert_eq!(tree.parent.name(), Some(&Name::new("hall", "wall")));
        assert!(tree.parent.get(&txn).is_null());
        assert_eq!(tree.get_global_transform(&txn).position, Vec3::new(0.0, 1.0, 0.0));
    }

    scenes
        .load_scene_json(
            "hall",
            &json!({ "entities": [ { "name": "wall", "transform": { "translate": [5.0, 0.0, 0.0] } } ] }),
        )
        .unwrap();
    let txn = scenes.live().transaction(Access::new().read::<Name>().read::<TransformTree>());
    let e = txn.find_named(&torch);
    let global = txn.get::<TransformTree>(e).unwrap().get_global_transform(&txn);
    assert_eq!(global.position, Vec3::new(5.0, 1.0, 0.0));
}

#[test]
fn test_saved_scene_reloads_identically() {
    let scenes = manager();
    scenes
        .load_scene("hall", |scene| {
            let lamp = scene.new_entity(Some("lamp"))?;
            scene.set(
                lamp,
                Light {
                    intensity: 3.5,
                    color: Vec3::new(1.0, 0.5, 0.25),
                    spot_angle: 0.5,
                    on: false,
                    ..Light::default()
                },
            )?;
            scene.set(
                lamp,
                TransformTree::new(Transform::from_position(Vec3::new(1.0, 2.0, 3.0))),
            )?;

            let cube = scene.new_entity(Some("cube"))?;
            scene.set(
                cube,
                Renderable {
                    model_name: "cube".to_owned(),
                    emissive: 0.75,
                    ..Renderable::default()
                },
            )?;
            scene.set(
                cube,
                Physics {
                    mass: 4.0,
                    dynamic: false,
                    ..Physics::default()
                },
            )?;

            let camera = scene.new_entity(Some("camera"))?;
            scene.set(
                camera,
                View {
                    fov: 1.2,
                    ..View::default()
                },
            )
        })
        .unwrap();
    let saved = scenes.save_scene("hall");

    let copy = manager();
    copy.load_scene_json("hall", &saved).unwrap();
    assert_eq!(copy.save_scene("hall"), saved);

    let txn = copy.live().transaction(Access::read_all());
    let lamp = txn.find_named(&Name::new("hall", "lamp"));
    assert_eq!(txn.get::<Light>(lamp).unwrap().intensity, 3.5);
    assert!(!txn.get::<Light>(lamp).unwrap().on);
    let snapshot = txn.get::<TransformSnapshot>(lamp).unwrap();
    assert_eq!(snapshot.translation(), Vec3::new(1.0, 2.0, 3.0));
    let cube = txn.find_named(&Name::new("hall", "cube"));
    assert!(!txn.get::<Physics>(cube).unwrap().dynamic);
    assert_eq!(txn.get::<Renderable>(cube).unwrap().model_name, "cube");
}

#[test]
fn test_bad_components_are_skipped() {
    let scenes = manager();
    let stats = scenes
        .load_scene_json(
            "hall",
            &json!({ "entities": [
                { "name": "ok", "light": { "intensity": 2.0 } },
                { "name": "bad", "light": { "intensity": "bright" }, "nonexistent": {} },
                "not an object"
            ] }),
        )
        .unwrap();
    assert_eq!(stats.created, 2);

    let txn = scenes.live().transaction(Access::new().read::<Name>().read::<Light>());
    let ok = txn.find_named(&Name::new("hall", "ok"));
    assert_eq!(txn.get::<Light>(ok).unwrap().intensity, 2.0);
    // The malformed field keeps its default; the component still loads.
    let bad = txn.find_named(&Name::new("hall", "bad"));
    assert!(!bad.is_null());
    assert_eq!(txn.get::<Light>(bad).unwrap().intensity, Light::default().intensity);
}

fn torch_scene(with_script: bool) -> serde_json::Value {
    let mut torch = json!({
        "name": "torch",
        "light": { "on": true },
        "transform": {},
        "event_input": {}
    });
    if with_script {
        torch["scripts"] = json!([{ "name": "flashlight" }]);
    }
    json!({ "entities": [torch] })
}

fn toggle(scenes: &SceneManager, torch: Entity) -> usize {
    let txn = scenes.live().transaction(Access::new().write::<EventInput>());
    txn.get::<EventInput>(torch)
        .map_or(0, |input| input.send(&Event::new(FLASHLIGHT_TOGGLE, EventData::None)))
}

fn find(scenes: &SceneManager, name: &Name) -> Entity {
    scenes.live().transaction(Access::new().read::<Name>()).find_named(name)
}

#[test]
fn test_remerge_keeps_pending_events() {
    register_builtin_scripts();
    let scenes = manager();
    scenes.load_scene_json("hall", &torch_scene(true)).unwrap();
    let torch = find(&scenes, &Name::new("hall", "torch"));

    let runner = ScriptRunner::default();
    runner.prepare(scenes.live());
    assert_eq!(toggle(&scenes, torch), 1);

    let stats = scenes.merge("hall").unwrap();
    assert_eq!(stats.updated, 1);
    assert_eq!(find(&scenes, &Name::new("hall", "torch")), torch);

    runner.tick(scenes.live(), Duration::from_millis(8));
    let txn = scenes.live().transaction(Access::new().read::<Light>());
    assert!(!txn.get::<Light>(torch).unwrap().on, "toggle posted before the merge was lost");
}

#[test]
fn test_remerge_unsubscribes_detached_scripts() {
    register_builtin_scripts();
    let scenes = manager();
    scenes.load_scene_json("hall", &torch_scene(true)).unwrap();
    let torch = find(&scenes, &Name::new("hall", "torch"));
    ScriptRunner::default().prepare(scenes.live());
    assert_eq!(toggle(&scenes, torch), 1);

    scenes.load_scene_json("hall", &torch_scene(false)).unwrap();
    assert_eq!(find(&scenes, &Name::new("hall", "torch")), torch);
    assert_eq!(toggle(&scenes, torch), 0);
}

#[test]
fn test_remerge_updates_bookkeeping_in_place() {
    let scenes = manager();
    scenes.load_scene_json("hall", &lamps(3, 1.0)).unwrap();
    let stats = scenes.load_scene_json("hall", &lamps(3, 2.0)).unwrap();
    assert_eq!((stats.created, stats.updated, stats.removed), (0, 3, 0));

    let txn = scenes.live().transaction(
        Access::new()
            .read::<SceneInfo>()
            .read::<TransformSnapshot>()
            .read::<Light>(),
    );
    let entities = txn.entities_with::<SceneInfo>();
    assert_eq!(entities.len(), 3);
    assert_eq!(txn.entities_with::<TransformSnapshot>().len(), 3);
    for e in entities {
        assert_eq!(txn.get::<SceneInfo>(e).unwrap().live_id, e);
        assert_eq!(txn.get::<Light>(e).unwrap().intensity, 2.0);
    }
}
