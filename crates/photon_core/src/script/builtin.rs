//! Scripts shipped with the engine.

use std::f64::consts::FRAC_PI_2;

use glam::{Quat, Vec3};
use tracing::warn;

use crate::components::{Light, LightSensor, Transform, TransformTree};
use crate::ecs::EntityRef;
use crate::meta::{Reflect, StructField};

use super::library::{Script, ScriptContext, ScriptLibrary};
use super::signal::SignalRef;

/// Event that switches a flashlight on or off.
pub const FLASHLIGHT_TOGGLE: &str = "/action/flashlight/toggle";
/// Event that picks a flashlight up or puts it down.
pub const FLASHLIGHT_GRAB: &str = "/action/flashlight/grab";

/// Registers every built-in script in the [`ScriptLibrary`].
pub fn register_builtin_scripts() {
    ScriptLibrary::register::<Flashlight>();
    ScriptLibrary::register::<Sun>();
    ScriptLibrary::register::<LightSensorScript>();
}

// ============================================================================
// FLASHLIGHT
// ============================================================================

/// Drives a [`Light`] from the `on`, `intensity` and `angle` signals and
/// reacts to the toggle and grab events.
#[derive(Clone, Debug, Default)]
pub struct Flashlight {
    /// Entity the flashlight attaches to when grabbed.
    pub parent: EntityRef,
}

impl Flashlight {
    fn grab(&self, ctx: &mut ScriptContext<'_, '_>) {
        let e = ctx.entity;
        let Some(tree) = ctx.txn.get::<TransformTree>(e) else {
            return;
        };

        let (pose, parent) = if !tree.parent.is_null() {
            (tree.get_global_transform(ctx.txn), EntityRef::NULL)
        } else if !self.parent.is_null() {
            (Transform::from_position(Vec3::new(0.0, -0.3, 0.0)), self.parent.clone())
        } else {
            warn!(target: "photon::script", entity = %e, "flashlight has no parent to attach to");
            return;
        };

        if let Some(tree) = ctx.txn.get_mut::<TransformTree>(e) {
            tree.pose = pose;
            tree.parent = parent;
        }
    }
}

impl Reflect for Flashlight {
    fn fields() -> Vec<StructField<Self>> {
        vec![StructField::<Self>::new("parent", |f| &f.parent, |f| &mut f.parent)]
    }
}

impl Script for Flashlight {
    const NAME: &'static str = "flashlight";
    const EVENTS: &'static [&'static str] = &[FLASHLIGHT_TOGGLE, FLASHLIGHT_GRAB];

    fn on_tick(&mut self, ctx: &mut ScriptContext<'_, '_>) {
        let e = ctx.entity;
        if !ctx.txn.has::<Light>(e) || !ctx.txn.has::<TransformTree>(e) {
            return;
        }

        let on_ref = SignalRef::new(e, "on");
        let on = on_ref.value(ctx.txn);
        let intensity = SignalRef::new(e, "intensity").value(ctx.txn);
        let angle = SignalRef::new(e, "angle").value(ctx.txn);
        if let Some(light) = ctx.txn.get_mut::<Light>(e) {
            if let Some(on) = on {
                light.on = on >= 0.5;
            }
            if let Some(intensity) = intensity {
                light.intensity = intensity as f32;
            }
            if let Some(angle) = angle {
                light.spot_angle = (angle as f32).to_radians();
            }
        }

        while let Some(event) = ctx.poll_event() {
            match event.name.as_str() {
                FLASHLIGHT_TOGGLE => {
                    let Some(light) = ctx.txn.get_mut::<Light>(e) else {
                        continue;
                    };
                    light.on = !light.on;
                    let value = if light.on { 1.0 } else { 0.0 };
                    on_ref.set_value(ctx.txn, value);
                }
                FLASHLIGHT_GRAB => self.grab(ctx),
                _ => {}
            }
        }
    }
}

// ============================================================================
// SUN
// ============================================================================

/// Moves a directional light along an arc, advancing the `position` signal
/// unless `fix_position` is set.
#[derive(Clone, Debug, Default)]
pub struct Sun;

impl Reflect for Sun {}

impl Script for Sun {
    const NAME: &'static str = "sun";

    fn on_tick(&mut self, ctx: &mut ScriptContext<'_, '_>) {
        let e = ctx.entity;
        if !ctx.txn.has::<TransformTree>(e) {
            return;
        }

        let position_ref = SignalRef::new(e, "position");
        let mut sun_pos = position_ref.get_signal(ctx.txn);
        if SignalRef::new(e, "fix_position").get_signal(ctx.txn) == 0.0 {
            sun_pos += ctx.interval_secs() * (0.05 + (sun_pos.sin() * 0.1).abs());
            if sun_pos > FRAC_PI_2 {
                sun_pos = -FRAC_PI_2;
            }
            position_ref.set_value(ctx.txn, sun_pos);
        }

        if let Some(tree) = ctx.txn.get_mut::<TransformTree>(e) {
            tree.pose.rotation = Quat::IDENTITY;
            tree.pose.rotate((-90f32).to_radians(), Vec3::X);
            tree.pose.rotate(sun_pos as f32, Vec3::Y);
            tree.pose.position = Vec3::new(sun_pos.sin() as f32 * 40.0, sun_pos.cos() as f32 * 40.0, 0.0);
        }
    }
}

// ============================================================================
// LIGHT SENSOR
// ============================================================================

/// Mirrors a [`LightSensor`] reading into the `light_value_r/g/b` signals.
#[derive(Clone, Debug, Default)]
pub struct LightSensorScript;

impl Reflect for LightSensorScript {}

impl Script for LightSensorScript {
    const NAME: &'static str = "light_sensor";

    fn on_tick(&mut self, ctx: &mut ScriptContext<'_, '_>) {
        let e = ctx.entity;
        let Some(sensor) = ctx.txn.get::<LightSensor>(e) else {
            return;
        };
        let rgb = sensor.illuminance;

        for (signal, value) in [("light_value_r", rgb.x), ("light_value_g", rgb.y), ("light_value_b", rgb.z)] {
            SignalRef::new(e, signal).set_value(ctx.txn, f64::from(value));
        }
    }
}
