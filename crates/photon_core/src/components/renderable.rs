//! Components consumed by the renderer: models, lights, views and light
//! sensors.

use glam::{Mat4, UVec2, Vec2, Vec3, Vec4};
use serde_json::Value;

use crate::asset::{AsyncPtr, Model};
use crate::ecs::Component;
use crate::meta::{FieldAction, FieldType, Reflect, StructField};

// ============================================================================
// VISIBILITY
// ============================================================================

/// Which passes an object or a view takes part in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VisibilityMask(pub u32);

impl VisibilityMask {
    /// No passes.
    pub const NONE: Self = Self(0);
    /// Seen by flat-screen cameras.
    pub const DIRECT_CAMERA: Self = Self(1);
    /// Seen by XR eyes.
    pub const DIRECT_EYE: Self = Self(1 << 1);
    /// Drawn in the transparent pass.
    pub const TRANSPARENT: Self = Self(1 << 2);
    /// Casts shadows.
    pub const LIGHTING_SHADOW: Self = Self(1 << 3);
    /// Contributes to voxel lighting.
    pub const LIGHTING_VOXEL: Self = Self(1 << 4);
    /// Seen by optical elements.
    pub const OPTICS: Self = Self(1 << 5);
    /// Drawn with a selection outline.
    pub const OUTLINE_SELECTION: Self = Self(1 << 6);

    const NAMES: [(&'static str, Self); 7] = [
        ("direct_camera", Self::DIRECT_CAMERA),
        ("direct_eye", Self::DIRECT_EYE),
        ("transparent", Self::TRANSPARENT),
        ("lighting_shadow", Self::LIGHTING_SHADOW),
        ("lighting_voxel", Self::LIGHTING_VOXEL),
        ("optics", Self::OPTICS),
        ("outline_selection", Self::OUTLINE_SELECTION),
    ];

    /// True if every bit of `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of both masks.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl Default for VisibilityMask {
    fn default() -> Self {
        Self::DIRECT_CAMERA
            .union(Self::DIRECT_EYE)
            .union(Self::LIGHTING_SHADOW)
            .union(Self::LIGHTING_VOXEL)
    }
}

/// Loads from a list of pass names, or a single name.
impl FieldType for VisibilityMask {
    fn load_field(&mut self, src: &Value) -> Result<(), String> {
        let names: Vec<&str> = match src {
            Value::String(name) => vec![name.as_str()],
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().ok_or_else(|| format!("expected a pass name, found {item}")))
                .collect::<Result<_, _>>()?,
            other => return Err(format!("expected pass names, found {other}")),
        };

        let mut mask = Self::NONE;
        for name in names {
            let Some((_, bit)) = Self::NAMES.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)) else {
                return Err(format!("unknown visibility pass `{name}`"));
            };
            mask = mask.union(*bit);
        }
        *self = mask;
        Ok(())
    }

    fn save_field(&self) -> Value {
        Value::Array(
            Self::NAMES
                .iter()
                .filter(|(_, bit)| self.contains(*bit))
                .map(|(name, _)| Value::String((*name).to_owned()))
                .collect(),
        )
    }
}

// ============================================================================
// RENDERABLE
// ============================================================================

/// A mesh of a model, drawn at the entity's [`super::TransformSnapshot`].
#[derive(Clone, Debug, PartialEq)]
pub struct Renderable {
    /// Model asset name.
    pub model_name: String,
    /// Loaded model, filled in by the asset loader.
    pub model: AsyncPtr<Model>,
    /// Mesh within the model.
    pub mesh_index: usize,
    /// Passes this object appears in.
    pub visibility: VisibilityMask,
    /// Emissive multiplier.
    pub emissive: f32,
    /// Base color override. Negative components keep the material color.
    pub color_override: Vec4,
    /// Metallic/roughness override. Negative components keep the material.
    pub metallic_roughness_override: Vec2,
}

impl Default for Renderable {
    fn default() -> Self {
        Self {
            model_name: String::new(),
            model: AsyncPtr::null(),
            mesh_index: 0,
            visibility: VisibilityMask::default(),
            emissive: 0.0,
            color_override: Vec4::splat(-1.0),
            metallic_roughness_override: Vec2::splat(-1.0),
        }
    }
}

impl Renderable {
    /// Renders mesh 0 of `model`.
    #[must_use]
    pub fn new(model_name: impl Into<String>, model: AsyncPtr<Model>) -> Self {
        Self {
            model_name: model_name.into(),
            model,
            ..Self::default()
        }
    }

    /// True if every pass in `view_mask` includes this object.
    #[inline]
    #[must_use]
    pub fn is_visible(&self, view_mask: VisibilityMask) -> bool {
        self.visibility.contains(view_mask)
    }
}

impl Reflect for Renderable {
    fn fields() -> Vec<StructField<Self>> {
        vec![
            StructField::<Self>::new("model", |r| &r.model_name, |r| &mut r.model_name),
            StructField::<Self>::new("mesh_index", |r| &r.mesh_index, |r| &mut r.mesh_index),
            StructField::<Self>::new("visibility", |r| &r.visibility, |r| &mut r.visibility),
            StructField::<Self>::new("emissive", |r| &r.emissive, |r| &mut r.emissive),
            StructField::<Self>::new("color_override", |r| &r.color_override, |r| &mut r.color_override),
            StructField::<Self>::new(
                "metallic_roughness_override",
                |r| &r.metallic_roughness_override,
                |r| &mut r.metallic_roughness_override,
            ),
        ]
    }
}

impl Component for Renderable {
    const NAME: &'static str = "renderable";
}

// ============================================================================
// LIGHT
// ============================================================================

/// A point or spot light.
#[derive(Clone, Debug, PartialEq)]
pub struct Light {
    /// Output scale.
    pub intensity: f32,
    /// Illuminance at one meter, for photometric lights. Zero uses `intensity`.
    pub illuminance: f32,
    /// Linear RGB color.
    pub color: Vec3,
    /// Spot cone half-angle in radians. Zero for a point light.
    pub spot_angle: f32,
    /// Whether the light emits at all.
    pub on: bool,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            intensity: 1.0,
            illuminance: 0.0,
            color: Vec3::ONE,
            spot_angle: 0.0,
            on: true,
        }
    }
}

impl Reflect for Light {
    fn fields() -> Vec<StructField<Self>> {
        vec![
            StructField::<Self>::new("intensity", |l| &l.intensity, |l| &mut l.intensity),
            StructField::<Self>::new("illuminance", |l| &l.illuminance, |l| &mut l.illuminance),
            StructField::<Self>::new("color", |l| &l.color, |l| &mut l.color),
            StructField::<Self>::new("spot_angle", |l| &l.spot_angle, |l| &mut l.spot_angle),
            StructField::<Self>::new("on", |l| &l.on, |l| &mut l.on),
        ]
    }
}

impl Component for Light {
    const NAME: &'static str = "light";
}

// ============================================================================
// VIEW
// ============================================================================

/// A camera.
#[derive(Clone, Debug, PartialEq)]
pub struct View {
    /// Target size in pixels.
    pub extents: UVec2,
    /// Vertical field of view in radians.
    pub fov: f32,
    /// Near and far clip distances.
    pub clip: Vec2,
    /// Passes this view renders.
    pub visibility: VisibilityMask,
}

impl Default for View {
    fn default() -> Self {
        Self {
            extents: UVec2::new(1920, 1080),
            fov: 60f32.to_radians(),
            clip: Vec2::new(0.1, 256.0),
            visibility: VisibilityMask::DIRECT_CAMERA,
        }
    }
}

impl View {
    /// Width over height. One for an empty target.
    #[must_use]
    pub fn aspect(&self) -> f32 {
        if self.extents.y == 0 {
            return 1.0;
        }
        self.extents.x as f32 / self.extents.y as f32
    }

    /// Right-handed perspective projection.
    #[must_use]
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect(), self.clip.x, self.clip.y)
    }
}

impl Reflect for View {
    fn fields() -> Vec<StructField<Self>> {
        vec![
            StructField::<Self>::new("extents", |v| &v.extents, |v| &mut v.extents),
            StructField::<Self>::new("fov", |v| &v.fov, |v| &mut v.fov),
            StructField::<Self>::new("clip", |v| &v.clip, |v| &mut v.clip),
            StructField::<Self>::new("visibility", |v| &v.visibility, |v| &mut v.visibility),
        ]
    }
}

impl Component for View {
    const NAME: &'static str = "view";
}

// ============================================================================
// LIGHT SENSOR
// ============================================================================

/// Measures incoming light at a point. The renderer writes `illuminance`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LightSensor {
    /// Offset from the entity origin.
    pub position: Vec3,
    /// Facing direction.
    pub direction: Vec3,
    /// Last measured RGB illuminance.
    pub illuminance: Vec3,
}

impl Reflect for LightSensor {
    fn fields() -> Vec<StructField<Self>> {
        vec![
            StructField::<Self>::new("position", |s| &s.position, |s| &mut s.position),
            StructField::<Self>::new("direction", |s| &s.direction, |s| &mut s.direction),
            StructField::<Self>::new("illuminance", |s| &s.illuminance, |s| &mut s.illuminance)
                .with_actions(FieldAction::SAVE),
        ]
    }
}

impl Component for LightSensor {
    const NAME: &'static str = "light_sensor";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::StructMetadata;
    use serde_json::json;

    #[test]
    fn test_visibility_names() {
        let mut mask = VisibilityMask::NONE;
        mask.load_field(&json!(["direct_camera", "Optics"])).unwrap();
        assert_eq!(mask, VisibilityMask::DIRECT_CAMERA.union(VisibilityMask::OPTICS));
        assert_eq!(mask.save_field(), json!(["direct_camera", "optics"]));

        assert!(mask.load_field(&json!(["xray"])).is_err());
        assert_eq!(mask, VisibilityMask::DIRECT_CAMERA.union(VisibilityMask::OPTICS));
    }

    #[test]
    fn test_renderable_visibility() {
        let r = Renderable::default();
        assert!(r.is_visible(VisibilityMask::DIRECT_CAMERA));
        assert!(!r.is_visible(VisibilityMask::TRANSPARENT));
    }

    #[test]
    fn test_renderable_load_keeps_model_pointer_out_of_data() {
        let meta = StructMetadata::<Renderable>::of();
        let mut r = Renderable::default();
        meta.load(&mut r, &json!({ "model": "box", "emissive": 2.0 })).unwrap();
        assert_eq!(r.model_name, "box");
        assert!(r.model.is_null());
        assert_eq!(
            meta.save(&r, Some(&Renderable::default())),
            json!({ "model": "box", "emissive": 2.0 })
        );
    }

    #[test]
    fn test_light_sensor_output_is_not_loaded() {
        let meta = StructMetadata::<LightSensor>::of();
        let mut sensor = LightSensor::default();
        meta.load(&mut sensor, &json!({ "direction": [0.0, 1.0, 0.0], "illuminance": [9.0, 9.0, 9.0] }))
            .unwrap();
        assert_eq!(sensor.direction, Vec3::Y);
        assert_eq!(sensor.illuminance, Vec3::ZERO);
    }

    #[test]
    fn test_view_projection_aspect() {
        let view = View {
            extents: UVec2::new(200, 100),
            ..View::default()
        };
        assert_eq!(view.aspect(), 2.0);
        assert!(view.projection().is_finite());
    }
}
