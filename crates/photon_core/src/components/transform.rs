//! # Transforms
//!
//! - [`Transform`] is a local pose: position, rotation, scale
//! - [`TransformTree`] places an entity relative to an optional parent
//! - [`TransformSnapshot`] is the flattened global matrix handed to renderers
//!
//! Scene data spells a pose as
//! `{ "translate": [x, y, z], "rotate": [degrees, ax, ay, az], "scale": s }`.
//! `rotation` (an `[x, y, z, w]` quaternion) is accepted as well and is what
//! saving produces.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};
use serde_json::{Map, Value};
use tracing::warn;

use crate::ecs::{Component, EntityRef};
use crate::meta::{FieldType, Reflect, StructField};
use crate::sync::Transaction;

/// Parent chains deeper than this are treated as cycles.
pub const MAX_TREE_DEPTH: usize = 64;

// ============================================================================
// TRANSFORM
// ============================================================================

/// A local pose.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// Translation.
    pub position: Vec3,
    /// Orientation.
    pub rotation: Quat,
    /// Per-axis scale.
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    /// No translation, rotation or scaling.
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// A pose at `position` with no rotation.
    #[inline]
    #[must_use]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Decomposes an affine matrix.
    #[must_use]
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, position) = matrix.to_scale_rotation_translation();
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// The pose as a matrix.
    #[inline]
    #[must_use]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Moves the pose by `delta`.
    #[inline]
    pub fn translate(&mut self, delta: Vec3) {
        self.position += delta;
    }

    /// Applies a further rotation of `radians` around `axis`, in local space.
    pub fn rotate(&mut self, radians: f32, axis: Vec3) {
        let Some(axis) = axis.try_normalize() else {
            return;
        };
        self.rotation = (self.rotation * Quat::from_axis_angle(axis, radians)).normalize();
    }

    /// The local forward direction (-Z).
    #[inline]
    #[must_use]
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }
}

fn vec3_from(src: &Value) -> Result<Vec3, String> {
    match src {
        Value::Number(n) => n
            .as_f64()
            .map(|s| Vec3::splat(s as f32))
            .ok_or_else(|| format!("expected a number, found {n}")),
        _ => serde_json::from_value::<[f32; 3]>(src.clone())
            .map(Vec3::from)
            .map_err(|e| e.to_string()),
    }
}

impl FieldType for Transform {
    fn load_field(&mut self, src: &Value) -> Result<(), String> {
        let Value::Object(fields) = src else {
            return Err(format!("expected a transform object, found {src}"));
        };

        let mut pose = *self;
        if let Some(translate) = fields.get("translate") {
            pose.position = serde_json::from_value::<[f32; 3]>(translate.clone())
                .map(Vec3::from)
                .map_err(|e| format!("translate: {e}"))?;
        }
        if let Some(rotation) = fields.get("rotation") {
            let [x, y, z, w] = serde_json::from_value::<[f32; 4]>(rotation.clone())
                .map_err(|e| format!("rotation: {e}"))?;
            pose.rotation = Quat::from_xyzw(x, y, z, w).normalize();
        }
        if let Some(rotate) = fields.get("rotate") {
            let [degrees, x, y, z] = serde_json::from_value::<[f32; 4]>(rotate.clone())
                .map_err(|e| format!("rotate: {e}"))?;
            pose.rotate(degrees.to_radians(), Vec3::new(x, y, z));
        }
        if let Some(scale) = fields.get("scale") {
            pose.scale = vec3_from(scale).map_err(|e| format!("scale: {e}"))?;
        }

        *self = pose;
        Ok(())
    }

    fn save_field(&self) -> Value {
        let mut out = Map::new();
        if self.position != Vec3::ZERO {
            out.insert("translate".to_owned(), self.position.to_array().to_vec().into());
        }
        if self.rotation != Quat::IDENTITY {
            out.insert("rotation".to_owned(), self.rotation.to_array().to_vec().into());
        }
        if self.scale != Vec3::ONE {
            out.insert("scale".to_owned(), self.scale.to_array().to_vec().into());
        }
        Value::Object(out)
    }
}

// ============================================================================
// TRANSFORM TREE
// ============================================================================

/// Pose of an entity, relative to `parent` when the parent resolves.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransformTree {
    /// Local pose.
    pub pose: Transform,
    /// Entity this pose is relative to. Null for a root.
    pub parent: EntityRef,
}

impl TransformTree {
    /// A root pose.
    #[must_use]
    pub fn new(pose: Transform) -> Self {
        Self {
            pose,
            parent: EntityRef::NULL,
        }
    }

    /// A pose relative to `parent`.
    #[must_use]
    pub fn with_parent(pose: Transform, parent: EntityRef) -> Self {
        Self { pose, parent }
    }

    /// Composes this pose with every resolvable ancestor.
    ///
    /// Chains longer than [`MAX_TREE_DEPTH`] are cut off with a warning.
    ///
    /// # Panics
    ///
    /// Requires Read on [`TransformTree`] and on [`crate::ecs::Name`].
    #[track_caller]
    #[must_use]
    pub fn global_matrix(&self, txn: &Transaction<'_>) -> Mat4 {
        let mut matrix = self.pose.matrix();
        let mut parent = self.parent.get(txn);
        let mut depth = 0;

        while let Some(tree) = txn.get::<TransformTree>(parent) {
            depth += 1;
            if depth > MAX_TREE_DEPTH {
                warn!(target: "photon::transform", entity = %parent, "transform tree too deep, cut off");
                break;
            }
            matrix = tree.pose.matrix() * matrix;
            parent = tree.parent.get(txn);
        }
        matrix
    }

    /// [`TransformTree::global_matrix`] as a pose.
    #[track_caller]
    #[must_use]
    pub fn get_global_transform(&self, txn: &Transaction<'_>) -> Transform {
        Transform::from_matrix(self.global_matrix(txn))
    }
}

impl Reflect for TransformTree {
    fn fields() -> Vec<StructField<Self>> {
        vec![
            StructField::<Self>::new("", |t| &t.pose, |t| &mut t.pose),
            StructField::<Self>::new("parent", |t| &t.parent, |t| &mut t.parent),
        ]
    }
}

impl Component for TransformTree {
    const NAME: &'static str = "transform";
}

// ============================================================================
// TRANSFORM SNAPSHOT
// ============================================================================

/// Global transform flattened for consumers that cannot walk parent chains.
///
/// Column-major, ready for GPU upload.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct TransformSnapshot {
    /// Column-major 4x4 matrix.
    pub matrix: [[f32; 4]; 4],
}

impl Default for TransformSnapshot {
    fn default() -> Self {
        Self::from_matrix(Mat4::IDENTITY)
    }
}

impl TransformSnapshot {
    /// Wraps a matrix.
    #[inline]
    #[must_use]
    pub fn from_matrix(matrix: Mat4) -> Self {
        Self {
            matrix: matrix.to_cols_array_2d(),
        }
    }

    /// The matrix.
    #[inline]
    #[must_use]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.matrix)
    }

    /// World-space position.
    #[inline]
    #[must_use]
    pub fn translation(&self) -> Vec3 {
        self.to_matrix().w_axis.truncate()
    }

    /// Recomputes the snapshot of every entity that has one and a
    /// [`TransformTree`].
    ///
    /// # Returns
    ///
    /// Number of snapshots written.
    ///
    /// # Panics
    ///
    /// Requires Read on [`TransformTree`] and [`crate::ecs::Name`], and Write
    /// on [`TransformSnapshot`].
    #[track_caller]
    pub fn update_all(txn: &mut Transaction<'_>) -> usize {
        let updates: Vec<_> = txn
            .entities_with::<TransformSnapshot>()
            .into_iter()
            .filter_map(|e| {
                let tree = txn.get::<TransformTree>(e)?;
                Some((e, tree.global_matrix(txn)))
            })
            .collect();

        let mut written = 0;
        for (e, matrix) in updates {
            if let Some(snapshot) = txn.get_mut::<TransformSnapshot>(e) {
                *snapshot = Self::from_matrix(matrix);
                written += 1;
            }
        }
        written
    }
}

impl Reflect for TransformSnapshot {}

impl Component for TransformSnapshot {
    const NAME: &'static str = "transform_snapshot";
}
