//! # Render Bridge
//!
//! Each render frame:
//! 1. Refresh every [`TransformSnapshot`] from its parent chain
//! 2. Copy what the GPU needs out of the world under
//!    `Read<Renderable, Light, TransformSnapshot, View>`
//! 3. Hand the owned [`RenderFrame`] to a [`RenderBackend`] with every lock
//!    released
//!
//! Snapshots are `bytemuck::Pod`, so a GPU backend can upload
//! [`DrawItem::transform`] with `bytemuck::bytes_of`.

use glam::{Mat4, Vec3, Vec4};
use photon_core::components::{Light, Renderable, TransformSnapshot, TransformTree, View, VisibilityMask};
use photon_core::{Access, Entity, Name, World};
use tracing::trace;

use crate::error::RuntimeResult;

/// One mesh to draw.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawItem {
    /// Source entity.
    pub entity: Entity,
    /// Model asset name.
    pub model: String,
    /// True once the model asset has loaded.
    pub model_ready: bool,
    /// Mesh within the model.
    pub mesh_index: usize,
    /// Model-to-world matrix.
    pub transform: TransformSnapshot,
    /// Passes the mesh appears in.
    pub visibility: VisibilityMask,
    /// Emissive multiplier.
    pub emissive: f32,
    /// Base color override, negative to keep the material.
    pub color_override: Vec4,
}

/// One light source.
#[derive(Clone, Debug, PartialEq)]
pub struct LightItem {
    /// Source entity.
    pub entity: Entity,
    /// World position.
    pub position: Vec3,
    /// Facing direction.
    pub direction: Vec3,
    /// Linear color scaled by intensity.
    pub radiance: Vec3,
    /// Spot cone angle in radians, zero for a point light.
    pub spot_angle: f32,
}

/// One camera.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewItem {
    /// Source entity.
    pub entity: Entity,
    /// World-to-view matrix.
    pub view: Mat4,
    /// View-to-clip matrix.
    pub projection: Mat4,
    /// Passes this camera renders.
    pub visibility: VisibilityMask,
}

/// Everything a backend needs for one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderFrame {
    /// Frame number.
    pub frame: u64,
    /// Meshes.
    pub draws: Vec<DrawItem>,
    /// Lights that are switched on.
    pub lights: Vec<LightItem>,
    /// Cameras.
    pub views: Vec<ViewItem>,
}

/// A graphics backend.
pub trait RenderBackend: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Draws `frame`.
    ///
    /// # Errors
    ///
    /// A backend-specific failure. The render thread stops on error.
    fn submit(&mut self, frame: &RenderFrame) -> RuntimeResult<()>;
}

/// Counts frames instead of drawing them.
#[derive(Clone, Debug, Default)]
pub struct HeadlessBackend {
    frames: u64,
    last: RenderFrame,
}

impl HeadlessBackend {
    /// Creates a backend that has seen no frames.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames submitted so far.
    #[inline]
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// The most recent frame.
    #[inline]
    #[must_use]
    pub fn last_frame(&self) -> &RenderFrame {
        &self.last
    }
}

impl RenderBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn submit(&mut self, frame: &RenderFrame) -> RuntimeResult<()> {
        self.frames += 1;
        self.last.clone_from(frame);
        Ok(())
    }
}

/// What one render frame did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Snapshots refreshed.
    pub snapshots: usize,
    /// Meshes submitted.
    pub draws: usize,
    /// Lights submitted.
    pub lights: usize,
    /// Cameras submitted.
    pub views: usize,
}

/// Extracts frames from a world and feeds a backend.
#[derive(Debug)]
pub struct RenderSystem<B> {
    backend: B,
    frame: u64,
}

impl<B: RenderBackend> RenderSystem<B> {
    /// Wraps `backend`.
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self { backend, frame: 0 }
    }

    /// The backend.
    #[inline]
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Frames rendered so far.
    #[inline]
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Renders one frame of `world`.
    ///
    /// # Errors
    ///
    /// Whatever the backend returns from [`RenderBackend::submit`].
    pub fn tick(&mut self, world: &World) -> RuntimeResult<RenderStats> {
        let snapshots = {
            let mut txn = world.transaction(
                Access::new()
                    .read::<Name>()
                    .read::<TransformTree>()
                    .write::<TransformSnapshot>(),
            );
            TransformSnapshot::update_all(&mut txn)
        };

        let frame = extract(world, self.frame);
        let stats = RenderStats {
            snapshots,
            draws: frame.draws.len(),
            lights: frame.lights.len(),
            views: frame.views.len(),
        };
        self.backend.submit(&frame)?;
        self.frame += 1;

        trace!(
            target: "photon::render",
            backend = self.backend.name(),
            frame = frame.frame,
            draws = stats.draws,
            lights = stats.lights,
            "frame submitted"
        );
        Ok(stats)
    }
}

/// Copies the render view of `world` into an owned frame.
#[must_use]
pub fn extract(world: &World, frame: u64) -> RenderFrame {
    let txn = world.transaction(
        Access::new()
            .read::<Renderable>()
            .read::<Light>()
            .read::<TransformSnapshot>()
            .read::<View>(),
    );
    let mut out = RenderFrame {
        frame,
        ..RenderFrame::default()
    };

    for e in txn.entities_with::<Renderable>() {
        let (Some(renderable), Some(transform)) = (txn.get::<Renderable>(e), txn.get::<TransformSnapshot>(e))
        else {
            continue;
        };
        if renderable.visibility == VisibilityMask::NONE {
            continue;
        }
        out.draws.push(DrawItem {
            entity: e,
            model: renderable.model_name.clone(),
            model_ready: renderable.model.ready(),
            mesh_index: renderable.mesh_index,
            transform: *transform,
            visibility: renderable.visibility,
            emissive: renderable.emissive,
            color_override: renderable.color_override,
        });
    }

    for e in txn.entities_with::<Light>() {
        let (Some(light), Some(transform)) = (txn.get::<Light>(e), txn.get::<TransformSnapshot>(e)) else {
            continue;
        };
        if !light.on {
            continue;
        }
        let matrix = transform.to_matrix();
        out.lights.push(LightItem {
            entity: e,
            position: transform.translation(),
            direction: matrix.transform_vector3(Vec3::NEG_Z).normalize_or_zero(),
            radiance: light.color * light.intensity,
            spot_angle: light.spot_angle,
        });
    }

    for e in txn.entities_with::<View>() {
        let (Some(view), Some(transform)) = (txn.get::<View>(e), txn.get::<TransformSnapshot>(e)) else {
            continue;
        };
        out.views.push(ViewItem {
            entity: e,
            view: transform.to_matrix().inverse(),
            projection: view.projection(),
            visibility: view.visibility,
        });
    }

    out
}
