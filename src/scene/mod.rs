//! Scene-side inputs to the renderer
//!
//! The scene is not owned here. It hands the renderer one [`DrawData`] per
//! visible mesh every time its set of renderables changes; the renderer turns
//! those into batches and publishes them to passes through [`RenderScene`].

mod camera;
mod material;

pub use camera::*;
pub use material::*;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::backend::{BufferView, IndexFormat};
use crate::renderer::{DrawBuffers, RenderBatch};

/// Object-space bounding sphere, moved into world space by the draw's transform
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }
}

/// One meshlet in its GPU layout
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct Meshlet {
    pub vertex_offset: u32,
    pub triangle_offset: u32,
    pub vertex_count: u32,
    pub triangle_count: u32,
}

/// Meshlet data of a mesh built for the mesh-shading path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshletBuffers {
    pub meshlets: BufferView,
    pub vertices: BufferView,
    pub triangles: BufferView,
    pub meshlet_count: u32,
}

/// One renderable, rebuilt whenever the scene's renderables change
#[derive(Debug, Clone, PartialEq)]
pub struct DrawData {
    pub vertex_buffer: BufferView,
    pub index_buffer: BufferView,
    pub index_format: IndexFormat,
    pub index_count: u32,
    /// Vertices use the [`SkinnedVertex`](crate::backend::SkinnedVertex) layout
    pub skinned: bool,
    pub transform: Mat4,
    pub material: Material,
    pub meshlets: Option<MeshletBuffers>,
    pub bounding_sphere: BoundingSphere,
}

/// Per-frame data visible to passes
#[derive(Debug, Clone, Default)]
pub struct RenderScene {
    pub camera: Camera,
    pub frustum: Frustum,
    pub opaque_batches: Vec<RenderBatch>,
    pub transparent_batches: Vec<RenderBatch>,
    /// Shared per-draw buffers, once the renderer has created them
    pub buffers: Option<DrawBuffers>,
    pub width: u32,
    pub height: u32,
}

impl RenderScene {
    /// Opaque batches followed by transparent ones
    pub fn batches(&self) -> impl Iterator<Item = &RenderBatch> {
        self.opaque_batches
            .iter()
            .chain(self.transparent_batches.iter())
    }

    pub fn batch_count(&self) -> usize {
        self.opaque_batches.len() + self.transparent_batches.len()
    }
}
