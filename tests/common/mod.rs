//! Shared helpers for the integration tests.
//!
//! Everything runs on the recording `DummyDevice`; compute dispatches of the
//! draw cull are executed by its software kernel.

#![allow(dead_code)]

use frame_graph_engine::backend::*;
use frame_graph_engine::renderer::{DrawBuffers, RenderBatch};
use frame_graph_engine::scene::{BoundingSphere, DrawData, Material};
use glam::{Mat4, Vec3};

/// Bytes per vertex of the test meshes
pub const VERTEX_SIZE: u64 = std::mem::size_of::<Vertex>() as u64;

/// Index and vertex counts of the test cube
pub const CUBE_INDICES: u32 = 36;
pub const CUBE_VERTICES: u64 = 24;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Device with the draw-cull software kernel registered
pub fn device() -> DummyDevice {
    init_logging();
    let mut device = DummyDevice::new();
    frame_graph_engine::pipeline::register_software_kernel(&mut device);
    device
}

pub fn mesh_buffer(device: &mut DummyDevice, usage: BufferUsage) -> BufferHandle {
    device
        .create_buffer(&BufferDescriptor {
            label: Some("test mesh".into()),
            size: 1 << 20,
            usage,
        })
        .expect("mesh buffer")
}

/// Cube number `slot` of a shared vertex/index buffer pair, placed at `position`
pub fn cube_draw(
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    slot: u64,
    position: Vec3,
) -> DrawData {
    DrawData {
        vertex_buffer: BufferView::new(
            vertex_buffer,
            slot * CUBE_VERTICES * VERTEX_SIZE,
            CUBE_VERTICES * VERTEX_SIZE,
        ),
        index_buffer: BufferView::new(index_buffer, slot * 4 * CUBE_INDICES as u64, 4 * CUBE_INDICES as u64),
        index_format: IndexFormat::Uint32,
        index_count: CUBE_INDICES,
        skinned: false,
        transform: Mat4::from_translation(position),
        material: Material::plastic(Vec3::ONE),
        meshlets: None,
        bounding_sphere: BoundingSphere::new(Vec3::ZERO, 1.0),
    }
}

/// Visible count the cull pass wrote for a batch
pub fn visible_count(device: &mut DummyDevice, buffers: &DrawBuffers, batch: &RenderBatch) -> u32 {
    let view = buffers.count_view(batch);
    let bytes = device
        .read_buffer(view.buffer, view.offset, view.size)
        .expect("count slot");
    bytemuck::pod_read_unaligned(&bytes)
}

/// The first `count` visible commands of a batch
pub fn visible_commands(
    device: &mut DummyDevice,
    buffers: &DrawBuffers,
    batch: &RenderBatch,
    count: u32,
) -> Vec<DrawIndexedIndirectCommand> {
    let view = buffers.visible_command_view(batch);
    let bytes = device
        .read_buffer(view.buffer, view.offset, count as u64 * DrawBuffers::COMMAND_STRIDE)
        .expect("visible commands");
    bytes
        .chunks_exact(DrawBuffers::COMMAND_STRIDE as usize)
        .map(bytemuck::pod_read_unaligned)
        .collect()
}
