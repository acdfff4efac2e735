//! Indirect batch drawing shared by the geometry passes

use crate::backend::*;
use crate::renderer::{DrawBuffers, RenderBatch};
use crate::scene::RenderScene;

/// Which batch list a geometry pass draws
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchFilter {
    Opaque,
    Transparent,
}

/// Create a graphics pipeline for a geometry pass.
pub(crate) fn create_pipeline(
    device: &mut dyn GraphicsDevice,
    label: &str,
    render_pass: Option<RenderPassHandle>,
    shader: &str,
    fragment: bool,
    depth_write: bool,
) -> BackendResult<GraphicsPipelineHandle> {
    device.create_graphics_pipeline(&GraphicsPipelineDescriptor {
        label: label.to_string(),
        render_pass,
        vertex_shader: shader.to_string(),
        fragment_shader: fragment.then(|| shader.to_string()),
        depth_write,
    })
}

/// Draw every non-empty batch of a list with counts written by the cull pass.
///
/// Returns the number of indirect draws issued.
pub(crate) fn draw_batches(
    device: &mut dyn GraphicsDevice,
    pipeline: GraphicsPipelineHandle,
    scene: &RenderScene,
    filter: BatchFilter,
) -> u32 {
    let Some(buffers) = scene.buffers else {
        return 0;
    };
    let batches: &[RenderBatch] = match filter {
        BatchFilter::Opaque => &scene.opaque_batches,
        BatchFilter::Transparent => &scene.transparent_batches,
    };
    if batches.iter().all(RenderBatch::is_empty) {
        return 0;
    }

    let capacity = buffers.capacity as u64;
    device.bind_graphics_pipeline(pipeline);
    device.bind_storage_buffers(&[
        BufferView::new(buffers.transforms, 0, capacity * DrawBuffers::TRANSFORM_STRIDE),
        BufferView::new(buffers.materials, 0, capacity * DrawBuffers::MATERIAL_STRIDE),
    ]);
    device.push_constants(bytemuck::bytes_of(&scene.camera.uniform_data()));

    let mut issued = 0;
    for batch in batches.iter().filter(|b| !b.is_empty()) {
        device.bind_vertex_buffer(batch.vertex_binding());
        device.bind_index_buffer(batch.index_binding(), batch.index_format);
        device.draw_indexed_indirect_count(
            buffers.visible_command_view(batch),
            buffers.count_view(batch),
            batch.count,
            DrawBuffers::COMMAND_STRIDE as u32,
        );
        issued += 1;
    }
    issued
}
