//! Barrier derivation for frame graph nodes

use crate::backend::{AccessFlags, ImageAspect, ImageBarrier, PipelineStages};
use crate::frame_graph::builder::FrameGraphBuilder;
use crate::frame_graph::resource::{
    FrameGraphNode, FrameGraphResourceType, ResourceHandle, TextureInfo,
};

/// Texture info of the output an input or output record resolves to
fn resolved_texture(
    builder: &FrameGraphBuilder,
    handle: ResourceHandle,
) -> Option<(FrameGraphResourceType, TextureInfo)> {
    let resource = builder.access_resource(handle)?;
    let canonical = resource
        .output_handle
        .and_then(|output| builder.access_resource(output))?;
    canonical
        .info
        .texture()
        .map(|info| (resource.resource_type, *info))
}

fn image_barrier(
    info: &TextureInfo,
    src_stage: PipelineStages,
    dst_stage: PipelineStages,
    src_access: AccessFlags,
    dst_access: AccessFlags,
) -> Option<ImageBarrier> {
    Some(ImageBarrier {
        texture: info.texture?,
        aspect: info.aspect,
        layer_count: info.layers,
        src_stage,
        dst_stage,
        src_access,
        dst_access,
    })
}

/// Barriers issued before a node runs.
///
/// Sampled texture inputs move from attachment writes to shader reads, depth
/// attachment inputs become depth-readable, and attachment outputs become
/// writable. Storage images are synchronized between compute writes and reads.
/// Buffers and resources without a backing texture contribute nothing; passes
/// owning buffers issue their own buffer barriers.
pub fn node_barriers(builder: &FrameGraphBuilder, node: &FrameGraphNode) -> Vec<ImageBarrier> {
    let mut barriers = Vec::new();
    let shader_stage = if node.compute {
        PipelineStages::COMPUTE_SHADER
    } else {
        PipelineStages::FRAGMENT_SHADER
    };

    for &input in &node.inputs {
        let Some((resource_type, info)) = resolved_texture(builder, input) else {
            continue;
        };
        let depth = info.aspect.contains(ImageAspect::DEPTH);
        let barrier = match (resource_type, depth) {
            (FrameGraphResourceType::Texture, false) => image_barrier(
                &info,
                PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                shader_stage,
                AccessFlags::COLOR_ATTACHMENT_WRITE,
                AccessFlags::SHADER_READ,
            ),
            (FrameGraphResourceType::StorageImage, _) => image_barrier(
                &info,
                PipelineStages::COMPUTE_SHADER,
                shader_stage,
                AccessFlags::SHADER_WRITE,
                AccessFlags::SHADER_READ,
            ),
            (FrameGraphResourceType::Texture | FrameGraphResourceType::Attachment, true) => {
                image_barrier(
                    &info,
                    PipelineStages::LATE_FRAGMENT_TESTS,
                    PipelineStages::EARLY_FRAGMENT_TESTS,
                    AccessFlags::empty(),
                    AccessFlags::DEPTH_STENCIL_READ,
                )
            }
            _ => None,
        };
        barriers.extend(barrier);
    }

    for &output in &node.outputs {
        let Some((resource_type, info)) = resolved_texture(builder, output) else {
            continue;
        };
        let barrier = match resource_type {
            FrameGraphResourceType::Attachment => attachment_write_barrier(&info),
            FrameGraphResourceType::StorageImage => image_barrier(
                &info,
                PipelineStages::TOP_OF_PIPE,
                PipelineStages::COMPUTE_SHADER,
                AccessFlags::empty(),
                AccessFlags::SHADER_WRITE,
            ),
            _ => None,
        };
        barriers.extend(barrier);
    }

    barriers
}

fn attachment_write_barrier(info: &TextureInfo) -> Option<ImageBarrier> {
    if info.aspect.contains(ImageAspect::DEPTH) {
        image_barrier(
            info,
            PipelineStages::TOP_OF_PIPE,
            PipelineStages::EARLY_FRAGMENT_TESTS | PipelineStages::LATE_FRAGMENT_TESTS,
            AccessFlags::empty(),
            AccessFlags::DEPTH_STENCIL_WRITE,
        )
    } else {
        image_barrier(
            info,
            PipelineStages::TOP_OF_PIPE,
            PipelineStages::COLOR_ATTACHMENT_OUTPUT,
            AccessFlags::empty(),
            AccessFlags::COLOR_ATTACHMENT_WRITE,
        )
    }
}
