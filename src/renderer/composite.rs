//! Final blit of the selected graph output onto the swapchain

use crate::backend::*;
use crate::frame_graph::TextureInfo;
use crate::pipeline::lighting_pass::FULLSCREEN_VERTEX_SHADER;

/// Samples one graph texture onto the acquired swapchain image.
///
/// Runs outside the frame graph, after every node has executed.
#[derive(Default)]
pub struct CompositePass {
    pipeline: Option<GraphicsPipelineHandle>,
}

impl CompositePass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize(&mut self, device: &mut dyn GraphicsDevice) -> BackendResult<()> {
        if self.pipeline.is_some() {
            return Ok(());
        }
        let pipeline = device.create_graphics_pipeline(&GraphicsPipelineDescriptor {
            label: "composite".to_string(),
            render_pass: None,
            vertex_shader: FULLSCREEN_VERTEX_SHADER.to_string(),
            fragment_shader: Some(COMPOSITE_SHADER.to_string()),
            depth_write: false,
        })?;
        self.pipeline = Some(pipeline);
        Ok(())
    }

    /// Record the composite into the swapchain pass.
    ///
    /// Without a source the swapchain pass still runs, leaving the cleared image.
    pub fn render(&mut self, device: &mut dyn GraphicsDevice, image: &SwapchainImage, source: Option<&TextureInfo>) {
        let source = source.and_then(|info| info.texture.map(|texture| (texture, info)));

        if let Some((texture, info)) = source {
            let (src_stage, src_access) = if info.is_depth() {
                (PipelineStages::LATE_FRAGMENT_TESTS, AccessFlags::DEPTH_STENCIL_WRITE)
            } else {
                (PipelineStages::COLOR_ATTACHMENT_OUTPUT, AccessFlags::COLOR_ATTACHMENT_WRITE)
            };
            device.pipeline_barrier(
                &[ImageBarrier {
                    texture,
                    aspect: info.aspect,
                    layer_count: info.layers,
                    src_stage,
                    dst_stage: PipelineStages::FRAGMENT_SHADER,
                    src_access,
                    dst_access: AccessFlags::SHADER_READ,
                }],
                &[],
            );
        }

        device.begin_swapchain_pass(image);
        if let (Some(pipeline), Some((texture, _))) = (self.pipeline, source) {
            device.bind_graphics_pipeline(pipeline);
            device.bind_sampled_texture(0, texture);
            device.draw(3, 1);
        }
        device.end_swapchain_pass();
    }

    pub fn shutdown(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(pipeline) = self.pipeline.take() {
            device.destroy_graphics_pipeline(pipeline);
        }
    }
}

pub const COMPOSITE_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@group(0) @binding(0) var source_texture: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;

// ACES filmic approximation, HDR sources come straight from the graph
fn tonemap(x: vec3<f32>) -> vec3<f32> {
    let a = 2.51;
    let b = 0.03;
    let c = 2.43;
    let d = 0.59;
    let e = 0.14;
    return clamp((x * (a * x + b)) / (x * (c * x + d) + e), vec3<f32>(0.0), vec3<f32>(1.0));
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let color = textureSample(source_texture, source_sampler, input.uv);
    return vec4<f32>(tonemap(color.rgb), 1.0);
}
"#;
