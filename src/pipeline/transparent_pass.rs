//! Forward pass for transparent draws, blended over the lit image

use crate::backend::*;
use crate::frame_graph::{FrameGraphPass, PassContext};
use crate::pipeline::geometry::{create_pipeline, draw_batches, BatchFilter};

#[derive(Default)]
pub struct TransparentPass {
    pipeline: Option<GraphicsPipelineHandle>,
    draws_issued: u32,
}

impl TransparentPass {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameGraphPass for TransparentPass {
    fn initialize(
        &mut self,
        device: &mut dyn GraphicsDevice,
        render_pass: Option<RenderPassHandle>,
    ) -> BackendResult<()> {
        self.pipeline = Some(create_pipeline(
            device,
            "transparent",
            render_pass,
            TRANSPARENT_SHADER,
            true,
            false,
        )?);
        Ok(())
    }

    fn render(&mut self, ctx: &mut PassContext<'_>) -> BackendResult<()> {
        if let Some(pipeline) = self.pipeline {
            self.draws_issued =
                draw_batches(&mut *ctx.device, pipeline, ctx.scene, BatchFilter::Transparent);
        }
        Ok(())
    }

    fn shutdown(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(pipeline) = self.pipeline.take() {
            device.destroy_graphics_pipeline(pipeline);
        }
    }

    fn add_ui(&mut self, ui: &mut egui::Ui) {
        ui.label(format!("{} indirect draws", self.draws_issued));
    }
}

pub const TRANSPARENT_SHADER: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
    position: vec4<f32>,
}

struct Material {
    base_color: vec4<f32>,
    emissive: vec4<f32>,
    metallic: f32,
    roughness: f32,
    alpha_cutoff: f32,
    flags: u32,
    textures: vec4<u32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) @interpolate(flat) draw: u32,
}

var<push_constant> camera: Camera;
@group(0) @binding(0) var<storage, read> transforms: array<mat4x4<f32>>;
@group(0) @binding(1) var<storage, read> materials: array<Material>;

@vertex
fn vs_main(@location(0) position: vec3<f32>, @builtin(instance_index) draw: u32) -> VertexOutput {
    var output: VertexOutput;
    output.clip_position = camera.view_proj * transforms[draw] * vec4<f32>(position, 1.0);
    output.draw = draw;
    return output;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let material = materials[input.draw];
    return vec4<f32>(material.base_color.rgb + material.emissive.rgb * material.emissive.w, material.base_color.a);
}
"#;
