//! G-Buffer generation pass for deferred rendering
//!
//! Renders the culled opaque draws to multiple render targets:
//! - Albedo (base color)
//! - World-space normals (encoded)
//! - Material properties (metallic, roughness)
//!
//! Depth from the pre-pass is re-entered with its contents kept.

use crate::backend::*;
use crate::frame_graph::{FrameGraphPass, PassContext};
use crate::pipeline::geometry::{create_pipeline, draw_batches, BatchFilter};

/// G-Buffer generation pass
#[derive(Default)]
pub struct GBufferPass {
    pipeline: Option<GraphicsPipelineHandle>,
    draws_issued: u32,
}

impl GBufferPass {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameGraphPass for GBufferPass {
    fn initialize(
        &mut self,
        device: &mut dyn GraphicsDevice,
        render_pass: Option<RenderPassHandle>,
    ) -> BackendResult<()> {
        self.pipeline = Some(create_pipeline(
            device,
            "gbuffer",
            render_pass,
            GBUFFER_SHADER,
            true,
            false,
        )?);
        Ok(())
    }

    fn render(&mut self, ctx: &mut PassContext<'_>) -> BackendResult<()> {
        if let Some(pipeline) = self.pipeline {
            self.draws_issued = draw_batches(&mut *ctx.device, pipeline, ctx.scene, BatchFilter::Opaque);
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

pub const GBUFFER_SHADER: &str = r#"
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

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) tangent: vec4<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_normal: vec3<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) @interpolate(flat) draw: u32,
}

struct GBufferOutput {
    @location(0) albedo: vec4<f32>,
    @location(1) normal: vec4<f32>,
    @location(2) material: vec4<f32>,
}

var<push_constant> camera: Camera;
@group(0) @binding(0) var<storage, read> transforms: array<mat4x4<f32>>;
@group(0) @binding(1) var<storage, read> materials: array<Material>;

@vertex
fn vs_main(input: VertexInput, @builtin(instance_index) draw: u32) -> VertexOutput {
    var output: VertexOutput;
    let model = transforms[draw];
    output.clip_position = camera.view_proj * model * vec4<f32>(input.position, 1.0);
    output.world_normal = normalize((model * vec4<f32>(input.normal, 0.0)).xyz);
    output.uv = input.uv;
    output.draw = draw;
    return output;
}

@fragment
fn fs_main(input: VertexOutput) -> GBufferOutput {
    let material = materials[input.draw];
    var output: GBufferOutput;
    output.albedo = material.base_color;
    output.normal = vec4<f32>(input.world_normal * 0.5 + 0.5, 1.0);
    output.material = vec4<f32>(material.metallic, material.roughness, 0.0, 1.0);
    return output;
}
"#;
