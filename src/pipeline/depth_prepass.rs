//! Depth pre-pass
//!
//! Lays down depth for the culled opaque draws so the G-buffer pass only
//! shades visible fragments.

use crate::backend::*;
use crate::frame_graph::{FrameGraphPass, PassContext};
use crate::pipeline::geometry::{create_pipeline, draw_batches, BatchFilter};

/// Depth pre-pass
#[derive(Default)]
pub struct DepthPrePass {
    pipeline: Option<GraphicsPipelineHandle>,
    draws_issued: u32,
}

impl DepthPrePass {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameGraphPass for DepthPrePass {
    fn initialize(
        &mut self,
        device: &mut dyn GraphicsDevice,
        render_pass: Option<RenderPassHandle>,
    ) -> BackendResult<()> {
        self.pipeline = Some(create_pipeline(
            device,
            "depth_prepass",
            render_pass,
            DEPTH_PREPASS_SHADER,
            false,
            true,
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

pub const DEPTH_PREPASS_SHADER: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
    position: vec4<f32>,
}

var<push_constant> camera: Camera;
@group(0) @binding(0) var<storage, read> transforms: array<mat4x4<f32>>;

@vertex
fn vs_main(
    @location(0) position: vec3<f32>,
    @builtin(instance_index) draw: u32,
) -> @builtin(position) vec4<f32> {
    return camera.view_proj * transforms[draw] * vec4<f32>(position, 1.0);
}
"#;
