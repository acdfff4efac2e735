//! Deferred lighting pass
//!
//! Samples the G-buffer and depth written earlier in the frame and shades a
//! fullscreen triangle with a single directional light.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use crate::backend::*;
use crate::frame_graph::{FrameGraphPass, PassContext};

/// G-buffer inputs in sampler-slot order
pub const GBUFFER_INPUTS: [&str; 4] = ["albedo", "normal", "material", "depth"];

/// Directional light parameters pushed to the lighting shader
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct LightingConstants {
    /// xyz = direction towards the light
    pub direction: Vec4,
    /// xyz = color, w = intensity
    pub color_intensity: Vec4,
    /// xyz = ambient color
    pub ambient: Vec4,
}

/// Deferred lighting pass
pub struct LightingPass {
    pipeline: Option<GraphicsPipelineHandle>,
    pub light_direction: Vec3,
    pub light_color: Vec3,
    pub intensity: f32,
    pub ambient: f32,
    missing_inputs: usize,
}

impl LightingPass {
    pub fn new() -> Self {
        Self {
            pipeline: None,
            light_direction: Vec3::new(0.3, 1.0, 0.5),
            light_color: Vec3::ONE,
            intensity: 3.0,
            ambient: 0.03,
            missing_inputs: 0,
        }
    }

    pub fn constants(&self) -> LightingConstants {
        LightingConstants {
            direction: self.light_direction.normalize_or_zero().extend(0.0),
            color_intensity: self.light_color.extend(self.intensity),
            ambient: Vec4::new(self.ambient, self.ambient, self.ambient, 0.0),
        }
    }
}

impl Default for LightingPass {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameGraphPass for LightingPass {
    fn initialize(
        &mut self,
        device: &mut dyn GraphicsDevice,
        render_pass: Option<RenderPassHandle>,
    ) -> BackendResult<()> {
        let pipeline = device.create_graphics_pipeline(&GraphicsPipelineDescriptor {
            label: "deferred_lighting".to_string(),
            render_pass,
            vertex_shader: FULLSCREEN_VERTEX_SHADER.to_string(),
            fragment_shader: Some(DEFERRED_LIGHTING_SHADER.to_string()),
            depth_write: false,
        })?;
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn render(&mut self, ctx: &mut PassContext<'_>) -> BackendResult<()> {
        let Some(pipeline) = self.pipeline else {
            return Ok(());
        };

        ctx.device.bind_graphics_pipeline(pipeline);
        self.missing_inputs = 0;
        for (slot, name) in GBUFFER_INPUTS.iter().enumerate() {
            match ctx.input_texture(name) {
                Some(texture) => ctx.device.bind_sampled_texture(slot as u32, texture),
                None => self.missing_inputs += 1,
            }
        }
        if self.missing_inputs > 0 {
            log::trace!(
                "Lighting: {} G-buffer inputs unbound in '{}'",
                self.missing_inputs,
                ctx.node_name()
            );
        }

        let constants = self.constants();
        ctx.device.push_constants(bytemuck::bytes_of(&constants));
        ctx.device.draw(3, 1);
        Ok(())
    }

    fn shutdown(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(pipeline) = self.pipeline.take() {
            device.destroy_graphics_pipeline(pipeline);
        }
    }

    fn add_ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Intensity");
            ui.add(egui::DragValue::new(&mut self.intensity).speed(0.05).range(0.0..=100.0));
        });
        ui.horizontal(|ui| {
            ui.label("Ambient");
            ui.add(egui::Slider::new(&mut self.ambient, 0.0..=1.0));
        });
        if self.missing_inputs > 0 {
            ui.colored_label(
                egui::Color32::YELLOW,
                format!("{} G-buffer inputs missing", self.missing_inputs),
            );
        }
    }
}

/// Fullscreen triangle covering the viewport, no vertex buffer needed
pub const FULLSCREEN_VERTEX_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var output: VertexOutput;
    let x = f32(i32(vertex_index & 1u) * 4 - 1);
    let y = f32(i32(vertex_index >> 1u) * 4 - 1);
    output.position = vec4<f32>(x, y, 0.0, 1.0);
    output.uv = vec2<f32>((x + 1.0) * 0.5, (1.0 - y) * 0.5);
    return output;
}
"#;

pub const DEFERRED_LIGHTING_SHADER: &str = r#"
struct Light {
    direction: vec4<f32>,
    color_intensity: vec4<f32>,
    ambient: vec4<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

var<push_constant> light: Light;
@group(0) @binding(0) var gbuffer_albedo: texture_2d<f32>;
@group(0) @binding(1) var gbuffer_normal: texture_2d<f32>;
@group(0) @binding(2) var gbuffer_material: texture_2d<f32>;
@group(0) @binding(3) var gbuffer_depth: texture_depth_2d;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let pixel = vec2<i32>(input.position.xy);
    let depth = textureLoad(gbuffer_depth, pixel, 0);
    if (depth >= 1.0) {
        return vec4<f32>(0.0, 0.0, 0.0, 1.0);
    }

    let albedo = textureLoad(gbuffer_albedo, pixel, 0).rgb;
    let normal = normalize(textureLoad(gbuffer_normal, pixel, 0).xyz * 2.0 - 1.0);
    let material = textureLoad(gbuffer_material, pixel, 0);
    let roughness = max(material.g, 0.04);

    let n_dot_l = max(dot(normal, light.direction.xyz), 0.0);
    let diffuse = albedo * (1.0 - material.r) * n_dot_l;
    let specular = vec3<f32>(pow(n_dot_l, 2.0 / (roughness * roughness)) * material.r);
    let radiance = light.color_intensity.rgb * light.color_intensity.w;

    return vec4<f32>(light.ambient.rgb * albedo + (diffuse + specular) * radiance, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_ui_keeps_settings() {
        let mut pass = LightingPass::new();
        pass.missing_inputs = 2;
        let ctx = egui::Context::default();
        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            egui::CentralPanel::default().show(ctx, |ui| pass.add_ui(ui));
        });

        assert_eq!(pass.intensity, 3.0);
        assert_eq!(pass.constants().color_intensity.w, 3.0);
    }
}
