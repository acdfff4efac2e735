//! GPU-driven draw culling
//!
//! One compute dispatch per batch tests every draw's bounding sphere against
//! the camera frustum and appends the commands of visible draws to the batch's
//! range of the visible command buffer, counting them in the batch's slot of
//! the draw count buffer. Geometry passes then draw with
//! `draw_indexed_indirect_count` reading that same slot.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::backend::*;
use crate::frame_graph::{FrameGraphPass, PassContext};
use crate::renderer::{DrawBuffers, MeshDrawData};
use crate::scene::{Frustum, RenderScene};

/// Compute pipeline label, also the software kernel key
pub const DRAW_CULL_LABEL: &str = "draw_cull";

/// Draws tested per workgroup
pub const CULL_GROUP_SIZE: u32 = 32;

/// Push constants of one batch dispatch
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CullConstants {
    pub planes: [Vec4; 6],
    pub draw_count: u32,
    /// Global index of the batch's first draw
    pub first_draw: u32,
    pub _pad: [u32; 2],
}

/// What the last recorded frame dispatched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CullStats {
    pub batches: u32,
    pub draws: u32,
    pub workgroups: u32,
}

/// Draw-cull compute pass
pub struct DrawCullPass {
    pipeline: Option<ComputePipelineHandle>,
    group_size: u32,
    stats: CullStats,
}

impl DrawCullPass {
    pub fn new(group_size: u32) -> Self {
        Self {
            pipeline: None,
            group_size: group_size.max(1),
            stats: CullStats::default(),
        }
    }

    pub fn stats(&self) -> CullStats {
        self.stats
    }

    /// Record the count reset, one dispatch per non-empty batch and the
    /// barrier handing the results to indirect draws.
    pub fn record(
        &mut self,
        device: &mut dyn GraphicsDevice,
        scene: &RenderScene,
    ) -> BackendResult<CullStats> {
        let mut stats = CullStats::default();
        let Some(pipeline) = self.pipeline else {
            log::warn!("DrawCullPass: recorded before initialize");
            return Ok(stats);
        };
        let Some(buffers) = scene.buffers else {
            return Ok(stats);
        };
        let batches: Vec<_> = scene.batches().copied().collect();
        let Some(slot_count) = batches.iter().map(|b| b.id + 1).max() else {
            self.stats = stats;
            return Ok(stats);
        };

        let count_bytes = slot_count as u64 * DrawBuffers::COUNT_STRIDE;
        device.fill_buffer(buffers.draw_counts, 0, count_bytes, 0);
        device.pipeline_barrier(
            &[],
            &[BufferBarrier {
                buffer: buffers.draw_counts,
                offset: 0,
                size: count_bytes,
                src_stage: PipelineStages::TRANSFER,
                dst_stage: PipelineStages::COMPUTE_SHADER,
                src_access: AccessFlags::TRANSFER_WRITE,
                dst_access: AccessFlags::SHADER_WRITE,
            }],
        );

        device.bind_compute_pipeline(pipeline);
        let mut commands_range: Option<(u64, u64)> = None;
        let mut counts_range: Option<(u64, u64)> = None;

        for batch in batches.iter().filter(|b| !b.is_empty()) {
            let visible = buffers.visible_command_view(batch);
            let count = buffers.count_view(batch);
            device.bind_storage_buffers(&[
                buffers.transform_view(batch),
                buffers.mesh_draw_view(batch),
                buffers.draw_command_view(batch),
                visible,
                count,
            ]);
            let constants = CullConstants {
                planes: scene.frustum.planes,
                draw_count: batch.count,
                first_draw: batch.offset,
                _pad: [0; 2],
            };
            device.push_constants(bytemuck::bytes_of(&constants));

            let groups = batch.count.div_ceil(self.group_size);
            device.dispatch(groups, 1, 1);

            extend_range(&mut commands_range, visible);
            extend_range(&mut counts_range, count);
            stats.batches += 1;
            stats.draws += batch.count;
            stats.workgroups += groups;
        }

        let indirect_read = |buffer: BufferHandle, (start, end): (u64, u64)| BufferBarrier {
            buffer,
            offset: start,
            size: end - start,
            src_stage: PipelineStages::COMPUTE_SHADER,
            dst_stage: PipelineStages::DRAW_INDIRECT,
            src_access: AccessFlags::SHADER_WRITE,
            dst_access: AccessFlags::INDIRECT_COMMAND_READ,
        };
        if let (Some(commands), Some(counts)) = (commands_range, counts_range) {
            device.pipeline_barrier(
                &[],
                &[
                    indirect_read(buffers.visible_commands, commands),
                    indirect_read(buffers.draw_counts, counts),
                ],
            );
        }

        self.stats = stats;
        Ok(stats)
    }
}

/// Grow a written byte range to cover `view`
fn extend_range(range: &mut Option<(u64, u64)>, view: BufferView) {
    let (start, end) = (view.offset, view.offset + view.size);
    *range = Some(match *range {
        Some((s, e)) => (s.min(start), e.max(end)),
        None => (start, end),
    });
}

impl Default for DrawCullPass {
    fn default() -> Self {
        Self::new(CULL_GROUP_SIZE)
    }
}

impl FrameGraphPass for DrawCullPass {
    fn initialize(
        &mut self,
        device: &mut dyn GraphicsDevice,
        _render_pass: Option<RenderPassHandle>,
    ) -> BackendResult<()> {
        self.pipeline = Some(device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: DRAW_CULL_LABEL.to_string(),
            shader: DRAW_CULL_SHADER.replace(
                "@workgroup_size(32, 1, 1)",
                &format!("@workgroup_size({}, 1, 1)", self.group_size),
            ),
            entry_point: "main".to_string(),
            push_constant_size: std::mem::size_of::<CullConstants>() as u32,
        })?);
        Ok(())
    }

    fn render(&mut self, ctx: &mut PassContext<'_>) -> BackendResult<()> {
        self.record(&mut *ctx.device, ctx.scene).map(|_| ())
    }

    fn shutdown(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(pipeline) = self.pipeline.take() {
            device.destroy_compute_pipeline(pipeline);
        }
    }

    fn add_ui(&mut self, ui: &mut egui::Ui) {
        ui.label(format!(
            "{} batches, {} draws, {} workgroups",
            self.stats.batches, self.stats.draws, self.stats.workgroups
        ));
    }
}

fn read_record<T: Pod>(bytes: &[u8], index: usize) -> BackendResult<T> {
    let size = std::mem::size_of::<T>();
    bytes
        .get(index * size..(index + 1) * size)
        .map(bytemuck::pod_read_unaligned)
        .ok_or(BackendError::OutOfRange {
            offset: (index * size) as u64,
            len: size as u64,
            size: bytes.len() as u64,
        })
}

/// World-space sphere of a draw
fn world_sphere(transform: &Mat4, data: &MeshDrawData) -> (Vec3, f32) {
    let center = transform.transform_point3(data.bounding_sphere.center);
    let scale = transform
        .x_axis
        .truncate()
        .length()
        .max(transform.y_axis.truncate().length())
        .max(transform.z_axis.truncate().length());
    (center, data.bounding_sphere.radius * scale)
}

/// CPU implementation of [`DRAW_CULL_SHADER`] for the dummy device.
///
/// Bindings: transforms, mesh draw data, draw commands, visible commands, count slot.
pub fn software_kernel() -> SoftwareKernel {
    Arc::new(|inv: &mut KernelInvocation<'_>| {
        let &[transforms, mesh_draws, _commands, visible, count] = inv.bindings else {
            return Err(BackendError::InvalidBinding(format!(
                "draw cull expects 5 storage buffers, got {}",
                inv.bindings.len()
            )));
        };
        let constants: CullConstants = read_record(inv.push_constants, 0)?;
        let frustum = Frustum {
            planes: constants.planes,
        };

        let transform_bytes = inv.memory.read(transforms)?.to_vec();
        let mesh_draw_bytes = inv.memory.read(mesh_draws)?.to_vec();
        let mut visible_count: u32 = read_record(inv.memory.read(count)?, 0)?;

        for index in 0..constants.draw_count {
            let transform: Mat4 = read_record(&transform_bytes, index as usize)?;
            let data: MeshDrawData = read_record(&mesh_draw_bytes, index as usize)?;
            let (center, radius) = world_sphere(&transform, &data);
            if !frustum.sphere_visible(center, radius) {
                continue;
            }

            let command = DrawIndexedIndirectCommand {
                index_count: data.index_count,
                instance_count: 1,
                first_index: data.index_offset,
                vertex_offset: data.vertex_offset as i32,
                first_instance: constants.first_draw + index,
            };
            inv.memory.write(
                visible,
                visible_count as u64 * DrawBuffers::COMMAND_STRIDE,
                bytemuck::bytes_of(&command),
            )?;
            visible_count += 1;
        }

        inv.memory.write(count, 0, &visible_count.to_le_bytes())
    })
}

/// Register [`software_kernel`] with a dummy device
pub fn register_software_kernel(device: &mut DummyDevice) {
    device.register_kernel(DRAW_CULL_LABEL, software_kernel());
}

pub const DRAW_CULL_SHADER: &str = r#"
struct CullConstants {
    planes: array<vec4<f32>, 6>,
    draw_count: u32,
    first_draw: u32,
    _pad: vec2<u32>,
}

struct BoundingSphere {
    center: vec3<f32>,
    radius: f32,
}

struct MeshDrawData {
    index_offset: u32,
    index_count: u32,
    vertex_offset: u32,
    vertex_count: u32,
    meshlet_offset: u32,
    meshlet_count: u32,
    skinned: u32,
    _pad: u32,
    sphere: BoundingSphere,
}

struct DrawCommand {
    index_count: u32,
    instance_count: u32,
    first_index: u32,
    vertex_offset: i32,
    first_instance: u32,
}

var<push_constant> constants: CullConstants;

@group(0) @binding(0) var<storage, read> transforms: array<mat4x4<f32>>;
@group(0) @binding(1) var<storage, read> mesh_draws: array<MeshDrawData>;
@group(0) @binding(2) var<storage, read> draw_commands: array<DrawCommand>;
@group(0) @binding(3) var<storage, read_write> visible_commands: array<DrawCommand>;
@group(0) @binding(4) var<storage, read_write> visible_count: atomic<u32>;

fn sphere_visible(center: vec3<f32>, radius: f32) -> bool {
    for (var i = 0u; i < 6u; i = i + 1u) {
        let plane = constants.planes[i];
        let corner = center + sign(plane.xyz) * radius;
        if dot(plane.xyz, corner) + plane.w < 0.0 {
            return false;
        }
    }
    return true;
}

@compute @workgroup_size(32, 1, 1)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let index = global_id.x;
    if index >= constants.draw_count {
        return;
    }

    let transform = transforms[index];
    let data = mesh_draws[index];
    let center = (transform * vec4<f32>(data.sphere.center, 1.0)).xyz;
    let scale = max(length(transform[0].xyz), max(length(transform[1].xyz), length(transform[2].xyz)));
    if !sphere_visible(center, data.sphere.radius * scale) {
        return;
    }

    let slot = atomicAdd(&visible_count, 1u);
    var command = draw_commands[index];
    command.first_instance = constants.first_draw + index;
    visible_commands[slot] = command;
}
"#;
