//! Grouping draws into buffer-contiguous batches

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use thiserror::Error;

use crate::backend::*;
use crate::scene::{BoundingSphere, DrawData, Material, Meshlet, MeshletBuffers};

/// Batch building errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("Draw capacity exceeded: {requested} draws requested, buffers hold {capacity}")]
    CapacityExceeded { requested: u64, capacity: u32 },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Per-draw geometry metadata read by the cull shader. Offsets and counts are
/// in elements of the respective buffers.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct MeshDrawData {
    pub index_offset: u32,
    pub index_count: u32,
    pub vertex_offset: u32,
    pub vertex_count: u32,
    pub meshlet_offset: u32,
    pub meshlet_count: u32,
    pub skinned: u32,
    pub _pad: u32,
    pub bounding_sphere: BoundingSphere,
}

/// A run of draws sharing one vertex buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderBatch {
    /// Per-frame index, also the batch's slot in the draw count buffer
    pub id: u32,
    pub vertex_buffer: BufferView,
    pub index_buffer: BufferView,
    pub index_format: IndexFormat,
    pub meshlets: Option<MeshletBuffers>,
    /// First entry in the shared per-draw buffers
    pub offset: u32,
    pub count: u32,
    vertex_end: u64,
    index_end: u64,
}

impl RenderBatch {
    fn open(id: u32, offset: u32, draw: &DrawData) -> Self {
        Self {
            id,
            vertex_buffer: draw.vertex_buffer,
            index_buffer: draw.index_buffer,
            index_format: draw.index_format,
            meshlets: draw.meshlets,
            offset,
            count: 0,
            vertex_end: 0,
            index_end: 0,
        }
    }

    fn push(&mut self, draw: &DrawData) {
        if draw.index_buffer.buffer != self.index_buffer.buffer {
            log::warn!(
                "Batch {}: draw uses index buffer {:?} but the batch binds {:?}",
                self.id,
                draw.index_buffer.buffer,
                self.index_buffer.buffer
            );
        }
        self.vertex_end = self
            .vertex_end
            .max(draw.vertex_buffer.offset + draw.vertex_buffer.size);
        self.index_end = self
            .index_end
            .max(draw.index_buffer.offset + draw.index_buffer.size);
        self.count += 1;
    }

    /// Vertex buffer range covering every draw of the batch, from the buffer start.
    ///
    /// Indirect commands carry absolute vertex offsets, so the binding starts at 0.
    pub fn vertex_binding(&self) -> BufferView {
        BufferView::new(self.vertex_buffer.buffer, 0, self.vertex_end)
    }

    /// Index buffer range covering every draw of the batch, from the buffer start
    pub fn index_binding(&self) -> BufferView {
        BufferView::new(self.index_buffer.buffer, 0, self.index_end)
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Shared per-draw GPU buffers, all indexed by draw slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawBuffers {
    pub transforms: BufferHandle,
    pub materials: BufferHandle,
    pub mesh_draws: BufferHandle,
    /// Commands written by the batch builder, one per draw
    pub draw_commands: BufferHandle,
    /// Commands of visible draws, appended by the cull pass per batch range
    pub visible_commands: BufferHandle,
    /// One `u32` visible count per batch id
    pub draw_counts: BufferHandle,
    pub capacity: u32,
}

impl DrawBuffers {
    pub const TRANSFORM_STRIDE: u64 = std::mem::size_of::<Mat4>() as u64;
    pub const MATERIAL_STRIDE: u64 = std::mem::size_of::<Material>() as u64;
    pub const MESH_DRAW_STRIDE: u64 = std::mem::size_of::<MeshDrawData>() as u64;
    pub const COMMAND_STRIDE: u64 = std::mem::size_of::<DrawIndexedIndirectCommand>() as u64;
    pub const COUNT_STRIDE: u64 = std::mem::size_of::<u32>() as u64;

    /// Create buffers for `capacity` draws (and as many batches).
    pub fn create(device: &mut dyn GraphicsDevice, capacity: u32) -> BackendResult<Self> {
        let draws = capacity as u64;
        let mut create = |label: &str, stride: u64, usage: BufferUsage| {
            device.create_buffer(&BufferDescriptor {
                label: Some(label.to_string()),
                size: draws * stride,
                usage: usage | BufferUsage::STORAGE | BufferUsage::COPY_DST,
            })
        };
        Ok(Self {
            transforms: create("draw transforms", Self::TRANSFORM_STRIDE, BufferUsage::empty())?,
            materials: create("draw materials", Self::MATERIAL_STRIDE, BufferUsage::empty())?,
            mesh_draws: create("mesh draw data", Self::MESH_DRAW_STRIDE, BufferUsage::empty())?,
            draw_commands: create("draw commands", Self::COMMAND_STRIDE, BufferUsage::INDIRECT)?,
            visible_commands: create(
                "visible draw commands",
                Self::COMMAND_STRIDE,
                BufferUsage::INDIRECT,
            )?,
            draw_counts: create("draw counts", Self::COUNT_STRIDE, BufferUsage::INDIRECT)?,
            capacity,
        })
    }

    pub fn destroy(&self, device: &mut dyn GraphicsDevice) {
        for buffer in [
            self.transforms,
            self.materials,
            self.mesh_draws,
            self.draw_commands,
            self.visible_commands,
            self.draw_counts,
        ] {
            device.destroy_buffer(buffer);
        }
    }

    fn range(buffer: BufferHandle, stride: u64, batch: &RenderBatch) -> BufferView {
        BufferView::new(buffer, batch.offset as u64 * stride, batch.count as u64 * stride)
    }

    pub fn transform_view(&self, batch: &RenderBatch) -> BufferView {
        Self::range(self.transforms, Self::TRANSFORM_STRIDE, batch)
    }

    pub fn mesh_draw_view(&self, batch: &RenderBatch) -> BufferView {
        Self::range(self.mesh_draws, Self::MESH_DRAW_STRIDE, batch)
    }

    pub fn draw_command_view(&self, batch: &RenderBatch) -> BufferView {
        Self::range(self.draw_commands, Self::COMMAND_STRIDE, batch)
    }

    pub fn visible_command_view(&self, batch: &RenderBatch) -> BufferView {
        Self::range(self.visible_commands, Self::COMMAND_STRIDE, batch)
    }

    /// The batch's slot in the draw count buffer
    pub fn count_view(&self, batch: &RenderBatch) -> BufferView {
        BufferView::new(
            self.draw_counts,
            batch.id as u64 * Self::COUNT_STRIDE,
            Self::COUNT_STRIDE,
        )
    }
}

/// Builds batches and fills the shared per-draw buffers.
#[derive(Debug, Default)]
pub struct BatchBuilder {
    next_id: u32,
}

impl BatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restart batch ids. Called once per rebuild, before the first list.
    pub fn reset(&mut self) {
        self.next_id = 0;
    }

    /// Group `draws` by vertex buffer, append the batches to `batches` and upload
    /// the per-draw records at `start_offset`. Returns the offset after the last draw.
    pub fn create_batch(
        &mut self,
        device: &mut dyn GraphicsDevice,
        buffers: &DrawBuffers,
        draws: &[DrawData],
        batches: &mut Vec<RenderBatch>,
        start_offset: u32,
    ) -> Result<u32, BatchError> {
        let requested = start_offset as u64 + draws.len() as u64;
        if requested > buffers.capacity as u64 {
            log::error!(
                "Batch builder: {} draws exceed the capacity of {}",
                requested,
                buffers.capacity
            );
            return Err(BatchError::CapacityExceeded {
                requested,
                capacity: buffers.capacity,
            });
        }
        if draws.is_empty() {
            return Ok(start_offset);
        }

        let mut sorted: Vec<&DrawData> = draws.iter().collect();
        sorted.sort_by_key(|draw| draw.vertex_buffer.buffer);

        let mut transforms = Vec::with_capacity(sorted.len());
        let mut materials = Vec::with_capacity(sorted.len());
        let mut mesh_draws = Vec::with_capacity(sorted.len());
        let mut commands = Vec::with_capacity(sorted.len());
        let mut current: Option<RenderBatch> = None;

        for (consumed, draw) in sorted.iter().enumerate() {
            let same_buffer = current
                .as_ref()
                .is_some_and(|batch| batch.vertex_buffer.buffer == draw.vertex_buffer.buffer);
            if !same_buffer {
                batches.extend(current.take());
                current = Some(RenderBatch::open(
                    self.next_id,
                    start_offset + consumed as u32,
                    draw,
                ));
                self.next_id += 1;
            }
            if let Some(batch) = current.as_mut() {
                batch.push(draw);
            }

            let mesh_draw = mesh_draw_data(draw);
            commands.push(DrawIndexedIndirectCommand {
                index_count: mesh_draw.index_count,
                instance_count: 1,
                first_index: mesh_draw.index_offset,
                vertex_offset: mesh_draw.vertex_offset as i32,
                first_instance: 0,
            });
            transforms.push(draw.transform);
            materials.push(draw.material);
            mesh_draws.push(mesh_draw);
        }
        batches.extend(current);

        let start = start_offset as u64;
        device.write_buffer(
            buffers.transforms,
            start * DrawBuffers::TRANSFORM_STRIDE,
            bytemuck::cast_slice(&transforms),
        )?;
        device.write_buffer(
            buffers.materials,
            start * DrawBuffers::MATERIAL_STRIDE,
            bytemuck::cast_slice(&materials),
        )?;
        device.write_buffer(
            buffers.mesh_draws,
            start * DrawBuffers::MESH_DRAW_STRIDE,
            bytemuck::cast_slice(&mesh_draws),
        )?;
        device.write_buffer(
            buffers.draw_commands,
            start * DrawBuffers::COMMAND_STRIDE,
            bytemuck::cast_slice(&commands),
        )?;

        log::trace!(
            "Batch builder: {} draws from offset {} in {} batches",
            draws.len(),
            start_offset,
            batches.len()
        );
        Ok(start_offset + draws.len() as u32)
    }
}

fn mesh_draw_data(draw: &DrawData) -> MeshDrawData {
    let vertex_stride = (if draw.skinned {
        std::mem::size_of::<SkinnedVertex>()
    } else {
        std::mem::size_of::<Vertex>()
    }) as u64;
    let index_size = draw.index_format.size();
    let (meshlet_offset, meshlet_count) = draw
        .meshlets
        .map(|m| {
            let offset = m.meshlets.offset / std::mem::size_of::<Meshlet>() as u64;
            (offset as u32, m.meshlet_count)
        })
        .unwrap_or((0, 0));

    MeshDrawData {
        index_offset: (draw.index_buffer.offset / index_size) as u32,
        index_count: draw.index_count,
        vertex_offset: (draw.vertex_buffer.offset / vertex_stride) as u32,
        vertex_count: (draw.vertex_buffer.size / vertex_stride) as u32,
        meshlet_offset,
        meshlet_count,
        skinned: draw.skinned as u32,
        _pad: 0,
        bounding_sphere: draw.bounding_sphere,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyDevice;
    use glam::Vec3;

    fn buffer(device: &mut DummyDevice, size: u64) -> BufferHandle {
        device
            .create_buffer(&BufferDescriptor {
                label: None,
                size,
                usage: BufferUsage::VERTEX,
            })
            .unwrap()
    }

    fn draw(vertex_buffer: BufferHandle, index_buffer: BufferHandle, slot: u64) -> DrawData {
        DrawData {
            vertex_buffer: BufferView::new(vertex_buffer, slot * 48 * 24, 48 * 24),
            index_buffer: BufferView::new(index_buffer, slot * 4 * 36, 4 * 36),
            index_format: IndexFormat::Uint32,
            index_count: 36,
            skinned: false,
            transform: Mat4::from_translation(Vec3::new(slot as f32, 0.0, 0.0)),
            material: Material::default(),
            meshlets: None,
            bounding_sphere: BoundingSphere::new(Vec3::ZERO, 1.0),
        }
    }

    #[test]
    fn test_mesh_draw_data_in_elements() {
        let mut device = DummyDevice::new();
        let (vb, ib) = (buffer(&mut device, 4096), buffer(&mut device, 4096));
        let data = mesh_draw_data(&draw(vb, ib, 2));
        assert_eq!(data.vertex_offset, 48);
        assert_eq!(data.vertex_count, 24);
        assert_eq!(data.index_offset, 72);
        assert_eq!(data.index_count, 36);

        let mut skinned = draw(vb, ib, 0);
        skinned.skinned = true;
        skinned.vertex_buffer = BufferView::new(vb, 160, 800);
        let data = mesh_draw_data(&skinned);
        assert_eq!((data.vertex_offset, data.vertex_count), (2, 10));
    }

    #[test]
    fn test_uploads_land_at_start_offset() {
        let mut device = DummyDevice::new();
        let buffers = DrawBuffers::create(&mut device, 16).unwrap();
        let (vb, ib) = (buffer(&mut device, 1 << 16), buffer(&mut device, 1 << 16));
        let draws = vec![draw(vb, ib, 0), draw(vb, ib, 1)];

        let mut batches = Vec::new();
        let mut builder = BatchBuilder::new();
        let next = builder
            .create_batch(&mut device, &buffers, &draws, &mut batches, 5)
            .unwrap();
        assert_eq!(next, 7);
        assert_eq!(batches[0].offset, 5);

        let bytes = device
            .read_buffer(
                buffers.draw_commands,
                5 * DrawBuffers::COMMAND_STRIDE,
                2 * DrawBuffers::COMMAND_STRIDE,
            )
            .unwrap();
        let commands: Vec<DrawIndexedIndirectCommand> = bytes
            .chunks_exact(DrawBuffers::COMMAND_STRIDE as usize)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        assert_eq!(commands[1].first_index, 36);
        assert_eq!(commands[1].vertex_offset, 24);
        assert_eq!(commands[1].instance_count, 1);
        assert_eq!(commands[1].first_instance, 0);
    }

    #[test]
    fn test_capacity_exceeded() {
        let mut device = DummyDevice::new();
        let buffers = DrawBuffers::create(&mut device, 2).unwrap();
        let (vb, ib) = (buffer(&mut device, 1 << 16), buffer(&mut device, 1 << 16));
        let draws = vec![draw(vb, ib, 0), draw(vb, ib, 1)];

        let mut batches = Vec::new();
        let result = BatchBuilder::new().create_batch(&mut device, &buffers, &draws, &mut batches, 1);
        assert_eq!(
            result,
            Err(BatchError::CapacityExceeded {
                requested: 3,
                capacity: 2
            })
        );
        assert!(batches.is_empty());
    }

    #[test]
    fn test_binding_covers_all_draws() {
        let mut device = DummyDevice::new();
        let buffers = DrawBuffers::create(&mut device, 8).unwrap();
        let (vb, ib) = (buffer(&mut device, 1 << 16), buffer(&mut device, 1 << 16));
        let draws = vec![draw(vb, ib, 3), draw(vb, ib, 1)];

        let mut batches = Vec::new();
        BatchBuilder::new()
            .create_batch(&mut device, &buffers, &draws, &mut batches, 0)
            .unwrap();
        assert_eq!(batches[0].vertex_binding(), BufferView::new(vb, 0, 4 * 48 * 24));
        assert_eq!(batches[0].index_binding(), BufferView::new(ib, 0, 4 * 4 * 36));
    }
}
