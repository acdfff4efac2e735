//! Dummy device for testing and development.
//!
//! This device doesn't talk to a GPU. Buffers live in host memory, every
//! recorded command is kept for inspection, and compute dispatches can run a
//! registered software kernel so compute passes are testable end to end.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::traits::*;
use crate::backend::types::*;

/// A CPU implementation of a compute shader, keyed by compute pipeline label.
pub type SoftwareKernel =
    Arc<dyn Fn(&mut KernelInvocation<'_>) -> BackendResult<()> + Send + Sync>;

/// Everything a software kernel can see during one dispatch
pub struct KernelInvocation<'a> {
    pub group_count: [u32; 3],
    pub push_constants: &'a [u8],
    pub bindings: &'a [BufferView],
    pub memory: &'a mut DummyMemory,
}

/// Host-side storage backing dummy buffers
#[derive(Debug, Default)]
pub struct DummyMemory {
    buffers: HashMap<u64, DummyBuffer>,
}

#[derive(Debug)]
struct DummyBuffer {
    desc: BufferDescriptor,
    data: Vec<u8>,
}

impl DummyMemory {
    fn buffer(&self, handle: BufferHandle) -> BackendResult<&DummyBuffer> {
        self.buffers.get(&handle.0).ok_or(BackendError::InvalidHandle {
            kind: "buffer",
            raw: handle.0,
        })
    }

    fn buffer_mut(&mut self, handle: BufferHandle) -> BackendResult<&mut DummyBuffer> {
        self.buffers.get_mut(&handle.0).ok_or(BackendError::InvalidHandle {
            kind: "buffer",
            raw: handle.0,
        })
    }

    /// Bytes covered by a view
    pub fn read(&self, view: BufferView) -> BackendResult<&[u8]> {
        let buffer = self.buffer(view.buffer)?;
        let range = checked_range(view.offset, view.size, buffer.data.len() as u64)?;
        Ok(&buffer.data[range])
    }

    /// Write `data` at `offset` bytes into a view
    pub fn write(&mut self, view: BufferView, offset: u64, data: &[u8]) -> BackendResult<()> {
        let len = data.len() as u64;
        if offset + len > view.size {
            return Err(BackendError::OutOfRange {
                offset: view.offset + offset,
                len,
                size: view.offset + view.size,
            });
        }
        let buffer = self.buffer_mut(view.buffer)?;
        let range = checked_range(view.offset + offset, len, buffer.data.len() as u64)?;
        buffer.data[range].copy_from_slice(data);
        Ok(())
    }
}

fn checked_range(offset: u64, len: u64, size: u64) -> BackendResult<std::ops::Range<usize>> {
    if offset + len > size {
        return Err(BackendError::OutOfRange { offset, len, size });
    }
    Ok(offset as usize..(offset + len) as usize)
}

/// A command recorded by the dummy device
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    FillBuffer {
        buffer: BufferHandle,
        offset: u64,
        size: u64,
        value: u32,
    },
    Barrier {
        images: Vec<ImageBarrier>,
        buffers: Vec<BufferBarrier>,
    },
    BeginRenderPass {
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
    },
    EndRenderPass,
    BindComputePipeline(ComputePipelineHandle),
    BindGraphicsPipeline(GraphicsPipelineHandle),
    BindStorageBuffers(Vec<BufferView>),
    BindSampledTexture {
        slot: u32,
        texture: TextureHandle,
    },
    PushConstants(Vec<u8>),
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    BindVertexBuffer(BufferView),
    BindIndexBuffer(BufferView, IndexFormat),
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    DrawIndexedIndirectCount {
        commands: BufferView,
        count: BufferView,
        max_draw_count: u32,
        stride: u32,
    },
    BeginSwapchainPass(SwapchainImage),
    EndSwapchainPass,
    Present,
}

/// Object creation counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStats {
    pub buffers_created: u32,
    pub buffers_destroyed: u32,
    pub textures_created: u32,
    pub textures_destroyed: u32,
    pub render_passes_created: u32,
    pub render_passes_destroyed: u32,
    pub framebuffers_created: u32,
    pub framebuffers_destroyed: u32,
    pub pipelines_created: u32,
    pub pipelines_destroyed: u32,
}

/// Dummy graphics device.
pub struct DummyDevice {
    next_handle: u64,
    memory: DummyMemory,
    textures: HashMap<u64, TextureDescriptor>,
    render_passes: HashMap<u64, RenderPassDescriptor>,
    framebuffers: HashMap<u64, FramebufferDescriptor>,
    compute_pipelines: HashMap<u64, ComputePipelineDescriptor>,
    graphics_pipelines: HashMap<u64, GraphicsPipelineDescriptor>,
    kernels: HashMap<String, SoftwareKernel>,
    bound_compute: Option<ComputePipelineHandle>,
    bound_storage: Vec<BufferView>,
    push_constant_data: Vec<u8>,
    commands: Vec<DeviceCommand>,
    stats: DeviceStats,
    swapchain_ready: bool,
    swapchain_size: (u32, u32),
    frame_index: u32,
}

impl DummyDevice {
    /// Create a new dummy device with a ready 1280x720 swapchain.
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            memory: DummyMemory::default(),
            textures: HashMap::new(),
            render_passes: HashMap::new(),
            framebuffers: HashMap::new(),
            compute_pipelines: HashMap::new(),
            graphics_pipelines: HashMap::new(),
            kernels: HashMap::new(),
            bound_compute: None,
            bound_storage: Vec::new(),
            push_constant_data: Vec::new(),
            commands: Vec::new(),
            stats: DeviceStats::default(),
            swapchain_ready: true,
            swapchain_size: (1280, 720),
            frame_index: 0,
        }
    }

    /// Register a software kernel run by dispatches of pipelines with this label
    pub fn register_kernel(&mut self, label: &str, kernel: SoftwareKernel) {
        self.kernels.insert(label.to_string(), kernel);
    }

    /// Simulate a minimized window or an out-of-date swapchain
    pub fn set_swapchain_ready(&mut self, ready: bool) {
        self.swapchain_ready = ready;
    }

    pub fn set_swapchain_size(&mut self, width: u32, height: u32) {
        self.swapchain_size = (width, height);
    }

    /// Commands recorded since the last [`DummyDevice::clear_commands`]
    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    pub fn memory(&self) -> &DummyMemory {
        &self.memory
    }

    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture.0)
    }

    pub fn render_pass_descriptor(&self, render_pass: RenderPassHandle) -> Option<&RenderPassDescriptor> {
        self.render_passes.get(&render_pass.0)
    }

    pub fn framebuffer_descriptor(&self, framebuffer: FramebufferHandle) -> Option<&FramebufferDescriptor> {
        self.framebuffers.get(&framebuffer.0)
    }

    /// Number of textures currently alive
    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Number of buffers currently alive
    pub fn live_buffer_count(&self) -> usize {
        self.memory.buffers.len()
    }

    /// Frames presented so far
    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    fn allocate_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn run_kernel(&mut self, group_count: [u32; 3]) -> BackendResult<()> {
        let Some(pipeline) = self.bound_compute else {
            log::warn!("DummyDevice: dispatch without a bound compute pipeline");
            return Ok(());
        };
        let Some(desc) = self.compute_pipelines.get(&pipeline.0) else {
            return Err(BackendError::InvalidHandle {
                kind: "compute pipeline",
                raw: pipeline.0,
            });
        };
        let Some(kernel) = self.kernels.get(&desc.label).cloned() else {
            log::trace!("DummyDevice: no software kernel for '{}'", desc.label);
            return Ok(());
        };

        let bindings = self.bound_storage.clone();
        let push_constants = self.push_constant_data.clone();
        let mut invocation = KernelInvocation {
            group_count,
            push_constants: &push_constants,
            bindings: &bindings,
            memory: &mut self.memory,
        };
        kernel(&mut invocation)
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsDevice for DummyDevice {
    fn name(&self) -> &str {
        "Dummy"
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        if desc.size == 0 {
            return Err(BackendError::BufferCreationFailed(format!(
                "{:?}: zero-sized buffer",
                desc.label
            )));
        }
        log::trace!(
            "DummyDevice: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        let handle = self.allocate_handle();
        self.memory.buffers.insert(
            handle,
            DummyBuffer {
                desc: desc.clone(),
                data: vec![0u8; desc.size as usize],
            },
        );
        self.stats.buffers_created += 1;
        Ok(BufferHandle(handle))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> BackendResult<()> {
        log::trace!(
            "DummyDevice: write_buffer {:?} offset={} len={}",
            buffer,
            offset,
            data.len()
        );
        let target = self.memory.buffer_mut(buffer)?;
        let range = checked_range(offset, data.len() as u64, target.data.len() as u64)?;
        target.data[range].copy_from_slice(data);
        Ok(())
    }

    fn fill_buffer(&mut self, buffer: BufferHandle, offset: u64, size: u64, value: u32) {
        self.commands.push(DeviceCommand::FillBuffer {
            buffer,
            offset,
            size,
            value,
        });
        let fill = value.to_le_bytes();
        match self.memory.buffer_mut(buffer) {
            Ok(target) => {
                let end = (offset + size).min(target.data.len() as u64) as usize;
                for (i, byte) in target.data[offset as usize..end].iter_mut().enumerate() {
                    *byte = fill[i % 4];
                }
            }
            Err(err) => log::error!("DummyDevice: fill_buffer failed: {err}"),
        }
    }

    fn read_buffer(&mut self, buffer: BufferHandle, offset: u64, size: u64) -> BackendResult<Vec<u8>> {
        let source = self.memory.buffer(buffer)?;
        let range = checked_range(offset, size, source.data.len() as u64)?;
        Ok(source.data[range].to_vec())
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 || desc.array_layers == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?}: degenerate extent {}x{}x{}",
                desc.label, desc.width, desc.height, desc.array_layers
            )));
        }
        log::trace!(
            "DummyDevice: creating texture {:?} ({}x{}, {} layers, {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.array_layers,
            desc.format
        );
        let handle = self.allocate_handle();
        self.textures.insert(handle, desc.clone());
        self.stats.textures_created += 1;
        Ok(TextureHandle(handle))
    }

    fn create_render_pass(&mut self, desc: &RenderPassDescriptor) -> BackendResult<RenderPassHandle> {
        log::trace!(
            "DummyDevice: creating render pass '{}' ({} color, depth: {})",
            desc.label,
            desc.color_attachments.len(),
            desc.depth_attachment.is_some()
        );
        let handle = self.allocate_handle();
        self.render_passes.insert(handle, desc.clone());
        self.stats.render_passes_created += 1;
        Ok(RenderPassHandle(handle))
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDescriptor) -> BackendResult<FramebufferHandle> {
        if !self.render_passes.contains_key(&desc.render_pass.0) {
            return Err(BackendError::FramebufferCreationFailed(format!(
                "'{}': unknown render pass {:?}",
                desc.label, desc.render_pass
            )));
        }
        let attachments = desc.color_attachments.iter().chain(desc.depth_attachment.iter());
        for texture in attachments {
            if !self.textures.contains_key(&texture.0) {
                return Err(BackendError::FramebufferCreationFailed(format!(
                    "'{}': unknown attachment {:?}",
                    desc.label, texture
                )));
            }
        }
        let handle = self.allocate_handle();
        self.framebuffers.insert(handle, desc.clone());
        self.stats.framebuffers_created += 1;
        Ok(FramebufferHandle(handle))
    }

    fn create_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDescriptor,
    ) -> BackendResult<ComputePipelineHandle> {
        log::trace!("DummyDevice: creating compute pipeline '{}'", desc.label);
        let handle = self.allocate_handle();
        self.compute_pipelines.insert(handle, desc.clone());
        self.stats.pipelines_created += 1;
        Ok(ComputePipelineHandle(handle))
    }

    fn create_graphics_pipeline(
        &mut self,
        desc: &GraphicsPipelineDescriptor,
    ) -> BackendResult<GraphicsPipelineHandle> {
        log::trace!("DummyDevice: creating graphics pipeline '{}'", desc.label);
        let handle = self.allocate_handle();
        self.graphics_pipelines.insert(handle, desc.clone());
        self.stats.pipelines_created += 1;
        Ok(GraphicsPipelineHandle(handle))
    }

    fn pipeline_barrier(&mut self, images: &[ImageBarrier], buffers: &[BufferBarrier]) {
        if images.is_empty() && buffers.is_empty() {
            return;
        }
        self.commands.push(DeviceCommand::Barrier {
            images: images.to_vec(),
            buffers: buffers.to_vec(),
        });
    }

    fn begin_render_pass(&mut self, render_pass: RenderPassHandle, framebuffer: FramebufferHandle) {
        self.commands.push(DeviceCommand::BeginRenderPass {
            render_pass,
            framebuffer,
        });
    }

    fn end_render_pass(&mut self) {
        self.commands.push(DeviceCommand::EndRenderPass);
    }

    fn bind_compute_pipeline(&mut self, pipeline: ComputePipelineHandle) {
        self.bound_compute = Some(pipeline);
        self.commands.push(DeviceCommand::BindComputePipeline(pipeline));
    }

    fn bind_graphics_pipeline(&mut self, pipeline: GraphicsPipelineHandle) {
        self.commands.push(DeviceCommand::BindGraphicsPipeline(pipeline));
    }

    fn bind_storage_buffers(&mut self, views: &[BufferView]) {
        self.bound_storage = views.to_vec();
        self.commands.push(DeviceCommand::BindStorageBuffers(views.to_vec()));
    }

    fn bind_sampled_texture(&mut self, slot: u32, texture: TextureHandle) {
        self.commands
            .push(DeviceCommand::BindSampledTexture { slot, texture });
    }

    fn push_constants(&mut self, data: &[u8]) {
        self.push_constant_data = data.to_vec();
        self.commands.push(DeviceCommand::PushConstants(data.to_vec()));
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.commands.push(DeviceCommand::Dispatch { x, y, z });
        if let Err(err) = self.run_kernel([x, y, z]) {
            log::error!("DummyDevice: software kernel failed: {err}");
        }
    }

    fn bind_vertex_buffer(&mut self, view: BufferView) {
        self.commands.push(DeviceCommand::BindVertexBuffer(view));
    }

    fn bind_index_buffer(&mut self, view: BufferView, format: IndexFormat) {
        self.commands.push(DeviceCommand::BindIndexBuffer(view, format));
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        self.commands.push(DeviceCommand::Draw {
            vertex_count,
            instance_count,
        });
    }

    fn draw_indexed_indirect_count(
        &mut self,
        commands: BufferView,
        count: BufferView,
        max_draw_count: u32,
        stride: u32,
    ) {
        self.commands.push(DeviceCommand::DrawIndexedIndirectCount {
            commands,
            count,
            max_draw_count,
            stride,
        });
    }

    fn acquire_swapchain_image(&mut self) -> BackendResult<Option<SwapchainImage>> {
        if !self.swapchain_ready {
            return Ok(None);
        }
        Ok(Some(SwapchainImage {
            index: self.frame_index % 3,
            width: self.swapchain_size.0,
            height: self.swapchain_size.1,
        }))
    }

    fn begin_swapchain_pass(&mut self, image: &SwapchainImage) {
        self.commands.push(DeviceCommand::BeginSwapchainPass(*image));
    }

    fn end_swapchain_pass(&mut self) {
        self.commands.push(DeviceCommand::EndSwapchainPass);
    }

    fn present(&mut self) -> BackendResult<()> {
        self.commands.push(DeviceCommand::Present);
        self.frame_index += 1;
        Ok(())
    }

    fn wait_idle(&mut self) {
        log::trace!("DummyDevice: wait_idle");
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        match self.memory.buffers.remove(&buffer.0) {
            Some(removed) => {
                log::trace!("DummyDevice: destroying buffer {:?}", removed.desc.label);
                self.stats.buffers_destroyed += 1;
            }
            None => log::warn!("DummyDevice: destroying unknown buffer {:?}", buffer),
        }
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture.0).is_some() {
            self.stats.textures_destroyed += 1;
        } else {
            log::warn!("DummyDevice: destroying unknown texture {:?}", texture);
        }
    }

    fn destroy_render_pass(&mut self, render_pass: RenderPassHandle) {
        if self.render_passes.remove(&render_pass.0).is_some() {
            self.stats.render_passes_destroyed += 1;
        }
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if self.framebuffers.remove(&framebuffer.0).is_some() {
            self.stats.framebuffers_destroyed += 1;
        }
    }

    fn destroy_compute_pipeline(&mut self, pipeline: ComputePipelineHandle) {
        if self.compute_pipelines.remove(&pipeline.0).is_some() {
            self.stats.pipelines_destroyed += 1;
        }
        if self.bound_compute == Some(pipeline) {
            self.bound_compute = None;
        }
    }

    fn destroy_graphics_pipeline(&mut self, pipeline: GraphicsPipelineHandle) {
        if self.graphics_pipelines.remove(&pipeline.0).is_some() {
            self.stats.pipelines_destroyed += 1;
        }
    }
}
