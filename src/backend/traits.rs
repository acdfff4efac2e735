//! Core device abstraction traits
//!
//! The frame graph, the batch builder and the passes only ever talk to the GPU
//! through [`GraphicsDevice`]. The device is passed explicitly to every call that
//! records commands or creates resources; there is no global device.

use crate::backend::types::*;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create render pass: {0}")]
    RenderPassCreationFailed(String),
    #[error("Failed to create framebuffer: {0}")]
    FramebufferCreationFailed(String),
    #[error("Failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("Invalid {kind} handle {raw}")]
    InvalidHandle { kind: &'static str, raw: u64 },
    #[error("Invalid bindings: {0}")]
    InvalidBinding(String),
    #[error("Buffer access out of range: offset {offset} + {len} exceeds size {size}")]
    OutOfRange { offset: u64, len: u64, size: u64 },
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a GPU texture (with its default view)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a render pass object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPassHandle(pub(crate) u64);

/// Handle to a framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub(crate) u64);

/// Handle to a graphics pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphicsPipelineHandle(pub(crate) u64);

/// Handle to a compute pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputePipelineHandle(pub(crate) u64);

macro_rules! impl_raw {
    ($($handle:ty),*) => {
        $(
            impl $handle {
                /// Raw backend value, for logging and sorting
                pub fn raw(&self) -> u64 {
                    self.0
                }
            }
        )*
    };
}

impl_raw!(
    BufferHandle,
    TextureHandle,
    RenderPassHandle,
    FramebufferHandle,
    GraphicsPipelineHandle,
    ComputePipelineHandle
);

/// Swapchain image acquired for the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainImage {
    pub index: u32,
    pub width: u32,
    pub height: u32,
}

/// Main device trait
///
/// Commands are recorded into the device's current command list in call
/// order. Implementations decide when to submit.
pub trait GraphicsDevice {
    /// Device name for logging
    fn name(&self) -> &str;

    // Resource creation

    /// Create a buffer
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle>;

    /// Upload data into a buffer at a byte offset
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> BackendResult<()>;

    /// Record a fill of `size` bytes starting at `offset` with a repeated `u32`
    fn fill_buffer(&mut self, buffer: BufferHandle, offset: u64, size: u64, value: u32);

    /// Read back buffer contents
    fn read_buffer(&mut self, buffer: BufferHandle, offset: u64, size: u64) -> BackendResult<Vec<u8>>;

    /// Create a texture and its default view
    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Create a render pass object
    fn create_render_pass(&mut self, desc: &RenderPassDescriptor) -> BackendResult<RenderPassHandle>;

    /// Create a framebuffer for a render pass
    fn create_framebuffer(&mut self, desc: &FramebufferDescriptor) -> BackendResult<FramebufferHandle>;

    /// Create a compute pipeline
    fn create_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDescriptor,
    ) -> BackendResult<ComputePipelineHandle>;

    /// Create a graphics pipeline
    fn create_graphics_pipeline(
        &mut self,
        desc: &GraphicsPipelineDescriptor,
    ) -> BackendResult<GraphicsPipelineHandle>;

    // Command recording

    /// Insert a pipeline barrier
    fn pipeline_barrier(&mut self, images: &[ImageBarrier], buffers: &[BufferBarrier]);

    /// Begin a render pass on a framebuffer
    fn begin_render_pass(&mut self, render_pass: RenderPassHandle, framebuffer: FramebufferHandle);

    /// End the current render pass
    fn end_render_pass(&mut self);

    /// Bind a compute pipeline
    fn bind_compute_pipeline(&mut self, pipeline: ComputePipelineHandle);

    /// Bind a graphics pipeline
    fn bind_graphics_pipeline(&mut self, pipeline: GraphicsPipelineHandle);

    /// Bind storage-buffer views to consecutive binding slots starting at 0
    fn bind_storage_buffers(&mut self, views: &[BufferView]);

    /// Bind a sampled texture to a slot
    fn bind_sampled_texture(&mut self, slot: u32, texture: TextureHandle);

    /// Set push constant bytes for the bound pipeline
    fn push_constants(&mut self, data: &[u8]);

    /// Dispatch compute work
    fn dispatch(&mut self, x: u32, y: u32, z: u32);

    /// Set vertex buffer
    fn bind_vertex_buffer(&mut self, view: BufferView);

    /// Set index buffer
    fn bind_index_buffer(&mut self, view: BufferView, format: IndexFormat);

    /// Draw non-indexed primitives
    fn draw(&mut self, vertex_count: u32, instance_count: u32);

    /// Draw indexed primitives reading commands and their count from GPU buffers
    fn draw_indexed_indirect_count(
        &mut self,
        commands: BufferView,
        count: BufferView,
        max_draw_count: u32,
        stride: u32,
    );

    // Presentation

    /// Acquire the next swapchain image; `None` when the swapchain is not ready
    fn acquire_swapchain_image(&mut self) -> BackendResult<Option<SwapchainImage>>;

    /// Begin rendering directly into the acquired swapchain image
    fn begin_swapchain_pass(&mut self, image: &SwapchainImage);

    /// End the swapchain pass
    fn end_swapchain_pass(&mut self);

    /// Submit recorded work and present the acquired image
    fn present(&mut self) -> BackendResult<()>;

    /// Block until the GPU is idle
    fn wait_idle(&mut self);

    // Resource cleanup

    /// Destroy a buffer
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Destroy a texture
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Destroy a render pass
    fn destroy_render_pass(&mut self, render_pass: RenderPassHandle);

    /// Destroy a framebuffer
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);

    /// Destroy a compute pipeline
    fn destroy_compute_pipeline(&mut self, pipeline: ComputePipelineHandle);

    /// Destroy a graphics pipeline
    fn destroy_graphics_pipeline(&mut self, pipeline: GraphicsPipelineHandle);
}
