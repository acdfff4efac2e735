//! Common types shared between the frame graph and device implementations

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

use crate::backend::traits::{BufferHandle, RenderPassHandle, TextureHandle};

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Rg16Float,
    Rgba32Float,
    R32Float,
    Depth16Unorm,
    Depth32Float,
    Depth24PlusStencil8,
}

impl TextureFormat {
    /// Decode a format name from a graph description.
    ///
    /// Accepts Vulkan-style names with or without the `VK_FORMAT_` prefix and
    /// a handful of short aliases, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        let key = upper.strip_prefix("VK_FORMAT_").unwrap_or(&upper);
        let format = match key {
            "R8G8B8A8_UNORM" | "RGBA8" => TextureFormat::Rgba8Unorm,
            "R8G8B8A8_SRGB" | "RGBA8_SRGB" => TextureFormat::Rgba8UnormSrgb,
            "B8G8R8A8_UNORM" | "BGRA8" => TextureFormat::Bgra8Unorm,
            "B8G8R8A8_SRGB" | "BGRA8_SRGB" => TextureFormat::Bgra8UnormSrgb,
            "R16G16B16A16_SFLOAT" | "RGBA16F" => TextureFormat::Rgba16Float,
            "R16G16_SFLOAT" | "RG16F" => TextureFormat::Rg16Float,
            "R32G32B32A32_SFLOAT" | "RGBA32F" => TextureFormat::Rgba32Float,
            "R32_SFLOAT" | "R32F" => TextureFormat::R32Float,
            "D16_UNORM" | "D16" => TextureFormat::Depth16Unorm,
            "D32_SFLOAT" | "D32" => TextureFormat::Depth32Float,
            "D24_UNORM_S8_UINT" | "D24S8" => TextureFormat::Depth24PlusStencil8,
            _ => return None,
        };
        Some(format)
    }

    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth16Unorm
                | TextureFormat::Depth32Float
                | TextureFormat::Depth24PlusStencil8
        )
    }

    pub fn has_stencil(&self) -> bool {
        matches!(self, TextureFormat::Depth24PlusStencil8)
    }

    /// Image aspect implied by the format
    pub fn aspect(&self) -> ImageAspect {
        if self.has_stencil() {
            ImageAspect::DEPTH | ImageAspect::STENCIL
        } else if self.is_depth() {
            ImageAspect::DEPTH
        } else {
            ImageAspect::COLOR
        }
    }
}

bitflags! {
    /// Which aspects of an image a view or barrier covers
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageAspect: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

bitflags! {
    /// Texture usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const COPY_SRC = 1 << 0;
        const COPY_DST = 1 << 1;
        const SAMPLED = 1 << 2;
        const STORAGE = 1 << 3;
        const RENDER_ATTACHMENT = 1 << 4;
    }
}

bitflags! {
    /// Buffer usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const COPY_SRC = 1 << 0;
        const COPY_DST = 1 << 1;
        const INDEX = 1 << 2;
        const VERTEX = 1 << 3;
        const UNIFORM = 1 << 4;
        const STORAGE = 1 << 5;
        const INDIRECT = 1 << 6;
    }
}

bitflags! {
    /// Pipeline stages a barrier waits on or blocks
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStages: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const DRAW_INDIRECT = 1 << 1;
        const VERTEX_INPUT = 1 << 2;
        const VERTEX_SHADER = 1 << 3;
        const FRAGMENT_SHADER = 1 << 4;
        const EARLY_FRAGMENT_TESTS = 1 << 5;
        const LATE_FRAGMENT_TESTS = 1 << 6;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 7;
        const COMPUTE_SHADER = 1 << 8;
        const TRANSFER = 1 << 9;
        const BOTTOM_OF_PIPE = 1 << 10;
    }
}

bitflags! {
    /// Memory access kinds made available or visible by a barrier.
    ///
    /// The empty set is the "none" access used for layout-only transitions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const INDIRECT_COMMAND_READ = 1 << 0;
        const SHADER_READ = 1 << 1;
        const SHADER_WRITE = 1 << 2;
        const COLOR_ATTACHMENT_READ = 1 << 3;
        const COLOR_ATTACHMENT_WRITE = 1 << 4;
        const DEPTH_STENCIL_READ = 1 << 5;
        const DEPTH_STENCIL_WRITE = 1 << 6;
        const TRANSFER_READ = 1 << 7;
        const TRANSFER_WRITE = 1 << 8;
    }
}

/// How an attachment's previous contents are treated when a render pass begins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadOp {
    Clear,
    Load,
    #[default]
    DontCare,
}

impl LoadOp {
    /// Decode a load operation name. Unrecognized names become `DontCare`.
    pub fn from_name(name: &str) -> Self {
        let lower = name.trim().to_ascii_lowercase();
        let key = lower
            .strip_prefix("vk_attachment_load_op_")
            .unwrap_or(&lower);
        match key {
            "clear" => LoadOp::Clear,
            "load" => LoadOp::Load,
            _ => LoadOp::DontCare,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Store,
    Discard,
}

/// View dimensionality of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureViewDimension {
    #[default]
    D2,
    D2Array,
}

/// Texture descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub array_layers: u32,
    pub mip_levels: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub view_dimension: TextureViewDimension,
    /// Register the texture in the bindless sampled-image table
    pub bindless: bool,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            depth: 1,
            array_layers: 1,
            mip_levels: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::SAMPLED | TextureUsage::COPY_DST,
            view_dimension: TextureViewDimension::D2,
            bindless: false,
        }
    }
}

/// Buffer descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsage,
}

/// A byte range of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferView {
    pub buffer: BufferHandle,
    pub offset: u64,
    pub size: u64,
}

impl BufferView {
    pub fn new(buffer: BufferHandle, offset: u64, size: u64) -> Self {
        Self {
            buffer,
            offset,
            size,
        }
    }
}

/// One attachment slot of a render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentDescription {
    pub format: TextureFormat,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

/// Render pass descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPassDescriptor {
    pub label: String,
    pub color_attachments: Vec<AttachmentDescription>,
    pub depth_attachment: Option<AttachmentDescription>,
}

/// Framebuffer descriptor binding concrete textures to a render pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferDescriptor {
    pub label: String,
    pub render_pass: RenderPassHandle,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub color_attachments: Vec<TextureHandle>,
    pub depth_attachment: Option<TextureHandle>,
}

/// Compute pipeline descriptor
#[derive(Debug, Clone)]
pub struct ComputePipelineDescriptor {
    pub label: String,
    pub shader: String,
    pub entry_point: String,
    pub push_constant_size: u32,
}

/// Graphics pipeline descriptor
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDescriptor {
    pub label: String,
    pub render_pass: Option<RenderPassHandle>,
    pub vertex_shader: String,
    pub fragment_shader: Option<String>,
    pub depth_write: bool,
}

/// Image memory barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub texture: TextureHandle,
    pub aspect: ImageAspect,
    pub layer_count: u32,
    pub src_stage: PipelineStages,
    pub dst_stage: PipelineStages,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
}

/// Buffer memory barrier over a byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: BufferHandle,
    pub offset: u64,
    pub size: u64,
    pub src_stage: PipelineStages,
    pub dst_stage: PipelineStages,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
}

/// GPU layout of one indexed indirect draw
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedIndirectCommand {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
}

/// Index format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

impl IndexFormat {
    pub fn size(&self) -> u64 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

/// Standard vertex with position, normal, UV, and tangent
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub tangent: Vec4,
}

/// Vertex layout used by skinned meshes
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SkinnedVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub tangent: Vec4,
    pub joints: [u32; 4],
    pub weights: Vec4,
}
