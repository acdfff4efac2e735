//! Frame graph resource and node records

use crate::backend::{
    BufferHandle, BufferUsage, FramebufferDescriptor, FramebufferHandle, ImageAspect, LoadOp,
    RenderPassDescriptor, RenderPassHandle, TextureFormat, TextureHandle,
};
use crate::frame_graph::pool::Handle;

pub type NodeHandle = Handle<FrameGraphNode>;
pub type ResourceHandle = Handle<FrameGraphResource>;

/// Kind of data a resource carries between nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameGraphResourceType {
    Buffer,
    /// Sampled texture
    Texture,
    /// Color or depth render target
    Attachment,
    StorageImage,
    /// Output that writes into a resource declared by another pass
    Reference,
    #[default]
    Invalid,
}

impl FrameGraphResourceType {
    /// Decode a resource type name. Unrecognized names become `Invalid`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "attachment" => Self::Attachment,
            "texture" => Self::Texture,
            "buffer" => Self::Buffer,
            "reference" => Self::Reference,
            "storage-image" => Self::StorageImage,
            _ => Self::Invalid,
        }
    }

    /// Resources backed by an image
    pub fn is_texture_like(&self) -> bool {
        matches!(self, Self::Texture | Self::Attachment | Self::StorageImage)
    }

    /// Resources whose backing texture the graph allocates at compile time
    pub fn is_graph_allocated(&self) -> bool {
        matches!(self, Self::Attachment | Self::StorageImage)
    }
}

/// Image metadata of a texture-like resource
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub format: TextureFormat,
    pub aspect: ImageAspect,
    pub layers: u32,
    pub load_op: LoadOp,
    pub texture: Option<TextureHandle>,
}

impl TextureInfo {
    pub fn new(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            depth: 1,
            format,
            aspect: format.aspect(),
            layers: 1,
            load_op: LoadOp::DontCare,
            texture: None,
        }
    }

    pub fn is_depth(&self) -> bool {
        self.aspect.contains(ImageAspect::DEPTH)
    }
}

/// Buffer metadata
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferInfo {
    pub size: u64,
    pub usage: BufferUsage,
    pub buffer: Option<BufferHandle>,
}

/// Type-specific resource metadata
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ResourceInfo {
    #[default]
    None,
    Texture(TextureInfo),
    Buffer(BufferInfo),
}

impl ResourceInfo {
    pub fn texture(&self) -> Option<&TextureInfo> {
        match self {
            ResourceInfo::Texture(info) => Some(info),
            _ => None,
        }
    }

    pub fn texture_mut(&mut self) -> Option<&mut TextureInfo> {
        match self {
            ResourceInfo::Texture(info) => Some(info),
            _ => None,
        }
    }
}

/// One named data artifact flowing between nodes
#[derive(Debug, Clone, Default)]
pub struct FrameGraphResource {
    pub name: String,
    pub resource_type: FrameGraphResourceType,
    pub info: ResourceInfo,
    /// Node that outputs this resource. Empty for inputs until edges are computed.
    pub producer: Option<NodeHandle>,
    /// Canonical output record this resource aliases
    pub output_handle: Option<ResourceHandle>,
    /// Enabled consumers counted during the last compile
    pub ref_count: u32,
}

/// One pass in the graph
#[derive(Debug, Clone, Default)]
pub struct FrameGraphNode {
    pub name: String,
    pub enabled: bool,
    pub compute: bool,
    pub render_pass: Option<RenderPassHandle>,
    pub framebuffer: Option<FramebufferHandle>,
    /// Descriptors `render_pass` and `framebuffer` were built from
    pub render_pass_desc: Option<RenderPassDescriptor>,
    pub framebuffer_desc: Option<FramebufferDescriptor>,
    /// Nodes consuming this node's outputs
    pub edges: Vec<NodeHandle>,
    pub inputs: Vec<ResourceHandle>,
    pub outputs: Vec<ResourceHandle>,
}

/// Static description of a resource, decoded from the graph description
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceCreation {
    pub name: String,
    pub resource_type: FrameGraphResourceType,
    pub info: ResourceInfo,
}

/// Static description of a node, decoded from the graph description
#[derive(Debug, Clone, PartialEq)]
pub struct NodeCreation {
    pub name: String,
    pub enabled: bool,
    pub compute: bool,
    pub inputs: Vec<ResourceCreation>,
    pub outputs: Vec<ResourceCreation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_names() {
        assert_eq!(
            FrameGraphResourceType::from_name("storage-image"),
            FrameGraphResourceType::StorageImage
        );
        assert_eq!(
            FrameGraphResourceType::from_name("Attachment"),
            FrameGraphResourceType::Invalid
        );
        assert!(FrameGraphResourceType::Attachment.is_graph_allocated());
        assert!(!FrameGraphResourceType::Texture.is_graph_allocated());
    }

    #[test]
    fn test_texture_info_aspect_follows_format() {
        let info = TextureInfo::new(16, 16, TextureFormat::Depth32Float);
        assert!(info.is_depth());
        assert_eq!(info.layers, 1);
    }
}
