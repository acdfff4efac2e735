//! Pass implementation contract

use crate::backend::{BackendResult, GraphicsDevice, RenderPassHandle, TextureHandle};
use crate::frame_graph::builder::FrameGraphBuilder;
use crate::frame_graph::resource::{FrameGraphNode, ResourceHandle};
use crate::scene::RenderScene;

/// Context handed to a pass while it records commands
pub struct PassContext<'a> {
    pub device: &'a mut dyn GraphicsDevice,
    pub scene: &'a RenderScene,
    pub(crate) builder: &'a FrameGraphBuilder,
    pub(crate) node: &'a FrameGraphNode,
}

impl<'a> PassContext<'a> {
    pub fn node_name(&self) -> &str {
        &self.node.name
    }

    /// Backing texture of an input, by resource name
    pub fn input_texture(&self, name: &str) -> Option<TextureHandle> {
        self.find_texture(&self.node.inputs, name)
    }

    /// Backing texture of an output, by resource name
    pub fn output_texture(&self, name: &str) -> Option<TextureHandle> {
        self.find_texture(&self.node.outputs, name)
    }

    fn find_texture(&self, handles: &[ResourceHandle], name: &str) -> Option<TextureHandle> {
        handles
            .iter()
            .filter_map(|&h| self.builder.access_resource(h))
            .find(|r| r.name == name)
            .and_then(|r| r.output_handle)
            .and_then(|h| self.builder.access_resource(h))
            .and_then(|r| r.info.texture())
            .and_then(|info| info.texture)
    }
}

/// A pass bound to a frame graph node.
///
/// `initialize` runs once before the first `render`, `render` once per frame
/// while the node is enabled (in execution order), and `shutdown` once at teardown.
pub trait FrameGraphPass {
    /// Create pipelines. Graphics nodes receive their render pass.
    fn initialize(
        &mut self,
        device: &mut dyn GraphicsDevice,
        render_pass: Option<RenderPassHandle>,
    ) -> BackendResult<()>;

    /// Record this pass's commands
    fn render(&mut self, ctx: &mut PassContext<'_>) -> BackendResult<()>;

    fn shutdown(&mut self, device: &mut dyn GraphicsDevice);

    fn on_resize(&mut self, _device: &mut dyn GraphicsDevice, _width: u32, _height: u32) {}

    fn add_ui(&mut self, _ui: &mut egui::Ui) {}
}
