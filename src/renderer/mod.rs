//! Renderer orchestration
//!
//! The renderer owns the frame graph, the shared per-draw buffers and the
//! batches built from the scene's draws. Each frame it runs the graph, then
//! composites the selected output onto the swapchain and lets an optional GUI
//! pass draw on top before presenting.

mod batch;
mod composite;

pub use batch::*;
pub use composite::{CompositePass, COMPOSITE_SHADER};

use thiserror::Error;

use crate::backend::*;
use crate::frame_graph::{
    CompileReport, FrameGraph, FrameGraphConfig, FrameGraphDescription, GraphError, GraphState,
};
use crate::pipeline::{self, CULL_GROUP_SIZE};
use crate::scene::{Camera, DrawData, Frustum, RenderScene};

/// Renderer configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    pub width: u32,
    pub height: u32,
    /// Capacity of the shared per-draw buffers, opaque and transparent combined
    pub max_draws: u32,
    /// Draws tested per cull workgroup
    pub cull_group_size: u32,
    /// Output composited to the swapchain; the last declared candidate when unset
    pub final_output: Option<String>,
    pub frame_graph: FrameGraphConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            max_draws: 4096,
            cull_group_size: CULL_GROUP_SIZE,
            final_output: None,
            frame_graph: FrameGraphConfig::default(),
        }
    }
}

/// Renderer error type
#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Unknown output '{0}'")]
    UnknownOutput(String),
    #[error("Renderer is shut down")]
    ShutDown,
}

pub type RendererResult<T> = Result<T, RendererError>;

/// Outcome of [`Renderer::render`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Rendered,
    /// The swapchain was not ready; nothing was recorded
    Skipped,
}

/// Overlay drawn into the swapchain pass after the composite, e.g. egui
pub trait GuiPass {
    fn render(&mut self, device: &mut dyn GraphicsDevice, image: &SwapchainImage) -> BackendResult<()>;

    fn shutdown(&mut self, _device: &mut dyn GraphicsDevice) {}
}

/// Frame graph driven renderer
pub struct Renderer {
    config: RendererConfig,
    graph: FrameGraph,
    buffers: DrawBuffers,
    batch_builder: BatchBuilder,
    scene: RenderScene,
    composite: CompositePass,
    gui_pass: Option<Box<dyn GuiPass>>,
    final_output: Option<String>,
    frustum_override: Option<Frustum>,
    frame_count: u64,
    shut_down: bool,
}

impl Renderer {
    pub fn new(device: &mut dyn GraphicsDevice, config: RendererConfig) -> RendererResult<Self> {
        let buffers = DrawBuffers::create(device, config.max_draws)?;
        let mut composite = CompositePass::new();
        composite.initialize(device)?;

        let mut camera = Camera::default();
        camera.set_aspect(config.width as f32, config.height as f32);
        let scene = RenderScene {
            camera,
            buffers: Some(buffers),
            width: config.width,
            height: config.height,
            ..Default::default()
        };

        log::info!(
            "Renderer: {}x{}, {} draws on '{}'",
            config.width,
            config.height,
            config.max_draws,
            device.name()
        );

        Ok(Self {
            graph: FrameGraph::new(config.frame_graph.clone()),
            final_output: config.final_output.clone(),
            config,
            buffers,
            batch_builder: BatchBuilder::new(),
            scene,
            composite,
            gui_pass: None,
            frustum_override: None,
            frame_count: 0,
            shut_down: false,
        })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn graph(&self) -> &FrameGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut FrameGraph {
        &mut self.graph
    }

    pub fn scene(&self) -> &RenderScene {
        &self.scene
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.scene.camera
    }

    pub fn draw_buffers(&self) -> &DrawBuffers {
        &self.buffers
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Cull against a fixed frustum instead of the camera's
    pub fn set_frustum_override(&mut self, frustum: Option<Frustum>) {
        self.frustum_override = frustum;
    }

    pub fn set_gui_pass(&mut self, pass: Option<Box<dyn GuiPass>>) {
        self.gui_pass = pass;
    }

    /// Replace the frame graph with a new description and bind the default passes.
    ///
    /// A previously loaded graph is shut down first.
    pub fn load_graph(
        &mut self,
        device: &mut dyn GraphicsDevice,
        description: &FrameGraphDescription,
    ) -> RendererResult<()> {
        self.ensure_running()?;
        if self.graph.state() != GraphState::Uninitialized {
            device.wait_idle();
            self.graph.shutdown(device);
            self.graph = FrameGraph::new(self.config.frame_graph.clone());
        }
        self.graph.parse(description)?;
        pipeline::register_default_passes(&mut self.graph, self.config.cull_group_size)?;
        Ok(())
    }

    /// Compile the loaded graph and settle the final output.
    pub fn compile(&mut self, device: &mut dyn GraphicsDevice) -> RendererResult<CompileReport> {
        self.ensure_running()?;
        let report = self.graph.compile(device)?;

        let choices = self.output_choices();
        let valid = self
            .final_output
            .as_ref()
            .is_some_and(|name| choices.contains(name));
        if !valid {
            if let Some(name) = &self.final_output {
                log::warn!("Renderer: final output '{}' is not a graph output", name);
            }
            self.final_output = choices.last().cloned();
        }
        log::debug!("Renderer: final output {:?}", self.final_output);
        Ok(report)
    }

    /// Rebuild batches from the scene's draws.
    ///
    /// Opaque batches fill the shared buffers first, transparent ones follow.
    /// Batch ids restart at zero on every call.
    pub fn update_draws(
        &mut self,
        device: &mut dyn GraphicsDevice,
        opaque: &[DrawData],
        transparent: &[DrawData],
    ) -> RendererResult<()> {
        self.ensure_running()?;
        self.batch_builder.reset();
        self.scene.opaque_batches.clear();
        self.scene.transparent_batches.clear();

        let requested = opaque.len() as u64 + transparent.len() as u64;
        if requested > self.buffers.capacity as u64 {
            return Err(BatchError::CapacityExceeded {
                requested,
                capacity: self.buffers.capacity,
            }
            .into());
        }

        let mut opaque_batches = Vec::new();
        let mut transparent_batches = Vec::new();
        let offset = self.batch_builder.create_batch(
            device,
            &self.buffers,
            opaque,
            &mut opaque_batches,
            0,
        )?;
        let end = self.batch_builder.create_batch(
            device,
            &self.buffers,
            transparent,
            &mut transparent_batches,
            offset,
        )?;

        log::debug!(
            "Renderer: {} draws in {} opaque and {} transparent batches",
            end,
            opaque_batches.len(),
            transparent_batches.len()
        );
        self.scene.opaque_batches = opaque_batches;
        self.scene.transparent_batches = transparent_batches;
        Ok(())
    }

    /// Render and present one frame.
    pub fn render(&mut self, device: &mut dyn GraphicsDevice) -> RendererResult<FrameStatus> {
        self.ensure_running()?;
        let Some(image) = device.acquire_swapchain_image()? else {
            log::trace!("Renderer: swapchain not ready, skipping frame");
            return Ok(FrameStatus::Skipped);
        };

        self.scene.frustum = self
            .frustum_override
            .unwrap_or_else(|| self.scene.camera.frustum());
        self.graph.execute(device, &self.scene)?;

        let source = self
            .final_output
            .as_deref()
            .and_then(|name| self.graph.get_resource(name))
            .and_then(|resource| resource.info.texture());
        self.composite.render(device, &image, source);

        if let Some(gui) = self.gui_pass.as_mut() {
            device.begin_swapchain_pass(&image);
            let result = gui.render(device, &image);
            device.end_swapchain_pass();
            result?;
        }

        device.present()?;
        self.frame_count += 1;
        Ok(FrameStatus::Rendered)
    }

    /// Single-layer texture outputs that can be shown on screen
    pub fn output_choices(&self) -> Vec<String> {
        self.graph
            .texture_outputs()
            .into_iter()
            .filter(|(_, info)| info.layers == 1)
            .map(|(name, _)| name.to_string())
            .collect()
    }

    pub fn final_output(&self) -> Option<&str> {
        self.final_output.as_deref()
    }

    pub fn select_final_output(&mut self, name: &str) -> RendererResult<()> {
        if !self.output_choices().iter().any(|choice| choice == name) {
            return Err(RendererError::UnknownOutput(name.to_string()));
        }
        self.final_output = Some(name.to_string());
        Ok(())
    }

    /// Track the new surface size and forward it to the passes.
    ///
    /// Attachments keep the resolution they were compiled with.
    pub fn on_resize(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) {
        if width == 0 || height == 0 || (width, height) == (self.scene.width, self.scene.height) {
            return;
        }
        self.scene.width = width;
        self.scene.height = height;
        self.scene.camera.set_aspect(width as f32, height as f32);
        self.graph.on_resize(device, width, height);
    }

    pub fn add_ui(&mut self, ui: &mut egui::Ui) {
        let choices = self.output_choices();
        let selected = self.final_output.clone().unwrap_or_default();
        egui::ComboBox::from_label("Final output")
            .selected_text(selected.as_str())
            .show_ui(ui, |ui| {
                for choice in &choices {
                    if ui
                        .selectable_label(*choice == selected, choice.as_str())
                        .clicked()
                    {
                        self.final_output = Some(choice.clone());
                    }
                }
            });
        ui.label(format!(
            "{} opaque / {} transparent batches",
            self.scene.opaque_batches.len(),
            self.scene.transparent_batches.len()
        ));
        ui.separator();
        self.graph.add_ui(ui);
    }

    /// Wait for the GPU and release everything the renderer created.
    pub fn shutdown(&mut self, device: &mut dyn GraphicsDevice) {
        if self.shut_down {
            return;
        }
        device.wait_idle();
        self.graph.shutdown(device);
        self.composite.shutdown(device);
        if let Some(mut gui) = self.gui_pass.take() {
            gui.shutdown(device);
        }
        self.buffers.destroy(device);
        self.scene.buffers = None;
        self.scene.opaque_batches.clear();
        self.scene.transparent_batches.clear();
        self.shut_down = true;
        log::info!("Renderer shut down after {} frames", self.frame_count);
    }

    fn ensure_running(&self) -> RendererResult<()> {
        if self.shut_down {
            return Err(RendererError::ShutDown);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_graph::{PassDescription, ResourceDescription};

    fn color_graph() -> FrameGraphDescription {
        FrameGraphDescription::new("outputs")
            .with_pass(
                PassDescription::graphics("shadow").output(
                    ResourceDescription::attachment("csm", "D32", [256, 256], "clear").with_layers(4),
                ),
            )
            .with_pass(
                PassDescription::graphics("main")
                    .output(ResourceDescription::attachment("hdr", "RGBA16F", [64, 64], "clear"))
                    .output(ResourceDescription::attachment("ids", "R32F", [64, 64], "clear")),
            )
    }

    #[test]
    fn test_output_choices_skip_layered() {
        let mut device = DummyDevice::new();
        let mut renderer = Renderer::new(&mut device, RendererConfig::default()).unwrap();
        renderer.load_graph(&mut device, &color_graph()).unwrap();
        renderer.compile(&mut device).unwrap();

        assert_eq!(renderer.output_choices(), vec!["hdr", "ids"]);
        assert_eq!(renderer.final_output(), Some("ids"));
    }

    #[test]
    fn test_select_final_output() {
        let mut device = DummyDevice::new();
        let mut renderer = Renderer::new(&mut device, RendererConfig::default()).unwrap();
        renderer.load_graph(&mut device, &color_graph()).unwrap();
        renderer.compile(&mut device).unwrap();

        renderer.select_final_output("hdr").unwrap();
        assert_eq!(renderer.final_output(), Some("hdr"));
        assert!(matches!(
            renderer.select_final_output("csm"),
            Err(RendererError::UnknownOutput(_))
        ));
    }

    #[test]
    fn test_configured_output_kept_when_valid() {
        let mut device = DummyDevice::new();
        let config = RendererConfig {
            final_output: Some("hdr".to_string()),
            ..Default::default()
        };
        let mut renderer = Renderer::new(&mut device, config).unwrap();
        renderer.load_graph(&mut device, &color_graph()).unwrap();
        renderer.compile(&mut device).unwrap();
        assert_eq!(renderer.final_output(), Some("hdr"));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut device = DummyDevice::new();
        let config = RendererConfig {
            max_draws: 0,
            ..Default::default()
        };
        // zero-size buffers are rejected by the device
        assert!(Renderer::new(&mut device, config).is_err());
    }

    #[test]
    fn test_resize_ignores_zero() {
        let mut device = DummyDevice::new();
        let mut renderer = Renderer::new(&mut device, RendererConfig::default()).unwrap();
        renderer.on_resize(&mut device, 0, 480);
        assert_eq!(renderer.scene().width, 1280);
        renderer.on_resize(&mut device, 640, 480);
        assert_eq!((renderer.scene().width, renderer.scene().height), (640, 480));
    }

    #[test]
    fn test_shutdown_releases_buffers() {
        let mut device = DummyDevice::new();
        let mut renderer = Renderer::new(&mut device, RendererConfig::default()).unwrap();
        renderer.load_graph(&mut device, &color_graph()).unwrap();
        renderer.compile(&mut device).unwrap();
        assert!(device.live_buffer_count() > 0);

        renderer.shutdown(&mut device);
        assert_eq!(device.live_buffer_count(), 0);
        assert_eq!(device.live_texture_count(), 0);
        assert!(matches!(
            renderer.render(&mut device),
            Err(RendererError::ShutDown)
        ));
    }
}
