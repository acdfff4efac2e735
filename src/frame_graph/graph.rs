//! Frame graph: parsing, compilation and per-frame execution

use std::collections::{HashMap, HashSet};

use crate::backend::*;
use crate::frame_graph::barrier::node_barriers;
use crate::frame_graph::builder::FrameGraphBuilder;
use crate::frame_graph::description::FrameGraphDescription;
use crate::frame_graph::error::{GraphError, GraphResult, UnresolvedInput};
use crate::frame_graph::pass::{FrameGraphPass, PassContext};
use crate::frame_graph::resource::*;
use crate::scene::RenderScene;

/// Frame graph configuration
#[derive(Debug, Clone, PartialEq)]
pub struct FrameGraphConfig {
    /// Fail `compile` when an input names no declared output
    pub strict_resolution: bool,
    pub max_nodes: usize,
    pub max_resources: usize,
}

impl Default for FrameGraphConfig {
    fn default() -> Self {
        Self {
            strict_resolution: false,
            max_nodes: 64,
            max_resources: 256,
        }
    }
}

/// Lifecycle of a frame graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Uninitialized,
    Parsed,
    Compiled,
    Shutdown,
}

impl GraphState {
    fn as_str(&self) -> &'static str {
        match self {
            GraphState::Uninitialized => "uninitialized",
            GraphState::Parsed => "parsed",
            GraphState::Compiled => "compiled",
            GraphState::Shutdown => "shut down",
        }
    }
}

/// Summary of a successful compile
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileReport {
    /// Node names in execution order
    pub order: Vec<String>,
    /// Inputs left dangling (lenient mode only)
    pub unresolved: Vec<UnresolvedInput>,
    pub textures_created: usize,
    pub render_passes_created: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Discovered,
    Finished,
}

/// Attachments gathered for one graphics node
#[derive(Default)]
struct NodeAttachments {
    colors: Vec<(AttachmentDescription, TextureHandle)>,
    depth: Option<(AttachmentDescription, TextureHandle)>,
    size: Option<(u32, u32)>,
    layers: u32,
}

impl NodeAttachments {
    fn check_size(&mut self, pass: &str, resource: &str, width: u32, height: u32) -> GraphResult<()> {
        match self.size {
            None => {
                self.size = Some((width, height));
                Ok(())
            }
            Some(expected) if expected == (width, height) => Ok(()),
            Some(expected) => Err(GraphError::AttachmentSizeMismatch {
                pass: pass.to_string(),
                resource: resource.to_string(),
                expected,
                actual: (width, height),
            }),
        }
    }

    fn add(
        &mut self,
        pass: &str,
        resource: &str,
        info: &TextureInfo,
        load_op: LoadOp,
    ) -> GraphResult<()> {
        let Some(texture) = info.texture else {
            log::warn!(
                "Frame graph: attachment '{}' of '{}' has no backing texture",
                resource,
                pass
            );
            return Ok(());
        };
        self.check_size(pass, resource, info.width, info.height)?;
        self.layers = self.layers.max(info.layers);

        let attachment = AttachmentDescription {
            format: info.format,
            load_op,
            store_op: StoreOp::Store,
        };
        if info.is_depth() {
            if self.depth.is_some() {
                return Err(GraphError::Description(format!(
                    "pass '{}' binds more than one depth attachment ('{}')",
                    pass, resource
                )));
            }
            self.depth = Some((attachment, texture));
        } else {
            self.colors.push((attachment, texture));
        }
        Ok(())
    }
}

/// A compiled DAG of passes and the resources flowing between them.
pub struct FrameGraph {
    name: String,
    config: FrameGraphConfig,
    state: GraphState,
    builder: FrameGraphBuilder,
    /// Nodes in declaration order
    nodes: Vec<NodeHandle>,
    /// Enabled nodes in execution order
    sorted: Vec<NodeHandle>,
    passes: HashMap<NodeHandle, Box<dyn FrameGraphPass>>,
    initialized: HashSet<NodeHandle>,
}

impl FrameGraph {
    pub fn new(config: FrameGraphConfig) -> Self {
        Self {
            name: String::new(),
            builder: FrameGraphBuilder::new(config.max_nodes, config.max_resources),
            config,
            state: GraphState::Uninitialized,
            nodes: Vec::new(),
            sorted: Vec::new(),
            passes: HashMap::new(),
            initialized: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    pub fn builder(&self) -> &FrameGraphBuilder {
        &self.builder
    }

    fn expect_state(&self, allowed: &[GraphState], expected: &'static str) -> GraphResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(GraphError::InvalidState {
                expected,
                found: self.state.as_str(),
            })
        }
    }

    /// Create nodes for every enabled pass of a description.
    pub fn parse(&mut self, description: &FrameGraphDescription) -> GraphResult<()> {
        self.expect_state(&[GraphState::Uninitialized], "uninitialized")?;

        for pass in &description.passes {
            if !pass.enabled {
                log::info!("Frame graph '{}': skipping disabled pass '{}'", description.name, pass.name);
                continue;
            }
            let creation = pass.to_creation()?;
            let handle = self.builder.create_node(&creation)?;
            self.nodes.push(handle);
        }

        self.name = description.name.clone();
        self.state = GraphState::Parsed;
        log::info!(
            "Frame graph '{}': parsed {} passes",
            self.name,
            self.nodes.len()
        );
        Ok(())
    }

    /// Resolve edges, sort, allocate attachments and build render passes.
    ///
    /// Safe to call again after toggling nodes: already allocated textures are
    /// kept, and render passes and framebuffers are rebuilt only when their
    /// attachments changed.
    pub fn compile(&mut self, device: &mut dyn GraphicsDevice) -> GraphResult<CompileReport> {
        self.expect_state(&[GraphState::Parsed, GraphState::Compiled], "parsed")?;

        for &handle in &self.nodes {
            if let Some(node) = self.builder.access_node_mut(handle) {
                node.edges.clear();
            }
        }
        for handle in self.builder.resource_handles() {
            if let Some(resource) = self.builder.access_resource_mut(handle) {
                resource.ref_count = 0;
            }
        }

        let unresolved = self.compute_edges();
        if self.config.strict_resolution && !unresolved.is_empty() {
            return Err(GraphError::UnresolvedInputs(unresolved));
        }

        self.sorted = self.topological_sort()?;
        let textures_created = self.allocate_resources(device)?;
        self.sync_resolved_info();
        let render_passes_created = self.create_render_passes(device)?;
        self.initialize_passes(device)?;

        self.state = GraphState::Compiled;
        let report = CompileReport {
            order: self.node_names_in_order(),
            unresolved,
            textures_created,
            render_passes_created,
        };
        log::info!(
            "Frame graph '{}': compiled [{}] ({} textures, {} render passes created)",
            self.name,
            report.order.join(" -> "),
            textures_created,
            render_passes_created
        );
        Ok(report)
    }

    fn compute_edges(&mut self) -> Vec<UnresolvedInput> {
        let mut unresolved = Vec::new();

        for &node_handle in &self.nodes {
            let Some(node) = self.builder.access_node(node_handle) else {
                continue;
            };
            if !node.enabled {
                continue;
            }
            let node_name = node.name.clone();
            let references = node.outputs.iter().copied().filter(|&h| {
                self.builder
                    .access_resource(h)
                    .is_some_and(|r| r.resource_type == FrameGraphResourceType::Reference)
            });
            let dependencies: Vec<ResourceHandle> =
                node.inputs.iter().copied().chain(references).collect();

            for dependency in dependencies {
                let Some(name) = self.builder.access_resource(dependency).map(|r| r.name.clone())
                else {
                    continue;
                };
                let Some(output_handle) = self.builder.get_resource(&name) else {
                    log::warn!(
                        "Frame graph: resource '{}' required by '{}' is not produced by any node",
                        name,
                        node_name
                    );
                    unresolved.push(UnresolvedInput {
                        pass: node_name.clone(),
                        resource: name,
                    });
                    continue;
                };
                let Some((producer, info)) = self
                    .builder
                    .access_resource_mut(output_handle)
                    .map(|output| {
                        output.ref_count += 1;
                        (output.producer, output.info)
                    })
                else {
                    continue;
                };

                if let Some(resource) = self.builder.access_resource_mut(dependency) {
                    resource.producer = producer;
                    resource.info = info;
                    resource.output_handle = Some(output_handle);
                }
                if let Some(producer) = producer.and_then(|p| self.builder.access_node_mut(p)) {
                    if !producer.edges.contains(&node_handle) {
                        producer.edges.push(node_handle);
                    }
                }
            }
        }

        unresolved
    }

    /// Iterative depth-first sort of the enabled nodes, producers first.
    fn topological_sort(&self) -> GraphResult<Vec<NodeHandle>> {
        let enabled: Vec<NodeHandle> = self
            .nodes
            .iter()
            .copied()
            .filter(|&h| self.builder.access_node(h).is_some_and(|n| n.enabled))
            .collect();
        let mut marks: HashMap<NodeHandle, Mark> =
            enabled.iter().map(|&h| (h, Mark::Unvisited)).collect();
        let mut sorted = Vec::with_capacity(enabled.len());
        let mut stack = Vec::new();
        let mut path: Vec<NodeHandle> = Vec::new();

        for &root in &enabled {
            if marks.get(&root) != Some(&Mark::Unvisited) {
                continue;
            }
            stack.push(root);

            while let Some(&top) = stack.last() {
                match marks.get(&top).copied().unwrap_or(Mark::Finished) {
                    Mark::Finished => {
                        stack.pop();
                    }
                    Mark::Discovered => {
                        marks.insert(top, Mark::Finished);
                        sorted.push(top);
                        path.pop();
                        stack.pop();
                    }
                    Mark::Unvisited => {
                        marks.insert(top, Mark::Discovered);
                        path.push(top);
                        let edges = self
                            .builder
                            .access_node(top)
                            .map(|n| n.edges.as_slice())
                            .unwrap_or_default();
                        for &child in edges {
                            match marks.get(&child) {
                                Some(Mark::Unvisited) => stack.push(child),
                                Some(Mark::Discovered) => return Err(self.cycle_error(&path, child)),
                                // Finished, or disabled and not part of this sort.
                                _ => {}
                            }
                        }
                    }
                }
            }
        }

        sorted.reverse();
        Ok(sorted)
    }

    fn cycle_error(&self, path: &[NodeHandle], back_edge_target: NodeHandle) -> GraphError {
        let start = path
            .iter()
            .position(|&h| h == back_edge_target)
            .unwrap_or(0);
        let nodes: Vec<String> = path[start..]
            .iter()
            .chain(std::iter::once(&back_edge_target))
            .filter_map(|&h| self.builder.access_node(h).map(|n| n.name.clone()))
            .collect();
        log::error!("Frame graph '{}': cycle detected: {}", self.name, nodes.join(" -> "));
        GraphError::CyclicDependency { nodes }
    }

    fn allocate_resources(&mut self, device: &mut dyn GraphicsDevice) -> GraphResult<usize> {
        let mut created = 0;

        for &node_handle in &self.sorted {
            let Some(outputs) = self.builder.access_node(node_handle).map(|n| n.outputs.clone())
            else {
                continue;
            };
            for output in outputs {
                let Some(resource) = self.builder.access_resource_mut(output) else {
                    continue;
                };
                if !resource.resource_type.is_graph_allocated() {
                    continue;
                }
                let resource_type = resource.resource_type;
                let name = resource.name.clone();
                let Some(info) = resource.info.texture_mut() else {
                    continue;
                };
                if info.texture.is_some() {
                    continue;
                }

                let usage = match resource_type {
                    FrameGraphResourceType::StorageImage => TextureUsage::STORAGE | TextureUsage::SAMPLED,
                    _ => TextureUsage::RENDER_ATTACHMENT | TextureUsage::SAMPLED,
                };
                let texture = device.create_texture(&TextureDescriptor {
                    label: Some(name.clone()),
                    width: info.width,
                    height: info.height,
                    depth: info.depth,
                    array_layers: info.layers,
                    mip_levels: 1,
                    format: info.format,
                    usage,
                    view_dimension: if info.layers > 1 {
                        TextureViewDimension::D2Array
                    } else {
                        TextureViewDimension::D2
                    },
                    bindless: true,
                })?;
                info.texture = Some(texture);
                created += 1;
                log::debug!(
                    "Frame graph: allocated '{}' {}x{}x{} {:?}",
                    name,
                    info.width,
                    info.height,
                    info.layers,
                    info.format
                );
            }
        }

        Ok(created)
    }

    /// Refresh every resolved record with its output's current info.
    fn sync_resolved_info(&mut self) {
        for handle in self.builder.resource_handles() {
            let Some(output) = self
                .builder
                .access_resource(handle)
                .and_then(|r| r.output_handle)
                .filter(|&o| o != handle)
            else {
                continue;
            };
            let Some(info) = self.builder.access_resource(output).map(|r| r.info) else {
                continue;
            };
            if let Some(resource) = self.builder.access_resource_mut(handle) {
                resource.info = info;
            }
        }
    }

    fn gather_attachments(&self, node: &FrameGraphNode) -> GraphResult<NodeAttachments> {
        let mut attachments = NodeAttachments::default();
        let mut reference_size = None;

        for resource in node.outputs.iter().filter_map(|&h| self.builder.access_resource(h)) {
            match (resource.resource_type, resource.info.texture()) {
                (FrameGraphResourceType::Attachment, Some(info)) => {
                    attachments.add(&node.name, &resource.name, info, info.load_op)?;
                }
                (FrameGraphResourceType::Reference, Some(info)) => {
                    reference_size.get_or_insert((info.width, info.height));
                }
                _ => {}
            }
        }

        // Attachments read from earlier passes are re-entered with their contents kept.
        for resource in node.inputs.iter().filter_map(|&h| self.builder.access_resource(h)) {
            if let (FrameGraphResourceType::Attachment, Some(info)) =
                (resource.resource_type, resource.info.texture())
            {
                attachments.add(&node.name, &resource.name, info, LoadOp::Load)?;
            }
        }

        if attachments.size.is_none() {
            attachments.size = reference_size;
        }
        Ok(attachments)
    }

    /// Build render passes and framebuffers, rebuilding those whose attachments changed.
    fn create_render_passes(&mut self, device: &mut dyn GraphicsDevice) -> GraphResult<usize> {
        let mut created = 0;

        for &node_handle in &self.sorted {
            let Some(node) = self.builder.access_node(node_handle) else {
                continue;
            };
            if node.compute {
                continue;
            }

            let attachments = self.gather_attachments(node)?;
            let Some((width, height)) = attachments.size else {
                return Err(GraphError::Description(format!(
                    "graphics pass '{}' has no attachment to size its framebuffer",
                    node.name
                )));
            };

            let render_pass_desc = RenderPassDescriptor {
                label: node.name.clone(),
                color_attachments: attachments.colors.iter().map(|(a, _)| *a).collect(),
                depth_attachment: attachments.depth.map(|(a, _)| a),
            };
            let keep_render_pass = node.render_pass.is_some()
                && node.render_pass_desc.as_ref() == Some(&render_pass_desc);
            let stale_render_pass = node.render_pass.filter(|_| !keep_render_pass);

            let render_pass = match node.render_pass {
                Some(render_pass) if keep_render_pass => render_pass,
                _ => {
                    created += 1;
                    device.create_render_pass(&render_pass_desc)?
                }
            };
            let framebuffer_desc = FramebufferDescriptor {
                label: node.name.clone(),
                render_pass,
                width,
                height,
                layers: attachments.layers.max(1),
                color_attachments: attachments.colors.iter().map(|(_, t)| *t).collect(),
                depth_attachment: attachments.depth.map(|(_, t)| t),
            };
            let stale_framebuffer = node
                .framebuffer
                .filter(|_| node.framebuffer_desc.as_ref() != Some(&framebuffer_desc));
            let framebuffer = match node.framebuffer {
                Some(framebuffer) if stale_framebuffer.is_none() => framebuffer,
                _ => device.create_framebuffer(&framebuffer_desc)?,
            };

            if let Some(framebuffer) = stale_framebuffer {
                log::debug!("Frame graph: rebuilding framebuffer of '{}'", node.name);
                device.destroy_framebuffer(framebuffer);
            }
            if let Some(render_pass) = stale_render_pass {
                log::debug!("Frame graph: rebuilding render pass of '{}'", node.name);
                device.destroy_render_pass(render_pass);
                // Pipelines built against the old render pass are rebuilt by `initialize_passes`.
                if self.initialized.remove(&node_handle) {
                    if let Some(pass) = self.passes.get_mut(&node_handle) {
                        pass.shutdown(device);
                    }
                }
            }

            if let Some(node) = self.builder.access_node_mut(node_handle) {
                node.render_pass = Some(render_pass);
                node.framebuffer = Some(framebuffer);
                node.render_pass_desc = Some(render_pass_desc);
                node.framebuffer_desc = Some(framebuffer_desc);
            }
        }

        Ok(created)
    }

    fn initialize_passes(&mut self, device: &mut dyn GraphicsDevice) -> GraphResult<()> {
        for &node_handle in &self.sorted {
            if self.initialized.contains(&node_handle) {
                continue;
            }
            let Some(pass) = self.passes.get_mut(&node_handle) else {
                continue;
            };
            let render_pass = self.builder.access_node(node_handle).and_then(|n| n.render_pass);
            pass.initialize(device, render_pass)?;
            self.initialized.insert(node_handle);
        }
        Ok(())
    }

    /// Bind a pass implementation to a node. Returns the previously bound pass.
    pub fn register_pass(
        &mut self,
        name: &str,
        pass: Box<dyn FrameGraphPass>,
    ) -> GraphResult<Option<Box<dyn FrameGraphPass>>> {
        let handle = self
            .builder
            .get_node(name)
            .ok_or_else(|| GraphError::UnknownPass(name.to_string()))?;
        self.initialized.remove(&handle);
        let previous = self.passes.insert(handle, pass);
        if previous.is_some() {
            log::warn!("Frame graph: replacing pass bound to '{}'", name);
        }
        Ok(previous)
    }

    /// Record every enabled node in execution order.
    pub fn execute(&mut self, device: &mut dyn GraphicsDevice, scene: &RenderScene) -> GraphResult<()> {
        self.expect_state(&[GraphState::Compiled], "compiled")?;

        for &node_handle in &self.sorted {
            let Some(node) = self.builder.access_node(node_handle) else {
                continue;
            };
            if !node.enabled {
                continue;
            }

            let barriers = node_barriers(&self.builder, node);
            if !barriers.is_empty() {
                device.pipeline_barrier(&barriers, &[]);
            }

            let pass = self.passes.get_mut(&node_handle);
            if pass.is_none() {
                log::trace!("Frame graph: no pass bound to '{}'", node.name);
            }

            if node.compute {
                if let Some(pass) = pass {
                    let mut ctx = PassContext {
                        device: &mut *device,
                        scene,
                        builder: &self.builder,
                        node,
                    };
                    pass.render(&mut ctx)?;
                }
                continue;
            }

            let (Some(render_pass), Some(framebuffer)) = (node.render_pass, node.framebuffer) else {
                log::warn!("Frame graph: '{}' has no render pass; recompile after enabling it", node.name);
                continue;
            };
            device.begin_render_pass(render_pass, framebuffer);
            let result = match pass {
                Some(pass) => {
                    let mut ctx = PassContext {
                        device: &mut *device,
                        scene,
                        builder: &self.builder,
                        node,
                    };
                    pass.render(&mut ctx)
                }
                None => Ok(()),
            };
            device.end_render_pass();
            result?;
        }

        Ok(())
    }

    /// Forward a resize to every enabled node's pass.
    ///
    /// Attachments allocated by `compile` keep their declared resolution.
    pub fn on_resize(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) {
        for &node_handle in &self.nodes {
            if !self.builder.access_node(node_handle).is_some_and(|n| n.enabled) {
                continue;
            }
            if let Some(pass) = self.passes.get_mut(&node_handle) {
                pass.on_resize(device, width, height);
            }
        }
    }

    /// Node list with enable toggles, plus each pass's own UI.
    pub fn add_ui(&mut self, ui: &mut egui::Ui) {
        ui.label(format!("Frame graph '{}'", self.name));
        for &node_handle in &self.nodes {
            let order = self.sorted.iter().position(|&h| h == node_handle);
            let Some(node) = self.builder.access_node_mut(node_handle) else {
                continue;
            };
            let label = match order {
                Some(index) => format!("{index}: {}", node.name),
                None => format!("-: {}", node.name),
            };
            ui.checkbox(&mut node.enabled, label);
            if let Some(pass) = self.passes.get_mut(&node_handle) {
                ui.indent(node_handle.index(), |ui| pass.add_ui(ui));
            }
        }
    }

    /// Shut down passes and destroy every GPU object the graph created.
    pub fn shutdown(&mut self, device: &mut dyn GraphicsDevice) {
        if self.state == GraphState::Shutdown {
            return;
        }
        for (_, mut pass) in self.passes.drain() {
            pass.shutdown(device);
        }
        for &node_handle in &self.nodes {
            if let Some(node) = self.builder.access_node_mut(node_handle) {
                if let Some(framebuffer) = node.framebuffer.take() {
                    device.destroy_framebuffer(framebuffer);
                }
                if let Some(render_pass) = node.render_pass.take() {
                    device.destroy_render_pass(render_pass);
                }
            }
        }
        self.builder.shutdown(device);
        self.nodes.clear();
        self.sorted.clear();
        self.initialized.clear();
        self.state = GraphState::Shutdown;
        log::info!("Frame graph '{}' shut down", self.name);
    }

    pub fn get_node(&self, name: &str) -> Option<&FrameGraphNode> {
        self.builder
            .get_node(name)
            .and_then(|h| self.builder.access_node(h))
    }

    /// Output resource declared under `name`
    pub fn get_resource(&self, name: &str) -> Option<&FrameGraphResource> {
        self.builder
            .get_resource(name)
            .and_then(|h| self.builder.access_resource(h))
    }

    /// Toggle a node.
    ///
    /// Disabling skips the node at the next `execute`. Enabling only takes
    /// effect after the next `compile`, which puts the node back into the
    /// execution order and rebuilds dependent framebuffers.
    pub fn set_node_enabled(&mut self, name: &str, enabled: bool) -> GraphResult<()> {
        let handle = self
            .builder
            .get_node(name)
            .ok_or_else(|| GraphError::UnknownPass(name.to_string()))?;
        if let Some(node) = self.builder.access_node_mut(handle) {
            node.enabled = enabled;
        }
        Ok(())
    }

    /// Enabled nodes in execution order, as of the last compile
    pub fn sorted_nodes(&self) -> &[NodeHandle] {
        &self.sorted
    }

    pub fn node_names_in_order(&self) -> Vec<String> {
        self.sorted
            .iter()
            .filter_map(|&h| self.builder.access_node(h).map(|n| n.name.clone()))
            .collect()
    }

    /// Texture-like outputs in declaration order
    pub fn texture_outputs(&self) -> Vec<(&str, &TextureInfo)> {
        self.nodes
            .iter()
            .filter_map(|&h| self.builder.access_node(h))
            .flat_map(|node| node.outputs.iter())
            .filter_map(|&h| self.builder.access_resource(h))
            .filter(|r| r.resource_type.is_texture_like())
            .filter_map(|r| r.info.texture().map(|info| (r.name.as_str(), info)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyDevice;
    use crate::frame_graph::description::{PassDescription, ResourceDescription};

    fn color(name: &str) -> ResourceDescription {
        ResourceDescription::attachment(name, "RGBA8", [64, 64], "clear")
    }

    fn compiled(desc: &FrameGraphDescription, device: &mut DummyDevice) -> GraphResult<FrameGraph> {
        let mut graph = FrameGraph::new(FrameGraphConfig::default());
        graph.parse(desc)?;
        graph.compile(device)?;
        Ok(graph)
    }

    #[test]
    fn test_sort_follows_dependencies_not_declaration_order() {
        // "post" is declared first but reads what "main" writes.
        let desc = FrameGraphDescription::new("g")
            .with_pass(
                PassDescription::graphics("post")
                    .input(ResourceDescription::input("scene", "texture"))
                    .output(color("final")),
            )
            .with_pass(PassDescription::graphics("main").output(color("scene")));
        let mut device = DummyDevice::new();
        let graph = compiled(&desc, &mut device).unwrap();
        assert_eq!(graph.node_names_in_order(), vec!["main", "post"]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let desc = FrameGraphDescription::new("g")
            .with_pass(
                PassDescription::graphics("a")
                    .input(ResourceDescription::input("y", "texture"))
                    .output(color("x")),
            )
            .with_pass(
                PassDescription::graphics("b")
                    .input(ResourceDescription::input("x", "texture"))
                    .output(color("y")),
            );
        let mut device = DummyDevice::new();
        match compiled(&desc, &mut device) {
            Err(GraphError::CyclicDependency { nodes }) => {
                assert_eq!(nodes.first(), nodes.last());
                assert!(nodes.contains(&"a".to_string()));
                assert!(nodes.contains(&"b".to_string()));
            }
            other => panic!("expected a cycle error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_unresolved_input_lenient_and_strict() {
        let desc = FrameGraphDescription::new("g").with_pass(
            PassDescription::graphics("a")
                .input(ResourceDescription::input("missing", "texture"))
                .output(color("x")),
        );
        let mut device = DummyDevice::new();

        let mut graph = FrameGraph::new(FrameGraphConfig::default());
        graph.parse(&desc).unwrap();
        let report = graph.compile(&mut device).unwrap();
        assert_eq!(report.unresolved.len(), 1);
        assert_eq!(report.unresolved[0].resource, "missing");

        let mut strict = FrameGraph::new(FrameGraphConfig {
            strict_resolution: true,
            ..Default::default()
        });
        strict.parse(&desc).unwrap();
        assert!(matches!(
            strict.compile(&mut device),
            Err(GraphError::UnresolvedInputs(_))
        ));
    }

    #[test]
    fn test_disabled_pass_skipped_at_parse() {
        let desc = FrameGraphDescription::new("g")
            .with_pass(PassDescription::graphics("a").output(color("x")))
            .with_pass(PassDescription::graphics("b").output(color("y")).disabled());
        let mut device = DummyDevice::new();
        let graph = compiled(&desc, &mut device).unwrap();
        assert!(graph.get_node("b").is_none());
        assert!(graph.get_resource("y").is_none());
        assert_eq!(device.stats().textures_created, 1);
    }

    #[test]
    fn test_attachment_size_mismatch() {
        let desc = FrameGraphDescription::new("g")
            .with_pass(PassDescription::graphics("a").output(color("x")))
            .with_pass(
                PassDescription::graphics("b")
                    .input(ResourceDescription::input("x", "attachment"))
                    .output(ResourceDescription::attachment("y", "RGBA8", [32, 32], "clear")),
            );
        let mut device = DummyDevice::new();
        assert!(matches!(
            compiled(&desc, &mut device),
            Err(GraphError::AttachmentSizeMismatch { .. })
        ));
    }

    #[test]
    fn test_compile_requires_parse() {
        let mut graph = FrameGraph::new(FrameGraphConfig::default());
        let mut device = DummyDevice::new();
        assert!(matches!(
            graph.compile(&mut device),
            Err(GraphError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_ref_counts() {
        let desc = FrameGraphDescription::new("g")
            .with_pass(PassDescription::graphics("a").output(color("x")))
            .with_pass(
                PassDescription::graphics("b")
                    .input(ResourceDescription::input("x", "texture"))
                    .output(color("y")),
            )
            .with_pass(
                PassDescription::graphics("c")
                    .input(ResourceDescription::input("x", "texture"))
                    .output(color("z")),
            );
        let mut device = DummyDevice::new();
        let mut graph = compiled(&desc, &mut device).unwrap();
        assert_eq!(graph.get_resource("x").unwrap().ref_count, 2);

        // Recounted rather than accumulated.
        graph.compile(&mut device).unwrap();
        assert_eq!(graph.get_resource("x").unwrap().ref_count, 2);
    }

    #[test]
    fn test_shutdown_destroys_everything() {
        let desc = FrameGraphDescription::new("g")
            .with_pass(PassDescription::graphics("a").output(color("x")))
            .with_pass(
                PassDescription::graphics("b")
                    .input(ResourceDescription::input("x", "attachment"))
                    .output(color("y")),
            );
        let mut device = DummyDevice::new();
        let mut graph = compiled(&desc, &mut device).unwrap();
        graph.shutdown(&mut device);

        let stats = device.stats();
        assert_eq!(stats.textures_created, stats.textures_destroyed);
        assert_eq!(stats.render_passes_created, stats.render_passes_destroyed);
        assert_eq!(stats.framebuffers_created, stats.framebuffers_destroyed);
        assert_eq!(graph.state(), GraphState::Shutdown);
    }
}
