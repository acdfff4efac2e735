//! Owner of node and resource records

use std::collections::HashMap;

use crate::backend::GraphicsDevice;
use crate::frame_graph::error::{GraphError, GraphResult};
use crate::frame_graph::pool::{PoolError, ResourcePool};
use crate::frame_graph::resource::*;

/// Creates nodes and resources and resolves them by name.
pub struct FrameGraphBuilder {
    nodes: ResourcePool<FrameGraphNode>,
    resources: ResourcePool<FrameGraphResource>,
    node_cache: HashMap<String, NodeHandle>,
    resource_cache: HashMap<String, ResourceHandle>,
}

impl FrameGraphBuilder {
    pub fn new(max_nodes: usize, max_resources: usize) -> Self {
        Self {
            nodes: ResourcePool::new("frame graph node", max_nodes),
            resources: ResourcePool::new("frame graph resource", max_resources),
            node_cache: HashMap::new(),
            resource_cache: HashMap::new(),
        }
    }

    /// Create a node with its outputs, then its inputs.
    pub fn create_node(&mut self, creation: &NodeCreation) -> GraphResult<NodeHandle> {
        if self.node_cache.contains_key(&creation.name) {
            return Err(GraphError::DuplicatePass(creation.name.clone()));
        }
        self.validate_outputs(creation)?;
        self.reserve(creation)?;

        let handle = self.nodes.obtain()?;
        if let Some(node) = self.nodes.access_mut(handle) {
            node.name = creation.name.clone();
            node.enabled = creation.enabled;
            node.compute = creation.compute;
            node.outputs.reserve(creation.outputs.len());
            node.inputs.reserve(creation.inputs.len());
        }

        // Outputs must exist before later nodes resolve their inputs by name.
        for output in &creation.outputs {
            let resource = self.create_node_output(output, handle)?;
            if let Some(node) = self.nodes.access_mut(handle) {
                node.outputs.push(resource);
            }
        }
        for input in &creation.inputs {
            let resource = self.create_node_input(input)?;
            if let Some(node) = self.nodes.access_mut(handle) {
                node.inputs.push(resource);
            }
        }

        self.node_cache.insert(creation.name.clone(), handle);
        log::debug!(
            "Frame graph: created node '{}' ({} inputs, {} outputs{})",
            creation.name,
            creation.inputs.len(),
            creation.outputs.len(),
            if creation.compute { ", compute" } else { "" }
        );
        Ok(handle)
    }

    /// Fail before allocating anything when the node or its resources do not fit.
    fn reserve(&self, creation: &NodeCreation) -> GraphResult<()> {
        let resources = creation.outputs.len() + creation.inputs.len();
        let exhausted = if self.nodes.available() == 0 {
            Some(self.nodes.capacity())
        } else if self.resources.available() < resources {
            Some(self.resources.capacity())
        } else {
            None
        };
        match exhausted {
            Some(capacity) => {
                log::error!(
                    "Frame graph: no room for node '{}' ({} resources, {} free)",
                    creation.name,
                    resources,
                    self.resources.available()
                );
                Err(PoolError::Exhausted { capacity }.into())
            }
            None => Ok(()),
        }
    }

    fn validate_outputs(&self, creation: &NodeCreation) -> GraphResult<()> {
        for (i, output) in creation.outputs.iter().enumerate() {
            if output.resource_type == FrameGraphResourceType::Reference {
                continue;
            }
            let previous = if let Some(&existing) = self.resource_cache.get(&output.name) {
                self.access_resource(existing)
                    .and_then(|r| r.producer)
                    .and_then(|p| self.access_node(p))
                    .map(|n| n.name.clone())
            } else if creation.outputs[..i].iter().any(|o| {
                o.name == output.name && o.resource_type != FrameGraphResourceType::Reference
            }) {
                Some(creation.name.clone())
            } else {
                None
            };
            if let Some(previous) = previous {
                log::error!(
                    "Frame graph: output '{}' of '{}' already declared by '{}'",
                    output.name,
                    creation.name,
                    previous
                );
                return Err(GraphError::DuplicateOutput {
                    resource: output.name.clone(),
                    pass: creation.name.clone(),
                    previous,
                });
            }
        }
        Ok(())
    }

    /// Create an output record. Non-reference outputs become name lookup targets.
    pub fn create_node_output(
        &mut self,
        creation: &ResourceCreation,
        producer: NodeHandle,
    ) -> GraphResult<ResourceHandle> {
        let handle = self.resources.obtain()?;
        let is_reference = creation.resource_type == FrameGraphResourceType::Reference;
        if let Some(resource) = self.resources.access_mut(handle) {
            resource.name = creation.name.clone();
            resource.resource_type = creation.resource_type;
            if !is_reference {
                resource.producer = Some(producer);
                resource.info = creation.info;
                resource.output_handle = Some(handle);
            }
        }
        if !is_reference {
            self.resource_cache.insert(creation.name.clone(), handle);
        }
        Ok(handle)
    }

    /// Create an input record. Producer and info are filled in when edges are computed.
    pub fn create_node_input(&mut self, creation: &ResourceCreation) -> GraphResult<ResourceHandle> {
        let handle = self.resources.obtain()?;
        if let Some(resource) = self.resources.access_mut(handle) {
            resource.name = creation.name.clone();
            resource.resource_type = creation.resource_type;
        }
        Ok(handle)
    }

    pub fn get_node(&self, name: &str) -> Option<NodeHandle> {
        self.node_cache.get(name).copied()
    }

    /// Output resource declared under `name`
    pub fn get_resource(&self, name: &str) -> Option<ResourceHandle> {
        self.resource_cache.get(name).copied()
    }

    pub fn access_node(&self, handle: NodeHandle) -> Option<&FrameGraphNode> {
        self.nodes.access(handle)
    }

    pub fn access_node_mut(&mut self, handle: NodeHandle) -> Option<&mut FrameGraphNode> {
        self.nodes.access_mut(handle)
    }

    pub fn access_resource(&self, handle: ResourceHandle) -> Option<&FrameGraphResource> {
        self.resources.access(handle)
    }

    pub fn access_resource_mut(&mut self, handle: ResourceHandle) -> Option<&mut FrameGraphResource> {
        self.resources.access_mut(handle)
    }

    /// Every resource record in use, inputs included
    pub fn resource_handles(&self) -> Vec<ResourceHandle> {
        self.resources.handles()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Destroy graph-owned backing resources and release every record.
    pub fn shutdown(&mut self, device: &mut dyn GraphicsDevice) {
        for handle in self.resources.handles() {
            let Some(resource) = self.resources.access_mut(handle) else {
                continue;
            };
            if resource.output_handle != Some(handle) {
                continue;
            }
            match (resource.resource_type, &mut resource.info) {
                (
                    FrameGraphResourceType::Attachment | FrameGraphResourceType::StorageImage,
                    ResourceInfo::Texture(info),
                ) => {
                    if let Some(texture) = info.texture.take() {
                        device.destroy_texture(texture);
                    }
                }
                (FrameGraphResourceType::Buffer, ResourceInfo::Buffer(info)) => {
                    if let Some(buffer) = info.buffer.take() {
                        device.destroy_buffer(buffer);
                    }
                }
                _ => {}
            }
        }

        for handle in self.resources.handles() {
            self.resources.release(handle);
        }
        for handle in self.nodes.handles() {
            self.nodes.release(handle);
        }
        self.resources.shutdown();
        self.nodes.shutdown();
        self.node_cache.clear();
        self.resource_cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TextureFormat;

    fn attachment(name: &str) -> ResourceCreation {
        ResourceCreation {
            name: name.to_string(),
            resource_type: FrameGraphResourceType::Attachment,
            info: ResourceInfo::Texture(TextureInfo::new(8, 8, TextureFormat::Rgba8Unorm)),
        }
    }

    fn input(name: &str) -> ResourceCreation {
        ResourceCreation {
            name: name.to_string(),
            resource_type: FrameGraphResourceType::Attachment,
            info: ResourceInfo::None,
        }
    }

    fn node(name: &str, inputs: Vec<ResourceCreation>, outputs: Vec<ResourceCreation>) -> NodeCreation {
        NodeCreation {
            name: name.to_string(),
            enabled: true,
            compute: false,
            inputs,
            outputs,
        }
    }

    #[test]
    fn test_outputs_are_cached_inputs_are_not() {
        let mut builder = FrameGraphBuilder::new(8, 16);
        let a = builder
            .create_node(&node("a", vec![], vec![attachment("color")]))
            .unwrap();
        let b = builder
            .create_node(&node("b", vec![input("color")], vec![]))
            .unwrap();

        let output = builder.get_resource("color").unwrap();
        let record = builder.access_resource(output).unwrap();
        assert_eq!(record.producer, Some(a));
        assert_eq!(record.output_handle, Some(output));

        let input = builder.access_node(b).unwrap().inputs[0];
        assert_ne!(input, output);
        let record = builder.access_resource(input).unwrap();
        assert_eq!(record.producer, None);
        assert_eq!(record.info, ResourceInfo::None);
    }

    #[test]
    fn test_duplicate_output_rejected() {
        let mut builder = FrameGraphBuilder::new(8, 16);
        builder
            .create_node(&node("a", vec![], vec![attachment("color")]))
            .unwrap();
        let err = builder
            .create_node(&node("b", vec![], vec![attachment("color")]))
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::DuplicateOutput {
                resource: "color".into(),
                pass: "b".into(),
                previous: "a".into(),
            }
        );
        assert!(builder.get_node("b").is_none());
    }

    #[test]
    fn test_duplicate_pass_rejected() {
        let mut builder = FrameGraphBuilder::new(8, 16);
        builder.create_node(&node("a", vec![], vec![])).unwrap();
        assert_eq!(
            builder.create_node(&node("a", vec![], vec![])),
            Err(GraphError::DuplicatePass("a".into()))
        );
    }

    #[test]
    fn test_resource_pool_exhaustion_surfaces() {
        let mut builder = FrameGraphBuilder::new(8, 1);
        let result = builder.create_node(&node("a", vec![input("x")], vec![attachment("y")]));
        assert!(matches!(result, Err(GraphError::Pool(_))));
    }

    #[test]
    fn test_exhaustion_allocates_nothing() {
        let mut builder = FrameGraphBuilder::new(2, 3);
        builder
            .create_node(&node("a", vec![], vec![attachment("color")]))
            .unwrap();

        let result = builder.create_node(&node(
            "b",
            vec![input("color")],
            vec![attachment("x"), attachment("y")],
        ));
        assert_eq!(
            result,
            Err(GraphError::Pool(PoolError::Exhausted { capacity: 3 }))
        );
        assert_eq!(builder.nodes.len(), 1);
        assert_eq!(builder.resources.len(), 1);
        assert!(builder.get_node("b").is_none());
        assert!(builder.get_resource("x").is_none());

        // The freed room is still usable.
        builder
            .create_node(&node("c", vec![input("color")], vec![attachment("z")]))
            .unwrap();
        assert_eq!(builder.resources.len(), 3);
    }
}
