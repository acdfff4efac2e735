//! Declarative pass-graph description.
//!
//! A description is a JSON document listing passes in declaration order:
//!
//! ```json
//! {
//!   "name": "shadows",
//!   "passes": [
//!     {
//!       "name": "shadow",
//!       "outputs": [
//!         { "name": "csm_depth", "type": "attachment", "format": "VK_FORMAT_D32_SFLOAT",
//!           "resolution": [2048, 2048], "op": "VK_ATTACHMENT_LOAD_OP_CLEAR", "layers": 4 }
//!       ]
//!     },
//!     {
//!       "name": "lighting",
//!       "inputs": [ { "name": "csm_depth", "type": "attachment" } ],
//!       "outputs": [
//!         { "name": "final", "type": "attachment", "format": "RGBA16F",
//!           "resolution": [2048, 2048], "op": "clear" }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backend::{BufferUsage, LoadOp, TextureFormat};
use crate::frame_graph::error::{GraphError, GraphResult};
use crate::frame_graph::resource::{
    BufferInfo, FrameGraphResourceType, NodeCreation, ResourceCreation, ResourceInfo, TextureInfo,
};

fn default_true() -> bool {
    true
}

fn default_layers() -> u32 {
    1
}

/// Top-level graph description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameGraphDescription {
    pub name: String,
    #[serde(default)]
    pub passes: Vec<PassDescription>,
}

/// One pass entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassDescription {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// `"compute"` marks a compute node, anything else is graphics
    #[serde(rename = "type", default)]
    pub pass_type: String,
    #[serde(default)]
    pub inputs: Vec<ResourceDescription>,
    #[serde(default)]
    pub outputs: Vec<ResourceDescription>,
}

/// One input or output entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescription {
    pub name: String,
    #[serde(rename = "type", default)]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<[u32; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    #[serde(default = "default_layers")]
    pub layers: u32,
    /// Byte size for buffer outputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl FrameGraphDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passes: Vec::new(),
        }
    }

    pub fn with_pass(mut self, pass: PassDescription) -> Self {
        self.passes.push(pass);
        self
    }

    pub fn from_json_str(json: &str) -> GraphResult<Self> {
        serde_json::from_str(json).map_err(|e| GraphError::Description(e.to_string()))
    }

    pub fn from_reader<R: Read>(reader: R) -> GraphResult<Self> {
        serde_json::from_reader(reader).map_err(|e| GraphError::Description(e.to_string()))
    }

    /// Read a description file from disk
    pub fn load(path: impl AsRef<Path>) -> GraphResult<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| GraphError::Description(format!("{}: {e}", path.display())))?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn to_json_string(&self) -> GraphResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| GraphError::Description(e.to_string()))
    }
}

impl PassDescription {
    pub fn graphics(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            pass_type: "graphics".to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn compute(name: impl Into<String>) -> Self {
        Self {
            pass_type: "compute".to_string(),
            ..Self::graphics(name)
        }
    }

    pub fn input(mut self, resource: ResourceDescription) -> Self {
        self.inputs.push(resource);
        self
    }

    pub fn output(mut self, resource: ResourceDescription) -> Self {
        self.outputs.push(resource);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn is_compute(&self) -> bool {
        self.pass_type == "compute"
    }

    /// Decode names into a node creation record.
    pub fn to_creation(&self) -> GraphResult<NodeCreation> {
        let inputs = self
            .inputs
            .iter()
            .map(|input| input.to_input_creation(&self.name))
            .collect();
        let outputs = self
            .outputs
            .iter()
            .map(|output| output.to_output_creation(&self.name))
            .collect::<GraphResult<Vec<_>>>()?;

        Ok(NodeCreation {
            name: self.name.clone(),
            enabled: self.enabled,
            compute: self.is_compute(),
            inputs,
            outputs,
        })
    }
}

impl ResourceDescription {
    fn named(name: impl Into<String>, resource_type: &str) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.to_string(),
            resolution: None,
            format: None,
            op: None,
            layers: 1,
            size: None,
        }
    }

    /// Attachment output
    pub fn attachment(name: impl Into<String>, format: &str, resolution: [u32; 2], op: &str) -> Self {
        Self {
            resolution: Some(resolution),
            format: Some(format.to_string()),
            op: Some(op.to_string()),
            ..Self::named(name, "attachment")
        }
    }

    /// Storage image output
    pub fn storage_image(name: impl Into<String>, format: &str, resolution: [u32; 2]) -> Self {
        Self {
            resolution: Some(resolution),
            format: Some(format.to_string()),
            ..Self::named(name, "storage-image")
        }
    }

    pub fn buffer(name: impl Into<String>, size: u64) -> Self {
        Self {
            size: Some(size),
            ..Self::named(name, "buffer")
        }
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self::named(name, "reference")
    }

    /// Input reading a resource of the given type name
    pub fn input(name: impl Into<String>, resource_type: &str) -> Self {
        Self::named(name, resource_type)
    }

    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers;
        self
    }

    fn decoded_type(&self, pass: &str) -> FrameGraphResourceType {
        let resource_type = FrameGraphResourceType::from_name(&self.resource_type);
        if resource_type == FrameGraphResourceType::Invalid {
            log::warn!(
                "Pass '{}': resource '{}' has unrecognized type '{}'",
                pass,
                self.name,
                self.resource_type
            );
        }
        resource_type
    }

    fn to_input_creation(&self, pass: &str) -> ResourceCreation {
        ResourceCreation {
            name: self.name.clone(),
            resource_type: self.decoded_type(pass),
            info: ResourceInfo::None,
        }
    }

    fn to_output_creation(&self, pass: &str) -> GraphResult<ResourceCreation> {
        let resource_type = self.decoded_type(pass);
        let info = match resource_type {
            FrameGraphResourceType::Buffer => ResourceInfo::Buffer(BufferInfo {
                size: self.size.unwrap_or(0),
                usage: BufferUsage::STORAGE,
                buffer: None,
            }),
            ty if ty.is_texture_like() => ResourceInfo::Texture(self.texture_info(pass)?),
            _ => ResourceInfo::None,
        };
        Ok(ResourceCreation {
            name: self.name.clone(),
            resource_type,
            info,
        })
    }

    fn texture_info(&self, pass: &str) -> GraphResult<TextureInfo> {
        let format_name = self.format.as_deref().unwrap_or_default();
        let format = TextureFormat::from_name(format_name).ok_or_else(|| GraphError::UnknownFormat {
            pass: pass.to_string(),
            resource: self.name.clone(),
            format: format_name.to_string(),
        })?;
        let [width, height] = self.resolution.ok_or_else(|| {
            GraphError::Description(format!(
                "pass '{}': output '{}' has no resolution",
                pass, self.name
            ))
        })?;

        let mut info = TextureInfo::new(width, height, format);
        info.layers = self.layers.max(1);
        info.load_op = self.op.as_deref().map(LoadOp::from_name).unwrap_or_default();
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHADOW_GRAPH: &str = r#"{
        "name": "shadows",
        "passes": [
            {
                "name": "shadow",
                "outputs": [
                    { "name": "csm_depth", "type": "attachment", "format": "VK_FORMAT_D32_SFLOAT",
                      "resolution": [2048, 2048], "op": "VK_ATTACHMENT_LOAD_OP_CLEAR", "layers": 4 }
                ]
            },
            {
                "name": "cull",
                "type": "compute",
                "enabled": false
            }
        ]
    }"#;

    #[test]
    fn test_parse_defaults() {
        let desc = FrameGraphDescription::from_json_str(SHADOW_GRAPH).unwrap();
        assert_eq!(desc.passes.len(), 2);
        assert!(desc.passes[0].enabled);
        assert!(!desc.passes[0].is_compute());
        assert!(desc.passes[1].is_compute());
        assert!(!desc.passes[1].enabled);
        assert!(desc.passes[1].inputs.is_empty());
    }

    #[test]
    fn test_output_decoding() {
        let desc = FrameGraphDescription::from_json_str(SHADOW_GRAPH).unwrap();
        let creation = desc.passes[0].to_creation().unwrap();
        let output = &creation.outputs[0];
        assert_eq!(output.resource_type, FrameGraphResourceType::Attachment);

        let info = output.info.texture().unwrap();
        assert_eq!(info.format, TextureFormat::Depth32Float);
        assert_eq!((info.width, info.height, info.layers), (2048, 2048, 4));
        assert_eq!(info.load_op, LoadOp::Clear);
        assert!(info.is_depth());
    }

    #[test]
    fn test_unknown_format_is_an_error() {
        let pass = PassDescription::graphics("p").output(ResourceDescription::attachment(
            "color",
            "VK_FORMAT_R4G4_UNORM_PACK8",
            [64, 64],
            "clear",
        ));
        assert!(matches!(
            pass.to_creation(),
            Err(GraphError::UnknownFormat { .. })
        ));
    }

    #[test]
    fn test_unknown_type_becomes_invalid() {
        let pass = PassDescription::graphics("p").input(ResourceDescription::input("x", "blob"));
        let creation = pass.to_creation().unwrap();
        assert_eq!(creation.inputs[0].resource_type, FrameGraphResourceType::Invalid);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            FrameGraphDescription::from_json_str("{ \"passes\": 3 }"),
            Err(GraphError::Description(_))
        ));
    }

    #[test]
    fn test_json_roundtrip_of_builder_output() {
        let desc = FrameGraphDescription::new("g").with_pass(
            PassDescription::graphics("a")
                .output(ResourceDescription::attachment("c", "RGBA8", [4, 4], "clear")),
        );
        let json = desc.to_json_string().unwrap();
        assert_eq!(FrameGraphDescription::from_json_str(&json).unwrap(), desc);
    }
}
