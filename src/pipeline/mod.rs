//! Deferred rendering pipeline
//!
//! The default graph wires these passes together:
//! 1. Draw cull - compute pass writing visible indirect commands per batch
//! 2. Depth pre-pass - opaque depth from the culled commands
//! 3. G-Buffer pass - albedo, normal and material targets
//! 4. Lighting pass - fullscreen pass shading the G-buffer
//! 5. Transparent pass - forward-shaded transparent batches over the lit image
//!
//! Passes are declared with the depth pre-pass first; the graph moves the cull
//! ahead of it because the pre-pass reads the culled draws.

pub mod depth_prepass;
pub mod draw_cull;
pub mod gbuffer_pass;
mod geometry;
pub mod lighting_pass;
pub mod transparent_pass;

pub use depth_prepass::DepthPrePass;
pub use draw_cull::{
    register_software_kernel, software_kernel, CullConstants, CullStats, DrawCullPass,
    CULL_GROUP_SIZE, DRAW_CULL_LABEL,
};
pub use gbuffer_pass::GBufferPass;
pub use geometry::BatchFilter;
pub use lighting_pass::{LightingConstants, LightingPass};
pub use transparent_pass::TransparentPass;

use crate::frame_graph::{
    FrameGraph, FrameGraphDescription, GraphResult, PassDescription, ResourceDescription,
};

pub const DEPTH_PREPASS: &str = "depth_prepass";
pub const DRAW_CULL: &str = "draw_cull";
pub const GBUFFER: &str = "gbuffer";
pub const LIGHTING: &str = "lighting";
pub const TRANSPARENT: &str = "transparent";

/// Buffer resource standing for the culled draw commands.
///
/// It only orders the graph; the command buffers themselves belong to the renderer.
pub const VISIBLE_DRAWS: &str = "visible_draws";

/// Description of the default deferred graph at the given resolution
pub fn deferred_description(width: u32, height: u32) -> FrameGraphDescription {
    let resolution = [width, height];
    let visible_draws = || ResourceDescription::input(VISIBLE_DRAWS, "buffer");

    FrameGraphDescription::new("deferred")
        .with_pass(
            PassDescription::graphics(DEPTH_PREPASS)
                .input(visible_draws())
                .output(ResourceDescription::attachment("depth", "D32", resolution, "clear")),
        )
        .with_pass(
            PassDescription::compute(DRAW_CULL)
                .output(ResourceDescription::buffer(VISIBLE_DRAWS, 0)),
        )
        .with_pass(
            PassDescription::graphics(GBUFFER)
                .input(visible_draws())
                .input(ResourceDescription::input("depth", "attachment"))
                .output(ResourceDescription::attachment("albedo", "RGBA8", resolution, "clear"))
                .output(ResourceDescription::attachment("normal", "RGBA16F", resolution, "clear"))
                .output(ResourceDescription::attachment("material", "RGBA8", resolution, "clear")),
        )
        .with_pass(
            PassDescription::graphics(LIGHTING)
                .input(ResourceDescription::input("albedo", "texture"))
                .input(ResourceDescription::input("normal", "texture"))
                .input(ResourceDescription::input("material", "texture"))
                .input(ResourceDescription::input("depth", "texture"))
                .output(ResourceDescription::attachment("lighting", "RGBA16F", resolution, "clear")),
        )
        .with_pass(
            PassDescription::graphics(TRANSPARENT)
                .input(visible_draws())
                .input(ResourceDescription::input("lighting", "attachment"))
                .input(ResourceDescription::input("depth", "attachment")),
        )
}

/// Bind the concrete passes to the nodes of a parsed default graph.
///
/// Nodes missing from the graph are skipped, so trimmed descriptions still work.
pub fn register_default_passes(graph: &mut FrameGraph, cull_group_size: u32) -> GraphResult<()> {
    let mut bind = |name: &str, pass: Box<dyn crate::frame_graph::FrameGraphPass>| {
        if graph.get_node(name).is_none() {
            log::debug!("Deferred pipeline: graph has no '{}' node", name);
            return Ok(());
        }
        graph.register_pass(name, pass).map(|_| ())
    };

    bind(DRAW_CULL, Box::new(DrawCullPass::new(cull_group_size)))?;
    bind(DEPTH_PREPASS, Box::new(DepthPrePass::new()))?;
    bind(GBUFFER, Box::new(GBufferPass::new()))?;
    bind(LIGHTING, Box::new(LightingPass::new()))?;
    bind(TRANSPARENT, Box::new(TransparentPass::new()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyDevice, TextureViewDimension};
    use crate::frame_graph::FrameGraphConfig;

    #[test]
    fn test_default_graph_orders_cull_first() {
        let mut device = DummyDevice::new();
        let mut graph = FrameGraph::new(FrameGraphConfig::default());
        graph.parse(&deferred_description(320, 240)).unwrap();
        register_default_passes(&mut graph, CULL_GROUP_SIZE).unwrap();

        let report = graph.compile(&mut device).unwrap();
        assert!(report.unresolved.is_empty());
        assert_eq!(
            report.order,
            vec![DRAW_CULL, DEPTH_PREPASS, GBUFFER, LIGHTING, TRANSPARENT]
        );
        // depth, albedo, normal, material, lighting
        assert_eq!(report.textures_created, 5);
        assert_eq!(report.render_passes_created, 4);
    }

    #[test]
    fn test_default_graph_texture_sizes() {
        let mut device = DummyDevice::new();
        let mut graph = FrameGraph::new(FrameGraphConfig::default());
        graph.parse(&deferred_description(320, 240)).unwrap();
        graph.compile(&mut device).unwrap();

        for (name, info) in graph.texture_outputs() {
            assert_eq!((info.width, info.height), (320, 240), "{name}");
            let texture = info.texture.unwrap();
            let desc = device.texture_descriptor(texture).unwrap();
            assert_eq!(desc.view_dimension, TextureViewDimension::D2);
        }
    }

    #[test]
    fn test_register_skips_missing_nodes() {
        let mut graph = FrameGraph::new(FrameGraphConfig::default());
        let desc = FrameGraphDescription::new("cull_only")
            .with_pass(PassDescription::compute(DRAW_CULL));
        graph.parse(&desc).unwrap();
        assert!(register_default_passes(&mut graph, 64).is_ok());
    }
}
