//! Frame graph integration tests.
//!
//! Graphs are described through the public description API or JSON, parsed,
//! compiled against the `DummyDevice` and inspected through the graph, its
//! builder and the device's recorded objects.

mod common;

use rstest::rstest;

use frame_graph_engine::backend::*;
use frame_graph_engine::frame_graph::*;
use frame_graph_engine::pipeline::{self, deferred_description};

fn compile(desc: &FrameGraphDescription, device: &mut DummyDevice) -> GraphResult<FrameGraph> {
    let mut graph = FrameGraph::new(FrameGraphConfig::default());
    graph.parse(desc)?;
    graph.compile(device)?;
    Ok(graph)
}

fn position(graph: &FrameGraph, handle: NodeHandle) -> usize {
    graph
        .sorted_nodes()
        .iter()
        .position(|&h| h == handle)
        .expect("node in sorted order")
}

// ============================================================================
// Compilation
// ============================================================================

const SHADOW_LIGHTING: &str = r#"{
    "name": "cascaded_shadows",
    "passes": [
        {
            "name": "shadow",
            "outputs": [
                { "name": "csm_depth", "type": "attachment", "format": "VK_FORMAT_D32_SFLOAT",
                  "resolution": [2048, 2048], "op": "VK_ATTACHMENT_LOAD_OP_CLEAR", "layers": 4 }
            ]
        },
        {
            "name": "lighting",
            "inputs": [ { "name": "csm_depth", "type": "attachment" } ]
        }
    ]
}"#;

#[test]
fn test_layered_depth_shared_with_consumer() {
    let mut device = common::device();
    let desc = FrameGraphDescription::from_json_str(SHADOW_LIGHTING).unwrap();
    let graph = compile(&desc, &mut device).unwrap();

    assert_eq!(device.stats().textures_created, 1);
    let csm = graph.get_resource("csm_depth").unwrap();
    let info = csm.info.texture().unwrap();
    let texture = info.texture.unwrap();
    let texture_desc = device.texture_descriptor(texture).unwrap();
    assert_eq!(texture_desc.format, TextureFormat::Depth32Float);
    assert_eq!(texture_desc.array_layers, 4);
    assert_eq!(texture_desc.view_dimension, TextureViewDimension::D2Array);

    let lighting = graph.get_node("lighting").unwrap();
    let framebuffer = device
        .framebuffer_descriptor(lighting.framebuffer.unwrap())
        .unwrap();
    assert_eq!((framebuffer.width, framebuffer.height), (2048, 2048));
    assert_eq!(framebuffer.depth_attachment, Some(texture));
    assert_eq!(framebuffer.layers, 4);

    let render_pass = device
        .render_pass_descriptor(lighting.render_pass.unwrap())
        .unwrap();
    assert_eq!(render_pass.depth_attachment.unwrap().load_op, LoadOp::Load);
}

fn chain(order: &[usize]) -> FrameGraphDescription {
    let passes = [
        PassDescription::graphics("gbuffer")
            .output(ResourceDescription::attachment("albedo", "RGBA8", [128, 128], "clear")),
        PassDescription::graphics("lighting")
            .input(ResourceDescription::input("albedo", "texture"))
            .output(ResourceDescription::attachment("hdr", "RGBA16F", [128, 128], "clear")),
        PassDescription::graphics("bloom")
            .input(ResourceDescription::input("hdr", "texture"))
            .output(ResourceDescription::attachment("bloom", "RGBA16F", [64, 64], "clear")),
        PassDescription::graphics("tonemap")
            .input(ResourceDescription::input("hdr", "texture"))
            .input(ResourceDescription::input("bloom", "texture"))
            .output(ResourceDescription::attachment("ldr", "RGBA8", [128, 128], "clear")),
    ];
    order
        .iter()
        .fold(FrameGraphDescription::new("chain"), |desc, &i| {
            desc.with_pass(passes[i].clone())
        })
}

#[rstest]
#[case::declared(&[0, 1, 2, 3])]
#[case::reversed(&[3, 2, 1, 0])]
#[case::shuffled(&[2, 0, 3, 1])]
fn test_producers_sorted_before_consumers(#[case] order: &[usize]) {
    let mut device = common::device();
    let graph = compile(&chain(order), &mut device).unwrap();

    assert_eq!(graph.sorted_nodes().len(), 4);
    for &producer in graph.sorted_nodes() {
        let node = graph.builder().access_node(producer).unwrap();
        for &consumer in &node.edges {
            assert!(
                position(&graph, producer) < position(&graph, consumer),
                "{} must run before its consumer",
                node.name
            );
        }
    }
    let names = graph.node_names_in_order();
    assert_eq!(names.first().map(String::as_str), Some("gbuffer"));
    assert_eq!(names.last().map(String::as_str), Some("tonemap"));
}

#[test]
fn test_duplicate_output_rejected() {
    let desc = FrameGraphDescription::new("duplicates")
        .with_pass(
            PassDescription::graphics("first")
                .output(ResourceDescription::attachment("color", "RGBA8", [32, 32], "clear")),
        )
        .with_pass(
            PassDescription::graphics("second")
                .output(ResourceDescription::attachment("color", "RGBA8", [32, 32], "clear")),
        );

    let mut graph = FrameGraph::new(FrameGraphConfig::default());
    let err = graph.parse(&desc).unwrap_err();
    assert!(
        matches!(err, GraphError::DuplicateOutput { ref resource, .. } if resource == "color"),
        "{err}"
    );
}

#[test]
fn test_cycle_names_the_loop() {
    let desc = FrameGraphDescription::new("cycle")
        .with_pass(
            PassDescription::graphics("a")
                .input(ResourceDescription::input("b_out", "texture"))
                .output(ResourceDescription::attachment("a_out", "RGBA8", [8, 8], "clear")),
        )
        .with_pass(
            PassDescription::graphics("b")
                .input(ResourceDescription::input("a_out", "texture"))
                .output(ResourceDescription::attachment("b_out", "RGBA8", [8, 8], "clear")),
        );

    let mut device = common::device();
    match compile(&desc, &mut device) {
        Err(GraphError::CyclicDependency { nodes }) => {
            assert_eq!(nodes.len(), 3);
            assert_eq!(nodes.first(), nodes.last());
        }
        other => panic!("expected a cycle error, got {:?}", other.map(|g| g.node_names_in_order())),
    }
}

#[rstest]
#[case::lenient(false)]
#[case::strict(true)]
fn test_unresolved_inputs(#[case] strict: bool) {
    let desc = FrameGraphDescription::new("dangling").with_pass(
        PassDescription::graphics("post")
            .input(ResourceDescription::input("missing", "texture"))
            .output(ResourceDescription::attachment("out", "RGBA8", [16, 16], "clear")),
    );
    let mut device = common::device();
    let mut graph = FrameGraph::new(FrameGraphConfig {
        strict_resolution: strict,
        ..Default::default()
    });
    graph.parse(&desc).unwrap();

    let result = graph.compile(&mut device);
    if strict {
        assert!(matches!(result, Err(GraphError::UnresolvedInputs(ref inputs)) if inputs.len() == 1));
    } else {
        let report = result.unwrap();
        assert_eq!(report.unresolved[0].resource, "missing");
        assert_eq!(report.order, vec!["post"]);
    }
}

// ============================================================================
// Enable toggles
// ============================================================================

#[test]
fn test_toggle_round_trip_is_idempotent() {
    let mut device = common::device();
    let mut graph = FrameGraph::new(FrameGraphConfig::default());
    graph.parse(&chain(&[0, 1, 2, 3])).unwrap();
    graph.compile(&mut device).unwrap();

    let order = graph.node_names_in_order();
    let textures: Vec<_> = graph
        .texture_outputs()
        .iter()
        .map(|(name, info)| (name.to_string(), info.texture))
        .collect();
    let created = device.stats();

    graph.set_node_enabled("bloom", false).unwrap();
    let report = graph.compile(&mut device).unwrap();
    assert_eq!(report.order, vec!["gbuffer", "lighting", "tonemap"]);

    graph.set_node_enabled("bloom", true).unwrap();
    let report = graph.compile(&mut device).unwrap();
    assert_eq!(report.order, order);
    assert_eq!(report.textures_created, 0);
    assert_eq!(report.render_passes_created, 0);

    let after: Vec<_> = graph
        .texture_outputs()
        .iter()
        .map(|(name, info)| (name.to_string(), info.texture))
        .collect();
    assert_eq!(after, textures);
    assert_eq!(device.stats().textures_created, created.textures_created);
    assert_eq!(device.stats().render_passes_created, created.render_passes_created);
}

#[test]
fn test_disabled_node_skipped_at_execute() {
    let mut device = common::device();
    let mut graph = FrameGraph::new(FrameGraphConfig::default());
    graph.parse(&chain(&[0, 1, 2, 3])).unwrap();
    graph.compile(&mut device).unwrap();
    graph.set_node_enabled("bloom", false).unwrap();

    device.clear_commands();
    graph
        .execute(&mut device, &frame_graph_engine::scene::RenderScene::default())
        .unwrap();
    let passes = device
        .commands()
        .iter()
        .filter(|c| matches!(c, DeviceCommand::BeginRenderPass { .. }))
        .count();
    assert_eq!(passes, 3);
}

#[test]
fn test_reenabled_producer_rebuilds_consumer_framebuffer() {
    let desc = FrameGraphDescription::new("prepass")
        .with_pass(
            PassDescription::graphics("depth")
                .output(ResourceDescription::attachment("depth", "D32", [64, 64], "clear")),
        )
        .with_pass(
            PassDescription::graphics("main")
                .input(ResourceDescription::input("depth", "attachment"))
                .output(ResourceDescription::attachment("color", "RGBA8", [64, 64], "clear")),
        );
    let mut device = common::device();
    let mut graph = FrameGraph::new(FrameGraphConfig::default());
    graph.parse(&desc).unwrap();
    graph.set_node_enabled("depth", false).unwrap();
    graph.compile(&mut device).unwrap();

    let main = graph.get_node("main").unwrap();
    let (old_framebuffer, old_render_pass) = (main.framebuffer.unwrap(), main.render_pass.unwrap());
    assert_eq!(
        device.framebuffer_descriptor(old_framebuffer).unwrap().depth_attachment,
        None
    );

    graph.set_node_enabled("depth", true).unwrap();
    let report = graph.compile(&mut device).unwrap();
    assert_eq!(report.order, vec!["depth", "main"]);
    assert_eq!(report.render_passes_created, 2);

    let depth = graph
        .get_resource("depth")
        .and_then(|r| r.info.texture())
        .and_then(|info| info.texture);
    assert!(depth.is_some());

    let main = graph.get_node("main").unwrap();
    let framebuffer = device
        .framebuffer_descriptor(main.framebuffer.unwrap())
        .unwrap();
    assert_eq!(framebuffer.depth_attachment, depth);
    let render_pass = device
        .render_pass_descriptor(main.render_pass.unwrap())
        .unwrap();
    assert_eq!(render_pass.depth_attachment.unwrap().load_op, LoadOp::Load);

    // The stale objects are gone, not leaked.
    assert!(device.framebuffer_descriptor(old_framebuffer).is_none());
    assert!(device.render_pass_descriptor(old_render_pass).is_none());
    graph.shutdown(&mut device);
    let stats = device.stats();
    assert_eq!(stats.framebuffers_created, stats.framebuffers_destroyed);
    assert_eq!(stats.render_passes_created, stats.render_passes_destroyed);
}

#[test]
fn test_node_enabled_after_compile_waits_for_recompile() {
    let mut device = common::device();
    let mut graph = FrameGraph::new(FrameGraphConfig::default());
    graph.parse(&chain(&[0, 1, 2, 3])).unwrap();
    graph.set_node_enabled("bloom", false).unwrap();
    graph.compile(&mut device).unwrap();
    graph.set_node_enabled("bloom", true).unwrap();

    let scene = frame_graph_engine::scene::RenderScene::default();
    let count_passes = |device: &DummyDevice| {
        device
            .commands()
            .iter()
            .filter(|c| matches!(c, DeviceCommand::BeginRenderPass { .. }))
            .count()
    };
    device.clear_commands();
    graph.execute(&mut device, &scene).unwrap();
    assert_eq!(count_passes(&device), 3);

    graph.compile(&mut device).unwrap();
    device.clear_commands();
    graph.execute(&mut device, &scene).unwrap();
    assert_eq!(count_passes(&device), 4);
}

// ============================================================================
// Barriers
// ============================================================================

#[test]
fn test_lighting_barriers() {
    let mut device = common::device();
    let graph = compile(&deferred_description(256, 256), &mut device).unwrap();
    let lighting = graph.get_node(pipeline::LIGHTING).unwrap();
    let barriers = node_barriers(graph.builder(), lighting);

    let texture = |name: &str| {
        graph
            .get_resource(name)
            .and_then(|r| r.info.texture())
            .and_then(|info| info.texture)
            .unwrap()
    };
    let find = |name: &str| {
        barriers
            .iter()
            .find(|b| b.texture == texture(name))
            .copied()
            .unwrap()
    };

    assert_eq!(barriers.len(), 5);
    for color in ["albedo", "normal", "material"] {
        let barrier = find(color);
        assert_eq!(barrier.src_stage, PipelineStages::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(barrier.dst_stage, PipelineStages::FRAGMENT_SHADER);
        assert_eq!(barrier.src_access, AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(barrier.dst_access, AccessFlags::SHADER_READ);
    }

    let depth = find("depth");
    assert_eq!(depth.aspect, ImageAspect::DEPTH);
    assert_eq!(depth.src_stage, PipelineStages::LATE_FRAGMENT_TESTS);
    assert_eq!(depth.dst_stage, PipelineStages::EARLY_FRAGMENT_TESTS);
    assert_eq!(depth.dst_access, AccessFlags::DEPTH_STENCIL_READ);

    let output = find("lighting");
    assert_eq!(output.src_stage, PipelineStages::TOP_OF_PIPE);
    assert_eq!(output.dst_stage, PipelineStages::COLOR_ATTACHMENT_OUTPUT);
    assert_eq!(output.dst_access, AccessFlags::COLOR_ATTACHMENT_WRITE);
}

#[test]
fn test_storage_image_barriers() {
    let desc = FrameGraphDescription::new("compute_chain")
        .with_pass(
            PassDescription::compute("generate")
                .output(ResourceDescription::storage_image("noise", "RGBA16F", [32, 32])),
        )
        .with_pass(
            PassDescription::compute("blur")
                .input(ResourceDescription::input("noise", "storage-image"))
                .output(ResourceDescription::storage_image("blurred", "RGBA16F", [32, 32])),
        );
    let mut device = common::device();
    let graph = compile(&desc, &mut device).unwrap();
    let texture = |name: &str| {
        graph
            .get_resource(name)
            .and_then(|r| r.info.texture())
            .and_then(|info| info.texture)
            .unwrap()
    };

    let blur = graph.get_node("blur").unwrap();
    let barriers = node_barriers(graph.builder(), blur);
    assert_eq!(barriers.len(), 2);

    let read = barriers.iter().find(|b| b.texture == texture("noise")).unwrap();
    assert_eq!(read.src_stage, PipelineStages::COMPUTE_SHADER);
    assert_eq!(read.dst_stage, PipelineStages::COMPUTE_SHADER);
    assert_eq!(read.src_access, AccessFlags::SHADER_WRITE);
    assert_eq!(read.dst_access, AccessFlags::SHADER_READ);

    let write = barriers.iter().find(|b| b.texture == texture("blurred")).unwrap();
    assert_eq!(write.dst_stage, PipelineStages::COMPUTE_SHADER);
    assert_eq!(write.dst_access, AccessFlags::SHADER_WRITE);
}

#[test]
fn test_execute_records_no_empty_barriers() {
    let mut device = common::device();
    let mut graph = compile(&deferred_description(64, 64), &mut device).unwrap();
    device.clear_commands();
    graph
        .execute(&mut device, &frame_graph_engine::scene::RenderScene::default())
        .unwrap();

    let commands = device.commands();
    assert!(commands
        .iter()
        .any(|c| matches!(c, DeviceCommand::Barrier { .. })));
    for command in commands {
        if let DeviceCommand::Barrier { images, buffers } = command {
            assert!(!images.is_empty() || !buffers.is_empty());
        }
    }
}

#[test]
fn test_compute_node_has_no_render_pass() {
    let mut device = common::device();
    let graph = compile(&deferred_description(64, 64), &mut device).unwrap();
    let cull = graph.get_node(pipeline::DRAW_CULL).unwrap();
    assert!(cull.compute);
    assert!(cull.render_pass.is_none());
    assert!(cull.framebuffer.is_none());
}

#[test]
fn test_shutdown_destroys_everything() {
    let mut device = common::device();
    let mut graph = FrameGraph::new(FrameGraphConfig::default());
    graph.parse(&deferred_description(64, 64)).unwrap();
    pipeline::register_default_passes(&mut graph, 32).unwrap();
    graph.compile(&mut device).unwrap();

    graph.shutdown(&mut device);
    let stats = device.stats();
    assert_eq!(stats.textures_created, stats.textures_destroyed);
    assert_eq!(stats.render_passes_created, stats.render_passes_destroyed);
    assert_eq!(stats.framebuffers_created, stats.framebuffers_destroyed);
    assert_eq!(stats.pipelines_created, stats.pipelines_destroyed);
    assert_eq!(graph.state(), GraphState::Shutdown);
}
