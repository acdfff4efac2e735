//! Headless frame graph demo.
//!
//! Loads a frame graph description (or the default deferred graph), scatters a
//! grid of cubes around the camera, renders a few frames on the recording
//! `DummyDevice` and logs how many draws survived culling per batch.
//!
//! ```bash
//! cargo run --example headless -- --frames 3 --draws 500
//! cargo run --example headless -- --graph my_graph.json --orbit
//! ```

use std::path::PathBuf;

use clap::Parser;
use glam::Vec3;

use frame_graph_engine::backend::*;
use frame_graph_engine::pipeline::{deferred_description, register_software_kernel};
use frame_graph_engine::scene::{BoundingSphere, DrawData, Material};
use frame_graph_engine::{FrameGraphDescription, FrameStatus, Renderer, RendererConfig};

/// Frame graph headless demo arguments.
#[derive(Parser, Debug)]
#[command(
    name = "headless",
    about = "Run a frame graph on the recording dummy device",
    version
)]
struct Args {
    /// JSON frame graph description; the default deferred graph when omitted.
    #[arg(long)]
    graph: Option<PathBuf>,

    /// Print the default deferred description as JSON and exit.
    #[arg(long)]
    dump_default: bool,

    /// Number of frames to render.
    #[arg(long, default_value = "3")]
    frames: u32,

    /// Number of cube draws in the scene.
    #[arg(long, default_value = "256")]
    draws: u32,

    /// Every n-th draw is transparent (0 disables transparency).
    #[arg(long, default_value = "8")]
    transparent_every: u32,

    /// Distinct vertex buffers the cubes are spread over.
    #[arg(long, default_value = "4")]
    meshes: u32,

    /// Render target width in pixels.
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Render target height in pixels.
    #[arg(long, default_value = "720")]
    height: u32,

    /// Rotate the camera around the grid between frames.
    #[arg(long)]
    orbit: bool,
}

const CUBE_VERTICES: u64 = 24;
const CUBE_INDICES: u32 = 36;

fn create_scene(
    device: &mut DummyDevice,
    args: &Args,
) -> Result<(Vec<DrawData>, Vec<DrawData>), BackendError> {
    let vertex_size = std::mem::size_of::<Vertex>() as u64;
    let meshes = args.meshes.max(1);
    let per_mesh = (args.draws as u64).div_ceil(meshes as u64).max(1);

    let mut vertex_buffers = Vec::with_capacity(meshes as usize);
    for mesh in 0..meshes {
        vertex_buffers.push(device.create_buffer(&BufferDescriptor {
            label: Some(format!("cube vertices {mesh}")),
            size: per_mesh * CUBE_VERTICES * vertex_size,
            usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
        })?);
    }
    let index_buffer = device.create_buffer(&BufferDescriptor {
        label: Some("cube indices".into()),
        size: per_mesh * CUBE_INDICES as u64 * 4,
        usage: BufferUsage::INDEX | BufferUsage::COPY_DST,
    })?;

    let side = (args.draws as f32).sqrt().ceil().max(1.0) as u32;
    let mut opaque = Vec::new();
    let mut transparent = Vec::new();
    for i in 0..args.draws {
        let mesh = (i % meshes) as usize;
        let slot = (i / meshes) as u64;
        let position = Vec3::new(
            (i % side) as f32 * 3.0 - side as f32 * 1.5,
            0.0,
            (i / side) as f32 * 3.0 - side as f32 * 1.5,
        );
        let is_transparent = args.transparent_every > 0 && i % args.transparent_every == 0;
        let draw = DrawData {
            vertex_buffer: BufferView::new(
                vertex_buffers[mesh],
                slot * CUBE_VERTICES * vertex_size,
                CUBE_VERTICES * vertex_size,
            ),
            index_buffer: BufferView::new(index_buffer, slot * CUBE_INDICES as u64 * 4, CUBE_INDICES as u64 * 4),
            index_format: IndexFormat::Uint32,
            index_count: CUBE_INDICES,
            skinned: false,
            transform: glam::Mat4::from_translation(position),
            material: if is_transparent {
                Material::glass()
            } else if mesh % 2 == 0 {
                Material::plastic(Vec3::new(0.8, 0.3, 0.2))
            } else {
                Material::metal(Vec3::new(0.9, 0.9, 0.95), 0.25)
            },
            meshlets: None,
            bounding_sphere: BoundingSphere::new(Vec3::ZERO, 0.9),
        };
        if is_transparent {
            transparent.push(draw);
        } else {
            opaque.push(draw);
        }
    }
    Ok((opaque, transparent))
}

fn log_visible_counts(device: &mut DummyDevice, renderer: &Renderer) -> Result<(), BackendError> {
    let buffers = *renderer.draw_buffers();
    for batch in renderer.scene().batches() {
        let view = buffers.count_view(batch);
        let bytes = device.read_buffer(view.buffer, view.offset, view.size)?;
        let visible: u32 = bytemuck::pod_read_unaligned(&bytes);
        log::info!(
            "  batch {} (vertex buffer {}): {}/{} visible",
            batch.id,
            batch.vertex_buffer.buffer.raw(),
            visible,
            batch.count
        );
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.dump_default {
        println!("{}", deferred_description(args.width, args.height).to_json_string()?);
        return Ok(());
    }

    let description = match &args.graph {
        Some(path) => FrameGraphDescription::load(path)?,
        None => deferred_description(args.width, args.height),
    };

    let mut device = DummyDevice::new();
    device.set_swapchain_size(args.width, args.height);
    register_software_kernel(&mut device);

    let config = RendererConfig {
        width: args.width,
        height: args.height,
        max_draws: args.draws.max(1),
        ..Default::default()
    };
    let mut renderer = Renderer::new(&mut device, config)?;
    renderer.load_graph(&mut device, &description)?;
    let report = renderer.compile(&mut device)?;
    log::info!("Execution order: {}", report.order.join(" -> "));
    for unresolved in &report.unresolved {
        log::warn!("'{}' reads '{}' which nothing produces", unresolved.pass, unresolved.resource);
    }
    log::info!("Final output: {:?} of {:?}", renderer.final_output(), renderer.output_choices());

    let (opaque, transparent) = create_scene(&mut device, &args)?;
    renderer.update_draws(&mut device, &opaque, &transparent)?;

    for frame in 0..args.frames {
        if args.orbit {
            let angle = frame as f32 * 0.5;
            let camera = renderer.camera_mut();
            camera.position = Vec3::new(angle.cos() * 40.0, 15.0, angle.sin() * 40.0);
            camera.target = Vec3::ZERO;
        }

        device.clear_commands();
        match renderer.render(&mut device)? {
            FrameStatus::Rendered => {
                log::info!(
                    "Frame {}: {} commands recorded",
                    frame,
                    device.commands().len()
                );
                log_visible_counts(&mut device, &renderer)?;
            }
            FrameStatus::Skipped => log::info!("Frame {}: skipped", frame),
        }
    }

    renderer.shutdown(&mut device);
    let stats = device.stats();
    log::info!(
        "Device objects: {} buffers, {} textures, {} pipelines created; {} live buffers",
        stats.buffers_created,
        stats.textures_created,
        stats.pipelines_created,
        device.live_buffer_count()
    );
    Ok(())
}
