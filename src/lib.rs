//! Frame graph engine - a declarative frame graph with GPU-driven draw culling
//!
//! # Features
//! - JSON-described frame graphs: passes and the named resources flowing between them
//! - Automatic execution order, attachment allocation, render passes and barriers
//! - Draw batching into buffer-contiguous ranges of shared per-draw buffers
//! - Compute draw culling feeding `draw_indexed_indirect_count`
//! - A default deferred pipeline (cull, depth pre-pass, G-buffer, lighting, transparent)
//! - A recording [`DummyDevice`](backend::DummyDevice) so everything runs without a GPU
//!
//! The device is passed explicitly to every call that needs it:
//!
//! ```no_run
//! use frame_graph_engine::backend::DummyDevice;
//! use frame_graph_engine::pipeline::{deferred_description, register_software_kernel};
//! use frame_graph_engine::{Renderer, RendererConfig};
//!
//! let mut device = DummyDevice::new();
//! register_software_kernel(&mut device);
//! let mut renderer = Renderer::new(&mut device, RendererConfig::default()).unwrap();
//! renderer.load_graph(&mut device, &deferred_description(1280, 720)).unwrap();
//! renderer.compile(&mut device).unwrap();
//! renderer.update_draws(&mut device, &[], &[]).unwrap();
//! renderer.render(&mut device).unwrap();
//! renderer.shutdown(&mut device);
//! ```

pub mod backend;
pub mod frame_graph;
pub mod pipeline;
pub mod renderer;
pub mod scene;

pub use frame_graph::{FrameGraph, FrameGraphConfig, FrameGraphDescription, GraphError};
pub use renderer::{FrameStatus, Renderer, RendererConfig, RendererError};
