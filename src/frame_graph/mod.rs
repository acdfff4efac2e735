//! Frame graph
//!
//! A frame graph is a DAG of render and compute passes connected by named
//! resources. The graph is described declaratively ([`FrameGraphDescription`]),
//! parsed into nodes and resources owned by a [`FrameGraphBuilder`], and
//! compiled once: edges are resolved by name, nodes are sorted so producers run
//! before consumers, attachments get backing textures, and graphics nodes get
//! render passes and framebuffers. Every frame, [`FrameGraph::execute`] issues
//! the barriers each node needs and calls its bound [`FrameGraphPass`].

mod barrier;
mod builder;
mod description;
mod error;
mod graph;
mod pass;
mod pool;
mod resource;

pub use barrier::node_barriers;
pub use builder::FrameGraphBuilder;
pub use description::{FrameGraphDescription, PassDescription, ResourceDescription};
pub use error::{GraphError, GraphResult, UnresolvedInput};
pub use graph::{CompileReport, FrameGraph, FrameGraphConfig, GraphState};
pub use pass::{FrameGraphPass, PassContext};
pub use pool::{Handle, PoolError, ResourcePool};
pub use resource::*;
