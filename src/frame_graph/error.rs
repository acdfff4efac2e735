//! Frame graph errors

use thiserror::Error;

use crate::backend::BackendError;
use crate::frame_graph::pool::PoolError;

/// Errors raised while parsing, compiling or executing a frame graph
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Malformed graph description: {0}")]
    Description(String),

    #[error("Pass '{pass}': unknown format '{format}' for output '{resource}'")]
    UnknownFormat {
        pass: String,
        resource: String,
        format: String,
    },

    #[error("Output '{resource}' declared by '{pass}' was already declared by '{previous}'")]
    DuplicateOutput {
        resource: String,
        pass: String,
        previous: String,
    },

    #[error("Duplicate pass name '{0}'")]
    DuplicatePass(String),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Cyclic dependency between passes: {}", nodes.join(" -> "))]
    CyclicDependency { nodes: Vec<String> },

    #[error(
        "Pass '{pass}': attachment '{resource}' is {actual:?} but the framebuffer is {expected:?}"
    )]
    AttachmentSizeMismatch {
        pass: String,
        resource: String,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Unresolved inputs: {}", .0.iter().map(|u| format!("{}.{}", u.pass, u.resource)).collect::<Vec<_>>().join(", "))]
    UnresolvedInputs(Vec<UnresolvedInput>),

    #[error("Unknown pass '{0}'")]
    UnknownPass(String),

    #[error("Invalid frame graph state: expected {expected}, found {found}")]
    InvalidState {
        expected: &'static str,
        found: &'static str,
    },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// An input whose name matched no declared output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedInput {
    pub pass: String,
    pub resource: String,
}

pub type GraphResult<T> = Result<T, GraphError>;
