pub mod inputs;

use std::borrow::Cow;

use rustc_hash::FxHashMap;
use tessera_core::{dim::Dimensions, fixed_dim::FixedDimensions, op_error::OpError, tensor::Tensor};
use thiserror::Error;

/// Tensors keyed by graph value name.
pub type NamedTensors = FxHashMap<String, Tensor>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Input '{0}' is not supplied")]
    MissingInput(String),

    #[error("Input '{name}' has shape {actual} but the model declares {expected}")]
    InvalidShape {
        name: String,
        expected: Dimensions,
        actual: FixedDimensions,
    },

    #[error("Node '{node}' reads tensor '{name}' which does not exist")]
    TensorNotFound { node: String, name: String },

    #[error("Operator '{op_type}' is not defined in opset {opset}")]
    UnknownOperator { op_type: String, opset: i64 },

    #[error("Opset version {version} is not supported (known versions: {known:?})")]
    UnsupportedOpset { version: i64, known: Vec<i64> },

    #[error("Node '{node}' produced {actual} outputs but declares {expected}")]
    OutputCountMismatch {
        node: String,
        expected: usize,
        actual: usize,
    },

    /// Errors raised by an operator while running a node.
    #[error("{op_type} ({node}): {source}")]
    Operator {
        op_type: String,
        node: String,
        #[source]
        source: OpError,
    },

    /// General error messages.
    #[error("Something went wrong: {0}")]
    Message(Cow<'static, str>),
}

pub trait Session {
    fn run(&self, inputs: NamedTensors) -> Result<NamedTensors, SessionError>;
}
