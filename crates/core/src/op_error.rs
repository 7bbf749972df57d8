use std::borrow::Cow;

use thiserror::Error;

use crate::{
    broadcast::BroadcastError,
    fixed_dim::FixedDimensions,
    tensor::{TensorElemType, TensorError},
};

/// Failure raised by an operator while parsing its attributes, validating its
/// inputs or computing its outputs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OpError {
    #[error("{op}: expected {expected} inputs but got {actual}")]
    InvalidInputCount {
        op: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{op}: expected between {min} and {max} inputs but got {actual}")]
    InvalidInputCountRange {
        op: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("{op}: input {position} has invalid type {elem_ty:?}")]
    InvalidInputType {
        op: &'static str,
        position: usize,
        elem_ty: TensorElemType,
    },

    #[error("{op}: unknown attribute '{name}'")]
    UnknownAttribute { op: &'static str, name: String },

    #[error("Attribute '{name}' is not of type {expected}")]
    AttributeType { name: String, expected: &'static str },

    #[error("{op}: {message}")]
    InvalidAttributeCount {
        op: &'static str,
        message: Cow<'static, str>,
    },

    #[error("{op}: unsupported value for attribute '{name}': {value}")]
    UnsupportedAttribute {
        op: &'static str,
        name: &'static str,
        value: String,
    },

    #[error("{op}: unsupported input: {message}")]
    UnsupportedInput {
        op: &'static str,
        message: Cow<'static, str>,
    },

    #[error("{op}: required input {position} is missing")]
    MissingInput { op: &'static str, position: usize },

    #[error("{op}: axis {axis} is out of range for rank {rank}")]
    AxisOutOfRange {
        op: &'static str,
        axis: i64,
        rank: usize,
    },

    #[error("{op}: index {index} is out of range for axis of size {size}")]
    IndexOutOfRange {
        op: &'static str,
        index: i64,
        size: usize,
    },

    #[error("{op}: {message}")]
    InvalidInput {
        op: &'static str,
        message: Cow<'static, str>,
    },

    #[error("{op}: invalid input shape {dims}: {message}")]
    InvalidInputShape {
        op: &'static str,
        dims: FixedDimensions,
        message: Cow<'static, str>,
    },

    #[error("{op}: input element types differ: {a:?} and {b:?}")]
    TypeMismatch {
        op: &'static str,
        a: TensorElemType,
        b: TensorElemType,
    },

    #[error(transparent)]
    Broadcast(#[from] BroadcastError),

    #[error(transparent)]
    Tensor(#[from] TensorError),
}

impl OpError {
    pub fn invalid_input(op: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidInput {
            op,
            message: message.into(),
        }
    }

    pub fn invalid_shape(
        op: &'static str,
        dims: &FixedDimensions,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidInputShape {
            op,
            dims: dims.clone(),
            message: message.into(),
        }
    }

    pub fn unsupported_attr(op: &'static str, name: &'static str, value: impl ToString) -> Self {
        Self::UnsupportedAttribute {
            op,
            name,
            value: value.to_string(),
        }
    }
}

/// Resolves a possibly negative `axis` against `rank`.
pub fn normalize_axis(op: &'static str, axis: i64, rank: usize) -> Result<usize, OpError> {
    let r = rank as i64;
    if axis < -r || axis >= r {
        return Err(OpError::AxisOutOfRange { op, axis, rank });
    }
    let axis = if axis < 0 { axis + r } else { axis };
    Ok(axis as usize)
}

#[test]
fn normalize_axes() {
    assert_eq!(normalize_axis("Test", -1, 3), Ok(2));
    assert_eq!(normalize_axis("Test", 0, 3), Ok(0));
    assert_eq!(
        normalize_axis("Test", 3, 3),
        Err(OpError::AxisOutOfRange {
            op: "Test",
            axis: 3,
            rank: 3
        })
    );
    assert!(normalize_axis("Test", -4, 3).is_err());
    assert!(normalize_axis("Test", 0, 0).is_err());
}

#[test]
fn input_count_messages() {
    let fixed = OpError::InvalidInputCount {
        op: "Add",
        expected: 2,
        actual: 3,
    };
    assert_eq!(fixed.to_string(), "Add: expected 2 inputs but got 3");
    let ranged = OpError::InvalidInputCountRange {
        op: "Conv",
        min: 2,
        max: 3,
        actual: 1,
    };
    assert_eq!(
        ranged.to_string(),
        "Conv: expected between 2 and 3 inputs but got 1"
    );
}
