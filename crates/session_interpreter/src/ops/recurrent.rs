//! Pieces shared by `GRU`, `RNN` and `LSTM`.
//!
//! Only the forward direction of a single layer is supported. Weights arrive
//! with a leading `num_directions` axis, which must be 1, and gate blocks
//! stacked along the row axis.

use ndarray::{
    s, Array, Array1, Array2, Array3, Array4, ArrayView1, ArrayView2, Axis, Dimension, Ix2, Ix3,
};
use tessera_core::{
    node::Attribute,
    op_error::OpError,
    tensor::{FloatElem, Tensor, TensorElemType},
};

use crate::operator::{required, same_type, FLOAT_TYPES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Sigmoid,
    Tanh,
    Relu,
    Softsign,
    Softplus,
}

impl Activation {
    /// Activation names are matched case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "sigmoid" => Self::Sigmoid,
            "tanh" => Self::Tanh,
            "relu" => Self::Relu,
            "softsign" => Self::Softsign,
            "softplus" => Self::Softplus,
            _ => return None,
        })
    }

    pub fn apply<T: FloatElem>(self, x: T) -> T {
        match self {
            Self::Sigmoid => T::one() / (T::one() + (-x).exp()),
            Self::Tanh => x.tanh(),
            Self::Relu => x.max(T::zero()),
            Self::Softsign => x / (T::one() + x.abs()),
            Self::Softplus => (T::one() + x.exp()).ln(),
        }
    }
}

/// Attributes common to every recurrent operator.
#[derive(Debug, Default)]
pub struct RecurrentAttrs {
    pub activations: Option<Vec<Activation>>,
    pub hidden_size: Option<usize>,
}

impl RecurrentAttrs {
    /// Consumes `attr` if it is a shared recurrent attribute. Returns `false` for
    /// anything else so the caller can handle its own attributes.
    pub fn parse(&mut self, op: &'static str, attr: &Attribute) -> Result<bool, OpError> {
        match attr.name.as_str() {
            "activations" => {
                let activations = attr
                    .strings()?
                    .iter()
                    .map(|name| {
                        Activation::from_name(name)
                            .ok_or_else(|| OpError::unsupported_attr(op, "activations", name))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                self.activations = Some(activations);
            }
            "direction" => {
                let direction = attr.string()?;
                if direction != "forward" {
                    return Err(OpError::unsupported_attr(op, "direction", direction));
                }
            }
            "hidden_size" => {
                let hidden_size = attr.int()?;
                if hidden_size <= 0 {
                    return Err(OpError::unsupported_attr(op, "hidden_size", hidden_size));
                }
                self.hidden_size = Some(hidden_size as usize);
            }
            "clip" => return Err(OpError::unsupported_attr(op, "clip", attr.float()?)),
            // None of the supported activations is parameterised.
            "activation_alpha" | "activation_beta" => {
                attr.floats()?;
            }
            "layout" => {
                let layout = attr.int()?;
                if layout != 0 {
                    return Err(OpError::unsupported_attr(op, "layout", layout));
                }
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Returns the configured activations, or `defaults` when none were given.
    pub fn activations<const N: usize>(
        &self,
        op: &'static str,
        defaults: [Activation; N],
    ) -> Result<[Activation; N], OpError> {
        let Some(activations) = &self.activations else {
            return Ok(defaults);
        };
        <[Activation; N]>::try_from(activations.as_slice()).map_err(|_| {
            OpError::unsupported_attr(op, "activations", format!("{activations:?}"))
        })
    }
}

/// Input types shared by all three operators, in ONNX input order:
/// `X, W, R, B, sequence_lens, initial_h`.
pub const INPUT_TYPES: [&[TensorElemType]; 6] = [
    FLOAT_TYPES,
    FLOAT_TYPES,
    FLOAT_TYPES,
    FLOAT_TYPES,
    &[TensorElemType::I32],
    FLOAT_TYPES,
];

/// Inputs with the direction axis stripped and optional ones defaulted.
#[derive(Debug)]
pub struct Prepared<T> {
    /// `[seq_length, batch_size, input_size]`
    pub x: Array3<T>,
    /// `[gates * hidden_size, input_size]`
    pub w: Array2<T>,
    /// `[gates * hidden_size, hidden_size]`
    pub r: Array2<T>,
    pub wb: Array1<T>,
    pub rb: Array1<T>,
    /// `[batch_size, hidden_size]`
    pub h0: Array2<T>,
    pub hidden_size: usize,
}

impl<T: FloatElem> Prepared<T> {
    pub fn seq_length(&self) -> usize {
        self.x.len_of(Axis(0))
    }

    pub fn batch_size(&self) -> usize {
        self.x.len_of(Axis(1))
    }

    /// Rows `[gate * hidden_size, (gate + 1) * hidden_size)` of the recurrence weights.
    pub fn r_gate(&self, gate: usize) -> ArrayView2<'_, T> {
        let h = self.hidden_size;
        self.r.slice(s![gate * h..(gate + 1) * h, ..])
    }

    pub fn rb_gate(&self, gate: usize) -> ArrayView1<'_, T> {
        let h = self.hidden_size;
        self.rb.slice(s![gate * h..(gate + 1) * h])
    }
}

pub fn to_array<T: FloatElem, D: Dimension>(
    op: &'static str,
    tensor: &Tensor,
) -> Result<Array<T, D>, OpError> {
    let view = tensor.view::<T>()?;
    view.into_dimensionality::<D>()
        .map(|v| v.to_owned())
        .map_err(|_| {
            OpError::invalid_shape(
                op,
                tensor.dims(),
                format!("expected rank {}", D::NDIM.unwrap_or(0)),
            )
        })
}

/// Validates shapes and strips the `num_directions` axis. `gates` is the number
/// of stacked gate blocks in `W` and `R`.
pub fn prepare<T: FloatElem>(
    op: &'static str,
    attrs: &RecurrentAttrs,
    inputs: &[Option<Tensor>],
    gates: usize,
) -> Result<Prepared<T>, OpError> {
    let x_tensor = required(op, inputs, 0)?;
    let w = required(op, inputs, 1)?;
    let r = required(op, inputs, 2)?;
    same_type(op, x_tensor, w)?;
    same_type(op, x_tensor, r)?;

    if inputs.get(4).and_then(Option::as_ref).is_some() {
        return Err(OpError::UnsupportedInput {
            op,
            message: "sequence_lens is not supported".into(),
        });
    }

    let x = to_array::<T, Ix3>(op, x_tensor)?;
    let w3 = to_array::<T, Ix3>(op, w)?;
    let r3 = to_array::<T, Ix3>(op, r)?;
    if w3.len_of(Axis(0)) != 1 || r3.len_of(Axis(0)) != 1 {
        return Err(OpError::UnsupportedInput {
            op,
            message: "only a single (forward) direction is supported".into(),
        });
    }

    let (_, batch_size, input_size) = x.dim();
    let hidden_size = r3.len_of(Axis(2));
    if let Some(declared) = attrs.hidden_size {
        if declared != hidden_size {
            return Err(OpError::invalid_input(
                op,
                format!("hidden_size is {declared} but R implies {hidden_size}"),
            ));
        }
    }
    if w3.dim() != (1, gates * hidden_size, input_size) {
        return Err(OpError::invalid_shape(
            op,
            w.dims(),
            format!("expected W of shape [1, {}, {input_size}]", gates * hidden_size),
        ));
    }
    if r3.dim() != (1, gates * hidden_size, hidden_size) {
        return Err(OpError::invalid_shape(
            op,
            r.dims(),
            format!("expected R of shape [1, {}, {hidden_size}]", gates * hidden_size),
        ));
    }

    let (wb, rb) = match inputs.get(3).and_then(Option::as_ref) {
        Some(b) => {
            same_type(op, x_tensor, b)?;
            let b2 = to_array::<T, Ix2>(op, b)?;
            if b2.dim() != (1, 2 * gates * hidden_size) {
                return Err(OpError::invalid_shape(
                    op,
                    b.dims(),
                    format!("expected B of shape [1, {}]", 2 * gates * hidden_size),
                ));
            }
            let b1 = b2.index_axis_move(Axis(0), 0);
            let n = gates * hidden_size;
            (b1.slice(s![..n]).to_owned(), b1.slice(s![n..]).to_owned())
        }
        None => (
            Array1::zeros(gates * hidden_size),
            Array1::zeros(gates * hidden_size),
        ),
    };

    let h0 = initial_state::<T>(op, inputs.get(5), "initial_h", batch_size, hidden_size)?;

    Ok(Prepared {
        x,
        w: w3.index_axis_move(Axis(0), 0),
        r: r3.index_axis_move(Axis(0), 0),
        wb,
        rb,
        h0,
        hidden_size,
    })
}

/// Reads an optional `[1, batch_size, hidden_size]` state, defaulting to zeros.
pub fn initial_state<T: FloatElem>(
    op: &'static str,
    input: Option<&Option<Tensor>>,
    name: &str,
    batch_size: usize,
    hidden_size: usize,
) -> Result<Array2<T>, OpError> {
    let Some(state) = input.and_then(Option::as_ref) else {
        return Ok(Array2::zeros((batch_size, hidden_size)));
    };
    let state3 = to_array::<T, Ix3>(op, state)?;
    if state3.dim() != (1, batch_size, hidden_size) {
        return Err(OpError::invalid_shape(
            op,
            state.dims(),
            format!("expected {name} of shape [1, {batch_size}, {hidden_size}]"),
        ));
    }
    Ok(state3.index_axis_move(Axis(0), 0))
}

/// Reads an optional 1-D vector of `len` elements, defaulting to zeros.
pub fn optional_vector<T: FloatElem>(
    op: &'static str,
    input: Option<&Option<Tensor>>,
    len: usize,
) -> Result<Array1<T>, OpError> {
    let Some(t) = input.and_then(Option::as_ref) else {
        return Ok(Array1::zeros(len));
    };
    let v = to_array::<T, Ix2>(op, t)?;
    if v.dim() != (1, len) {
        return Err(OpError::invalid_shape(
            op,
            t.dims(),
            format!("expected shape [1, {len}]"),
        ));
    }
    Ok(v.index_axis_move(Axis(0), 0))
}

/// Collects per-step hidden states into `Y` (`[seq_length, 1, batch_size, hidden_size]`).
pub struct Sequence<T> {
    y: Array4<T>,
}

impl<T: FloatElem> Sequence<T> {
    pub fn new(seq_length: usize, batch_size: usize, hidden_size: usize) -> Self {
        Self {
            y: Array4::zeros((seq_length, 1, batch_size, hidden_size)),
        }
    }

    pub fn record(&mut self, t: usize, h: &Array2<T>) {
        self.y.slice_mut(s![t, 0, .., ..]).assign(h);
    }

    pub fn into_tensor(self) -> Tensor {
        Tensor::from_array(self.y.into_dyn())
    }
}

/// Final state with the `num_directions` axis restored.
pub fn state_tensor<T: FloatElem>(state: Array2<T>) -> Tensor {
    Tensor::from_array(state.insert_axis(Axis(0)).into_dyn())
}

/// `xs · wᵀ + b` for one gate block.
pub fn affine<T: FloatElem>(
    xs: &ArrayView2<'_, T>,
    w: &ArrayView2<'_, T>,
    b: &ArrayView1<'_, T>,
) -> Array2<T> {
    let mut out = xs.dot(&w.t());
    out += b;
    out
}

#[test]
fn activation_names_are_case_insensitive() {
    assert_eq!(Activation::from_name("Sigmoid"), Some(Activation::Sigmoid));
    assert_eq!(Activation::from_name("TANH"), Some(Activation::Tanh));
    assert_eq!(Activation::from_name("relu"), Some(Activation::Relu));
    assert_eq!(Activation::from_name("HardSigmoid"), None);
}

#[test]
fn activation_values() {
    assert!((Activation::Sigmoid.apply(0.0f32) - 0.5).abs() < 1e-7);
    assert!((Activation::Tanh.apply(1.0f64) - 1.0f64.tanh()).abs() < 1e-12);
    assert_eq!(Activation::Relu.apply(-3.0f32), 0.0);
    assert_eq!(Activation::Softsign.apply(1.0f32), 0.5);
    assert!((Activation::Softplus.apply(0.0f64) - 2.0f64.ln()).abs() < 1e-12);
}

#[test]
fn non_forward_direction_is_rejected() {
    use tessera_core::node::AttributeValue;

    let mut attrs = RecurrentAttrs::default();
    let attr = Attribute::new("direction", AttributeValue::String("reverse".into()));
    assert_eq!(
        attrs.parse("GRU", &attr),
        Err(OpError::UnsupportedAttribute {
            op: "GRU",
            name: "direction",
            value: "reverse".into()
        })
    );
    let attr = Attribute::new("linear_before_reset", AttributeValue::Int(1));
    assert_eq!(attrs.parse("GRU", &attr), Ok(false));
}

#[test]
fn activation_count_must_match() {
    let attrs = RecurrentAttrs {
        activations: Some(vec![Activation::Sigmoid]),
        hidden_size: None,
    };
    assert!(attrs
        .activations("GRU", [Activation::Sigmoid, Activation::Tanh])
        .is_err());
    assert_eq!(
        attrs.activations("RNN", [Activation::Tanh]),
        Ok([Activation::Sigmoid])
    );
}
