use std::sync::OnceLock;

use rustc_hash::FxHashMap;
use tessera_session::SessionError;

use crate::{
    operator::Operator,
    ops::{
        activation::{LeakyRelu, PRelu, Softmax},
        binary::{
            Add, And, Div, Equal, Greater, GreaterOrEqual, Less, LessOrEqual, Mul, Or, Pow, Sub,
            Where, Xor,
        },
        constant::{Cast, Constant, ConstantOfShape},
        conv::Conv,
        gather::Gather,
        gru::Gru,
        lstm::Lstm,
        matmul::{Gemm, MatMul},
        normalization::BatchNormalization,
        reduce::{ReduceMax, ReduceMean, ReduceMin},
        rnn::Rnn,
        shape::{Concat, Expand, Flatten, Identity, Reshape, Shape, Transpose},
        slice::Slice,
        squeeze::{Squeeze, Unsqueeze},
        unary::{
            Abs, Acos, Acosh, Asin, Asinh, Atan, Atanh, Ceil, Cos, Cosh, Exp, Floor, Log, Neg,
            Not, Reciprocal, Relu, Sigmoid, Sin, Sinh, Softsign, Sqrt, Tan, Tanh,
        },
    },
};

/// Creates an unconfigured operator instance.
pub type OperatorCtor = fn() -> Box<dyn Operator>;

/// Operator constructors keyed by ONNX operator type.
pub type Opset = FxHashMap<&'static str, OperatorCtor>;

fn new_op<O: Operator + Default + 'static>() -> Box<dyn Operator> {
    Box::<O>::default()
}

macro_rules! opset {
    ($($op_type:literal => $op:ty),* $(,)?) => {{
        let mut opset = Opset::default();
        $(opset.insert($op_type, new_op::<$op> as OperatorCtor);)*
        opset
    }};
}

fn opset_13() -> Opset {
    opset! {
        "Abs" => Abs,
        "Acos" => Acos,
        "Acosh" => Acosh,
        "Add" => Add,
        "And" => And,
        "Asin" => Asin,
        "Asinh" => Asinh,
        "Atan" => Atan,
        "Atanh" => Atanh,
        "BatchNormalization" => BatchNormalization,
        "Cast" => Cast,
        "Ceil" => Ceil,
        "Concat" => Concat,
        "Constant" => Constant,
        "ConstantOfShape" => ConstantOfShape,
        "Conv" => Conv,
        "Cos" => Cos,
        "Cosh" => Cosh,
        "Div" => Div,
        "Equal" => Equal,
        "Exp" => Exp,
        "Expand" => Expand,
        "Flatten" => Flatten,
        "Floor" => Floor,
        "GRU" => Gru,
        "Gather" => Gather,
        "Gemm" => Gemm,
        "Greater" => Greater,
        "GreaterOrEqual" => GreaterOrEqual,
        "Identity" => Identity,
        "LSTM" => Lstm,
        "LeakyRelu" => LeakyRelu,
        "Less" => Less,
        "LessOrEqual" => LessOrEqual,
        "Log" => Log,
        "MatMul" => MatMul,
        "Mul" => Mul,
        "Neg" => Neg,
        "Not" => Not,
        "Or" => Or,
        "PRelu" => PRelu,
        "Pow" => Pow,
        "RNN" => Rnn,
        "Reciprocal" => Reciprocal,
        "ReduceMax" => ReduceMax,
        "ReduceMean" => ReduceMean,
        "ReduceMin" => ReduceMin,
        "Relu" => Relu,
        "Reshape" => Reshape,
        "Shape" => Shape,
        "Sigmoid" => Sigmoid,
        "Sin" => Sin,
        "Sinh" => Sinh,
        "Slice" => Slice,
        "Softmax" => Softmax,
        "Softsign" => Softsign,
        "Sqrt" => Sqrt,
        "Squeeze" => Squeeze,
        "Sub" => Sub,
        "Tan" => Tan,
        "Tanh" => Tanh,
        "Transpose" => Transpose,
        "Unsqueeze" => Unsqueeze,
        "Where" => Where,
        "Xor" => Xor,
    }
}

fn opsets() -> &'static FxHashMap<i64, Opset> {
    static OPSETS: OnceLock<FxHashMap<i64, Opset>> = OnceLock::new();
    OPSETS.get_or_init(|| {
        let mut opsets = FxHashMap::default();
        opsets.insert(13, opset_13());
        opsets
    })
}

/// Versions with a registered operator table, ascending.
pub fn known_versions() -> Vec<i64> {
    let mut versions: Vec<i64> = opsets().keys().copied().collect();
    versions.sort_unstable();
    versions
}

pub fn resolve_opset(version: i64) -> Result<&'static Opset, SessionError> {
    opsets()
        .get(&version)
        .ok_or_else(|| SessionError::UnsupportedOpset {
            version,
            known: known_versions(),
        })
}

#[test]
fn registered_names_match_operators() {
    let opset = resolve_opset(13).unwrap();
    for (&op_type, ctor) in opset {
        assert_eq!(ctor().name(), op_type);
    }
}

#[test]
fn unknown_version() {
    assert!(matches!(
        resolve_opset(7),
        Err(SessionError::UnsupportedOpset { version: 7, ref known }) if known == &[13]
    ));
}
