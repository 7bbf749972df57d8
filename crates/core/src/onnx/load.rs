use log::{debug, warn};
use prost::{DecodeError, Message};
use std::{
    fs,
    io::{self, Read},
    path::Path,
};
use thiserror::Error;

use crate::{
    dim::{Dimension, Dimensions},
    fixed_dim::FixedDimensions,
    graph::ValueInfo,
    model::Model,
    node::{Attribute, AttributeValue, Node},
    tensor::{Tensor, TensorElemType, TypedShape},
};

use super::proto::{
    attribute_proto::AttributeType,
    tensor_shape_proto::dimension::Value::{DimParam, DimValue},
    type_proto::Value::TensorType,
    AttributeProto, ModelProto, TensorProto, ValueInfoProto,
};

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("Model does not contain any graph")]
    NoGraph,

    #[error("Model is invalid: {0}")]
    InvalidModel(DecodeError),

    #[error("Model does not import the default ONNX opset")]
    NoOpset,

    #[error("Type of value '{0}' is not specified")]
    NoValueType(String),

    #[error("Unsupported tensor data type {ty} for '{name}'")]
    UnsupportedDataType { name: String, ty: i32 },

    #[error("Tensor '{name}' is invalid: {message}")]
    InvalidTensor { name: String, message: String },

    #[error("Attribute '{name}' has unsupported type {ty:?}")]
    UnsupportedAttributeType { name: String, ty: AttributeType },
}

pub fn load_onnx(path: impl AsRef<Path>) -> Result<Model, ModelLoadError> {
    let model_proto = load_onnx_model_proto(path)?;
    load_onnx_from_model_proto(model_proto)
}

pub fn load_onnx_from_buffer(buf: &[u8]) -> Result<Model, ModelLoadError> {
    let model = ModelProto::decode(buf).map_err(ModelLoadError::InvalidModel)?;
    load_onnx_from_model_proto(model)
}

/// Reads the whole stream before decoding; protobuf messages are not self-delimiting.
pub fn load_onnx_from_reader(mut reader: impl Read) -> Result<Model, ModelLoadError> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    load_onnx_from_buffer(&buf)
}

pub fn load_onnx_model_proto(path: impl AsRef<Path>) -> Result<ModelProto, ModelLoadError> {
    ModelProto::decode(&*fs::read(path)?).map_err(ModelLoadError::InvalidModel)
}

pub fn load_onnx_from_model_proto(model_proto: ModelProto) -> Result<Model, ModelLoadError> {
    let mut opset_version = None;
    for opset_import in &model_proto.opset_import {
        match opset_import.domain() {
            "" | "ai.onnx" => {
                opset_version = opset_version.max(Some(opset_import.version()));
            }
            domain => warn!(
                "Ignoring opset import for domain '{domain}' (version {})",
                opset_import.version()
            ),
        }
    }

    let graph = model_proto.graph.ok_or(ModelLoadError::NoGraph)?;
    let mut model = Model {
        opset_version: opset_version.ok_or(ModelLoadError::NoOpset)?,
        ..Default::default()
    };

    // Load initializers.
    for init in graph.initializer.iter() {
        let tensor = get_tensor(init)?;
        model.graph.add_init(init.name(), tensor);
    }

    // Load inputs and outputs.
    for (vals, vec) in [
        (&graph.input, &mut model.graph.inputs),
        (&graph.output, &mut model.graph.outputs),
    ] {
        for x in vals {
            vec.push(get_value_info(x)?);
        }
    }

    // Remove initializers from inputs if needed.
    model
        .graph
        .inputs
        .retain(|x| !model.graph.inits.contains_key(&x.name));

    // Load nodes.
    for node in graph.node.iter() {
        let attributes = node
            .attribute
            .iter()
            .map(get_attribute)
            .collect::<Result<Vec<_>, _>>()?;
        model.graph.add_node(Node {
            op_type: node.op_type().to_string(),
            name: node.name.clone(),
            inputs: node.input.clone(),
            outputs: node.output.clone(),
            attributes,
        });
    }

    debug!(
        "Loaded model: opset {}, {} nodes, {} inputs, {} outputs, {} initializers",
        model.opset_version,
        model.graph.nodes.len(),
        model.graph.inputs.len(),
        model.graph.outputs.len(),
        model.graph.inits.len()
    );

    Ok(model)
}

fn get_value_info(x: &ValueInfoProto) -> Result<ValueInfo, ModelLoadError> {
    let Some(TensorType(tensor)) = x.r#type.as_ref().and_then(|t| t.value.as_ref()) else {
        return Err(ModelLoadError::NoValueType(x.name().to_string()));
    };

    // Without a shape the rank is unknown, so nothing can be checked at run time.
    let Some(shape) = tensor.shape.as_ref() else {
        return Ok(ValueInfo::new(x.name(), None));
    };

    let dims: Vec<Dimension> = shape
        .dim
        .iter()
        .map(|d| match d.value.as_ref() {
            Some(DimValue(i)) if *i >= 0 => Dimension::Fixed(*i as usize),
            Some(DimParam(s)) => Dimension::Dynamic(s.clone()),
            _ => Dimension::Dynamic(String::new()),
        })
        .collect();
    let elem_ty = TensorElemType::from_onnx_data_type(tensor.elem_type()).ok_or_else(|| {
        ModelLoadError::UnsupportedDataType {
            name: x.name().to_string(),
            ty: tensor.elem_type(),
        }
    })?;

    Ok(ValueInfo::new(
        x.name(),
        TypedShape::new(Dimensions(dims), elem_ty),
    ))
}

fn get_attribute(attr: &AttributeProto) -> Result<Attribute, ModelLoadError> {
    let ty = match attr.r#type() {
        AttributeType::Undefined => infer_attribute_type(attr),
        ty => ty,
    };
    let value = match ty {
        AttributeType::Float => AttributeValue::Float(attr.f()),
        AttributeType::Int => AttributeValue::Int(attr.i()),
        AttributeType::String => {
            AttributeValue::String(String::from_utf8_lossy(attr.s()).into_owned())
        }
        AttributeType::Tensor => match attr.t.as_ref() {
            Some(t) => AttributeValue::Tensor(get_tensor(t)?),
            None => {
                return Err(ModelLoadError::InvalidTensor {
                    name: attr.name().to_string(),
                    message: "tensor attribute has no value".into(),
                })
            }
        },
        AttributeType::Floats => AttributeValue::Floats(attr.floats.clone()),
        AttributeType::Ints => AttributeValue::Ints(attr.ints.clone()),
        AttributeType::Strings => AttributeValue::Strings(
            attr.strings
                .iter()
                .map(|s| String::from_utf8_lossy(s).into_owned())
                .collect(),
        ),
        AttributeType::Tensors => AttributeValue::Tensors(
            attr.tensors
                .iter()
                .map(get_tensor)
                .collect::<Result<_, _>>()?,
        ),
        ty => {
            return Err(ModelLoadError::UnsupportedAttributeType {
                name: attr.name().to_string(),
                ty,
            })
        }
    };
    Ok(Attribute::new(attr.name(), value))
}

/// Older exporters leave `type` unset. Pick the populated field instead.
fn infer_attribute_type(attr: &AttributeProto) -> AttributeType {
    if attr.f.is_some() {
        AttributeType::Float
    } else if attr.i.is_some() {
        AttributeType::Int
    } else if attr.s.is_some() {
        AttributeType::String
    } else if attr.t.is_some() {
        AttributeType::Tensor
    } else if !attr.floats.is_empty() {
        AttributeType::Floats
    } else if !attr.ints.is_empty() {
        AttributeType::Ints
    } else if !attr.strings.is_empty() {
        AttributeType::Strings
    } else if !attr.tensors.is_empty() {
        AttributeType::Tensors
    } else {
        AttributeType::Undefined
    }
}

pub(crate) fn get_tensor(tensor: &TensorProto) -> Result<Tensor, ModelLoadError> {
    let invalid = |message: String| ModelLoadError::InvalidTensor {
        name: tensor.name().to_string(),
        message,
    };

    if let Some(&d) = tensor.dims.iter().find(|&&d| d < 0) {
        return Err(invalid(format!("negative dimension {d}")));
    }
    let dims = FixedDimensions::from_i64(&tensor.dims);
    let elem_ty = TensorElemType::from_onnx_data_type(tensor.data_type()).ok_or_else(|| {
        ModelLoadError::UnsupportedDataType {
            name: tensor.name().to_string(),
            ty: tensor.data_type(),
        }
    })?;
    let raw = tensor.raw_data();

    let tensor = if raw.is_empty() {
        match elem_ty {
            TensorElemType::F32 => Tensor::try_new(dims, tensor.float_data.clone()),
            TensorElemType::F64 => Tensor::try_new(dims, tensor.double_data.clone()),
            TensorElemType::I64 => Tensor::try_new(dims, tensor.int64_data.clone()),
            TensorElemType::I32 => Tensor::try_new(dims, tensor.int32_data.clone()),
            TensorElemType::I16 => Tensor::try_new(dims, narrow(&tensor.int32_data, |x| x as i16)),
            TensorElemType::I8 => Tensor::try_new(dims, narrow(&tensor.int32_data, |x| x as i8)),
            TensorElemType::U16 => Tensor::try_new(dims, narrow(&tensor.int32_data, |x| x as u16)),
            TensorElemType::U8 => Tensor::try_new(dims, narrow(&tensor.int32_data, |x| x as u8)),
            TensorElemType::Bool => Tensor::try_new(dims, narrow(&tensor.int32_data, |x| x != 0)),
            TensorElemType::U64 => Tensor::try_new(dims, tensor.uint64_data.clone()),
            TensorElemType::U32 => {
                Tensor::try_new(dims, narrow(&tensor.uint64_data, |x| x as u32))
            }
        }
    } else {
        match elem_ty {
            TensorElemType::F32 => Tensor::try_new(dims, decode_raw(raw, f32::from_le_bytes)),
            TensorElemType::F64 => Tensor::try_new(dims, decode_raw(raw, f64::from_le_bytes)),
            TensorElemType::I64 => Tensor::try_new(dims, decode_raw(raw, i64::from_le_bytes)),
            TensorElemType::I32 => Tensor::try_new(dims, decode_raw(raw, i32::from_le_bytes)),
            TensorElemType::I16 => Tensor::try_new(dims, decode_raw(raw, i16::from_le_bytes)),
            TensorElemType::I8 => Tensor::try_new(dims, decode_raw(raw, i8::from_le_bytes)),
            TensorElemType::U64 => Tensor::try_new(dims, decode_raw(raw, u64::from_le_bytes)),
            TensorElemType::U32 => Tensor::try_new(dims, decode_raw(raw, u32::from_le_bytes)),
            TensorElemType::U16 => Tensor::try_new(dims, decode_raw(raw, u16::from_le_bytes)),
            TensorElemType::U8 => Tensor::try_new(dims, raw.to_vec()),
            TensorElemType::Bool => Tensor::try_new(dims, raw.iter().map(|&b| b != 0).collect()),
        }
    };

    tensor.map_err(|e| invalid(e.to_string()))
}

fn narrow<S: Copy, T>(data: &[S], f: impl Fn(S) -> T) -> Vec<T> {
    data.iter().map(|&x| f(x)).collect()
}

fn decode_raw<T, const N: usize>(raw: &[u8], f: impl Fn([u8; N]) -> T) -> Vec<T> {
    raw.chunks_exact(N)
        .map(|c| {
            let mut bytes = [0u8; N];
            bytes.copy_from_slice(c);
            f(bytes)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onnx::proto::{
        tensor_shape_proto, type_proto, GraphProto, NodeProto, OperatorSetIdProto,
        TensorShapeProto, TypeProto,
    };

    fn value_info(name: &str, dims: &[Option<i64>]) -> ValueInfoProto {
        ValueInfoProto {
            name: Some(name.into()),
            r#type: Some(TypeProto {
                denotation: None,
                value: Some(TensorType(type_proto::Tensor {
                    elem_type: Some(1),
                    shape: Some(TensorShapeProto {
                        dim: dims
                            .iter()
                            .map(|d| tensor_shape_proto::Dimension {
                                denotation: None,
                                value: Some(match d {
                                    Some(v) => DimValue(*v),
                                    None => DimParam("N".into()),
                                }),
                            })
                            .collect(),
                    }),
                })),
            }),
            doc_string: None,
        }
    }

    fn opset(domain: &str, version: i64) -> OperatorSetIdProto {
        OperatorSetIdProto {
            domain: Some(domain.into()),
            version: Some(version),
        }
    }

    fn model_proto() -> ModelProto {
        ModelProto {
            ir_version: Some(7),
            opset_import: vec![opset("", 11), opset("ai.onnx.ml", 2), opset("ai.onnx", 13)],
            graph: Some(GraphProto {
                node: vec![NodeProto {
                    input: vec!["x".into(), "w".into()],
                    output: vec!["y".into()],
                    op_type: Some("MatMul".into()),
                    ..Default::default()
                }],
                initializer: vec![TensorProto {
                    name: Some("w".into()),
                    dims: vec![3, 2],
                    data_type: Some(1),
                    raw_data: Some(
                        [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]
                            .iter()
                            .flat_map(|x| x.to_le_bytes())
                            .collect(),
                    ),
                    ..Default::default()
                }],
                input: vec![value_info("x", &[None, Some(3)]), value_info("w", &[Some(3), Some(2)])],
                output: vec![value_info("y", &[None, Some(2)])],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn load_minimal_model() {
        let model = load_onnx_from_model_proto(model_proto()).unwrap();
        assert_eq!(model.opset_version, 13);
        assert_eq!(model.input_names(), vec!["x"]);
        assert_eq!(model.output_names(), vec!["y"]);
        assert_eq!(model.param_names(), vec!["w"]);
        assert!(model.param("w").unwrap().allclose(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]));
        assert_eq!(
            model.input_shape("x").unwrap().dims.to_string(),
            "[N, 3]"
        );
        let (_, node) = model.graph.nodes.iter().next().unwrap();
        assert_eq!(node.op_type, "MatMul");
        assert_eq!(node.inputs, vec!["x", "w"]);
    }

    #[test]
    fn load_from_bytes_and_reader() {
        let buf = model_proto().encode_to_vec();
        let a = load_onnx_from_buffer(&buf).unwrap();
        let b = load_onnx_from_reader(io::Cursor::new(buf)).unwrap();
        assert_eq!(a.opset_version, b.opset_version);
        assert_eq!(a.param("w"), b.param("w"));
    }

    #[test]
    fn missing_default_opset() {
        let mut proto = model_proto();
        proto.opset_import = vec![opset("com.microsoft", 1)];
        assert!(matches!(
            load_onnx_from_model_proto(proto),
            Err(ModelLoadError::NoOpset)
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            load_onnx_from_buffer(&[0xff, 0xff, 0xff]),
            Err(ModelLoadError::InvalidModel(_))
        ));
    }

    #[test]
    fn typed_tensor_fields() {
        let t = TensorProto {
            dims: vec![2],
            data_type: Some(7),
            int64_data: vec![-1, 5],
            ..Default::default()
        };
        assert_eq!(get_tensor(&t).unwrap().as_slice::<i64>().unwrap(), &[-1, 5]);

        let t = TensorProto {
            dims: vec![3],
            data_type: Some(9),
            int32_data: vec![1, 0, 1],
            ..Default::default()
        };
        assert_eq!(
            get_tensor(&t).unwrap().as_slice::<bool>().unwrap(),
            &[true, false, true]
        );

        let t = TensorProto {
            dims: vec![2, 2],
            data_type: Some(1),
            float_data: vec![1.0],
            ..Default::default()
        };
        assert!(matches!(
            get_tensor(&t),
            Err(ModelLoadError::InvalidTensor { .. })
        ));

        let t = TensorProto {
            dims: vec![1],
            data_type: Some(8),
            string_data: vec![b"a".to_vec()],
            ..Default::default()
        };
        assert!(matches!(
            get_tensor(&t),
            Err(ModelLoadError::UnsupportedDataType { ty: 8, .. })
        ));
    }

    #[test]
    fn untyped_attributes_are_inferred() {
        let attr = AttributeProto {
            name: Some("axis".into()),
            i: Some(-1),
            ..Default::default()
        };
        assert_eq!(
            get_attribute(&attr).unwrap(),
            Attribute::new("axis", AttributeValue::Int(-1))
        );
        let attr = AttributeProto {
            name: Some("direction".into()),
            s: Some(b"forward".to_vec()),
            r#type: Some(AttributeType::String as i32),
            ..Default::default()
        };
        assert_eq!(
            get_attribute(&attr).unwrap(),
            Attribute::new("direction", AttributeValue::String("forward".into()))
        );
        let attr = AttributeProto {
            name: Some("body".into()),
            r#type: Some(AttributeType::Graph as i32),
            ..Default::default()
        };
        assert!(get_attribute(&attr).is_err());
    }
}
