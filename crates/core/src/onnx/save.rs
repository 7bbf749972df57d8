use std::{fs, io, path::Path};

use prost::Message;

use crate::{
    dim::Dimension as Dim,
    graph::ValueInfo,
    model::Model,
    node::{Attribute, AttributeValue},
    tensor::{Tensor, TensorData},
};

use super::proto::{
    attribute_proto::AttributeType,
    tensor_shape_proto::{dimension::Value as DimValue, Dimension},
    type_proto::{self, Value::TensorType},
    AttributeProto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto, TensorProto,
    TensorShapeProto, TypeProto, ValueInfoProto,
};

pub fn save_onnx(model: &Model, path: impl AsRef<Path>) -> io::Result<()> {
    fs::write(path, encode_onnx(model))
}

/// Serializes `model`. Tensors are written as little-endian `raw_data`.
pub fn encode_onnx(model: &Model) -> Vec<u8> {
    fn opset_to_ir_version(opset: i64) -> i64 {
        match opset {
            i64::MIN..=8 => 3,
            9 => 4,
            10 => 5,
            11 => 6,
            12..=14 => 7,
            15..=18 => 8,
            _ => 9,
        }
    }

    let model_proto = ModelProto {
        ir_version: Some(opset_to_ir_version(model.opset_version)),
        producer_name: Some(env!("CARGO_PKG_NAME").to_string()),
        graph: Some(encode_graph(model)),
        opset_import: vec![OperatorSetIdProto {
            domain: Some(String::new()),
            version: Some(model.opset_version),
        }],
        ..Default::default()
    };
    model_proto.encode_to_vec()
}

fn encode_graph(model: &Model) -> GraphProto {
    let graph = &model.graph;
    let mut graph_proto = GraphProto {
        name: Some("main".to_string()),
        ..Default::default()
    };

    graph_proto.input = graph.inputs.iter().map(encode_value_info).collect();
    graph_proto.output = graph.outputs.iter().map(encode_value_info).collect();

    // Sorted so that encoding is deterministic.
    let mut inits: Vec<_> = graph.inits.iter().collect();
    inits.sort_by(|a, b| a.0.cmp(b.0));
    graph_proto.initializer = inits
        .into_iter()
        .map(|(name, tensor)| encode_tensor(name, tensor))
        .collect();

    for (_, node) in graph.nodes.iter() {
        graph_proto.node.push(NodeProto {
            input: node.inputs.clone(),
            output: node.outputs.clone(),
            name: node.name.clone(),
            op_type: Some(node.op_type.clone()),
            attribute: node.attributes.iter().map(encode_attribute).collect(),
            ..Default::default()
        });
    }

    graph_proto
}

fn encode_value_info(val: &ValueInfo) -> ValueInfoProto {
    let tensor_type = match &val.shape {
        Some(shape) => type_proto::Tensor {
            elem_type: Some(shape.elem_ty.onnx_data_type()),
            shape: Some(TensorShapeProto {
                dim: shape
                    .dims
                    .as_slice()
                    .iter()
                    .map(|d| Dimension {
                        denotation: None,
                        value: Some(match d {
                            Dim::Fixed(d) => DimValue::DimValue(*d as i64),
                            Dim::Dynamic(d) => DimValue::DimParam(d.clone()),
                        }),
                    })
                    .collect(),
            }),
        },
        None => type_proto::Tensor {
            elem_type: None,
            shape: None,
        },
    };

    ValueInfoProto {
        name: Some(val.name.clone()),
        r#type: Some(TypeProto {
            denotation: None,
            value: Some(TensorType(tensor_type)),
        }),
        doc_string: None,
    }
}

fn encode_attribute(attr: &Attribute) -> AttributeProto {
    let mut proto = AttributeProto {
        name: Some(attr.name.clone()),
        ..Default::default()
    };
    let ty = match &attr.value {
        AttributeValue::Float(f) => {
            proto.f = Some(*f);
            AttributeType::Float
        }
        AttributeValue::Int(i) => {
            proto.i = Some(*i);
            AttributeType::Int
        }
        AttributeValue::String(s) => {
            proto.s = Some(s.as_bytes().to_vec());
            AttributeType::String
        }
        AttributeValue::Tensor(t) => {
            proto.t = Some(encode_tensor("", t));
            AttributeType::Tensor
        }
        AttributeValue::Floats(floats) => {
            proto.floats = floats.clone();
            AttributeType::Floats
        }
        AttributeValue::Ints(ints) => {
            proto.ints = ints.clone();
            AttributeType::Ints
        }
        AttributeValue::Strings(ss) => {
            proto.strings = ss.iter().map(|s| s.as_bytes().to_vec()).collect();
            AttributeType::Strings
        }
        AttributeValue::Tensors(ts) => {
            proto.tensors = ts.iter().map(|t| encode_tensor("", t)).collect();
            AttributeType::Tensors
        }
    };
    proto.r#type = Some(ty as i32);
    proto
}

fn encode_tensor(name: &str, tensor: &Tensor) -> TensorProto {
    fn le<T, const N: usize>(data: &[T], f: impl Fn(T) -> [u8; N]) -> Vec<u8>
    where
        T: Copy,
    {
        data.iter().flat_map(|&x| f(x)).collect()
    }

    let raw = match tensor.data() {
        TensorData::Bool(v) => v.iter().map(|&b| b as u8).collect(),
        TensorData::I8(v) => le(v, i8::to_le_bytes),
        TensorData::I16(v) => le(v, i16::to_le_bytes),
        TensorData::I32(v) => le(v, i32::to_le_bytes),
        TensorData::I64(v) => le(v, i64::to_le_bytes),
        TensorData::U8(v) => v.clone(),
        TensorData::U16(v) => le(v, u16::to_le_bytes),
        TensorData::U32(v) => le(v, u32::to_le_bytes),
        TensorData::U64(v) => le(v, u64::to_le_bytes),
        TensorData::F32(v) => le(v, f32::to_le_bytes),
        TensorData::F64(v) => le(v, f64::to_le_bytes),
    };

    TensorProto {
        dims: tensor.dims().to_i64_vec(),
        data_type: Some(tensor.elem_ty().onnx_data_type()),
        name: (!name.is_empty()).then(|| name.to_string()),
        raw_data: Some(raw),
        ..Default::default()
    }
}

#[test]
fn save_and_reload() {
    use crate::{
        dim::Dimensions,
        node::Node,
        tensor::{TensorElemType, TypedShape},
    };

    let mut model = Model {
        opset_version: 13,
        ..Default::default()
    };
    model.graph.add_input(
        "x",
        TypedShape::new(
            Dimensions(vec![Dim::Dynamic("N".into()), Dim::Fixed(4)]),
            TensorElemType::F32,
        ),
    );
    model.graph.add_output("y", None);
    model.graph.add_init(
        "shape",
        Tensor::new(vec![2].into(), vec![-1i64, 2]),
    );
    model.graph.add_init("mask", Tensor::new(vec![2].into(), vec![true, false]));
    model.graph.add_node(
        Node::new("Reshape")
            .with_name(Some("reshape".to_string()))
            .with_ins(["x", "shape"])
            .with_out("r"),
    );
    model.graph.add_node(
        Node::new("Softmax")
            .with_in("r")
            .with_out("y")
            .with_attr("axis", AttributeValue::Int(-1)),
    );

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.onnx");
    save_onnx(&model, &path).unwrap();

    let loaded = crate::onnx::load::load_onnx(&path).unwrap();
    assert_eq!(loaded.opset_version, 13);
    assert_eq!(loaded.input_shape("x"), model.input_shape("x"));
    assert_eq!(loaded.output_names(), vec!["y"]);
    assert_eq!(loaded.param("shape"), model.param("shape"));
    assert_eq!(loaded.param("mask"), model.param("mask"));
    let nodes: Vec<_> = loaded.graph.nodes.iter().map(|(_, n)| n.clone()).collect();
    let expected: Vec<_> = model.graph.nodes.iter().map(|(_, n)| n.clone()).collect();
    assert_eq!(nodes, expected);

    assert_eq!(encode_onnx(&model), encode_onnx(&loaded));
}
