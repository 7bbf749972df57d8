use std::{io::Read, path::Path};

use crate::{
    dim::Dimension,
    graph::Graph,
    onnx::load::{load_onnx, load_onnx_from_buffer, load_onnx_from_reader, ModelLoadError},
    tensor::{Tensor, TypedShape},
};

/// A loaded ONNX model: its graph plus the operator set version it was
/// exported against.
#[derive(Debug, Default, Clone)]
pub struct Model {
    pub graph: Graph,
    pub opset_version: i64,
}

impl Model {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ModelLoadError> {
        load_onnx(path)
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, ModelLoadError> {
        load_onnx_from_buffer(buf)
    }

    /// Reads a model from any byte stream, such as an archive member.
    pub fn from_reader(reader: impl Read) -> Result<Self, ModelLoadError> {
        load_onnx_from_reader(reader)
    }

    /// Names of the inputs a caller has to supply.
    pub fn input_names(&self) -> Vec<&str> {
        self.graph.inputs.iter().map(|v| v.name.as_str()).collect()
    }

    pub fn input_shape(&self, name: &str) -> Option<&TypedShape> {
        self.graph
            .inputs
            .iter()
            .find(|v| v.name == name)
            .and_then(|v| v.shape.as_ref())
    }

    /// Size of dimension `index` of input `name`, or `None` if it is unknown or dynamic.
    pub fn input_dim_size(&self, name: &str, index: usize) -> Option<usize> {
        self.input_shape(name)?
            .dims
            .as_slice()
            .get(index)
            .and_then(Dimension::as_fixed)
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.graph.outputs.iter().map(|v| v.name.as_str()).collect()
    }

    pub fn output_shape(&self, name: &str) -> Option<&TypedShape> {
        self.graph
            .outputs
            .iter()
            .find(|v| v.name == name)
            .and_then(|v| v.shape.as_ref())
    }

    /// Names of the preloaded parameters, sorted.
    pub fn param_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.graph.inits.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn param(&self, name: &str) -> Option<&Tensor> {
        self.graph.inits.get(name)
    }
}

#[test]
fn query_declared_io() {
    use crate::{
        dim::Dimensions,
        tensor::TensorElemType,
    };

    let mut model = Model {
        opset_version: 13,
        ..Default::default()
    };
    model.graph.add_input(
        "x",
        TypedShape::new(
            Dimensions(vec![Dimension::Dynamic("N".into()), Dimension::Fixed(3)]),
            TensorElemType::F32,
        ),
    );
    model.graph.add_output("y", None);
    model.graph.add_init("w", Tensor::zeros::<f32>(vec![3, 2].into()));
    model.graph.add_init("b", Tensor::zeros::<f32>(vec![2].into()));

    assert_eq!(model.input_names(), vec!["x"]);
    assert_eq!(model.input_dim_size("x", 0), None);
    assert_eq!(model.input_dim_size("x", 1), Some(3));
    assert_eq!(model.input_dim_size("x", 2), None);
    assert_eq!(model.input_dim_size("z", 0), None);
    assert_eq!(model.output_names(), vec!["y"]);
    assert!(model.output_shape("y").is_none());
    assert_eq!(model.param_names(), vec!["b", "w"]);
    assert_eq!(model.param("w").unwrap().dims(), &vec![3, 2].into());
}
