use tessera_core::{
    model::Model,
    node::{AttributeValue, Node},
    op_error::OpError,
    tensor::Tensor,
};
use tessera_session::{NamedTensors, SessionError};
use tessera_session_interpreter::InterpreterSessionBuilder;

/// Runs `node` with `data` bound to "x" and `params` as initializers,
/// returning the node's first output.
fn run(node: Node, data: Tensor, params: Vec<(&str, Tensor)>) -> Result<Tensor, SessionError> {
    let mut model = Model {
        opset_version: 13,
        ..Default::default()
    };
    model.graph.add_input("x", None);
    for (name, tensor) in params {
        model.graph.add_init(name, tensor);
    }
    let output = node.outputs[0].clone();
    model.graph.add_output(output.as_str(), None);
    model.graph.add_node(node);

    let sess = InterpreterSessionBuilder::new(&model).build();
    let mut inputs = NamedTensors::default();
    inputs.insert("x".into(), data);
    Ok(sess.run(inputs)?.remove(&output).unwrap())
}

fn ints(values: &[i64]) -> Tensor {
    Tensor::new(vec![values.len()].into(), values.to_vec())
}

fn arange(dims: Vec<usize>) -> Tensor {
    let len = dims.iter().product::<usize>();
    Tensor::new(dims.into(), (0..len).map(|i| i as f32).collect())
}

fn op_error(result: Result<Tensor, SessionError>) -> OpError {
    match result {
        Err(SessionError::Operator { source, .. }) => source,
        other => panic!("expected an operator error, got {other:?}"),
    }
}

#[test]
fn gather_negative_index() {
    let node = Node::new("Gather")
        .with_ins(["x", "i"])
        .with_out("y")
        .with_attr("axis", AttributeValue::Int(1));
    let y = run(node, arange(vec![2, 3]), vec![("i", ints(&[-1, 0]))]).unwrap();
    assert_eq!(y.dims().as_slice(), &[2, 2]);
    assert_eq!(y.as_slice::<f32>().unwrap(), &[2.0, 0.0, 5.0, 3.0]);
}

#[test]
fn gather_index_out_of_range() {
    let node = Node::new("Gather").with_ins(["x", "i"]).with_out("y");
    let err = op_error(run(node, arange(vec![2, 3]), vec![("i", ints(&[2]))]));
    assert!(matches!(err, OpError::IndexOutOfRange { index: 2, size: 2, .. }));
}

#[test]
fn gather_axis_out_of_range() {
    let node = Node::new("Gather")
        .with_ins(["x", "i"])
        .with_out("y")
        .with_attr("axis", AttributeValue::Int(2));
    let err = op_error(run(node, arange(vec![2, 3]), vec![("i", ints(&[0]))]));
    assert!(matches!(err, OpError::AxisOutOfRange { axis: 2, rank: 2, .. }));
}

#[test]
fn slice_negative_step() {
    let node = Node::new("Slice")
        .with_ins(["x", "starts", "ends", "axes", "steps"])
        .with_out("y");
    let params = vec![
        ("starts", ints(&[-1])),
        ("ends", ints(&[i64::MIN])),
        ("axes", ints(&[1])),
        ("steps", ints(&[-2])),
    ];
    let y = run(node, arange(vec![2, 5]), params).unwrap();
    assert_eq!(y.dims().as_slice(), &[2, 3]);
    assert_eq!(y.as_slice::<f32>().unwrap(), &[4.0, 2.0, 0.0, 9.0, 7.0, 5.0]);
}

#[test]
fn slice_without_axes_uses_leading_axes() {
    let node = Node::new("Slice")
        .with_ins(["x", "starts", "ends"])
        .with_out("y");
    let params = vec![("starts", ints(&[1, 1])), ("ends", ints(&[2, 100]))];
    let y = run(node, arange(vec![2, 3, 2]), params).unwrap();
    assert_eq!(y.dims().as_slice(), &[1, 2, 2]);
    assert_eq!(y.as_slice::<f32>().unwrap(), &[8.0, 9.0, 10.0, 11.0]);
}

#[test]
fn squeeze_unsqueeze_round_trip() {
    let mut model = Model {
        opset_version: 13,
        ..Default::default()
    };
    model.graph.add_input("x", None);
    model.graph.add_output("y", None);
    model.graph.add_init("axes", ints(&[0, 2]));
    model
        .graph
        .add_node(Node::new("Unsqueeze").with_ins(["x", "axes"]).with_out("u"));
    model
        .graph
        .add_node(Node::new("Squeeze").with_ins(["u", "axes"]).with_out("y"));

    let sess = InterpreterSessionBuilder::new(&model).build();
    let mut inputs = NamedTensors::default();
    inputs.insert("x".into(), arange(vec![3, 4]));
    let y = sess.run(inputs).unwrap().remove("y").unwrap();
    assert_eq!(y.dims().as_slice(), &[3, 4]);
    assert_eq!(y.as_slice::<f32>().unwrap(), arange(vec![3, 4]).as_slice::<f32>().unwrap());
}

#[test]
fn reduce_mean_over_axes() {
    let node = Node::new("ReduceMean")
        .with_in("x")
        .with_out("y")
        .with_attr("axes", AttributeValue::Ints(vec![0, -1]))
        .with_attr("keepdims", AttributeValue::Int(0));
    let y = run(node, arange(vec![2, 2, 3]), vec![]).unwrap();
    assert_eq!(y.dims().as_slice(), &[2]);
    assert!(y.allclose(&[4.0f32, 7.0]));
}

#[test]
fn reduce_rejects_bad_axis() {
    let node = Node::new("ReduceMax")
        .with_in("x")
        .with_out("y")
        .with_attr("axes", AttributeValue::Ints(vec![3]));
    let err = op_error(run(node, arange(vec![2, 2]), vec![]));
    assert!(matches!(err, OpError::AxisOutOfRange { .. }));
}

#[test]
fn reshape_copies_zero_and_infers() {
    let node = Node::new("Reshape").with_ins(["x", "shape"]).with_out("y");
    let y = run(node, arange(vec![2, 3, 4]), vec![("shape", ints(&[0, -1]))]).unwrap();
    assert_eq!(y.dims().as_slice(), &[2, 12]);
}

#[test]
fn shape_then_constant_of_shape() {
    let mut model = Model {
        opset_version: 13,
        ..Default::default()
    };
    model.graph.add_input("x", None);
    model.graph.add_output("y", None);
    model
        .graph
        .add_node(Node::new("Shape").with_in("x").with_out("s"));
    model.graph.add_node(
        Node::new("ConstantOfShape")
            .with_in("s")
            .with_out("y")
            .with_attr("value", AttributeValue::Tensor(Tensor::new(vec![1].into(), vec![3i64]))),
    );

    let sess = InterpreterSessionBuilder::new(&model).build();
    let mut inputs = NamedTensors::default();
    inputs.insert("x".into(), arange(vec![2, 2]));
    let y = sess.run(inputs).unwrap().remove("y").unwrap();
    assert_eq!(y.dims().as_slice(), &[2, 2]);
    assert_eq!(y.as_slice::<i64>().unwrap(), &[3; 4]);
}

#[test]
fn concat_variadic() {
    let node = Node::new("Concat")
        .with_ins(["x", "a", "b"])
        .with_out("y")
        .with_attr("axis", AttributeValue::Int(-1));
    let params = vec![
        ("a", Tensor::zeros::<f32>(vec![2, 1].into())),
        ("b", Tensor::full(vec![2, 2].into(), 9.0f32)),
    ];
    let y = run(node, arange(vec![2, 1]), params).unwrap();
    assert_eq!(y.dims().as_slice(), &[2, 4]);
    assert_eq!(
        y.as_slice::<f32>().unwrap(),
        &[0.0, 0.0, 9.0, 9.0, 1.0, 0.0, 9.0, 9.0]
    );
}
