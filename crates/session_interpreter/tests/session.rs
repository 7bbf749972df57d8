use tessera_core::{
    dim::{Dimension, Dimensions},
    model::Model,
    node::{AttributeValue, Node},
    onnx::{load::load_onnx, save::save_onnx},
    tensor::{Tensor, TensorElemType, TypedShape},
};
use tessera_session::{NamedTensors, Session, SessionError};
use tessera_session_interpreter::InterpreterSessionBuilder;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Two dense layers: `relu(x · w1 + b1)` followed by a Gemm.
fn feed_forward() -> Model {
    let mut model = Model {
        opset_version: 13,
        ..Default::default()
    };
    let w1 = (0..12)
        .map(|n| {
            let (i, j) = (n / 4, n % 4);
            0.1 * (((i * 3 + j * 5) % 7) as f32 - 3.0)
        })
        .collect::<Vec<_>>();
    let w2 = (0..8)
        .map(|n| {
            let (i, j) = (n / 2, n % 2);
            0.1 * (((i * 2 + j * 3) % 5) as f32 - 2.0)
        })
        .collect::<Vec<_>>();

    model.graph.add_input(
        "x",
        TypedShape::new(
            Dimensions(vec![Dimension::Dynamic("batch".into()), Dimension::Fixed(3)]),
            TensorElemType::F32,
        ),
    );
    model.graph.add_output("y", None);
    model.graph.add_init("w1", Tensor::new(vec![3, 4].into(), w1));
    model.graph.add_init(
        "b1",
        Tensor::new(vec![4].into(), vec![-0.1f32, 0.0, 0.1, 0.2]),
    );
    model.graph.add_init("w2", Tensor::new(vec![4, 2].into(), w2));
    model
        .graph
        .add_init("b2", Tensor::new(vec![2].into(), vec![0.25f32, -0.25]));

    model.graph.add_node(
        Node::new("MatMul")
            .with_name("fc1".to_string())
            .with_ins(["x", "w1"])
            .with_out("xw"),
    );
    model
        .graph
        .add_node(Node::new("Add").with_ins(["xw", "b1"]).with_out("h_pre"));
    model
        .graph
        .add_node(Node::new("Relu").with_in("h_pre").with_out("h"));
    model
        .graph
        .add_node(Node::new("Gemm").with_ins(["h", "w2", "b2"]).with_out("y"));
    model
}

fn batch() -> NamedTensors {
    let mut inputs = NamedTensors::default();
    inputs.insert(
        "x".into(),
        Tensor::new(vec![2, 3].into(), vec![0.5f32, -1.0, 2.0, 1.5, 0.25, -0.5]),
    );
    inputs
}

#[test]
fn feed_forward_through_onnx_file() {
    init_logger();

    let path = tempfile::NamedTempFile::new().unwrap();
    let path = path.path();
    save_onnx(&feed_forward(), path).unwrap();
    let model = load_onnx(path).unwrap();

    let sess = InterpreterSessionBuilder::new(&model)
        .with_profiling_enabled(true)
        .build();
    let y = sess.run(batch()).unwrap().remove("y").unwrap();
    assert_eq!(y.dims().as_slice(), &[2, 2]);
    assert!(y.allclose(&[0.18f32, -0.315, 0.2875, -0.275]), "{y}");
}

#[test]
fn runs_are_deterministic() {
    let model = feed_forward();
    let sess = InterpreterSessionBuilder::new(&model).build();
    let first = sess.run(batch()).unwrap();
    let second = sess.run(batch()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn usable_through_session_trait() {
    let model = feed_forward();
    let sess: Box<dyn Session + '_> = Box::new(InterpreterSessionBuilder::new(&model).build());
    let outputs = sess.run(batch()).unwrap();
    assert_eq!(outputs.len(), 1);
    assert!(outputs.contains_key("y"));
}

#[test]
fn dynamic_batch_size() {
    let model = feed_forward();
    let sess = InterpreterSessionBuilder::new(&model).build();
    let mut inputs = NamedTensors::default();
    inputs.insert("x".into(), Tensor::zeros::<f32>(vec![5, 3].into()));
    let y = sess.run(inputs).unwrap().remove("y").unwrap();
    assert_eq!(y.dims().as_slice(), &[5, 2]);
    // Zero input leaves relu(b1) · w2 + b2 in every row.
    assert!(y.allclose(&[0.25f32, -0.21].repeat(5)), "{y}");
}

#[test]
fn shape_gate_runs_before_any_node() {
    let model = feed_forward();
    let sess = InterpreterSessionBuilder::new(&model).build();
    let mut inputs = NamedTensors::default();
    inputs.insert("x".into(), Tensor::zeros::<f32>(vec![2, 4].into()));
    assert!(matches!(
        sess.run(inputs),
        Err(SessionError::InvalidShape { ref name, .. }) if name == "x"
    ));
    assert!(matches!(
        sess.run(NamedTensors::default()),
        Err(SessionError::MissingInput(ref name)) if name == "x"
    ));
}

#[test]
fn error_leaves_session_usable() {
    let model = feed_forward();
    let sess = InterpreterSessionBuilder::new(&model).build();
    let mut inputs = NamedTensors::default();
    inputs.insert("x".into(), Tensor::zeros::<i64>(vec![2, 3].into()));
    let err = sess.run(inputs).unwrap_err();
    assert!(
        matches!(err, SessionError::Operator { ref op_type, ref node, .. }
            if op_type == "MatMul" && node == "fc1"),
        "{err}"
    );
    assert!(sess.run(batch()).is_ok());
}

#[test]
fn unknown_operator() {
    let mut model = feed_forward();
    model
        .graph
        .add_node(Node::new("Frobnicate").with_in("y").with_out("z"));
    let sess = InterpreterSessionBuilder::new(&model).build();
    assert!(matches!(
        sess.run(batch()),
        Err(SessionError::UnknownOperator { ref op_type, opset: 13 }) if op_type == "Frobnicate"
    ));
}

#[test]
fn unsupported_opset() {
    let mut model = feed_forward();
    model.opset_version = 99;
    let sess = InterpreterSessionBuilder::new(&model).build();
    let err = sess.run(batch()).unwrap_err();
    assert!(matches!(
        err,
        SessionError::UnsupportedOpset { version: 99, ref known } if known == &[13]
    ));
}

#[test]
fn missing_tensor() {
    let mut model = feed_forward();
    model
        .graph
        .add_node(Node::new("Add").with_ins(["y", "nowhere"]).with_out("z"));
    let sess = InterpreterSessionBuilder::new(&model).build();
    assert!(matches!(
        sess.run(batch()),
        Err(SessionError::TensorNotFound { ref node, ref name }) if node == "z" && name == "nowhere"
    ));
}

#[test]
fn missing_graph_output() {
    let mut model = feed_forward();
    model.graph.add_output("never_produced", None);
    let sess = InterpreterSessionBuilder::new(&model).build();
    assert!(matches!(
        sess.run(batch()),
        Err(SessionError::TensorNotFound { ref name, .. }) if name == "never_produced"
    ));
}

#[test]
fn unknown_attribute_is_an_error() {
    let mut model = feed_forward();
    let id = model.graph.nodes.iter().map(|(id, _)| id).last().unwrap();
    model.graph.nodes[id]
        .attributes
        .push(tessera_core::node::Attribute::new("colour", AttributeValue::Int(1)));
    let sess = InterpreterSessionBuilder::new(&model).build();
    assert!(matches!(
        sess.run(batch()),
        Err(SessionError::Operator { ref op_type, .. }) if op_type == "Gemm"
    ));
}

#[test]
fn initializers_override_inputs() {
    let mut model = Model {
        opset_version: 13,
        ..Default::default()
    };
    model.graph.add_output("y", None);
    model.graph.add_init("c", Tensor::scalar(2.0f32));
    model
        .graph
        .add_node(Node::new("Identity").with_in("c").with_out("y"));
    let sess = InterpreterSessionBuilder::new(&model).build();
    let mut inputs = NamedTensors::default();
    inputs.insert("c".into(), Tensor::scalar(7.0f32));
    let y = sess.run(inputs).unwrap().remove("y").unwrap();
    assert_eq!(y.as_slice::<f32>().unwrap(), &[2.0]);
}

#[test]
fn graph_output_listed_twice() {
    let mut model = feed_forward();
    model.graph.add_output("y", None);
    let sess = InterpreterSessionBuilder::new(&model).build();
    let outputs = sess.run(batch()).unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs["y"].dims().as_slice(), &[2, 2]);
}
