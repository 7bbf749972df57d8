use tessera_core::{
    model::Model,
    node::{AttributeValue, Node},
    tensor::Tensor,
};
use tessera_session::NamedTensors;
use tessera_session_interpreter::InterpreterSessionBuilder;

fn weight() -> Tensor {
    let w = (0..18)
        .map(|i| 0.1 * (((i * 5) % 7) as f32 - 3.0))
        .collect::<Vec<_>>();
    Tensor::new(vec![2, 1, 3, 3].into(), w)
}

fn run_conv(x: Tensor, attrs: Vec<(&str, AttributeValue)>) -> Tensor {
    let mut model = Model {
        opset_version: 13,
        ..Default::default()
    };
    model.graph.add_input("x", None);
    model.graph.add_output("y", None);
    model.graph.add_init("w", weight());
    model
        .graph
        .add_init("b", Tensor::new(vec![2].into(), vec![0.5f32, -0.5]));
    let mut node = Node::new("Conv").with_ins(["x", "w", "b"]).with_out("y");
    for (name, value) in attrs {
        node = node.with_attr(name, value);
    }
    model.graph.add_node(node);

    let sess = InterpreterSessionBuilder::new(&model).build();
    let mut inputs = NamedTensors::default();
    inputs.insert("x".into(), x);
    sess.run(inputs).unwrap().remove("y").unwrap()
}

fn arange(dims: Vec<usize>) -> Tensor {
    let len = dims.iter().product::<usize>();
    Tensor::new(dims.into(), (0..len).map(|i| i as f32).collect())
}

#[test]
fn conv_padded_strided() {
    let y = run_conv(
        arange(vec![1, 1, 4, 4]),
        vec![
            ("pads", AttributeValue::Ints(vec![1, 1, 1, 1])),
            ("strides", AttributeValue::Ints(vec![2, 2])),
        ],
    );
    assert_eq!(y.dims().as_slice(), &[1, 2, 2, 2]);
    assert!(
        y.allclose(&[0.4f32, 0.3, 3.6, 0.0, -1.8, -1.9, -5.9, -3.4]),
        "{y}"
    );
}

#[test]
fn conv_dilated() {
    let y = run_conv(
        arange(vec![1, 1, 4, 4]),
        vec![
            ("pads", AttributeValue::Ints(vec![2, 2, 2, 2])),
            ("dilations", AttributeValue::Ints(vec![2, 2])),
        ],
    );
    assert_eq!(y.dims().as_slice(), &[1, 2, 4, 4]);
    #[rustfmt::skip]
    let expected = [
        0.3f32, 0.6, -2.7, -3.0, 1.5, 1.8, -3.9, -4.2,
        3.9, 4.5, 2.3, 2.3, 6.3, 6.9, 2.3, 2.3,
        -3.1, -3.7, 0.9, 1.1, -5.5, -6.1, 1.7, 1.9,
        -3.7, -4.0, -1.1, -1.3, -4.9, -5.2, -1.9, -2.1,
    ];
    assert!(y.allclose(&expected), "{y}");
}

#[test]
fn conv_output_shape_law() {
    Tensor::seed_rng_from_u64(7);
    for (size, pad, stride) in [(5, 0, 1), (7, 1, 2), (8, 2, 3), (3, 1, 1)] {
        let y = run_conv(
            Tensor::rand::<f32>(vec![2, 1, size, size + 1].into()),
            vec![
                ("pads", AttributeValue::Ints(vec![pad; 4])),
                ("strides", AttributeValue::Ints(vec![stride; 2])),
            ],
        );
        let (size, pad, stride) = (size as usize, pad as usize, stride as usize);
        let out = |n: usize| (n + 2 * pad - 3) / stride + 1;
        assert_eq!(y.dims().as_slice(), &[2, 2, out(size), out(size + 1)]);
    }
}

#[test]
fn conv_same_upper_keeps_spatial_size() {
    Tensor::seed_rng_from_u64(1);
    let y = run_conv(
        Tensor::rand::<f32>(vec![1, 1, 6, 5].into()),
        vec![(
            "auto_pad",
            AttributeValue::String("SAME_UPPER".to_string()),
        )],
    );
    assert_eq!(y.dims().as_slice(), &[1, 2, 6, 5]);
}

#[test]
fn conv_one_dimensional() {
    let w = Tensor::new(vec![1, 1, 3].into(), vec![1.0f32, 0.0, -1.0]);
    let mut model = Model {
        opset_version: 13,
        ..Default::default()
    };
    model.graph.add_input("x", None);
    model.graph.add_output("y", None);
    model.graph.add_init("w", w);
    model
        .graph
        .add_node(Node::new("Conv").with_ins(["x", "w"]).with_out("y"));

    let sess = InterpreterSessionBuilder::new(&model).build();
    let mut inputs = NamedTensors::default();
    inputs.insert(
        "x".into(),
        Tensor::new(vec![1, 1, 5].into(), vec![1.0f32, 4.0, 9.0, 16.0, 25.0]),
    );
    let y = sess.run(inputs).unwrap().remove("y").unwrap();
    assert_eq!(y.dims().as_slice(), &[1, 1, 3]);
    assert!(y.allclose(&[-8.0f32, -12.0, -16.0]));
}

#[test]
fn conv_rejects_channel_mismatch() {
    let mut model = Model {
        opset_version: 13,
        ..Default::default()
    };
    model.graph.add_input("x", None);
    model.graph.add_output("y", None);
    model.graph.add_init("w", weight());
    model
        .graph
        .add_node(Node::new("Conv").with_ins(["x", "w"]).with_out("y"));
    let sess = InterpreterSessionBuilder::new(&model).build();
    let mut inputs = NamedTensors::default();
    inputs.insert("x".into(), Tensor::zeros::<f32>(vec![1, 3, 4, 4].into()));
    assert!(sess.run(inputs).is_err());
}
