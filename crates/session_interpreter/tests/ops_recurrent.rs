use tessera_core::{
    model::Model,
    node::{AttributeValue, Node},
    tensor::Tensor,
};
use tessera_session::{NamedTensors, SessionError};
use tessera_session_interpreter::InterpreterSessionBuilder;

const HIDDEN: usize = 2;

/// Deterministic weights `scale * ((i * mul) % modulus - offset)`.
fn weights(len: usize, mul: usize, modulus: usize, offset: f32, scale: f32) -> Vec<f32> {
    (0..len)
        .map(|i| scale * (((i * mul) % modulus) as f32 - offset))
        .collect()
}

fn sequence() -> Tensor {
    Tensor::new(vec![2, 1, 2].into(), vec![0.5f32, -1.0, 0.25, 0.75])
}

/// A `[1, 1, HIDDEN]` initial state.
fn initial_state(values: [f32; HIDDEN]) -> Tensor {
    Tensor::new(vec![1, 1, HIDDEN].into(), values.to_vec())
}

struct Recurrent {
    op_type: &'static str,
    params: Vec<(&'static str, Option<Tensor>)>,
    outputs: Vec<&'static str>,
    attrs: Vec<(&'static str, AttributeValue)>,
}

impl Recurrent {
    fn run(self) -> Result<NamedTensors, SessionError> {
        let mut model = Model {
            opset_version: 13,
            ..Default::default()
        };
        model.graph.add_input("x", None);
        let mut ins = vec!["x"];
        for (name, tensor) in self.params {
            ins.push(name);
            if let Some(tensor) = tensor {
                model.graph.add_init(name, tensor);
            }
        }
        for &output in &self.outputs {
            if !output.is_empty() {
                model.graph.add_output(output, None);
            }
        }
        let mut node = Node::new(self.op_type)
            .with_ins(ins)
            .with_outs(self.outputs);
        for (name, value) in self.attrs {
            node = node.with_attr(name, value);
        }
        model.graph.add_node(node);

        let sess = InterpreterSessionBuilder::new(&model).build();
        let mut inputs = NamedTensors::default();
        inputs.insert("x".into(), sequence());
        sess.run(inputs)
    }
}

fn gru(attrs: Vec<(&'static str, AttributeValue)>) -> Recurrent {
    Recurrent {
        op_type: "GRU",
        params: vec![
            ("w", Some(Tensor::new(vec![1, 6, 2].into(), weights(12, 7, 11, 5.0, 0.1)))),
            ("r", Some(Tensor::new(vec![1, 6, 2].into(), weights(12, 5, 9, 4.0, 0.1)))),
            ("b", Some(Tensor::new(vec![1, 12].into(), weights(12, 3, 7, 3.0, 0.05)))),
        ],
        outputs: vec!["y", "y_h"],
        attrs,
    }
}

#[test]
fn gru_sequence() {
    let mut outputs = gru(vec![]).run().unwrap();
    let y = outputs.remove("y").unwrap();
    let y_h = outputs.remove("y_h").unwrap();
    assert_eq!(y.dims().as_slice(), &[2, 1, 1, HIDDEN]);
    assert_eq!(y_h.dims().as_slice(), &[1, 1, HIDDEN]);
    assert!(
        y.allclose(&[-0.2675412f32, 0.2865448, -0.0856661, -0.0176732]),
        "{y}"
    );
    assert!(y_h.allclose(&[-0.0856661f32, -0.0176732]), "{y_h}");
}

#[test]
fn gru_linear_before_reset() {
    let attrs = vec![
        ("linear_before_reset", AttributeValue::Int(1)),
        ("hidden_size", AttributeValue::Int(HIDDEN as i64)),
    ];
    let y = gru(attrs).run().unwrap().remove("y").unwrap();
    assert!(
        y.allclose(&[-0.2576235f32, 0.2623671, -0.062541, -0.0459674]),
        "{y}"
    );
}

#[test]
fn gru_only_y_h() {
    let mut op = gru(vec![]);
    op.outputs = vec!["", "y_h"];
    let y_h = op.run().unwrap().remove("y_h").unwrap();
    assert!(y_h.allclose(&[-0.0856661f32, -0.0176732]));
}

#[test]
fn gru_hidden_four_without_bias() {
    let op = Recurrent {
        op_type: "GRU",
        params: vec![
            ("w", Some(Tensor::new(vec![1, 12, 2].into(), weights(24, 7, 11, 5.0, 0.1)))),
            ("r", Some(Tensor::new(vec![1, 12, 4].into(), weights(48, 5, 9, 4.0, 0.1)))),
        ],
        outputs: vec!["y", "y_h"],
        attrs: vec![("hidden_size", AttributeValue::Int(4))],
    };
    let mut outputs = op.run().unwrap();
    let y = outputs.remove("y").unwrap();
    assert_eq!(y.dims().as_slice(), &[2, 1, 1, 4]);
    assert!(
        y.allclose(&[
            -0.3056373f32,
            0.2453164,
            0.1012451,
            -0.1899246,
            -0.0709869,
            0.039047,
            0.0526773,
            -0.0869605,
        ]),
        "{y}"
    );
    let y_h = outputs.remove("y_h").unwrap();
    assert!(
        y_h.allclose(&[-0.0709869f32, 0.039047, 0.0526773, -0.0869605]),
        "{y_h}"
    );
}

#[test]
fn gru_with_initial_hidden_state() {
    let mut op = gru(vec![]);
    // sequence_lens stays absent.
    op.params.extend([
        ("", None),
        ("h0", Some(initial_state([0.3, -0.6]))),
    ]);
    let y = op.run().unwrap().remove("y").unwrap();
    assert!(
        y.allclose(&[-0.1162891f32, 0.2002838, 0.0065868, -0.0686278]),
        "{y}"
    );
}

#[test]
fn gru_rejects_reverse_direction() {
    let attrs = vec![("direction", AttributeValue::String("reverse".into()))];
    assert!(matches!(
        gru(attrs).run(),
        Err(SessionError::Operator { ref op_type, .. }) if op_type == "GRU"
    ));
}

#[test]
fn gru_rejects_hidden_size_mismatch() {
    let attrs = vec![("hidden_size", AttributeValue::Int(3))];
    assert!(gru(attrs).run().is_err());
}

#[test]
fn rnn_sequence() {
    let op = Recurrent {
        op_type: "RNN",
        params: vec![
            ("w", Some(Tensor::new(vec![1, 2, 2].into(), weights(4, 3, 7, 3.0, 0.1)))),
            ("r", Some(Tensor::new(vec![1, 2, 2].into(), weights(4, 5, 7, 2.0, 0.1)))),
            (
                "b",
                Some(Tensor::new(vec![1, 4].into(), vec![-0.2f32, -0.1, 0.0, 0.1])),
            ),
        ],
        outputs: vec!["y", "y_h"],
        attrs: vec![],
    };
    let mut outputs = op.run().unwrap();
    let y = outputs.remove("y").unwrap();
    assert!(
        y.allclose(&[-0.3363755f32, 0.2449187, -0.1334485, -0.058064]),
        "{y}"
    );
    let y_h = outputs.remove("y_h").unwrap();
    assert!(y_h.allclose(&[-0.1334485f32, -0.058064]));
}

#[test]
fn rnn_without_bias_from_initial_state() {
    let op = Recurrent {
        op_type: "RNN",
        params: vec![
            ("w", Some(Tensor::new(vec![1, 2, 2].into(), weights(4, 3, 7, 3.0, 0.1)))),
            ("r", Some(Tensor::new(vec![1, 2, 2].into(), weights(4, 5, 7, 2.0, 0.1)))),
            ("", None),
            ("", None),
            ("h0", Some(initial_state([0.3, -0.6]))),
        ],
        outputs: vec!["y", "y_h"],
        attrs: vec![],
    };
    let mut outputs = op.run().unwrap();
    let y = outputs.remove("y").unwrap();
    assert!(
        y.allclose(&[-0.3713602f32, 0.3274774, 0.0972073, -0.0697702]),
        "{y}"
    );
    let y_h = outputs.remove("y_h").unwrap();
    assert!(y_h.allclose(&[0.0972073f32, -0.0697702]), "{y_h}");
}

fn lstm(peephole: bool) -> Recurrent {
    let mut params = vec![
        ("w", Some(Tensor::new(vec![1, 8, 2].into(), weights(16, 7, 13, 6.0, 0.1)))),
        ("r", Some(Tensor::new(vec![1, 8, 2].into(), weights(16, 5, 11, 5.0, 0.1)))),
        ("b", Some(Tensor::new(vec![1, 16].into(), weights(16, 3, 7, 3.0, 0.02)))),
    ];
    if peephole {
        // sequence_lens, initial_h and initial_c stay absent.
        params.extend([
            ("", None),
            ("", None),
            ("", None),
            ("p", Some(Tensor::new(vec![1, 6].into(), weights(6, 1, 6, 3.0, 0.1)))),
        ]);
    }
    Recurrent {
        op_type: "LSTM",
        params,
        outputs: vec!["y", "y_h", "y_c"],
        attrs: vec![],
    }
}

#[test]
fn lstm_sequence() {
    let mut outputs = lstm(false).run().unwrap();
    let y = outputs.remove("y").unwrap();
    assert!(
        y.allclose(&[0.0751087f32, 0.0671921, -0.0444169, -0.0492083]),
        "{y}"
    );
    let y_c = outputs.remove("y_c").unwrap();
    assert_eq!(y_c.dims().as_slice(), &[1, 1, HIDDEN]);
    assert!(y_c.allclose(&[-0.0816384f32, -0.0878578]), "{y_c}");
}

#[test]
fn lstm_with_peepholes() {
    let mut outputs = lstm(true).run().unwrap();
    let y = outputs.remove("y").unwrap();
    assert!(
        y.allclose(&[0.0742056f32, 0.0671921, -0.0406897, -0.0463615]),
        "{y}"
    );
    let y_c = outputs.remove("y_c").unwrap();
    assert!(y_c.allclose(&[-0.0745199f32, -0.082761]), "{y_c}");
}

#[test]
fn lstm_without_bias_from_initial_states() {
    let mut op = lstm(false);
    op.params.truncate(2);
    op.params.extend([
        ("", None),
        ("", None),
        ("h0", Some(initial_state([0.3, -0.6]))),
        ("c0", Some(initial_state([0.5, -0.25]))),
    ]);
    let mut outputs = op.run().unwrap();
    let y = outputs.remove("y").unwrap();
    assert!(
        y.allclose(&[0.134496f32, 0.0064509, -0.004054, -0.0962085]),
        "{y}"
    );
    let y_h = outputs.remove("y_h").unwrap();
    assert!(y_h.allclose(&[-0.004054f32, -0.0962085]), "{y_h}");
    let y_c = outputs.remove("y_c").unwrap();
    assert!(y_c.allclose(&[-0.0074487f32, -0.1718082]), "{y_c}");
}

#[test]
fn lstm_too_many_outputs() {
    let mut op = lstm(false);
    op.outputs = vec!["y", "y_h", "y_c", "extra"];
    assert!(matches!(
        op.run(),
        Err(SessionError::OutputCountMismatch { expected: 4, actual: 3, .. })
    ));
}
