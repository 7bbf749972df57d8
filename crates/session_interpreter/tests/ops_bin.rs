use tessera_core::{
    model::Model,
    node::Node,
    tensor::{Tensor, TensorElemType, TypedShape},
};
use tessera_session::NamedTensors;
use tessera_session_interpreter::InterpreterSessionBuilder;

macro_rules! test_op {
    ($name:ident, $op:literal, $x:expr, $y:expr, |$a:ident, $b:ident| $f:expr) => {
        #[test]
        fn $name() {
            Tensor::seed_rng_from_u64(42);
            let x = Tensor::rand::<f32>($x.into());
            // Keeps divisors away from zero.
            let y = Tensor::rand::<f32>($y.into()).map(|v: f32| v + 0.5).unwrap();

            let z = run_binary($op, &x, &y);
            let dims = x.dims().broadcast(y.dims()).unwrap();
            let expected: Vec<f32> = x
                .expand_to(&dims)
                .unwrap()
                .as_slice::<f32>()
                .unwrap()
                .iter()
                .zip(y.expand_to(&dims).unwrap().as_slice::<f32>().unwrap())
                .map(|(&$a, &$b)| $f)
                .collect();

            assert_eq!(z.dims(), &dims);
            assert!(z.allclose(&expected), "{z}");
        }
    };
}

test_op!(add_same_shape, "Add", [4, 2], [4, 2], |a, b| a + b);
test_op!(add_bcast_row, "Add", [3, 4], [4], |a, b| a + b);
test_op!(sub_bcast_both, "Sub", [3, 1], [1, 5], |a, b| a - b);
test_op!(mul_bcast_rank3, "Mul", [2, 3, 4], [3, 1], |a, b| a * b);
test_op!(div_bcast_scalar, "Div", [2, 3], [1], |a, b| a / b);
test_op!(pow_same_shape, "Pow", [5], [5], |a, b| a.powf(b));

fn run_binary(op: &str, x: &Tensor, y: &Tensor) -> Tensor {
    let mut model = Model {
        opset_version: 13,
        ..Default::default()
    };
    for (name, t) in [("x", x), ("y", y)] {
        model.graph.add_input(
            name,
            TypedShape::new(t.dims().clone(), TensorElemType::F32),
        );
    }
    model.graph.add_output("z", None);
    model
        .graph
        .add_node(Node::new(op).with_ins(["x", "y"]).with_out("z"));

    let sess = InterpreterSessionBuilder::new(&model).build();
    let mut inputs = NamedTensors::default();
    inputs.insert("x".into(), x.clone());
    inputs.insert("y".into(), y.clone());
    sess.run(inputs).unwrap().remove("z").unwrap()
}

#[test]
fn compare_outputs_bool() {
    let x = Tensor::new(vec![2, 2].into(), vec![1.0f32, 2.0, 3.0, 4.0]);
    let y = Tensor::new(vec![2].into(), vec![2.0f32, 2.0]);
    let z = run_binary("Greater", &x, &y);
    assert_eq!(z.elem_ty(), TensorElemType::Bool);
    assert_eq!(z.as_slice::<bool>().unwrap(), &[false, false, true, true]);

    let z = run_binary("LessOrEqual", &x, &y);
    assert_eq!(z.as_slice::<bool>().unwrap(), &[true, true, false, false]);
}

#[test]
fn incompatible_shapes_fail() {
    let mut model = Model {
        opset_version: 13,
        ..Default::default()
    };
    model.graph.add_input("x", None);
    model.graph.add_input("y", None);
    model.graph.add_output("z", None);
    model
        .graph
        .add_node(Node::new("Add").with_ins(["x", "y"]).with_out("z"));

    let sess = InterpreterSessionBuilder::new(&model).build();
    let mut inputs = NamedTensors::default();
    inputs.insert("x".into(), Tensor::zeros::<f32>(vec![2, 3].into()));
    inputs.insert("y".into(), Tensor::zeros::<f32>(vec![4].into()));
    let err = sess.run(inputs).unwrap_err();
    assert!(err.to_string().starts_with("Add (z): "), "{err}");
}

#[test]
fn mixed_types_fail() {
    let x = Tensor::zeros::<f32>(vec![2].into());
    let y = Tensor::zeros::<i64>(vec![2].into());
    let mut model = Model {
        opset_version: 13,
        ..Default::default()
    };
    model.graph.add_output("z", None);
    model.graph.add_init("x", x);
    model.graph.add_init("y", y);
    model
        .graph
        .add_node(Node::new("Mul").with_ins(["x", "y"]).with_out("z"));
    let sess = InterpreterSessionBuilder::new(&model).build();
    assert!(sess.run(NamedTensors::default()).is_err());
}

fn run_on_inits(op: &str, inits: Vec<(&str, Tensor)>) -> Result<Tensor, String> {
    let mut model = Model {
        opset_version: 13,
        ..Default::default()
    };
    model.graph.add_output("z", None);
    let names: Vec<&str> = inits.iter().map(|(name, _)| *name).collect();
    model
        .graph
        .add_node(Node::new(op).with_ins(names).with_out("z"));
    for (name, t) in inits {
        model.graph.add_init(name, t);
    }
    let sess = InterpreterSessionBuilder::new(&model).build();
    sess.run(NamedTensors::default())
        .map(|mut out| out.remove("z").unwrap())
        .map_err(|e| e.to_string())
}

#[test]
fn integer_arithmetic_wraps_on_overflow() {
    let x = Tensor::new(vec![2].into(), vec![i32::MAX, i32::MIN]);
    let one = Tensor::new(vec![1].into(), vec![1i32]);

    let z = run_on_inits("Add", vec![("x", x.clone()), ("y", one.clone())]).unwrap();
    assert_eq!(z.as_slice::<i32>().unwrap(), &[i32::MIN, i32::MIN + 1]);

    let z = run_on_inits("Sub", vec![("x", x.clone()), ("y", one)]).unwrap();
    assert_eq!(z.as_slice::<i32>().unwrap(), &[i32::MAX - 1, i32::MAX]);

    let two = Tensor::new(vec![1].into(), vec![2i32]);
    let z = run_on_inits("Mul", vec![("x", x), ("y", two)]).unwrap();
    assert_eq!(z.as_slice::<i32>().unwrap(), &[-2, 0]);
}

#[test]
fn integer_division_rejects_undefined_quotients() {
    let x = Tensor::new(vec![2].into(), vec![i64::MIN, 6]);

    let err = run_on_inits(
        "Div",
        vec![("x", x.clone()), ("y", Tensor::new(vec![1].into(), vec![-1i64]))],
    )
    .unwrap_err();
    assert!(err.starts_with("Div (z): "), "{err}");

    let err = run_on_inits(
        "Div",
        vec![("x", x.clone()), ("y", Tensor::new(vec![2].into(), vec![3i64, 0]))],
    )
    .unwrap_err();
    assert!(err.starts_with("Div (z): "), "{err}");

    let z = run_on_inits(
        "Div",
        vec![("x", x), ("y", Tensor::new(vec![2].into(), vec![2i64, -4]))],
    )
    .unwrap();
    assert_eq!(z.as_slice::<i64>().unwrap(), &[i64::MIN / 2, -1]);
}

#[test]
fn float_division_by_zero_is_infinite() {
    let z = run_on_inits(
        "Div",
        vec![
            ("x", Tensor::new(vec![1].into(), vec![1.0f32])),
            ("y", Tensor::new(vec![1].into(), vec![0.0f32])),
        ],
    )
    .unwrap();
    assert_eq!(z.as_slice::<f32>().unwrap(), &[f32::INFINITY]);
}

#[test]
fn where_selects_with_broadcast() {
    let z = run_on_inits(
        "Where",
        vec![
            ("c", Tensor::new(vec![2, 1].into(), vec![true, false])),
            ("x", Tensor::new(vec![2].into(), vec![1.0f32, 2.0])),
            ("y", Tensor::new(vec![1].into(), vec![-1.0f32])),
        ],
    )
    .unwrap();
    assert_eq!(z.dims().as_slice(), &[2, 2]);
    assert_eq!(z.as_slice::<f32>().unwrap(), &[1.0, 2.0, -1.0, -1.0]);
}

#[test]
fn where_reports_conflicting_shapes() {
    let err = run_on_inits(
        "Where",
        vec![
            ("c", Tensor::new(vec![2].into(), vec![true, false])),
            ("x", Tensor::new(vec![2].into(), vec![1.0f32, 2.0])),
            ("y", Tensor::new(vec![3].into(), vec![0.0f32; 3])),
        ],
    )
    .unwrap_err();
    assert!(err.contains("[2] and [3]"), "{err}");

    let err = run_on_inits(
        "Where",
        vec![
            ("c", Tensor::new(vec![4].into(), vec![true; 4])),
            ("x", Tensor::new(vec![2].into(), vec![1.0f32, 2.0])),
            ("y", Tensor::new(vec![2].into(), vec![0.0f32; 2])),
        ],
    )
    .unwrap_err();
    assert!(err.contains("[4] and [2]"), "{err}");
}
