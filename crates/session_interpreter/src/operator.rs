use tessera_core::{
    node::Attribute,
    op_error::OpError,
    tensor::{Tensor, TensorElemType},
};

pub const BOOL_TYPES: &[TensorElemType] = &[TensorElemType::Bool];

pub const INDEX_TYPES: &[TensorElemType] = &[TensorElemType::I32, TensorElemType::I64];

pub const FLOAT_TYPES: &[TensorElemType] = &[TensorElemType::F32, TensorElemType::F64];

pub const SIGNED_TYPES: &[TensorElemType] = &[
    TensorElemType::I8,
    TensorElemType::I16,
    TensorElemType::I32,
    TensorElemType::I64,
    TensorElemType::F32,
    TensorElemType::F64,
];

pub const NUMERIC_TYPES: &[TensorElemType] = &[
    TensorElemType::I8,
    TensorElemType::I16,
    TensorElemType::I32,
    TensorElemType::I64,
    TensorElemType::U8,
    TensorElemType::U16,
    TensorElemType::U32,
    TensorElemType::U64,
    TensorElemType::F32,
    TensorElemType::F64,
];

pub const ALL_TYPES: &[TensorElemType] = &[
    TensorElemType::Bool,
    TensorElemType::I8,
    TensorElemType::I16,
    TensorElemType::I32,
    TensorElemType::I64,
    TensorElemType::U8,
    TensorElemType::U16,
    TensorElemType::U32,
    TensorElemType::U64,
    TensorElemType::F32,
    TensorElemType::F64,
];

/// An operator instance. It is created fresh for every node execution,
/// configured through [`Operator::init`] and applied exactly once.
pub trait Operator {
    fn name(&self) -> &'static str;

    /// Parses node attributes. Unknown attribute names are errors.
    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError>;

    /// Computes the outputs. `inputs` has already passed [`Operator::validate_inputs`],
    /// so it holds exactly `max_inputs()` entries with `None` for absent optional inputs.
    fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError>;

    fn min_inputs(&self) -> usize;

    fn max_inputs(&self) -> usize;

    /// Upper bound on the outputs a node may declare. Operators with optional
    /// trailing outputs only return as many as the node asks for.
    fn max_outputs(&self) -> usize {
        1
    }

    /// Allowed element types for each input position.
    fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]>;

    fn validate_inputs(&self, inputs: Vec<Option<Tensor>>) -> Result<Vec<Option<Tensor>>, OpError> {
        validate_inputs_with(
            self.name(),
            self.min_inputs(),
            self.max_inputs(),
            &self.input_type_constraints(),
            inputs,
        )
    }
}

/// Checks the input count, pads the list with `None` up to `max`, then checks the
/// element type of every present input against the constraint for its position.
pub fn validate_inputs_with(
    op: &'static str,
    min: usize,
    max: usize,
    constraints: &[&'static [TensorElemType]],
    mut inputs: Vec<Option<Tensor>>,
) -> Result<Vec<Option<Tensor>>, OpError> {
    let actual = inputs.len();
    if min == max && actual != min {
        return Err(OpError::InvalidInputCount {
            op,
            expected: min,
            actual,
        });
    }
    if actual < min || actual > max {
        return Err(OpError::InvalidInputCountRange {
            op,
            min,
            max,
            actual,
        });
    }

    inputs.resize(max, None);

    for (position, input) in inputs.iter().enumerate() {
        let Some(input) = input else { continue };
        let allowed = constraints.get(position).copied().unwrap_or(ALL_TYPES);
        if !allowed.contains(&input.elem_ty()) {
            return Err(OpError::InvalidInputType {
                op,
                position,
                elem_ty: input.elem_ty(),
            });
        }
    }

    Ok(inputs)
}

/// Returns input `i`, failing if the optional slot is empty.
pub fn required<'a>(
    op: &'static str,
    inputs: &'a [Option<Tensor>],
    i: usize,
) -> Result<&'a Tensor, OpError> {
    inputs
        .get(i)
        .and_then(Option::as_ref)
        .ok_or(OpError::MissingInput { op, position: i })
}

/// Fails with [`OpError::UnknownAttribute`] for the first attribute not in `known`.
pub fn check_attributes(
    op: &'static str,
    attributes: &[Attribute],
    known: &[&str],
) -> Result<(), OpError> {
    match attributes.iter().find(|a| !known.contains(&a.name.as_str())) {
        Some(a) => Err(OpError::UnknownAttribute {
            op,
            name: a.name.clone(),
        }),
        None => Ok(()),
    }
}

pub fn unknown_attribute(op: &'static str, attr: &Attribute) -> OpError {
    OpError::UnknownAttribute {
        op,
        name: attr.name.clone(),
    }
}

/// Error for an element type that passed validation but has no kernel.
pub fn unsupported_type(op: &'static str, elem_ty: TensorElemType) -> OpError {
    OpError::InvalidInputType {
        op,
        position: 0,
        elem_ty,
    }
}

/// Reads an `INDEX_TYPES` tensor as `i64`s.
pub fn index_values(op: &'static str, tensor: &Tensor) -> Result<Vec<i64>, OpError> {
    match tensor.elem_ty() {
        TensorElemType::I64 => Ok(tensor.to_vec::<i64>()?),
        TensorElemType::I32 => Ok(tensor.as_slice::<i32>()?.iter().map(|&i| i as i64).collect()),
        ty => Err(unsupported_type(op, ty)),
    }
}

/// Fails unless both tensors share an element type.
pub fn same_type(op: &'static str, a: &Tensor, b: &Tensor) -> Result<TensorElemType, OpError> {
    if a.elem_ty() != b.elem_ty() {
        return Err(OpError::TypeMismatch {
            op,
            a: a.elem_ty(),
            b: b.elem_ty(),
        });
    }
    Ok(a.elem_ty())
}

#[test]
fn exact_count_is_returned_unchanged() {
    let x = Tensor::zeros::<f32>(vec![2].into());
    let y = Tensor::zeros::<f32>(vec![2].into());
    let inputs = vec![Some(x), Some(y)];
    let validated = validate_inputs_with(
        "Add",
        2,
        2,
        &[NUMERIC_TYPES, NUMERIC_TYPES],
        inputs.clone(),
    )
    .unwrap();
    assert_eq!(validated, inputs);
}

#[test]
fn ranged_count_pads_with_none() {
    let x = Tensor::zeros::<f32>(vec![1, 1, 3].into());
    let validated = validate_inputs_with(
        "Conv",
        2,
        3,
        &[FLOAT_TYPES, FLOAT_TYPES, FLOAT_TYPES],
        vec![Some(x.clone()), Some(x.clone())],
    )
    .unwrap();
    assert_eq!(validated, vec![Some(x.clone()), Some(x), None]);
}

#[test]
fn wrong_count() {
    let x = Tensor::zeros::<f32>(vec![2].into());
    assert_eq!(
        validate_inputs_with("Relu", 1, 1, &[FLOAT_TYPES], vec![Some(x.clone()), Some(x.clone())]),
        Err(OpError::InvalidInputCount {
            op: "Relu",
            expected: 1,
            actual: 2
        })
    );
    assert_eq!(
        validate_inputs_with("Conv", 2, 3, &[], vec![Some(x)]),
        Err(OpError::InvalidInputCountRange {
            op: "Conv",
            min: 2,
            max: 3,
            actual: 1
        })
    );
}

#[test]
fn wrong_type_names_position() {
    let x = Tensor::zeros::<f32>(vec![2].into());
    let i = Tensor::zeros::<i64>(vec![2].into());
    assert_eq!(
        validate_inputs_with(
            "Gather",
            2,
            2,
            &[ALL_TYPES, INDEX_TYPES],
            vec![Some(x.clone()), Some(x)]
        ),
        Err(OpError::InvalidInputType {
            op: "Gather",
            position: 1,
            elem_ty: TensorElemType::F32
        })
    );
    assert_eq!(
        validate_inputs_with("Sigmoid", 1, 1, &[FLOAT_TYPES], vec![Some(i)]),
        Err(OpError::InvalidInputType {
            op: "Sigmoid",
            position: 0,
            elem_ty: TensorElemType::I64
        })
    );
}

#[test]
fn absent_optional_input_skips_type_check() {
    let x = Tensor::zeros::<f32>(vec![2].into());
    let validated = validate_inputs_with(
        "Squeeze",
        1,
        2,
        &[ALL_TYPES, &[TensorElemType::I64]],
        vec![Some(x), None],
    )
    .unwrap();
    assert!(validated[1].is_none());
}

#[test]
fn rejects_unknown_attribute() {
    use tessera_core::node::AttributeValue;

    let attrs = vec![
        Attribute::new("axis", AttributeValue::Int(0)),
        Attribute::new("bogus", AttributeValue::Int(1)),
    ];
    assert_eq!(
        check_attributes("Gather", &attrs, &["axis"]),
        Err(OpError::UnknownAttribute {
            op: "Gather",
            name: "bogus".into()
        })
    );
    assert!(check_attributes("Gather", &attrs[..1], &["axis"]).is_ok());
}
