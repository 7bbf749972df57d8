//! Operators that only rearrange or describe shapes.

use ndarray::{concatenate, Axis, IxDyn};
use tessera_core::{
    broadcast::{BroadcastCause, BroadcastError},
    dispatch_all,
    fixed_dim::{self, FixedDimensions},
    node::Attribute,
    op_error::{normalize_axis, OpError},
    tensor::{Tensor, TensorElemType, TensorElemTypeExt},
};

use crate::operator::{
    check_attributes, required, same_type, unknown_attribute, validate_inputs_with, Operator,
    ALL_TYPES,
};

const SHAPE_TYPES: &[TensorElemType] = &[TensorElemType::I64];

/// Reinterprets `data` under a new shape. A `0` copies the input dimension at
/// the same position unless `allowzero` is set; at most one `-1` is inferred.
#[derive(Debug, Default)]
pub struct Reshape {
    pub allow_zero: bool,
}

impl Reshape {
    pub fn resolve(
        &self,
        input: &FixedDimensions,
        shape: &[i64],
    ) -> Result<FixedDimensions, OpError> {
        let op = self.name();
        if shape.iter().filter(|&&d| d == -1).count() > 1 {
            return Err(OpError::invalid_input(op, "more than one dimension is -1"));
        }
        if self.allow_zero && shape.contains(&0) && shape.contains(&-1) {
            return Err(OpError::invalid_input(
                op,
                "allowzero forbids mixing 0 and -1 in the shape",
            ));
        }

        let mut dims = Vec::with_capacity(shape.len());
        let mut inferred = None;
        for (i, &d) in shape.iter().enumerate() {
            match d {
                0 if !self.allow_zero => match input.get(i) {
                    Some(&size) => dims.push(size),
                    None => {
                        return Err(OpError::invalid_input(
                            op,
                            format!(
                                "0 at position {i} has no input dimension to copy (input rank {})",
                                input.len()
                            ),
                        ))
                    }
                },
                -1 => {
                    inferred = Some(i);
                    dims.push(1);
                }
                d if d < 0 => {
                    return Err(OpError::invalid_input(op, format!("invalid dimension {d}")))
                }
                d => dims.push(d as usize),
            }
        }

        if let Some(i) = inferred {
            let known: usize = dims.iter().product();
            let total = input.total_elems();
            if known == 0 || total % known != 0 {
                return Err(OpError::invalid_input(
                    op,
                    format!("cannot infer -1 for {total} elements from {shape:?}"),
                ));
            }
            dims[i] = total / known;
        }
        Ok(dims.into())
    }
}

impl Operator for Reshape {
    fn name(&self) -> &'static str {
        "Reshape"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        for attr in attributes {
            match attr.name.as_str() {
                "allowzero" => self.allow_zero = attr.int()? != 0,
                _ => return Err(unknown_attribute(self.name(), attr)),
            }
        }
        Ok(())
    }

    fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        let data = required(self.name(), inputs, 0)?;
        let shape = required(self.name(), inputs, 1)?.to_vec::<i64>()?;
        let dims = self.resolve(data.dims(), &shape)?;
        Ok(vec![data.reshape(dims)?])
    }

    fn min_inputs(&self) -> usize {
        2
    }

    fn max_inputs(&self) -> usize {
        2
    }

    fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
        vec![ALL_TYPES, SHAPE_TYPES]
    }
}

/// Collapses `data` into a matrix at `axis`.
#[derive(Debug)]
pub struct Flatten {
    pub axis: i64,
}

impl Default for Flatten {
    fn default() -> Self {
        Self { axis: 1 }
    }
}

impl Operator for Flatten {
    fn name(&self) -> &'static str {
        "Flatten"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        for attr in attributes {
            match attr.name.as_str() {
                "axis" => self.axis = attr.int()?,
                _ => return Err(unknown_attribute(self.name(), attr)),
            }
        }
        Ok(())
    }

    fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        let data = required(self.name(), inputs, 0)?;
        // The split point may equal the rank.
        let rank = data.rank() as i64;
        if self.axis < -rank || self.axis > rank {
            return Err(OpError::AxisOutOfRange {
                op: self.name(),
                axis: self.axis,
                rank: data.rank(),
            });
        }
        let axis = if self.axis < 0 { self.axis + rank } else { self.axis };
        let axis = axis as usize;
        let outer: usize = data.dims()[..axis].iter().product();
        let inner: usize = data.dims()[axis..].iter().product();
        Ok(vec![data.reshape(vec![outer, inner])?])
    }

    fn min_inputs(&self) -> usize {
        1
    }

    fn max_inputs(&self) -> usize {
        1
    }

    fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
        vec![ALL_TYPES]
    }
}

#[derive(Debug, Default)]
pub struct Transpose {
    pub perm: Option<Vec<i64>>,
}

impl Operator for Transpose {
    fn name(&self) -> &'static str {
        "Transpose"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        for attr in attributes {
            match attr.name.as_str() {
                "perm" => self.perm = Some(attr.ints()?.to_vec()),
                _ => return Err(unknown_attribute(self.name(), attr)),
            }
        }
        Ok(())
    }

    fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        let data = required(self.name(), inputs, 0)?;
        let rank = data.rank();
        let perm: Vec<usize> = match &self.perm {
            Some(perm) => {
                let mut seen = vec![false; rank];
                let is_permutation = perm.len() == rank
                    && perm.iter().all(|&p| {
                        (0..rank as i64).contains(&p)
                            && !std::mem::replace(&mut seen[p as usize], true)
                    });
                if !is_permutation {
                    return Err(OpError::unsupported_attr(
                        self.name(),
                        "perm",
                        format!("{perm:?}"),
                    ));
                }
                perm.iter().map(|&p| p as usize).collect()
            }
            None => (0..rank).rev().collect(),
        };

        fn transpose<T: TensorElemTypeExt>(
            data: &Tensor,
            perm: &[usize],
        ) -> Result<Tensor, OpError> {
            let view = data.view::<T>()?.permuted_axes(IxDyn(perm));
            Ok(Tensor::from_array(view.to_owned()))
        }

        let output = dispatch_all!(data.elem_ty(), T => transpose::<T>(data, &perm)?);
        Ok(vec![output])
    }

    fn min_inputs(&self) -> usize {
        1
    }

    fn max_inputs(&self) -> usize {
        1
    }

    fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
        vec![ALL_TYPES]
    }
}

#[derive(Debug, Default)]
pub struct Identity;

impl Operator for Identity {
    fn name(&self) -> &'static str {
        "Identity"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        check_attributes(self.name(), attributes, &[])
    }

    fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        Ok(vec![required(self.name(), inputs, 0)?.clone()])
    }

    fn min_inputs(&self) -> usize {
        1
    }

    fn max_inputs(&self) -> usize {
        1
    }

    fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
        vec![ALL_TYPES]
    }
}

/// Joins any number of tensors along `axis`.
#[derive(Debug, Default)]
pub struct Concat {
    pub axis: i64,
}

impl Operator for Concat {
    fn name(&self) -> &'static str {
        "Concat"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        for attr in attributes {
            match attr.name.as_str() {
                "axis" => self.axis = attr.int()?,
                _ => return Err(unknown_attribute(self.name(), attr)),
            }
        }
        Ok(())
    }

    fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        let first = required(self.name(), inputs, 0)?;
        let tensors = (0..inputs.len())
            .map(|i| required(self.name(), inputs, i))
            .collect::<Result<Vec<_>, _>>()?;
        for t in &tensors[1..] {
            same_type(self.name(), first, t)?;
        }
        let axis = normalize_axis(self.name(), self.axis, first.rank())?;

        fn concat<T: TensorElemTypeExt>(
            tensors: &[&Tensor],
            axis: usize,
        ) -> Result<Tensor, OpError> {
            let views = tensors
                .iter()
                .map(|t| t.view::<T>())
                .collect::<Result<Vec<_>, _>>()?;
            let joined = concatenate(Axis(axis), &views).map_err(|e| {
                OpError::invalid_input("Concat", format!("inputs cannot be joined: {e}"))
            })?;
            Ok(Tensor::from_array(joined))
        }

        let output = dispatch_all!(first.elem_ty(), T => concat::<T>(&tensors, axis)?);
        Ok(vec![output])
    }

    fn min_inputs(&self) -> usize {
        1
    }

    /// Unbounded; see [`Concat::validate_inputs`].
    fn max_inputs(&self) -> usize {
        usize::MAX
    }

    fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
        vec![ALL_TYPES]
    }

    fn validate_inputs(
        &self,
        inputs: Vec<Option<Tensor>>,
    ) -> Result<Vec<Option<Tensor>>, OpError> {
        let n = inputs.len();
        validate_inputs_with(self.name(), 1, n.max(1), &vec![ALL_TYPES; n], inputs)
    }
}

#[derive(Debug, Default)]
pub struct Shape;

impl Operator for Shape {
    fn name(&self) -> &'static str {
        "Shape"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        check_attributes(self.name(), attributes, &[])
    }

    fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        let data = required(self.name(), inputs, 0)?;
        let dims = data.dims().to_i64_vec();
        Ok(vec![Tensor::new(vec![dims.len()].into(), dims)])
    }

    fn min_inputs(&self) -> usize {
        1
    }

    fn max_inputs(&self) -> usize {
        1
    }

    fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
        vec![ALL_TYPES]
    }
}

/// Broadcasts `input` against `shape` (multidirectionally) and materializes it.
#[derive(Debug, Default)]
pub struct Expand;

impl Operator for Expand {
    fn name(&self) -> &'static str {
        "Expand"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        check_attributes(self.name(), attributes, &[])
    }

    fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        let input = required(self.name(), inputs, 0)?;
        let shape = required(self.name(), inputs, 1)?.to_vec::<i64>()?;
        if let Some(&d) = shape.iter().find(|&&d| d < 0) {
            return Err(OpError::invalid_input(
                self.name(),
                format!("invalid dimension {d}"),
            ));
        }
        let shape = FixedDimensions::from_i64(&shape);
        let dims = fixed_dim::broadcast(&[input.dims(), &shape]).ok_or_else(|| BroadcastError {
            a: input.dims().clone(),
            b: shape.clone(),
            cause: BroadcastCause::IncompatibleDimensions,
        })?;
        Ok(vec![input.expand_to(&dims)?])
    }

    fn min_inputs(&self) -> usize {
        2
    }

    fn max_inputs(&self) -> usize {
        2
    }

    fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
        vec![ALL_TYPES, SHAPE_TYPES]
    }
}

#[test]
fn reshape_copies_zero_and_infers_minus_one() {
    let op = Reshape::default();
    let input = FixedDimensions::from(vec![2, 3, 4]);
    assert_eq!(
        op.resolve(&input, &[0, -1]).unwrap(),
        FixedDimensions::from(vec![2, 12])
    );
    assert_eq!(
        op.resolve(&input, &[-1, 0, 2]).unwrap(),
        FixedDimensions::from(vec![4, 3, 2])
    );
    assert!(op.resolve(&input, &[-1, -1]).is_err());
    assert!(op.resolve(&input, &[5, -1]).is_err());
}

#[test]
fn reshape_zero_beyond_input_rank_is_an_error() {
    let op = Reshape::default();
    let input = FixedDimensions::from(vec![24]);
    assert!(matches!(
        op.resolve(&input, &[2, 0, -1]),
        Err(OpError::InvalidInput { op: "Reshape", .. })
    ));

    let op = Reshape { allow_zero: true };
    assert_eq!(
        op.resolve(&FixedDimensions::from(vec![0, 3]), &[3, 0]).unwrap(),
        FixedDimensions::from(vec![3, 0])
    );
    assert!(op.resolve(&input, &[0, -1]).is_err());
}

#[test]
fn flatten_negative_axis() {
    let x = Tensor::zeros::<f32>(vec![2, 3, 4].into());
    let out = Flatten { axis: -1 }.apply(&[Some(x.clone())]).unwrap();
    assert_eq!(out[0].dims().as_slice(), &[6, 4]);
    let out = Flatten { axis: 0 }.apply(&[Some(x.clone())]).unwrap();
    assert_eq!(out[0].dims().as_slice(), &[1, 24]);
    let out = Flatten { axis: 3 }.apply(&[Some(x)]).unwrap();
    assert_eq!(out[0].dims().as_slice(), &[24, 1]);
}

#[test]
fn transpose_default_reverses_axes() {
    let x = Tensor::new(vec![2, 3].into(), vec![1i32, 2, 3, 4, 5, 6]);
    let out = Transpose::default().apply(&[Some(x.clone())]).unwrap();
    assert_eq!(out[0].dims().as_slice(), &[3, 2]);
    assert_eq!(out[0].as_slice::<i32>().unwrap(), &[1, 4, 2, 5, 3, 6]);

    let op = Transpose {
        perm: Some(vec![0, 0]),
    };
    assert!(op.apply(&[Some(x)]).is_err());
}

#[test]
fn concat_validates_dynamic_arity() {
    let a = Tensor::new(vec![1, 2].into(), vec![1.0f32, 2.0]);
    let b = Tensor::new(vec![2, 2].into(), vec![3.0f32, 4.0, 5.0, 6.0]);
    let op = Concat { axis: 0 };
    let inputs = op
        .validate_inputs(vec![Some(a.clone()), Some(b), Some(a)])
        .unwrap();
    assert_eq!(inputs.len(), 3);
    let out = op.apply(&inputs).unwrap();
    assert_eq!(out[0].dims().as_slice(), &[4, 2]);
    assert_eq!(
        out[0].as_slice::<f32>().unwrap(),
        &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 1.0, 2.0]
    );
    assert!(op.validate_inputs(vec![]).is_err());
}

#[test]
fn expand_broadcasts_both_ways() {
    let x = Tensor::new(vec![3, 1].into(), vec![1i64, 2, 3]);
    let shape = Tensor::new(vec![3].into(), vec![2i64, 1, 2]);
    let out = Expand.apply(&[Some(x), Some(shape)]).unwrap();
    assert_eq!(out[0].dims().as_slice(), &[2, 3, 2]);
    assert_eq!(
        out[0].as_slice::<i64>().unwrap(),
        &[1, 1, 2, 2, 3, 3, 1, 1, 2, 2, 3, 3]
    );
}
