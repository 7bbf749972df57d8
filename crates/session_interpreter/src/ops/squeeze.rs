use tessera_core::{
    node::Attribute,
    op_error::{normalize_axis, OpError},
    tensor::{Tensor, TensorElemType},
};

use crate::operator::{check_attributes, index_values, required, Operator, ALL_TYPES};

const AXES_TYPES: &[TensorElemType] = &[TensorElemType::I64];

/// Resolves `axes` against `rank`, rejecting repeats.
fn resolve_axes(op: &'static str, axes: &[i64], rank: usize) -> Result<Vec<usize>, OpError> {
    let mut resolved = Vec::with_capacity(axes.len());
    for &axis in axes {
        let axis = normalize_axis(op, axis, rank)?;
        if resolved.contains(&axis) {
            return Err(OpError::invalid_input(op, format!("axis {axis} repeats")));
        }
        resolved.push(axis);
    }
    Ok(resolved)
}

/// Removes size-1 axes: the listed ones, or all of them when `axes` is absent.
#[derive(Debug, Default)]
pub struct Squeeze;

impl Operator for Squeeze {
    fn name(&self) -> &'static str {
        "Squeeze"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        check_attributes(self.name(), attributes, &[])
    }

    fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        let data = required(self.name(), inputs, 0)?;
        let dims = data.dims();

        let axes = match inputs.get(1).and_then(Option::as_ref) {
            Some(axes) => {
                let axes = index_values(self.name(), axes)?;
                let axes = resolve_axes(self.name(), &axes, dims.len())?;
                if let Some(&axis) = axes.iter().find(|&&axis| dims[axis] != 1) {
                    return Err(OpError::invalid_shape(
                        self.name(),
                        dims,
                        format!("cannot squeeze axis {axis} of size {}", dims[axis]),
                    ));
                }
                axes
            }
            None => (0..dims.len()).filter(|&axis| dims[axis] == 1).collect(),
        };

        let squeezed: Vec<usize> = dims
            .iter()
            .enumerate()
            .filter(|(axis, _)| !axes.contains(axis))
            .map(|(_, &size)| size)
            .collect();
        Ok(vec![data.reshape(squeezed)?])
    }

    fn min_inputs(&self) -> usize {
        1
    }

    fn max_inputs(&self) -> usize {
        2
    }

    fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
        vec![ALL_TYPES, AXES_TYPES]
    }
}

/// Inserts size-1 axes at the given positions of the output shape.
#[derive(Debug, Default)]
pub struct Unsqueeze;

impl Operator for Unsqueeze {
    fn name(&self) -> &'static str {
        "Unsqueeze"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        check_attributes(self.name(), attributes, &[])
    }

    fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        let data = required(self.name(), inputs, 0)?;
        let axes = index_values(self.name(), required(self.name(), inputs, 1)?)?;
        let rank = data.rank() + axes.len();
        let axes = resolve_axes(self.name(), &axes, rank)?;

        let mut sizes = data.dims().iter();
        let unsqueezed: Vec<usize> = (0..rank)
            .map(|axis| {
                if axes.contains(&axis) {
                    1
                } else {
                    sizes.next().copied().unwrap_or(1)
                }
            })
            .collect();
        Ok(vec![data.reshape(unsqueezed)?])
    }

    fn min_inputs(&self) -> usize {
        2
    }

    fn max_inputs(&self) -> usize {
        2
    }

    fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
        vec![ALL_TYPES, AXES_TYPES]
    }
}

#[test]
fn squeeze_all_unit_axes() {
    let x = Tensor::zeros::<f32>(vec![1, 3, 1, 2].into());
    let out = Squeeze.apply(&[Some(x), None]).unwrap();
    assert_eq!(out[0].dims().as_slice(), &[3, 2]);
}

#[test]
fn squeeze_rejects_non_unit_axis() {
    let x = Tensor::zeros::<f32>(vec![1, 3].into());
    let axes = Tensor::new(vec![1].into(), vec![1i64]);
    assert!(matches!(
        Squeeze.apply(&[Some(x), Some(axes)]),
        Err(OpError::InvalidInputShape { op: "Squeeze", .. })
    ));
}

#[test]
fn unsqueeze_negative_and_duplicate_axes() {
    let x = Tensor::zeros::<f32>(vec![3, 4].into());
    let axes = Tensor::new(vec![2].into(), vec![0i64, -1]);
    let out = Unsqueeze.apply(&[Some(x.clone()), Some(axes)]).unwrap();
    assert_eq!(out[0].dims().as_slice(), &[1, 3, 4, 1]);

    let axes = Tensor::new(vec![2].into(), vec![1i64, -3]);
    assert!(Unsqueeze.apply(&[Some(x), Some(axes)]).is_err());
}
