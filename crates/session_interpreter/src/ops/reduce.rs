use ndarray::{ArrayView1, Axis};
use tessera_core::{
    dispatch_numeric,
    node::Attribute,
    op_error::{normalize_axis, OpError},
    tensor::{NumericElem, Tensor, TensorElemType},
};

use crate::operator::{required, unknown_attribute, unsupported_type, Operator, NUMERIC_TYPES};

fn max<T: NumericElem>(lane: ArrayView1<T>) -> T {
    lane.iter()
        .copied()
        .reduce(|m, v| if v > m { v } else { m })
        .unwrap_or_default()
}

fn min<T: NumericElem>(lane: ArrayView1<T>) -> T {
    lane.iter()
        .copied()
        .reduce(|m, v| if v < m { v } else { m })
        .unwrap_or_default()
}

fn mean<T: NumericElem>(lane: ArrayView1<T>) -> T {
    T::from_f64(lane.iter().map(|v| v.as_f64()).sum::<f64>() / lane.len() as f64)
}

/// Reduces `input` over `axes` (all axes when empty) with `f`, applied one axis
/// at a time from the innermost.
fn reduce<T: NumericElem>(
    op: &'static str,
    input: &Tensor,
    axes: &[i64],
    keepdims: bool,
    f: fn(ArrayView1<T>) -> T,
) -> Result<Tensor, OpError> {
    let mut axes = if axes.is_empty() {
        (0..input.rank()).collect()
    } else {
        axes.iter()
            .map(|&axis| normalize_axis(op, axis, input.rank()))
            .collect::<Result<Vec<_>, _>>()?
    };
    axes.sort_unstable();
    axes.dedup();

    if let Some(&axis) = axes.iter().find(|&&axis| input.dims()[axis] == 0) {
        return Err(OpError::invalid_shape(
            op,
            input.dims(),
            format!("cannot reduce empty axis {axis}"),
        ));
    }

    let mut array = input.view::<T>()?.to_owned();
    for &axis in axes.iter().rev() {
        array = array.map_axis(Axis(axis), |lane| f(lane));
        if keepdims {
            array.insert_axis_inplace(Axis(axis));
        }
    }
    Ok(Tensor::from_array(array))
}

macro_rules! reduce_op {
    ($name:ident, $f:ident) => {
        #[derive(Debug)]
        pub struct $name {
            pub axes: Vec<i64>,
            pub keepdims: bool,
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    axes: vec![],
                    keepdims: true,
                }
            }
        }

        impl Operator for $name {
            fn name(&self) -> &'static str {
                stringify!($name)
            }

            fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
                for attr in attributes {
                    match attr.name.as_str() {
                        "axes" => self.axes = attr.ints()?.to_vec(),
                        "keepdims" => self.keepdims = attr.int()? != 0,
                        _ => return Err(unknown_attribute(self.name(), attr)),
                    }
                }
                Ok(())
            }

            fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
                let input = required(self.name(), inputs, 0)?;
                let output = dispatch_numeric!(input.elem_ty(), T => {
                    reduce::<T>(self.name(), input, &self.axes, self.keepdims, $f::<T>)?
                }, ty => return Err(unsupported_type(self.name(), ty)));
                Ok(vec![output])
            }

            fn min_inputs(&self) -> usize {
                1
            }

            fn max_inputs(&self) -> usize {
                1
            }

            fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
                vec![NUMERIC_TYPES]
            }
        }
    };
}

reduce_op!(ReduceMax, max);
reduce_op!(ReduceMin, min);
reduce_op!(ReduceMean, mean);

#[test]
fn reduce_keepdims() {
    let x = Tensor::new(vec![2, 3].into(), vec![1.0f32, 5.0, 3.0, -2.0, 0.0, 4.0]);
    let op = ReduceMax {
        axes: vec![1],
        keepdims: true,
    };
    let out = op.apply(&[Some(x.clone())]).unwrap();
    assert_eq!(out[0].dims().as_slice(), &[2, 1]);
    assert_eq!(out[0].as_slice::<f32>().unwrap(), &[5.0, 4.0]);

    let op = ReduceMin {
        axes: vec![-2],
        keepdims: false,
    };
    let out = op.apply(&[Some(x.clone())]).unwrap();
    assert_eq!(out[0].dims().as_slice(), &[3]);
    assert_eq!(out[0].as_slice::<f32>().unwrap(), &[-2.0, 0.0, 3.0]);

    let out = ReduceMean::default().apply(&[Some(x)]).unwrap();
    assert_eq!(out[0].dims().as_slice(), &[1, 1]);
    assert!(out[0].allclose(&[11.0f32 / 6.0]));
}

#[test]
fn reduce_integers_over_all_axes() {
    let x = Tensor::new(vec![2, 2].into(), vec![3i64, 9, -4, 1]);
    let op = ReduceMax {
        axes: vec![],
        keepdims: false,
    };
    let out = op.apply(&[Some(x)]).unwrap();
    assert!(out[0].dims().is_empty());
    assert_eq!(out[0].as_slice::<i64>().unwrap(), &[9]);
}

#[test]
fn integer_mean_does_not_overflow() {
    let x = Tensor::new(vec![3].into(), vec![i8::MAX, i8::MAX, 99]);
    let out = ReduceMean {
        axes: vec![0],
        keepdims: false,
    }
    .apply(&[Some(x)])
    .unwrap();
    assert_eq!(out[0].as_slice::<i8>().unwrap(), &[117]);
}
