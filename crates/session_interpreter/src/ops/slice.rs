use ndarray::Slice as AxisSlice;
use tessera_core::{
    dispatch_all,
    node::Attribute,
    op_error::{normalize_axis, OpError},
    tensor::{Tensor, TensorElemType, TensorElemTypeExt},
};

use crate::operator::{
    check_attributes, index_values, required, Operator, ALL_TYPES, INDEX_TYPES,
};

/// `Slice(data, starts, ends, axes?, steps?)`. Out-of-range starts and ends are
/// clamped the way numpy does.
#[derive(Debug, Default)]
pub struct Slice;

impl Operator for Slice {
    fn name(&self) -> &'static str {
        "Slice"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        check_attributes(self.name(), attributes, &[])
    }

    fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        let op = self.name();
        let data = required(op, inputs, 0)?;
        let starts = index_values(op, required(op, inputs, 1)?)?;
        let ends = index_values(op, required(op, inputs, 2)?)?;
        let n = starts.len();
        if ends.len() != n {
            return Err(OpError::invalid_input(
                op,
                format!("{n} starts but {} ends", ends.len()),
            ));
        }

        let axes = match inputs.get(3).and_then(Option::as_ref) {
            Some(axes) => index_values(op, axes)?,
            None => (0..n as i64).collect(),
        };
        let steps = match inputs.get(4).and_then(Option::as_ref) {
            Some(steps) => index_values(op, steps)?,
            None => vec![1; n],
        };
        if axes.len() != n || steps.len() != n {
            return Err(OpError::invalid_input(
                op,
                "starts, ends, axes and steps must have the same length",
            ));
        }

        let mut slices = vec![AxisSlice::from(..); data.rank()];
        let mut seen = vec![false; data.rank()];
        for i in 0..n {
            let axis = normalize_axis(op, axes[i], data.rank())?;
            if std::mem::replace(&mut seen[axis], true) {
                return Err(OpError::invalid_input(op, format!("axis {} repeats", axes[i])));
            }
            slices[axis] = axis_slice(op, starts[i], ends[i], steps[i], data.dims()[axis])?;
        }

        fn slice<T: TensorElemTypeExt>(
            data: &Tensor,
            slices: &[AxisSlice],
        ) -> Result<Tensor, OpError> {
            let view = data.view::<T>()?;
            let sliced = view.slice_each_axis(|ax| slices[ax.axis.index()]);
            Ok(Tensor::from_array(sliced.to_owned()))
        }

        let output = dispatch_all!(data.elem_ty(), T => slice::<T>(data, &slices)?);
        Ok(vec![output])
    }

    fn min_inputs(&self) -> usize {
        3
    }

    fn max_inputs(&self) -> usize {
        5
    }

    fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
        vec![ALL_TYPES, INDEX_TYPES, INDEX_TYPES, INDEX_TYPES, INDEX_TYPES]
    }
}

/// Clamps `start`/`end` against an axis of length `len` and converts them to
/// an ndarray slice, which always walks a half-open range and applies a
/// negative step from its far end.
fn axis_slice(
    op: &'static str,
    start: i64,
    end: i64,
    step: i64,
    len: usize,
) -> Result<AxisSlice, OpError> {
    if step == 0 {
        return Err(OpError::invalid_input(op, "step must not be zero"));
    }

    let len = len as i64;
    let resolve = |i: i64| if i < 0 { i + len } else { i };
    let (start, end) = (resolve(start), resolve(end));

    let empty = AxisSlice::new(0, Some(0), 1);
    if step > 0 {
        let start = start.clamp(0, len);
        let end = end.clamp(0, len);
        if start >= end {
            return Ok(empty);
        }
        Ok(AxisSlice::new(start as isize, Some(end as isize), step as isize))
    } else {
        if len == 0 {
            return Ok(empty);
        }
        let start = start.clamp(0, len - 1);
        let end = end.clamp(-1, len - 1);
        if start <= end {
            return Ok(empty);
        }
        Ok(AxisSlice::new(
            (end + 1) as isize,
            Some((start + 1) as isize),
            step as isize,
        ))
    }
}

#[test]
fn clamps_like_numpy() {
    let s = axis_slice("Slice", 1, i64::MAX, 1, 4).unwrap();
    assert_eq!(s, AxisSlice::new(1, Some(4), 1));
    let s = axis_slice("Slice", -100, -1, 1, 4).unwrap();
    assert_eq!(s, AxisSlice::new(0, Some(3), 1));
    let s = axis_slice("Slice", -1, i64::MIN, -1, 4).unwrap();
    assert_eq!(s, AxisSlice::new(0, Some(4), -1));
    let s = axis_slice("Slice", 3, 3, 1, 4).unwrap();
    assert_eq!(s, AxisSlice::new(0, Some(0), 1));
    assert!(axis_slice("Slice", 0, 1, 0, 4).is_err());
}

#[test]
fn slices_with_steps() {
    let data = Tensor::new(vec![2, 4].into(), (0..8).collect::<Vec<i32>>());
    let idx = |v: Vec<i64>| Some(Tensor::new(vec![v.len()].into(), v));
    let out = Slice
        .apply(&[
            Some(data.clone()),
            idx(vec![0, 3]),
            idx(vec![1, 0]),
            idx(vec![0, 1]),
            idx(vec![1, -2]),
        ])
        .unwrap();
    assert_eq!(out[0].dims().as_slice(), &[1, 2]);
    assert_eq!(out[0].as_slice::<i32>().unwrap(), &[3, 1]);

    let out = Slice
        .apply(&[Some(data), idx(vec![1]), idx(vec![1000]), idx(vec![-1]), None])
        .unwrap();
    assert_eq!(out[0].dims().as_slice(), &[2, 3]);
    assert_eq!(out[0].as_slice::<i32>().unwrap(), &[1, 2, 3, 5, 6, 7]);
}
