use tessera_core::{
    dispatch_all,
    fixed_dim::FixedDimensions,
    node::Attribute,
    op_error::{normalize_axis, OpError},
    tensor::{Tensor, TensorElemType, TensorElemTypeExt},
};

use crate::operator::{
    index_values, required, unknown_attribute, Operator, ALL_TYPES, INDEX_TYPES,
};

/// Picks slices of `data` along `axis`. The output shape is the data shape with
/// the gathered axis replaced by the shape of `indices`.
#[derive(Debug, Default)]
pub struct Gather {
    pub axis: i64,
}

impl Operator for Gather {
    fn name(&self) -> &'static str {
        "Gather"
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
        let indices = required(self.name(), inputs, 1)?;
        let axis = normalize_axis(self.name(), self.axis, data.rank())?;

        let size = data.dims()[axis];
        let positions = index_values(self.name(), indices)?
            .into_iter()
            .map(|index| {
                let resolved = if index < 0 { index + size as i64 } else { index };
                if resolved < 0 || resolved >= size as i64 {
                    return Err(OpError::IndexOutOfRange {
                        op: self.name(),
                        index,
                        size,
                    });
                }
                Ok(resolved as usize)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut dims = data.dims()[..axis].to_vec();
        dims.extend_from_slice(indices.dims());
        dims.extend_from_slice(&data.dims()[axis + 1..]);
        let dims = FixedDimensions::from(dims);

        let output =
            dispatch_all!(data.elem_ty(), T => gather::<T>(data, axis, &positions, dims)?);
        Ok(vec![output])
    }

    fn min_inputs(&self) -> usize {
        2
    }

    fn max_inputs(&self) -> usize {
        2
    }

    fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
        vec![ALL_TYPES, INDEX_TYPES]
    }
}

/// For every outer coordinate, copies the contiguous inner block selected by
/// each position.
fn gather<T: TensorElemTypeExt>(
    data: &Tensor,
    axis: usize,
    positions: &[usize],
    dims: FixedDimensions,
) -> Result<Tensor, OpError> {
    let src = data.as_slice::<T>()?;
    let outer: usize = data.dims()[..axis].iter().product();
    let inner: usize = data.dims()[axis + 1..].iter().product();
    let axis_len = data.dims()[axis];

    let mut out = Vec::with_capacity(dims.total_elems());
    for o in 0..outer {
        let base = o * axis_len * inner;
        for &p in positions {
            let start = base + p * inner;
            out.extend_from_slice(&src[start..start + inner]);
        }
    }
    Ok(Tensor::new(dims, out))
}

#[test]
fn gather_rows_and_columns() {
    let data = Tensor::new(vec![3, 2].into(), vec![1.0f32, 1.2, 2.3, 3.4, 4.5, 5.7]);
    let indices = Tensor::new(vec![2, 2].into(), vec![0i64, 1, 1, 2]);
    let out = Gather { axis: 0 }
        .apply(&[Some(data.clone()), Some(indices)])
        .unwrap();
    assert_eq!(out[0].dims(), &FixedDimensions::from(vec![2, 2, 2]));
    assert_eq!(
        out[0].as_slice::<f32>().unwrap(),
        &[1.0, 1.2, 2.3, 3.4, 2.3, 3.4, 4.5, 5.7]
    );

    let indices = Tensor::new(vec![1].into(), vec![-1i32]);
    let out = Gather { axis: 1 }
        .apply(&[Some(data), Some(indices)])
        .unwrap();
    assert_eq!(out[0].dims(), &FixedDimensions::from(vec![3, 1]));
    assert_eq!(out[0].as_slice::<f32>().unwrap(), &[1.2, 3.4, 5.7]);
}

#[test]
fn gather_scalar_index_drops_axis() {
    let data = Tensor::new(vec![2, 3].into(), vec![0i64, 1, 2, 3, 4, 5]);
    let out = Gather { axis: 0 }
        .apply(&[Some(data), Some(Tensor::scalar(1i64))])
        .unwrap();
    assert_eq!(out[0].dims(), &FixedDimensions::from(vec![3]));
    assert_eq!(out[0].as_slice::<i64>().unwrap(), &[3, 4, 5]);
}
