//! ONNX shape broadcasting over whole tensors.
//!
//! Both functions materialize the stretched operands so that callers can zip
//! the two buffers element by element.

use thiserror::Error;

use crate::{
    fixed_dim::{self, FixedDimensions},
    tensor::Tensor,
};

#[derive(Debug, Clone, PartialEq, Error)]
#[error("Cannot broadcast shapes {a} and {b}: {cause}")]
pub struct BroadcastError {
    pub a: FixedDimensions,
    pub b: FixedDimensions,
    pub cause: BroadcastCause,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastCause {
    #[error("incompatible dimensions")]
    IncompatibleDimensions,

    #[error("right-hand side has more dimensions than left-hand side")]
    TooManyDimensions,
}

impl BroadcastError {
    fn new(a: &Tensor, b: &Tensor, cause: BroadcastCause) -> Self {
        Self {
            a: a.dims().clone(),
            b: b.dims().clone(),
            cause,
        }
    }
}

/// Stretches `b` onto the shape of `a`. `a` is returned unchanged.
pub fn unidirectional_broadcast(
    a: &Tensor,
    b: &Tensor,
) -> Result<(Tensor, Tensor), BroadcastError> {
    if b.rank() > a.rank() {
        return Err(BroadcastError::new(a, b, BroadcastCause::TooManyDimensions));
    }
    let dims = fixed_dim::unidirectional_broadcast(a.dims(), b.dims())
        .ok_or_else(|| BroadcastError::new(a, b, BroadcastCause::IncompatibleDimensions))?;
    let b_expanded = expand(a, b, b, &dims)?;
    Ok((a.clone(), b_expanded))
}

/// Stretches `a` and `b` onto their common shape.
pub fn multidirectional_broadcast(
    a: &Tensor,
    b: &Tensor,
) -> Result<(Tensor, Tensor), BroadcastError> {
    let dims = a
        .dims()
        .broadcast(b.dims())
        .ok_or_else(|| BroadcastError::new(a, b, BroadcastCause::IncompatibleDimensions))?;
    Ok((expand(a, b, a, &dims)?, expand(a, b, b, &dims)?))
}

fn expand(
    a: &Tensor,
    b: &Tensor,
    t: &Tensor,
    dims: &FixedDimensions,
) -> Result<Tensor, BroadcastError> {
    t.expand_to(dims)
        .map_err(|_| BroadcastError::new(a, b, BroadcastCause::IncompatibleDimensions))
}

#[test]
fn multidirectional_result_shape_is_elementwise_max() {
    let cases: &[(&[usize], &[usize], &[usize])] = &[
        (&[2, 3, 4, 5], &[], &[2, 3, 4, 5]),
        (&[2, 3, 4, 5], &[5], &[2, 3, 4, 5]),
        (&[4, 5], &[2, 3, 4, 5], &[2, 3, 4, 5]),
        (&[1, 4, 5], &[2, 3, 1, 1], &[2, 3, 4, 5]),
        (&[3, 4, 5], &[2, 1, 1, 1], &[2, 3, 4, 5]),
    ];
    for (a, b, expected) in cases {
        let a = Tensor::zeros::<f32>(FixedDimensions::from(*a));
        let b = Tensor::zeros::<f32>(FixedDimensions::from(*b));
        let (x, y) = multidirectional_broadcast(&a, &b).unwrap();
        assert_eq!(x.dims().as_slice(), *expected);
        assert_eq!(y.dims().as_slice(), *expected);
    }
}

#[test]
fn multidirectional_repeats_values() {
    let a = Tensor::new(vec![2, 1].into(), vec![1i32, 2]);
    let b = Tensor::new(vec![3].into(), vec![10i32, 20, 30]);
    let (x, y) = multidirectional_broadcast(&a, &b).unwrap();
    assert_eq!(x.as_slice::<i32>().unwrap(), &[1, 1, 1, 2, 2, 2]);
    assert_eq!(y.as_slice::<i32>().unwrap(), &[10, 20, 30, 10, 20, 30]);
}

#[test]
fn incompatible_shapes_name_both_operands() {
    let a = Tensor::zeros::<f32>(vec![2, 3].into());
    let b = Tensor::zeros::<f32>(vec![4].into());
    let err = multidirectional_broadcast(&a, &b).unwrap_err();
    assert_eq!(
        err,
        BroadcastError {
            a: vec![2, 3].into(),
            b: vec![4].into(),
            cause: BroadcastCause::IncompatibleDimensions,
        }
    );
    assert_eq!(
        err.to_string(),
        "Cannot broadcast shapes [2, 3] and [4]: incompatible dimensions"
    );
}

#[test]
fn unidirectional_only_stretches_rhs() {
    let a = Tensor::zeros::<f32>(vec![2, 3].into());
    let b = Tensor::new(vec![3].into(), vec![1.0f32, 2.0, 3.0]);
    let (x, y) = unidirectional_broadcast(&a, &b).unwrap();
    assert_eq!(x, a);
    assert_eq!(y.as_slice::<f32>().unwrap(), &[1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);

    let err = unidirectional_broadcast(&b, &a).unwrap_err();
    assert_eq!(err.cause, BroadcastCause::TooManyDimensions);

    let a = Tensor::zeros::<f32>(vec![1, 3].into());
    let b = Tensor::zeros::<f32>(vec![2, 3].into());
    let err = unidirectional_broadcast(&a, &b).unwrap_err();
    assert_eq!(err.cause, BroadcastCause::IncompatibleDimensions);
}

#[test]
fn scalar_broadcasts_against_anything() {
    let a = Tensor::zeros::<i64>(vec![2, 2].into());
    let b = Tensor::scalar(7i64);
    let (_, y) = unidirectional_broadcast(&a, &b).unwrap();
    assert_eq!(y.as_slice::<i64>().unwrap(), &[7, 7, 7, 7]);
    let (x, _) = multidirectional_broadcast(&b, &a).unwrap();
    assert_eq!(x.dims(), a.dims());
}
