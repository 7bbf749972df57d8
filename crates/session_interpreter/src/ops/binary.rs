//! Elementwise binary operators. Operands are broadcast multidirectionally.

use tessera_core::{
    broadcast::{multidirectional_broadcast, BroadcastCause, BroadcastError},
    dispatch_all, dispatch_float, dispatch_numeric,
    fixed_dim::FixedDimensions,
    node::Attribute,
    op_error::OpError,
    tensor::{NumericElem, Tensor, TensorElemType, TensorElemTypeExt},
};

use crate::operator::{
    check_attributes, required, same_type, unsupported_type, Operator, ALL_TYPES, BOOL_TYPES,
    FLOAT_TYPES, NUMERIC_TYPES,
};

/// Broadcasts `x` and `y` together and combines them element by element.
pub(crate) fn zip_map<T, U>(
    x: &Tensor,
    y: &Tensor,
    f: impl Fn(T, T) -> U,
) -> Result<Tensor, OpError>
where
    T: TensorElemTypeExt,
    U: TensorElemTypeExt,
{
    let (x, y) = multidirectional_broadcast(x, y)?;
    let data = x
        .as_slice::<T>()?
        .iter()
        .zip(y.as_slice::<T>()?)
        .map(|(&a, &b)| f(a, b))
        .collect();
    Ok(Tensor::new(x.dims().clone(), data))
}

/// Elementwise `x / y`. Integer division by zero and `MIN / -1` are rejected.
fn divide<T: NumericElem>(x: &Tensor, y: &Tensor) -> Result<Tensor, OpError> {
    let (x, y) = multidirectional_broadcast(x, y)?;
    let data = x
        .as_slice::<T>()?
        .iter()
        .zip(y.as_slice::<T>()?)
        .map(|(&a, &b)| {
            a.checked_div(b).ok_or_else(|| {
                OpError::invalid_input("Div", format!("cannot divide {a:?} by {b:?}"))
            })
        })
        .collect::<Result<_, _>>()?;
    Ok(Tensor::new(x.dims().clone(), data))
}

macro_rules! binary_op {
    ($name:ident, $constraints:expr, |$x:ident, $y:ident, $ty:ident| $apply:block) => {
        #[derive(Debug, Default)]
        pub struct $name;

        impl Operator for $name {
            fn name(&self) -> &'static str {
                stringify!($name)
            }

            fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
                check_attributes(self.name(), attributes, &[])
            }

            fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
                let $x = required(self.name(), inputs, 0)?;
                let $y = required(self.name(), inputs, 1)?;
                let $ty = same_type(self.name(), $x, $y)?;
                Ok(vec![$apply])
            }

            fn min_inputs(&self) -> usize {
                2
            }

            fn max_inputs(&self) -> usize {
                2
            }

            fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
                vec![$constraints, $constraints]
            }
        }
    };
}

macro_rules! arith_op {
    ($name:ident, |$l:ident, $r:ident| $body:expr) => {
        binary_op!($name, NUMERIC_TYPES, |x, y, ty| {
            dispatch_numeric!(ty, T => zip_map(x, y, |$l: T, $r: T| $body)?,
                other => return Err(unsupported_type(stringify!($name), other)))
        });
    };
}

macro_rules! compare_op {
    ($name:ident, $constraints:expr, |$l:ident, $r:ident| $body:expr) => {
        binary_op!($name, $constraints, |x, y, ty| {
            dispatch_all!(ty, T => zip_map(x, y, |$l: T, $r: T| -> bool { $body })?)
        });
    };
}

macro_rules! logical_op {
    ($name:ident, |$l:ident, $r:ident| $body:expr) => {
        binary_op!($name, BOOL_TYPES, |x, y, _ty| {
            zip_map(x, y, |$l: bool, $r: bool| -> bool { $body })?
        });
    };
}

arith_op!(Add, |a, b| NumericElem::wrapping_add(a, b));
arith_op!(Sub, |a, b| NumericElem::wrapping_sub(a, b));
arith_op!(Mul, |a, b| NumericElem::wrapping_mul(a, b));

binary_op!(Div, NUMERIC_TYPES, |x, y, ty| {
    dispatch_numeric!(ty, T => divide::<T>(x, y)?,
        other => return Err(unsupported_type("Div", other)))
});

binary_op!(Pow, FLOAT_TYPES, |x, y, ty| {
    dispatch_float!(ty, T => zip_map(x, y, |a: T, b: T| a.powf(b))?,
        other => return Err(unsupported_type("Pow", other)))
});

compare_op!(Equal, ALL_TYPES, |a, b| a == b);
compare_op!(Greater, NUMERIC_TYPES, |a, b| a > b);
compare_op!(GreaterOrEqual, NUMERIC_TYPES, |a, b| a >= b);
compare_op!(Less, NUMERIC_TYPES, |a, b| a < b);
compare_op!(LessOrEqual, NUMERIC_TYPES, |a, b| a <= b);

logical_op!(And, |a, b| a && b);
logical_op!(Or, |a, b| a || b);
logical_op!(Xor, |a, b| a ^ b);

/// `condition ? x : y`, with all three operands broadcast together.
#[derive(Debug, Default)]
pub struct Where;

impl Operator for Where {
    fn name(&self) -> &'static str {
        "Where"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        check_attributes(self.name(), attributes, &[])
    }

    fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        let op = self.name();
        let cond = required(op, inputs, 0)?;
        let x = required(op, inputs, 1)?;
        let y = required(op, inputs, 2)?;
        let ty = same_type(op, x, y)?;

        let incompatible = |a: &FixedDimensions, b: &FixedDimensions| BroadcastError {
            a: a.clone(),
            b: b.clone(),
            cause: BroadcastCause::IncompatibleDimensions,
        };
        let dims = cond
            .dims()
            .broadcast(x.dims())
            .ok_or_else(|| incompatible(cond.dims(), x.dims()))?;
        let dims = dims
            .broadcast(y.dims())
            .ok_or_else(|| incompatible(&dims, y.dims()))?;
        let cond = cond.expand_to(&dims)?;
        let x = x.expand_to(&dims)?;
        let y = y.expand_to(&dims)?;

        fn select<T: TensorElemTypeExt>(
            cond: &Tensor,
            x: &Tensor,
            y: &Tensor,
        ) -> Result<Tensor, OpError> {
            let data = cond
                .as_slice::<bool>()?
                .iter()
                .zip(x.as_slice::<T>()?.iter().zip(y.as_slice::<T>()?))
                .map(|(&c, (&a, &b))| if c { a } else { b })
                .collect();
            Ok(Tensor::new(cond.dims().clone(), data))
        }

        Ok(vec![dispatch_all!(ty, T => select::<T>(&cond, &x, &y)?)])
    }

    fn min_inputs(&self) -> usize {
        3
    }

    fn max_inputs(&self) -> usize {
        3
    }

    fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
        vec![BOOL_TYPES, ALL_TYPES, ALL_TYPES]
    }
}
