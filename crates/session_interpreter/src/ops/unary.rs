use tessera_core::{
    dispatch_float, dispatch_signed,
    node::Attribute,
    op_error::OpError,
    tensor::{NumericElem, Tensor, TensorElemType},
};

use crate::operator::{
    check_attributes, required, unsupported_type, Operator, BOOL_TYPES, FLOAT_TYPES, SIGNED_TYPES,
};

macro_rules! unary_op {
    ($dispatch:ident, $constraints:expr, $($name:ident => |$x:ident| $body:expr),* $(,)?) => {
        $(
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
                    let input = required(self.name(), inputs, 0)?;
                    let output = $dispatch!(input.elem_ty(), T => input.map(|$x: T| $body)?,
                        ty => return Err(unsupported_type(self.name(), ty)));
                    Ok(vec![output])
                }

                fn min_inputs(&self) -> usize {
                    1
                }

                fn max_inputs(&self) -> usize {
                    1
                }

                fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
                    vec![$constraints]
                }
            }
        )*
    };
}

unary_op!(dispatch_float, FLOAT_TYPES,
    Acos => |x| x.acos(),
    Acosh => |x| x.acosh(),
    Asin => |x| x.asin(),
    Asinh => |x| x.asinh(),
    Atan => |x| x.atan(),
    Atanh => |x| x.atanh(),
    Ceil => |x| x.ceil(),
    Cos => |x| x.cos(),
    Cosh => |x| x.cosh(),
    Exp => |x| x.exp(),
    Floor => |x| x.floor(),
    Log => |x| x.ln(),
    Reciprocal => |x| 1.0 / x,
    Relu => |x| x.max(0.0),
    Sigmoid => |x| 1.0 / (1.0 + (-x).exp()),
    Sin => |x| x.sin(),
    Sinh => |x| x.sinh(),
    Softsign => |x| x / (1.0 + x.abs()),
    Sqrt => |x| x.sqrt(),
    Tan => |x| x.tan(),
    Tanh => |x| x.tanh(),
);

unary_op!(dispatch_signed, SIGNED_TYPES,
    Abs => |x| NumericElem::wrapping_abs(x),
    Neg => |x| NumericElem::wrapping_neg(x),
);

#[derive(Debug, Default)]
pub struct Not;

impl Operator for Not {
    fn name(&self) -> &'static str {
        "Not"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        check_attributes(self.name(), attributes, &[])
    }

    fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        let input = required(self.name(), inputs, 0)?;
        Ok(vec![input.map(|x: bool| !x)?])
    }

    fn min_inputs(&self) -> usize {
        1
    }

    fn max_inputs(&self) -> usize {
        1
    }

    fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
        vec![BOOL_TYPES]
    }
}

#[test]
fn signed_minimum_wraps() {
    let x = Tensor::new(vec![3].into(), vec![i32::MIN, -5, 7]);
    let abs = Abs.apply(&[Some(x.clone())]).unwrap();
    assert_eq!(abs[0].as_slice::<i32>().unwrap(), &[i32::MIN, 5, 7]);
    let neg = Neg.apply(&[Some(x)]).unwrap();
    assert_eq!(neg[0].as_slice::<i32>().unwrap(), &[i32::MIN, 5, -7]);
}
