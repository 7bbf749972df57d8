use tessera_core::{
    dispatch_all,
    fixed_dim::FixedDimensions,
    node::Attribute,
    op_error::OpError,
    tensor::{Tensor, TensorElemType, TensorElemTypeExt},
};

use crate::operator::{required, unknown_attribute, Operator, ALL_TYPES};

/// Produces the tensor carried by its single value attribute.
#[derive(Debug, Default)]
pub struct Constant {
    pub value: Option<Tensor>,
}

impl Operator for Constant {
    fn name(&self) -> &'static str {
        "Constant"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        if attributes.len() != 1 {
            return Err(OpError::InvalidAttributeCount {
                op: self.name(),
                message: format!(
                    "expected exactly one value attribute but got {}",
                    attributes.len()
                )
                .into(),
            });
        }

        let attr = &attributes[0];
        let value = match attr.name.as_str() {
            "value" => attr.tensor()?.clone(),
            "value_float" => Tensor::scalar(attr.float()?),
            "value_floats" => {
                let floats = attr.floats()?.to_vec();
                Tensor::new(vec![floats.len()].into(), floats)
            }
            "value_int" => Tensor::scalar(attr.int()?),
            "value_ints" => {
                let ints = attr.ints()?.to_vec();
                Tensor::new(vec![ints.len()].into(), ints)
            }
            "sparse_value" | "value_string" | "value_strings" => {
                return Err(OpError::unsupported_attr(
                    self.name(),
                    "value",
                    format!("{} is not supported", attr.name),
                ))
            }
            _ => return Err(unknown_attribute(self.name(), attr)),
        };
        self.value = Some(value);
        Ok(())
    }

    fn apply(&self, _inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        match &self.value {
            Some(value) => Ok(vec![value.clone()]),
            None => Err(OpError::InvalidAttributeCount {
                op: self.name(),
                message: "no value attribute".into(),
            }),
        }
    }

    fn min_inputs(&self) -> usize {
        0
    }

    fn max_inputs(&self) -> usize {
        0
    }

    fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
        vec![]
    }
}

/// Fills a tensor of the given shape with a single value (`0.0f32` by default).
#[derive(Debug)]
pub struct ConstantOfShape {
    pub value: Tensor,
}

impl Default for ConstantOfShape {
    fn default() -> Self {
        Self {
            value: Tensor::scalar(0.0f32),
        }
    }
}

impl Operator for ConstantOfShape {
    fn name(&self) -> &'static str {
        "ConstantOfShape"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        for attr in attributes {
            match attr.name.as_str() {
                "value" => {
                    let value = attr.tensor()?;
                    if value.len() != 1 {
                        return Err(OpError::unsupported_attr(
                            self.name(),
                            "value",
                            format!("tensor of shape {} (expected one element)", value.dims()),
                        ));
                    }
                    self.value = value.clone();
                }
                _ => return Err(unknown_attribute(self.name(), attr)),
            }
        }
        Ok(())
    }

    fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        let shape = required(self.name(), inputs, 0)?.to_vec::<i64>()?;
        if let Some(&d) = shape.iter().find(|&&d| d < 0) {
            return Err(OpError::invalid_input(
                self.name(),
                format!("invalid dimension {d}"),
            ));
        }
        let dims = FixedDimensions::from_i64(&shape);

        fn fill<T: TensorElemTypeExt>(
            value: &Tensor,
            dims: FixedDimensions,
        ) -> Result<Tensor, OpError> {
            Ok(Tensor::full(dims, value.as_slice::<T>()?[0]))
        }

        let output = dispatch_all!(self.value.elem_ty(), T => fill::<T>(&self.value, dims)?);
        Ok(vec![output])
    }

    fn min_inputs(&self) -> usize {
        1
    }

    fn max_inputs(&self) -> usize {
        1
    }

    fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
        vec![&[TensorElemType::I64]]
    }
}

/// Converts element types. Every conversion goes through `f64`, so integers
/// wider than 53 bits may lose precision.
#[derive(Debug, Default)]
pub struct Cast {
    pub to: Option<TensorElemType>,
}

impl Operator for Cast {
    fn name(&self) -> &'static str {
        "Cast"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        if attributes.len() != 1 {
            return Err(OpError::InvalidAttributeCount {
                op: self.name(),
                message: format!("expected only 'to' but got {} attributes", attributes.len())
                    .into(),
            });
        }
        let attr = &attributes[0];
        match attr.name.as_str() {
            "to" => {
                let code = attr.int()?;
                let to = i32::try_from(code)
                    .ok()
                    .and_then(TensorElemType::from_onnx_data_type)
                    .ok_or_else(|| OpError::unsupported_attr(self.name(), "to", code))?;
                self.to = Some(to);
            }
            _ => return Err(unknown_attribute(self.name(), attr)),
        }
        Ok(())
    }

    fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        let input = required(self.name(), inputs, 0)?;
        let to = self.to.ok_or(OpError::InvalidAttributeCount {
            op: self.name(),
            message: "missing 'to'".into(),
        })?;
        if input.elem_ty() == to {
            return Ok(vec![input.clone()]);
        }

        let output = dispatch_all!(input.elem_ty(), S => {
            dispatch_all!(to, D => input.map(|x: S| D::from_f64(x.as_f64()))?)
        });
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

#[test]
fn constant_requires_exactly_one_value() {
    use tessera_core::node::AttributeValue;

    let mut op = Constant::default();
    assert!(matches!(
        op.init(&[]),
        Err(OpError::InvalidAttributeCount { op: "Constant", .. })
    ));
    let attrs = [
        Attribute::new("value_int", AttributeValue::Int(1)),
        Attribute::new("value_float", AttributeValue::Float(1.0)),
    ];
    assert!(op.init(&attrs).is_err());

    op.init(&attrs[..1]).unwrap();
    let out = op.apply(&[]).unwrap();
    assert_eq!(out[0].elem_ty(), TensorElemType::I64);
    assert_eq!(out[0].as_slice::<i64>().unwrap(), &[1]);
}

#[test]
fn constant_of_shape_defaults_to_f32_zero() {
    let shape = Tensor::new(vec![2].into(), vec![2i64, 3]);
    let out = ConstantOfShape::default().apply(&[Some(shape)]).unwrap();
    assert_eq!(out[0].dims().as_slice(), &[2, 3]);
    assert_eq!(out[0].as_slice::<f32>().unwrap(), &[0.0; 6]);
}

#[test]
fn cast_between_types() {
    use tessera_core::node::AttributeValue;

    let mut op = Cast::default();
    op.init(&[Attribute::new("to", AttributeValue::Int(7))]).unwrap();
    let x = Tensor::new(vec![3].into(), vec![1.7f32, -2.2, 0.0]);
    let out = op.apply(&[Some(x)]).unwrap();
    assert_eq!(out[0].as_slice::<i64>().unwrap(), &[1, -2, 0]);

    let mut op = Cast::default();
    op.init(&[Attribute::new("to", AttributeValue::Int(9))]).unwrap();
    let x = Tensor::new(vec![3].into(), vec![2i32, 0, -1]);
    let out = op.apply(&[Some(x)]).unwrap();
    assert_eq!(out[0].as_slice::<bool>().unwrap(), &[true, false, true]);

    assert!(Cast::default()
        .init(&[Attribute::new("to", AttributeValue::Int(8))])
        .is_err());
}
