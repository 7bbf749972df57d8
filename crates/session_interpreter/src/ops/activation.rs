use ndarray::Axis;
use tessera_core::{
    broadcast::unidirectional_broadcast,
    dispatch_float,
    node::Attribute,
    op_error::{normalize_axis, OpError},
    tensor::{FloatElem, Tensor, TensorElemType},
};

use super::binary::zip_map;
use crate::operator::{
    check_attributes, required, same_type, unknown_attribute, unsupported_type, Operator,
    FLOAT_TYPES,
};

#[derive(Debug)]
pub struct LeakyRelu {
    pub alpha: f32,
}

impl Default for LeakyRelu {
    fn default() -> Self {
        Self { alpha: 0.01 }
    }
}

impl Operator for LeakyRelu {
    fn name(&self) -> &'static str {
        "LeakyRelu"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        for attr in attributes {
            match attr.name.as_str() {
                "alpha" => self.alpha = attr.float()?,
                _ => return Err(unknown_attribute(self.name(), attr)),
            }
        }
        Ok(())
    }

    fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        let input = required(self.name(), inputs, 0)?;
        let alpha = self.alpha;
        let output = dispatch_float!(input.elem_ty(), T => {
            let alpha = alpha as T;
            input.map(|x: T| if x < 0.0 { x * alpha } else { x })?
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
        vec![FLOAT_TYPES]
    }
}

/// Leaky ReLU with a learned slope. The slope is broadcast onto `X`.
#[derive(Debug, Default)]
pub struct PRelu;

impl Operator for PRelu {
    fn name(&self) -> &'static str {
        "PRelu"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        check_attributes(self.name(), attributes, &[])
    }

    fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        let x = required(self.name(), inputs, 0)?;
        let slope = required(self.name(), inputs, 1)?;
        let ty = same_type(self.name(), x, slope)?;
        let (x, slope) = unidirectional_broadcast(x, slope)?;
        let output = dispatch_float!(ty, T => {
            zip_map(&x, &slope, |x: T, s: T| if x < 0.0 { x * s } else { x })?
        }, ty => return Err(unsupported_type(self.name(), ty)));
        Ok(vec![output])
    }

    fn min_inputs(&self) -> usize {
        2
    }

    fn max_inputs(&self) -> usize {
        2
    }

    fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
        vec![FLOAT_TYPES, FLOAT_TYPES]
    }
}

#[derive(Debug)]
pub struct Softmax {
    pub axis: i64,
}

impl Default for Softmax {
    fn default() -> Self {
        Self { axis: -1 }
    }
}

fn softmax<T: FloatElem>(input: &Tensor, axis: usize) -> Result<Tensor, OpError> {
    let mut output = input.view::<T>()?.to_owned();
    for mut lane in output.lanes_mut(Axis(axis)) {
        let max = lane.fold(T::neg_infinity(), |m, &v| m.max(v));
        lane.mapv_inplace(|v| (v - max).exp());
        let sum = lane.sum();
        lane.mapv_inplace(|v| v / sum);
    }
    Ok(Tensor::from_array(output))
}

impl Operator for Softmax {
    fn name(&self) -> &'static str {
        "Softmax"
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
        let input = required(self.name(), inputs, 0)?;
        let axis = normalize_axis(self.name(), self.axis, input.rank())?;
        let output = dispatch_float!(input.elem_ty(), T => softmax::<T>(input, axis)?,
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
        vec![FLOAT_TYPES]
    }
}
