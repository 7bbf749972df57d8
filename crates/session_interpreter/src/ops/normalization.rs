use ndarray::{ArrayView1, Axis, Zip};
use tessera_core::{
    dispatch_float,
    node::Attribute,
    op_error::OpError,
    tensor::{FloatElem, Tensor, TensorElemType},
};

use crate::operator::{
    required, same_type, unknown_attribute, unsupported_type, Operator, FLOAT_TYPES,
};

/// Inference-mode batch normalization over axis 1:
/// `Y = (X - mean) / sqrt(var + epsilon) * scale + B`.
#[derive(Debug)]
pub struct BatchNormalization {
    pub epsilon: f32,
}

impl Default for BatchNormalization {
    fn default() -> Self {
        Self { epsilon: 1e-5 }
    }
}

impl Operator for BatchNormalization {
    fn name(&self) -> &'static str {
        "BatchNormalization"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        for attr in attributes {
            match attr.name.as_str() {
                "epsilon" => self.epsilon = attr.float()?,
                // Only used when updating running statistics.
                "momentum" => {
                    attr.float()?;
                }
                "training_mode" => {
                    let training_mode = attr.int()?;
                    if training_mode != 0 {
                        return Err(OpError::unsupported_attr(
                            self.name(),
                            "training_mode",
                            training_mode,
                        ));
                    }
                }
                _ => return Err(unknown_attribute(self.name(), attr)),
            }
        }
        Ok(())
    }

    fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        let op = self.name();
        let x = required(op, inputs, 0)?;
        let params = (1..5)
            .map(|i| required(op, inputs, i))
            .collect::<Result<Vec<_>, _>>()?;
        for p in &params {
            same_type(op, x, p)?;
        }

        if x.rank() < 2 {
            return Err(OpError::invalid_shape(op, x.dims(), "expected at least [N, C]"));
        }
        let channels = x.dims()[1];
        if let Some(p) = params.iter().find(|p| p.dims().as_slice() != [channels]) {
            return Err(OpError::invalid_shape(
                op,
                p.dims(),
                format!("expected per-channel parameters of shape [{channels}]"),
            ));
        }

        let output = dispatch_float!(x.elem_ty(), T => {
            normalize::<T>(x, params[0], params[1], params[2], params[3], self.epsilon)?
        }, ty => return Err(unsupported_type(op, ty)));
        Ok(vec![output])
    }

    fn min_inputs(&self) -> usize {
        5
    }

    fn max_inputs(&self) -> usize {
        5
    }

    fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
        vec![FLOAT_TYPES; 5]
    }
}

fn normalize<T: FloatElem>(
    x: &Tensor,
    scale: &Tensor,
    bias: &Tensor,
    mean: &Tensor,
    var: &Tensor,
    epsilon: f32,
) -> Result<Tensor, OpError> {
    let epsilon = T::from_f64(epsilon as f64);
    fn vector<T: FloatElem>(t: &Tensor) -> Result<ArrayView1<'_, T>, OpError> {
        Ok(ArrayView1::from(t.as_slice::<T>()?))
    }
    let (scale, bias) = (vector::<T>(scale)?, vector::<T>(bias)?);
    let (mean, var) = (vector::<T>(mean)?, vector::<T>(var)?);

    let mut y = x.view::<T>()?.to_owned();
    for mut batch in y.outer_iter_mut() {
        Zip::from(batch.axis_iter_mut(Axis(0)))
            .and(&scale)
            .and(&bias)
            .and(&mean)
            .and(&var)
            .for_each(|mut channel, &s, &b, &m, &v| {
                let k = s / (v + epsilon).sqrt();
                channel.mapv_inplace(|x| (x - m) * k + b);
            });
    }
    Ok(Tensor::from_array(y))
}

#[test]
fn normalizes_per_channel() {
    let x = Tensor::new(vec![1, 2, 2].into(), vec![1.0f32, 3.0, 10.0, 20.0]);
    let scale = Tensor::new(vec![2].into(), vec![1.0f32, 2.0]);
    let bias = Tensor::new(vec![2].into(), vec![0.0f32, 1.0]);
    let mean = Tensor::new(vec![2].into(), vec![2.0f32, 15.0]);
    let var = Tensor::new(vec![2].into(), vec![1.0f32, 25.0]);
    let op = BatchNormalization { epsilon: 0.0 };
    let out = op
        .apply(&[Some(x), Some(scale), Some(bias), Some(mean), Some(var)])
        .unwrap();
    assert!(out[0].allclose(&[-1.0f32, 1.0, -1.0, 3.0]));
}
