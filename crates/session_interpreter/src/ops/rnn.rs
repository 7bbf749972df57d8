use tessera_core::{
    dispatch_float,
    node::Attribute,
    op_error::OpError,
    tensor::{FloatElem, Tensor, TensorElemType},
};

use super::recurrent::{
    affine, prepare, state_tensor, Activation, RecurrentAttrs, Sequence, INPUT_TYPES,
};
use crate::operator::{required, unknown_attribute, unsupported_type, Operator};

/// Simple recurrence `Ht = f(Xt·Wᵀ + Ht-1·Rᵀ + Wb + Rb)`. Outputs `Y` and `Y_h`.
#[derive(Debug, Default)]
pub struct Rnn {
    pub common: RecurrentAttrs,
}

impl Operator for Rnn {
    fn name(&self) -> &'static str {
        "RNN"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        for attr in attributes {
            if !self.common.parse(self.name(), attr)? {
                return Err(unknown_attribute(self.name(), attr));
            }
        }
        self.common.activations(self.name(), [Activation::Tanh])?;
        Ok(())
    }

    fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        let ty = required(self.name(), inputs, 0)?.elem_ty();
        dispatch_float!(ty, T => self.run::<T>(inputs),
            ty => Err(unsupported_type(self.name(), ty)))
    }

    fn min_inputs(&self) -> usize {
        3
    }

    fn max_inputs(&self) -> usize {
        6
    }

    fn max_outputs(&self) -> usize {
        2
    }

    fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
        INPUT_TYPES.to_vec()
    }
}

impl Rnn {
    fn run<T: FloatElem>(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        let [f] = self.common.activations(self.name(), [Activation::Tanh])?;
        let p = prepare::<T>(self.name(), &self.common, inputs, 1)?;

        let mut ht = p.h0.clone();
        let mut y = Sequence::new(p.seq_length(), p.batch_size(), p.hidden_size);

        for (t, xt) in p.x.outer_iter().enumerate() {
            let mut next = affine(&ht.view(), &p.r.view(), &p.rb.view());
            next += &affine(&xt, &p.w.view(), &p.wb.view());
            next.mapv_inplace(|v| f.apply(v));
            ht = next;
            y.record(t, &ht);
        }

        Ok(vec![y.into_tensor(), state_tensor(ht)])
    }
}
