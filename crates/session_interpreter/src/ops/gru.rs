use ndarray::{s, Zip};
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

const UPDATE: usize = 0;
const RESET: usize = 1;
const HIDDEN: usize = 2;

/// Gated recurrent unit. Outputs `Y` and `Y_h`.
///
/// Gate order in `W`, `R` and `B` is update (`z`), reset (`r`), hidden (`h`).
#[derive(Debug, Default)]
pub struct Gru {
    pub common: RecurrentAttrs,
    pub linear_before_reset: bool,
}

impl Operator for Gru {
    fn name(&self) -> &'static str {
        "GRU"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        for attr in attributes {
            if self.common.parse(self.name(), attr)? {
                continue;
            }
            match attr.name.as_str() {
                "linear_before_reset" => self.linear_before_reset = attr.int()? != 0,
                _ => return Err(unknown_attribute(self.name(), attr)),
            }
        }
        self.common
            .activations(self.name(), [Activation::Sigmoid, Activation::Tanh])?;
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

impl Gru {
    fn run<T: FloatElem>(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        let [f, g] = self
            .common
            .activations(self.name(), [Activation::Sigmoid, Activation::Tanh])?;
        let p = prepare::<T>(self.name(), &self.common, inputs, 3)?;
        let h = p.hidden_size;
        let gate = |i: usize| i * h..(i + 1) * h;

        let mut ht = p.h0.clone();
        let mut y = Sequence::new(p.seq_length(), p.batch_size(), h);

        for (t, xt) in p.x.outer_iter().enumerate() {
            let xw = affine(&xt, &p.w.view(), &p.wb.view());

            let mut z = affine(&ht.view(), &p.r_gate(UPDATE), &p.rb_gate(UPDATE));
            z += &xw.slice(s![.., gate(UPDATE)]);
            z.mapv_inplace(|v| f.apply(v));

            let mut r = affine(&ht.view(), &p.r_gate(RESET), &p.rb_gate(RESET));
            r += &xw.slice(s![.., gate(RESET)]);
            r.mapv_inplace(|v| f.apply(v));

            let mut candidate = if self.linear_before_reset {
                let mut hr = affine(&ht.view(), &p.r_gate(HIDDEN), &p.rb_gate(HIDDEN));
                hr *= &r;
                hr
            } else {
                let reset = &r * &ht;
                affine(&reset.view(), &p.r_gate(HIDDEN), &p.rb_gate(HIDDEN))
            };
            candidate += &xw.slice(s![.., gate(HIDDEN)]);
            candidate.mapv_inplace(|v| g.apply(v));

            Zip::from(&mut ht)
                .and(&z)
                .and(&candidate)
                .for_each(|h, &z, &c| *h = (T::one() - z) * c + z * *h);
            y.record(t, &ht);
        }

        Ok(vec![y.into_tensor(), state_tensor(ht)])
    }
}
