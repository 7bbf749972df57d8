use ndarray::{s, Array2, ArrayView1, Zip};
use tessera_core::{
    dispatch_float,
    node::Attribute,
    op_error::OpError,
    tensor::{FloatElem, Tensor, TensorElemType},
};

use super::recurrent::{
    affine, initial_state, optional_vector, prepare, state_tensor, Activation, RecurrentAttrs,
    Sequence, INPUT_TYPES,
};
use crate::operator::{required, unknown_attribute, unsupported_type, Operator, FLOAT_TYPES};

const INPUT: usize = 0;
const OUTPUT: usize = 1;
const FORGET: usize = 2;
const CELL: usize = 3;

/// Long short-term memory. Outputs `Y`, `Y_h` and `Y_c`.
///
/// Gate order in `W`, `R` and `B` is input, output, forget, cell. Peephole
/// weights `P` are ordered input, output, forget.
#[derive(Debug, Default)]
pub struct Lstm {
    pub common: RecurrentAttrs,
}

const DEFAULT_ACTIVATIONS: [Activation; 3] =
    [Activation::Sigmoid, Activation::Tanh, Activation::Tanh];

impl Operator for Lstm {
    fn name(&self) -> &'static str {
        "LSTM"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        for attr in attributes {
            if self.common.parse(self.name(), attr)? {
                continue;
            }
            match attr.name.as_str() {
                "input_forget" => {
                    let input_forget = attr.int()?;
                    if input_forget != 0 {
                        return Err(OpError::unsupported_attr(
                            self.name(),
                            "input_forget",
                            input_forget,
                        ));
                    }
                }
                _ => return Err(unknown_attribute(self.name(), attr)),
            }
        }
        self.common.activations(self.name(), DEFAULT_ACTIVATIONS)?;
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
        8
    }

    fn max_outputs(&self) -> usize {
        3
    }

    fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
        let mut types = INPUT_TYPES.to_vec();
        types.extend([FLOAT_TYPES, FLOAT_TYPES]);
        types
    }
}

impl Lstm {
    fn run<T: FloatElem>(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        let [f, g, h_act] = self.common.activations(self.name(), DEFAULT_ACTIVATIONS)?;
        let p = prepare::<T>(self.name(), &self.common, inputs, 4)?;
        let h = p.hidden_size;
        let gate = |i: usize| i * h..(i + 1) * h;

        let c0 = initial_state::<T>(
            self.name(),
            inputs.get(6),
            "initial_c",
            p.batch_size(),
            h,
        )?;
        let peephole = optional_vector::<T>(self.name(), inputs.get(7), 3 * h)?;
        let p_i = peephole.slice(s![0..h]);
        let p_o = peephole.slice(s![h..2 * h]);
        let p_f = peephole.slice(s![2 * h..3 * h]);

        let mut ht = p.h0.clone();
        let mut ct = c0;
        let mut y = Sequence::new(p.seq_length(), p.batch_size(), h);

        for (t, xt) in p.x.outer_iter().enumerate() {
            let xw = affine(&xt, &p.w.view(), &p.wb.view());
            let pre = |i: usize| {
                let mut v = affine(&ht.view(), &p.r_gate(i), &p.rb_gate(i));
                v += &xw.slice(s![.., gate(i)]);
                v
            };

            let it = peephole_gate(pre(INPUT), &p_i, &ct, f);
            let ft = peephole_gate(pre(FORGET), &p_f, &ct, f);
            let mut cell = pre(CELL);
            cell.mapv_inplace(|v| g.apply(v));
            let out_pre = pre(OUTPUT);

            Zip::from(&mut ct)
                .and(&ft)
                .and(&it)
                .and(&cell)
                .for_each(|c, &forget, &input, &cand| *c = forget * *c + input * cand);

            let ot = peephole_gate(out_pre, &p_o, &ct, f);
            ht = &ot * &ct.mapv(|c| h_act.apply(c));
            y.record(t, &ht);
        }

        Ok(vec![y.into_tensor(), state_tensor(ht), state_tensor(ct)])
    }
}

/// `act(pre + peep ⊙ c)` with `peep` broadcast over the batch.
fn peephole_gate<T: FloatElem>(
    mut pre: Array2<T>,
    peep: &ArrayView1<'_, T>,
    c: &Array2<T>,
    act: Activation,
) -> Array2<T> {
    Zip::from(&mut pre)
        .and_broadcast(peep)
        .and(c)
        .for_each(|v, &p, &c| *v = act.apply(*v + p * c));
    pre
}
