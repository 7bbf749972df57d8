use ndarray::{Array2, Array3, ArrayView2, Axis, Ix2};
use tessera_core::{
    broadcast::{unidirectional_broadcast, BroadcastCause, BroadcastError},
    dispatch_numeric,
    fixed_dim::FixedDimensions,
    node::Attribute,
    op_error::OpError,
    tensor::{NumericElem, Tensor, TensorElemType},
};

use crate::operator::{
    check_attributes, required, same_type, unknown_attribute, unsupported_type, Operator,
    NUMERIC_TYPES,
};

/// Matrix product with numpy semantics.
///
/// A 1-D left operand is treated as a row vector and a 1-D right operand as a
/// column vector; the inserted axis is removed from the result. Leading (batch)
/// dimensions are broadcast multidirectionally while the trailing two are
/// multiplied as matrices.
#[derive(Debug, Default)]
pub struct MatMul;

impl Operator for MatMul {
    fn name(&self) -> &'static str {
        "MatMul"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        check_attributes(self.name(), attributes, &[])
    }

    fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        let a = required(self.name(), inputs, 0)?;
        let b = required(self.name(), inputs, 1)?;
        let ty = same_type(self.name(), a, b)?;
        let output = dispatch_numeric!(ty, T => matmul::<T>(a, b)?,
            ty => return Err(unsupported_type(self.name(), ty)));
        Ok(vec![output])
    }

    fn min_inputs(&self) -> usize {
        2
    }

    fn max_inputs(&self) -> usize {
        2
    }

    fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
        vec![NUMERIC_TYPES, NUMERIC_TYPES]
    }
}

/// Matrix product of `a` (m x k) and `b` (k x n). Integer products wrap on
/// overflow.
fn product<T: NumericElem>(a: ArrayView2<T>, b: ArrayView2<T>) -> Array2<T> {
    if T::get_type().is_float() {
        return a.dot(&b);
    }
    let mut c = Array2::zeros((a.nrows(), b.ncols()));
    for ((i, j), c) in c.indexed_iter_mut() {
        *c = a
            .row(i)
            .iter()
            .zip(b.column(j))
            .fold(T::zero(), |acc, (&x, &y)| acc.wrapping_add(x.wrapping_mul(y)));
    }
    c
}

fn matmul<T: NumericElem>(a: &Tensor, b: &Tensor) -> Result<Tensor, OpError> {
    const OP: &str = "MatMul";

    if a.rank() == 0 || b.rank() == 0 {
        return Err(OpError::invalid_input(
            OP,
            "operands must have at least one dimension",
        ));
    }

    // Promote vectors to matrices.
    let a_is_vec = a.rank() == 1;
    let b_is_vec = b.rank() == 1;
    let a = if a_is_vec {
        a.reshape(vec![1, a.dims()[0]])?
    } else {
        a.clone()
    };
    let b = if b_is_vec {
        b.reshape(vec![b.dims()[0], 1])?
    } else {
        b.clone()
    };

    let (a_batch, a_mat) = a.dims().split_at(a.rank() - 2);
    let (b_batch, b_mat) = b.dims().split_at(b.rank() - 2);
    let (m, k, n) = (a_mat[0], a_mat[1], b_mat[1]);
    if k != b_mat[0] {
        return Err(OpError::InvalidInputShape {
            op: OP,
            dims: b.dims().clone(),
            message: format!("inner dimension {} does not match {k}", b_mat[0]).into(),
        });
    }

    let a_batch = FixedDimensions::from(a_batch);
    let b_batch = FixedDimensions::from(b_batch);
    let batch = a_batch.broadcast(&b_batch).ok_or_else(|| BroadcastError {
        a: a.dims().clone(),
        b: b.dims().clone(),
        cause: BroadcastCause::IncompatibleDimensions,
    })?;
    let num_batches = batch.total_elems();

    let with_mat = |rows: usize, cols: usize| {
        let mut dims = batch.0.clone();
        dims.extend([rows, cols]);
        FixedDimensions::from(dims)
    };
    let a = a.expand_to(&with_mat(m, k))?;
    let b = b.expand_to(&with_mat(k, n))?;

    let shape_err = |_| OpError::invalid_input(OP, "operand is not contiguous");
    let a3 = a
        .view::<T>()?
        .into_shape((num_batches, m, k))
        .map_err(shape_err)?;
    let b3 = b
        .view::<T>()?
        .into_shape((num_batches, k, n))
        .map_err(shape_err)?;

    let mut output = Array3::<T>::zeros((num_batches, m, n));
    for i in 0..num_batches {
        let c = product(a3.index_axis(Axis(0), i), b3.index_axis(Axis(0), i));
        output.index_axis_mut(Axis(0), i).assign(&c);
    }

    let mut out_dims = batch.0;
    if !a_is_vec {
        out_dims.push(m);
    }
    if !b_is_vec {
        out_dims.push(n);
    }
    Ok(Tensor::from_array(output.into_dyn()).reshape(out_dims)?)
}

/// `Y = alpha * A' * B' + beta * C` where `A'`/`B'` are optionally transposed and
/// `C` is broadcast onto the product.
#[derive(Debug)]
pub struct Gemm {
    pub alpha: f32,
    pub beta: f32,
    pub trans_a: bool,
    pub trans_b: bool,
}

impl Default for Gemm {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
            trans_a: false,
            trans_b: false,
        }
    }
}

impl Operator for Gemm {
    fn name(&self) -> &'static str {
        "Gemm"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        for attr in attributes {
            match attr.name.as_str() {
                "alpha" => self.alpha = attr.float()?,
                "beta" => self.beta = attr.float()?,
                "transA" => self.trans_a = attr.int()? != 0,
                "transB" => self.trans_b = attr.int()? != 0,
                _ => return Err(unknown_attribute(self.name(), attr)),
            }
        }
        Ok(())
    }

    fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        let a = required(self.name(), inputs, 0)?;
        let b = required(self.name(), inputs, 1)?;
        let ty = same_type(self.name(), a, b)?;
        let c = match inputs.get(2).and_then(Option::as_ref) {
            Some(c) => {
                same_type(self.name(), a, c)?;
                Some(c)
            }
            None => None,
        };
        let output = dispatch_numeric!(ty, T => self.gemm::<T>(a, b, c)?,
            ty => return Err(unsupported_type(self.name(), ty)));
        Ok(vec![output])
    }

    fn min_inputs(&self) -> usize {
        2
    }

    fn max_inputs(&self) -> usize {
        3
    }

    fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
        vec![NUMERIC_TYPES, NUMERIC_TYPES, NUMERIC_TYPES]
    }
}

impl Gemm {
    fn gemm<T: NumericElem>(
        &self,
        a: &Tensor,
        b: &Tensor,
        c: Option<&Tensor>,
    ) -> Result<Tensor, OpError> {
        let matrix = |t: &Tensor| -> Result<Array2<T>, OpError> {
            let view = t.view::<T>()?;
            view.into_dimensionality::<Ix2>()
                .map(|v| v.to_owned())
                .map_err(|_| OpError::invalid_shape(self.name(), t.dims(), "expected a matrix"))
        };
        let a = matrix(a)?;
        let b = matrix(b)?;
        let a = if self.trans_a { a.reversed_axes() } else { a };
        let b = if self.trans_b { b.reversed_axes() } else { b };
        if a.ncols() != b.nrows() {
            return Err(OpError::invalid_input(
                self.name(),
                format!(
                    "cannot multiply {}x{} by {}x{}",
                    a.nrows(),
                    a.ncols(),
                    b.nrows(),
                    b.ncols()
                ),
            ));
        }

        let alpha = T::from_f64(self.alpha as f64);
        let beta = T::from_f64(self.beta as f64);
        let mut y = product(a.view(), b.view()).mapv(|v| v.wrapping_mul(alpha));

        if let Some(c) = c {
            let product = Tensor::zeros::<T>(FixedDimensions::from(y.shape()));
            let (_, c) = unidirectional_broadcast(&product, c)?;
            let c = c
                .view::<T>()?
                .into_dimensionality::<Ix2>()
                .map_err(|_| OpError::invalid_shape(self.name(), c.dims(), "expected a matrix"))?
                .to_owned();
            y.zip_mut_with(&c, |y, &c| *y = y.wrapping_add(c.wrapping_mul(beta)));
        }

        Ok(Tensor::from_array(y.into_dyn()))
    }
}
