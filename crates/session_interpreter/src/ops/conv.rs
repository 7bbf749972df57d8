use ndarray::{s, Array1, Array4, ArrayView4, Axis, Ix4, Zip};
use tessera_core::{
    dispatch_float,
    fixed_dim::FixedDimensions,
    node::Attribute,
    op_error::OpError,
    tensor::{FloatElem, Tensor, TensorElemType},
};

use crate::operator::{
    required, same_type, unknown_attribute, unsupported_type, Operator, FLOAT_TYPES,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoPad {
    NotSet,
    SameUpper,
    SameLower,
    Valid,
}

/// 1-D and 2-D convolution over `N x C x spatial...` inputs.
///
/// A 1-D convolution is computed as a 2-D one with a trailing unit axis.
#[derive(Debug)]
pub struct Conv {
    pub auto_pad: AutoPad,
    pub dilations: Vec<i64>,
    pub kernel_shape: Vec<i64>,
    pub pads: Vec<i64>,
    pub strides: Vec<i64>,
}

impl Default for Conv {
    fn default() -> Self {
        Self {
            auto_pad: AutoPad::NotSet,
            dilations: vec![],
            kernel_shape: vec![],
            pads: vec![],
            strides: vec![],
        }
    }
}

/// Fully resolved 2-D geometry.
#[derive(Debug, PartialEq, Eq)]
struct Geometry {
    kernel: [usize; 2],
    dilations: [usize; 2],
    strides: [usize; 2],
    /// `[h_begin, w_begin, h_end, w_end]`
    pads: [usize; 4],
}

impl Operator for Conv {
    fn name(&self) -> &'static str {
        "Conv"
    }

    fn init(&mut self, attributes: &[Attribute]) -> Result<(), OpError> {
        for attr in attributes {
            match attr.name.as_str() {
                "auto_pad" => {
                    self.auto_pad = match attr.string()? {
                        "NOTSET" => AutoPad::NotSet,
                        "SAME_UPPER" => AutoPad::SameUpper,
                        "SAME_LOWER" => AutoPad::SameLower,
                        "VALID" => AutoPad::Valid,
                        other => {
                            return Err(OpError::unsupported_attr(self.name(), "auto_pad", other))
                        }
                    }
                }
                "dilations" => self.dilations = attr.ints()?.to_vec(),
                "group" => {
                    let group = attr.int()?;
                    if group != 1 {
                        return Err(OpError::unsupported_attr(self.name(), "group", group));
                    }
                }
                "kernel_shape" => self.kernel_shape = attr.ints()?.to_vec(),
                "pads" => self.pads = attr.ints()?.to_vec(),
                "strides" => self.strides = attr.ints()?.to_vec(),
                _ => return Err(unknown_attribute(self.name(), attr)),
            }
        }
        Ok(())
    }

    fn apply(&self, inputs: &[Option<Tensor>]) -> Result<Vec<Tensor>, OpError> {
        let x = required(self.name(), inputs, 0)?;
        let w = required(self.name(), inputs, 1)?;
        let b = inputs.get(2).and_then(Option::as_ref);
        let ty = same_type(self.name(), x, w)?;
        if let Some(b) = b {
            same_type(self.name(), x, b)?;
        }

        if !matches!(x.rank(), 3 | 4) {
            return Err(OpError::UnsupportedInput {
                op: self.name(),
                message: format!(
                    "only 1-D and 2-D convolution is supported, got rank {}",
                    x.rank()
                )
                .into(),
            });
        }
        if w.rank() != x.rank() {
            return Err(OpError::invalid_shape(
                self.name(),
                w.dims(),
                format!("kernel rank must equal input rank {}", x.rank()),
            ));
        }
        if w.dims()[1] != x.dims()[1] {
            return Err(OpError::invalid_shape(
                self.name(),
                w.dims(),
                format!("kernel expects {} channels but input has {}", w.dims()[1], x.dims()[1]),
            ));
        }
        if let Some(b) = b {
            if b.dims().as_slice() != [w.dims()[0]] {
                return Err(OpError::invalid_shape(
                    self.name(),
                    b.dims(),
                    format!("bias must have shape [{}]", w.dims()[0]),
                ));
            }
        }

        let is_1d = x.rank() == 3;
        let (x, w) = if is_1d {
            let mut xd = x.dims().0.clone();
            xd.push(1);
            let mut wd = w.dims().0.clone();
            wd.push(1);
            (x.reshape(xd)?, w.reshape(wd)?)
        } else {
            (x.clone(), w.clone())
        };

        let geometry = self.geometry(x.dims(), w.dims(), is_1d)?;
        let output = dispatch_float!(ty, T => conv2d::<T>(&x, &w, b, &geometry)?,
            ty => return Err(unsupported_type(self.name(), ty)));

        if is_1d {
            let mut dims = output.dims().0.clone();
            dims.pop();
            return Ok(vec![output.reshape(dims)?]);
        }
        Ok(vec![output])
    }

    fn min_inputs(&self) -> usize {
        2
    }

    fn max_inputs(&self) -> usize {
        3
    }

    fn input_type_constraints(&self) -> Vec<&'static [TensorElemType]> {
        vec![FLOAT_TYPES, FLOAT_TYPES, FLOAT_TYPES]
    }
}

impl Conv {
    /// Resolves defaults, lifts 1-D attributes to 2-D and computes padding.
    /// `x` and `w` are already rank 4.
    fn geometry(&self, x: &[usize], w: &[usize], is_1d: bool) -> Result<Geometry, OpError> {
        let spatial = if is_1d { 1 } else { 2 };
        let per_axis = |name: &'static str, values: &[i64], default: i64| {
            let values = if values.is_empty() {
                vec![default; spatial]
            } else {
                values.to_vec()
            };
            if values.len() != spatial || values.iter().any(|&v| v < 1) {
                return Err(OpError::unsupported_attr(self.name(), name, format!("{values:?}")));
            }
            let mut out = [1usize; 2];
            for (o, v) in out.iter_mut().zip(values) {
                *o = v as usize;
            }
            Ok(out)
        };

        let dilations = per_axis("dilations", &self.dilations, 1)?;
        let strides = per_axis("strides", &self.strides, 1)?;
        let kernel = [w[2], w[3]];
        if kernel.contains(&0) {
            return Err(OpError::invalid_shape(
                self.name(),
                &FixedDimensions::from(w),
                "kernel has an empty spatial axis",
            ));
        }
        if !self.kernel_shape.is_empty() {
            let declared = per_axis("kernel_shape", &self.kernel_shape, 1)?;
            if declared != kernel {
                return Err(OpError::invalid_shape(
                    self.name(),
                    &FixedDimensions::from(w),
                    format!("kernel_shape {:?} does not match the kernel", self.kernel_shape),
                ));
            }
        }

        let dilated = [
            kernel[0] + (kernel[0] - 1) * (dilations[0] - 1),
            kernel[1] + (kernel[1] - 1) * (dilations[1] - 1),
        ];

        let pads = match self.auto_pad {
            AutoPad::NotSet => match self.pads.len() {
                0 => [0; 4],
                n if n == spatial * 2 && self.pads.iter().all(|&p| p >= 0) => {
                    let p: Vec<usize> = self.pads.iter().map(|&p| p as usize).collect();
                    if is_1d {
                        [p[0], 0, p[1], 0]
                    } else {
                        [p[0], p[1], p[2], p[3]]
                    }
                }
                _ => {
                    return Err(OpError::unsupported_attr(
                        self.name(),
                        "pads",
                        format!("{:?}", self.pads),
                    ))
                }
            },
            AutoPad::Valid => [0; 4],
            AutoPad::SameUpper | AutoPad::SameLower => {
                let mut pads = [0; 4];
                for axis in 0..2 {
                    let input = x[axis + 2];
                    let stride = strides[axis];
                    let out = (input + stride - 1) / stride;
                    let total = ((out.max(1) - 1) * stride + dilated[axis]).saturating_sub(input);
                    let small = total / 2;
                    let (begin, end) = if self.auto_pad == AutoPad::SameUpper {
                        (small, total - small)
                    } else {
                        (total - small, small)
                    };
                    pads[axis] = begin;
                    pads[axis + 2] = end;
                }
                pads
            }
        };

        Ok(Geometry {
            kernel,
            dilations,
            strides,
            pads,
        })
    }
}

/// Inserts `dilation - 1` zeros between neighbouring kernel taps.
fn dilate<T: FloatElem>(w: ArrayView4<T>, dilations: [usize; 2]) -> Array4<T> {
    if dilations == [1, 1] {
        return w.to_owned();
    }
    let (m, c, kh, kw) = w.dim();
    let dh = kh + (kh - 1) * (dilations[0] - 1);
    let dw = kw + (kw - 1) * (dilations[1] - 1);
    let mut out = Array4::<T>::zeros((m, c, dh, dw));
    out.slice_mut(s![.., .., ..;dilations[0], ..;dilations[1]]).assign(&w);
    out
}

fn conv2d<T: FloatElem>(
    x: &Tensor,
    w: &Tensor,
    b: Option<&Tensor>,
    geometry: &Geometry,
) -> Result<Tensor, OpError> {
    const OP: &str = "Conv";
    let not_4d = |t: &Tensor| OpError::invalid_shape(OP, t.dims(), "expected rank 4");

    let x4 = x
        .view::<T>()?
        .into_dimensionality::<Ix4>()
        .map_err(|_| not_4d(x))?;
    let w4 = w
        .view::<T>()?
        .into_dimensionality::<Ix4>()
        .map_err(|_| not_4d(w))?;
    let kernel = dilate(w4, geometry.dilations);

    let (n, c, h, wd) = x4.dim();
    let (m, _, kh, kw) = kernel.dim();
    let [pt, pl, pb, pr] = geometry.pads;
    let (hp, wp) = (h + pt + pb, wd + pl + pr);
    if hp < kh || wp < kw {
        return Err(OpError::invalid_shape(
            OP,
            x.dims(),
            format!(
                "padded input {hp}x{wp} is smaller than the kernel {kh}x{kw} ({:?} before dilation)",
                geometry.kernel
            ),
        ));
    }

    let mut padded = Array4::<T>::zeros((n, c, hp, wp));
    padded
        .slice_mut(s![.., .., pt..pt + h, pl..pl + wd])
        .assign(&x4);

    let [sh, sw] = geometry.strides;
    let (oh, ow) = ((hp - kh) / sh + 1, (wp - kw) / sw + 1);
    let mut output = Array4::<T>::zeros((n, m, oh, ow));

    for batch in 0..n {
        for (kernel_idx, filter) in kernel.outer_iter().enumerate() {
            for row in 0..oh {
                for col in 0..ow {
                    let (top, left) = (row * sh, col * sw);
                    let field = padded.slice(s![batch, .., top..top + kh, left..left + kw]);
                    output[[batch, kernel_idx, row, col]] = Zip::from(&field)
                        .and(&filter)
                        .fold(T::zero(), |acc, &v, &k| acc + v * k);
                }
            }
        }
    }

    if let Some(b) = b {
        let bias = Array1::from(b.to_vec::<T>()?);
        for (mut channel, &bias) in output.axis_iter_mut(Axis(1)).zip(bias.iter()) {
            channel.mapv_inplace(|v| v + bias);
        }
    }

    Ok(Tensor::from_array(output.into_dyn()))
}

#[test]
fn same_upper_and_lower_split_odd_padding() {
    let conv = Conv {
        auto_pad: AutoPad::SameUpper,
        strides: vec![2, 2],
        ..Conv::default()
    };
    // in=4, stride=2, k=2: out=2, total=(2-1)*2+2-4=0
    let g = conv.geometry(&[1, 1, 4, 4], &[1, 1, 2, 2], false).unwrap();
    assert_eq!(g.pads, [0, 0, 0, 0]);

    // in=5, stride=1, k=4: total=3
    let conv = Conv {
        auto_pad: AutoPad::SameUpper,
        ..Conv::default()
    };
    let g = conv.geometry(&[1, 1, 5, 5], &[1, 1, 4, 4], false).unwrap();
    assert_eq!(g.pads, [1, 1, 2, 2]);
    let conv = Conv {
        auto_pad: AutoPad::SameLower,
        ..Conv::default()
    };
    let g = conv.geometry(&[1, 1, 5, 5], &[1, 1, 4, 4], false).unwrap();
    assert_eq!(g.pads, [2, 2, 1, 1]);
}

#[test]
fn one_dimensional_attributes_are_lifted() {
    let conv = Conv {
        pads: vec![1, 2],
        strides: vec![3],
        dilations: vec![2],
        ..Conv::default()
    };
    let g = conv.geometry(&[1, 1, 10, 1], &[1, 1, 3, 1], true).unwrap();
    assert_eq!(
        g,
        Geometry {
            kernel: [3, 1],
            dilations: [2, 1],
            strides: [3, 1],
            pads: [1, 0, 2, 0],
        }
    );
}

#[test]
fn dilation_inserts_zero_taps() {
    let w = ndarray::Array4::from_shape_vec((1, 1, 2, 2), vec![1.0f32, 2.0, 3.0, 4.0]).unwrap();
    let d = dilate(w.view(), [2, 2]);
    assert_eq!(d.dim(), (1, 1, 3, 3));
    assert_eq!(
        d.iter().copied().collect::<Vec<_>>(),
        vec![1.0, 0.0, 2.0, 0.0, 0.0, 0.0, 3.0, 0.0, 4.0]
    );
}
