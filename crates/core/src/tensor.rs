use std::{cell::RefCell, fmt, sync::Arc};

use crate::{
    dim::Dimensions,
    fixed_dim::{FixedDimension, FixedDimensions},
};
use ndarray::{ArrayD, ArrayViewD, IxDyn, LinalgScalar, NdFloat};
use rand::{distributions::Standard, prelude::Distribution, rngs::StdRng, Rng, SeedableRng};
use thiserror::Error;

thread_local!(static RNG: RefCell<StdRng> = RefCell::new(StdRng::from_entropy()));

/// N-dimensional array with a type-tagged, reference-counted buffer.
///
/// Cloning a `Tensor` is cheap and shares the buffer. Nothing mutates a buffer
/// in place; operators always allocate their outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    dims: FixedDimensions,
    data: Arc<TensorData>,
}

/// Flat element buffer of a [`Tensor`], in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    Bool(Vec<bool>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// Represents a type and shape of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypedShape {
    pub dims: Dimensions,
    pub elem_ty: TensorElemType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TensorElemType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TensorError {
    #[error("Tensor of shape {dims} needs {expected} elements but got {actual}")]
    ElemCount {
        dims: FixedDimensions,
        expected: usize,
        actual: usize,
    },

    #[error("Expected tensor of type {expected:?} but found {actual:?}")]
    TypeMismatch {
        expected: TensorElemType,
        actual: TensorElemType,
    },

    #[error("Cannot reshape tensor of shape {from} into {to}")]
    Reshape {
        from: FixedDimensions,
        to: FixedDimensions,
    },

    #[error("Cannot expand tensor of shape {from} to {to}")]
    Expand {
        from: FixedDimensions,
        to: FixedDimensions,
    },
}

pub trait TensorElemTypeExt:
    Copy + PartialEq + PartialOrd + Default + fmt::Debug + Send + Sync + 'static
{
    fn get_type() -> TensorElemType;
    fn close(a: Self, b: Self) -> bool;
    fn into_data(data: Vec<Self>) -> TensorData;
    fn from_data(data: &TensorData) -> Option<&[Self]>;
    /// Lossy conversion used by `Cast` and by float attributes applied to integer tensors.
    fn as_f64(self) -> f64;
    fn from_f64(x: f64) -> Self;
}

/// Element types supporting arithmetic and matrix products.
///
/// Integer arithmetic wraps on overflow. Division returns `None` where it is
/// undefined for integers: a zero divisor, or `MIN / -1`.
pub trait NumericElem: TensorElemTypeExt + LinalgScalar {
    fn wrapping_add(self, rhs: Self) -> Self;
    fn wrapping_sub(self, rhs: Self) -> Self;
    fn wrapping_mul(self, rhs: Self) -> Self;
    fn checked_div(self, rhs: Self) -> Option<Self>;
    fn wrapping_neg(self) -> Self;
    fn wrapping_abs(self) -> Self;
}

macro_rules! impl_int_numeric {
    ($($ty:ty => |$x:ident| $abs:expr),*) => {
        $(impl NumericElem for $ty {
            fn wrapping_add(self, rhs: Self) -> Self {
                <$ty>::wrapping_add(self, rhs)
            }

            fn wrapping_sub(self, rhs: Self) -> Self {
                <$ty>::wrapping_sub(self, rhs)
            }

            fn wrapping_mul(self, rhs: Self) -> Self {
                <$ty>::wrapping_mul(self, rhs)
            }

            fn checked_div(self, rhs: Self) -> Option<Self> {
                <$ty>::checked_div(self, rhs)
            }

            fn wrapping_neg(self) -> Self {
                <$ty>::wrapping_neg(self)
            }

            fn wrapping_abs(self) -> Self {
                let $x = self;
                $abs
            }
        })*
    };
}

impl_int_numeric!(
    i8 => |x| x.wrapping_abs(),
    i16 => |x| x.wrapping_abs(),
    i32 => |x| x.wrapping_abs(),
    i64 => |x| x.wrapping_abs(),
    u8 => |x| x,
    u16 => |x| x,
    u32 => |x| x,
    u64 => |x| x
);

macro_rules! impl_float_numeric {
    ($($ty:ty),*) => {
        $(impl NumericElem for $ty {
            fn wrapping_add(self, rhs: Self) -> Self {
                self + rhs
            }

            fn wrapping_sub(self, rhs: Self) -> Self {
                self - rhs
            }

            fn wrapping_mul(self, rhs: Self) -> Self {
                self * rhs
            }

            fn checked_div(self, rhs: Self) -> Option<Self> {
                Some(self / rhs)
            }

            fn wrapping_neg(self) -> Self {
                -self
            }

            fn wrapping_abs(self) -> Self {
                self.abs()
            }
        })*
    };
}

impl_float_numeric!(f32, f64);

/// `f32` and `f64`.
pub trait FloatElem: NumericElem + NdFloat {}

impl<T: NumericElem + NdFloat> FloatElem for T {}

impl Tensor {
    /// Creates a tensor. `data.len()` must equal the number of elements `dims` describes.
    pub fn new<T: TensorElemTypeExt>(dims: FixedDimensions, data: Vec<T>) -> Self {
        assert_eq!(
            dims.total_elems(),
            data.len(),
            "element count does not match shape {dims}"
        );
        Self {
            dims,
            data: Arc::new(T::into_data(data)),
        }
    }

    pub fn try_new<T: TensorElemTypeExt>(
        dims: FixedDimensions,
        data: Vec<T>,
    ) -> Result<Self, TensorError> {
        if dims.total_elems() != data.len() {
            return Err(TensorError::ElemCount {
                expected: dims.total_elems(),
                actual: data.len(),
                dims,
            });
        }
        Ok(Self::new(dims, data))
    }

    pub fn scalar<T: TensorElemTypeExt>(value: T) -> Self {
        Self::new(FixedDimensions::default(), vec![value])
    }

    pub fn full<T: TensorElemTypeExt>(dims: FixedDimensions, value: T) -> Self {
        let total_elems = dims.total_elems();
        Self::new(dims, vec![value; total_elems])
    }

    pub fn zeros<T: TensorElemTypeExt>(dims: FixedDimensions) -> Self {
        Self::full(dims, T::default())
    }

    pub fn from_array<T: TensorElemTypeExt>(array: ArrayD<T>) -> Self {
        let dims = FixedDimensions::from(array.shape());
        let data = if array.is_standard_layout() {
            array.as_slice().map_or_else(|| array.iter().copied().collect(), <[T]>::to_vec)
        } else {
            array.iter().copied().collect()
        };
        Self::new(dims, data)
    }

    pub fn rand<T>(dims: FixedDimensions) -> Self
    where
        T: TensorElemTypeExt,
        Standard: Distribution<T>,
    {
        let total_elems = dims.total_elems();
        Self::new(
            dims,
            RNG.with(|r| {
                (&mut *r.borrow_mut())
                    .sample_iter(Standard)
                    .take(total_elems)
                    .collect::<Vec<T>>()
            }),
        )
    }

    pub fn rand_of_type(ty: TensorElemType, dims: FixedDimensions) -> Self {
        crate::dispatch_all!(ty, T => Self::rand::<T>(dims))
    }

    pub fn seed_rng_from_u64(seed: u64) {
        RNG.with(|r| *r.borrow_mut() = StdRng::seed_from_u64(seed));
    }

    pub fn dims(&self) -> &FixedDimensions {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.dims.total_elems()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fixed_dims<const N: usize>(&self) -> [FixedDimension; N] {
        self.dims.to_fixed_dims()
    }

    pub fn strides(&self) -> FixedDimensions {
        self.dims.strides()
    }

    pub fn elem_ty(&self) -> TensorElemType {
        match &*self.data {
            TensorData::Bool(_) => TensorElemType::Bool,
            TensorData::I8(_) => TensorElemType::I8,
            TensorData::I16(_) => TensorElemType::I16,
            TensorData::I32(_) => TensorElemType::I32,
            TensorData::I64(_) => TensorElemType::I64,
            TensorData::U8(_) => TensorElemType::U8,
            TensorData::U16(_) => TensorElemType::U16,
            TensorData::U32(_) => TensorElemType::U32,
            TensorData::U64(_) => TensorElemType::U64,
            TensorData::F32(_) => TensorElemType::F32,
            TensorData::F64(_) => TensorElemType::F64,
        }
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn as_slice<T: TensorElemTypeExt>(&self) -> Result<&[T], TensorError> {
        T::from_data(&self.data).ok_or(TensorError::TypeMismatch {
            expected: T::get_type(),
            actual: self.elem_ty(),
        })
    }

    pub fn to_vec<T: TensorElemTypeExt>(&self) -> Result<Vec<T>, TensorError> {
        self.as_slice().map(<[T]>::to_vec)
    }

    pub fn view<T: TensorElemTypeExt>(&self) -> Result<ArrayViewD<'_, T>, TensorError> {
        let data = self.as_slice::<T>()?;
        ArrayViewD::from_shape(IxDyn(self.dims.as_slice()), data).map_err(|_| {
            TensorError::ElemCount {
                dims: self.dims.clone(),
                expected: self.dims.total_elems(),
                actual: data.len(),
            }
        })
    }

    /// Returns a tensor sharing this buffer under a new shape.
    pub fn reshape(&self, dims: impl Into<FixedDimensions>) -> Result<Self, TensorError> {
        let dims = dims.into();
        if dims.total_elems() != self.len() {
            return Err(TensorError::Reshape {
                from: self.dims.clone(),
                to: dims,
            });
        }
        Ok(Self {
            dims,
            data: self.data.clone(),
        })
    }

    /// Materializes this tensor broadcast to `dims`.
    pub fn expand_to(&self, dims: &FixedDimensions) -> Result<Self, TensorError> {
        if &self.dims == dims {
            return Ok(self.clone());
        }

        fn expand<T: TensorElemTypeExt>(
            tensor: &Tensor,
            dims: &FixedDimensions,
        ) -> Result<Tensor, TensorError> {
            let view = tensor.view::<T>()?;
            let expanded = view
                .broadcast(IxDyn(dims.as_slice()))
                .ok_or_else(|| TensorError::Expand {
                    from: tensor.dims.clone(),
                    to: dims.clone(),
                })?;
            Ok(Tensor::new(dims.clone(), expanded.iter().copied().collect()))
        }

        crate::dispatch_all!(self.elem_ty(), T => expand::<T>(self, dims))
    }

    /// Applies `f` to every element.
    pub fn map<T, U>(&self, f: impl Fn(T) -> U) -> Result<Self, TensorError>
    where
        T: TensorElemTypeExt,
        U: TensorElemTypeExt,
    {
        let data = self.as_slice::<T>()?.iter().map(|&x| f(x)).collect();
        Ok(Self::new(self.dims.clone(), data))
    }

    pub fn allclose<T: TensorElemTypeExt>(&self, other: &[T]) -> bool {
        let Ok(x) = self.as_slice::<T>() else {
            return false;
        };
        if x.len() != other.len() {
            return false;
        }

        x.iter().zip(other.iter()).all(|(&x, &y)| T::close(x, y))
    }

    pub fn verify(&self) -> bool {
        let len = crate::dispatch_all!(self.elem_ty(), T => self.as_slice::<T>().map_or(0, <[T]>::len));
        len == self.dims.total_elems()
    }
}

impl TypedShape {
    pub fn new(dims: impl Into<Dimensions>, elem_ty: TensorElemType) -> Self {
        Self {
            dims: dims.into(),
            elem_ty,
        }
    }
}

impl TensorElemType {
    pub fn size(&self) -> usize {
        match self {
            TensorElemType::Bool | TensorElemType::I8 | TensorElemType::U8 => 1,
            TensorElemType::I16 | TensorElemType::U16 => 2,
            TensorElemType::I32 | TensorElemType::U32 | TensorElemType::F32 => 4,
            TensorElemType::I64 | TensorElemType::U64 | TensorElemType::F64 => 8,
        }
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Self::Bool)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    pub fn is_integer(&self) -> bool {
        !self.is_bool() && !self.is_float()
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            Self::I8 | Self::I16 | Self::I32 | Self::I64 | Self::F32 | Self::F64
        )
    }

    /// Maps an ONNX `TensorProto.DataType` code.
    pub fn from_onnx_data_type(code: i32) -> Option<Self> {
        Some(match code {
            1 => Self::F32,
            2 => Self::U8,
            3 => Self::I8,
            4 => Self::U16,
            5 => Self::I16,
            6 => Self::I32,
            7 => Self::I64,
            9 => Self::Bool,
            11 => Self::F64,
            12 => Self::U32,
            13 => Self::U64,
            _ => return None,
        })
    }

    pub fn onnx_data_type(&self) -> i32 {
        match self {
            Self::F32 => 1,
            Self::U8 => 2,
            Self::I8 => 3,
            Self::U16 => 4,
            Self::I16 => 5,
            Self::I32 => 6,
            Self::I64 => 7,
            Self::Bool => 9,
            Self::F64 => 11,
            Self::U32 => 12,
            Self::U64 => 13,
        }
    }
}

impl fmt::Display for TensorElemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

macro_rules! impl_int_elem_type {
    ($($ty:ty => $variant:ident),*) => {
        $(impl TensorElemTypeExt for $ty {
            fn get_type() -> TensorElemType {
                TensorElemType::$variant
            }

            fn close(a: Self, b: Self) -> bool {
                a == b
            }

            fn into_data(data: Vec<Self>) -> TensorData {
                TensorData::$variant(data)
            }

            fn from_data(data: &TensorData) -> Option<&[Self]> {
                match data {
                    TensorData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn as_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(x: f64) -> Self {
                x as $ty
            }
        })*
    };
}

macro_rules! impl_float_elem_type {
    ($($ty:ty => $variant:ident, $atol:expr, $rtol:expr);*) => {
        $(impl TensorElemTypeExt for $ty {
            fn get_type() -> TensorElemType {
                TensorElemType::$variant
            }

            fn close(a: Self, b: Self) -> bool {
                ((a - b).abs() <= ($atol + $rtol * b.abs()))
                    || (a.is_infinite()
                        && b.is_infinite()
                        && a.is_sign_positive() == b.is_sign_positive())
                    || (a.is_nan() && b.is_nan())
            }

            fn into_data(data: Vec<Self>) -> TensorData {
                TensorData::$variant(data)
            }

            fn from_data(data: &TensorData) -> Option<&[Self]> {
                match data {
                    TensorData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn as_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(x: f64) -> Self {
                x as $ty
            }
        })*
    };
}

impl_int_elem_type!(
    i8 => I8, i16 => I16, i32 => I32, i64 => I64,
    u8 => U8, u16 => U16, u32 => U32, u64 => U64
);

impl_float_elem_type!(
    f32 => F32, 1e-5, 1e-8;
    f64 => F64, 1e-8, 1e-8
);

impl TensorElemTypeExt for bool {
    fn get_type() -> TensorElemType {
        TensorElemType::Bool
    }

    fn close(a: Self, b: Self) -> bool {
        a == b
    }

    fn into_data(data: Vec<Self>) -> TensorData {
        TensorData::Bool(data)
    }

    fn from_data(data: &TensorData) -> Option<&[Self]> {
        match data {
            TensorData::Bool(v) => Some(v),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        if self {
            1.0
        } else {
            0.0
        }
    }

    fn from_f64(x: f64) -> Self {
        x != 0.0
    }
}

/// Expands `$body` once for each listed element type with `$t` aliased to the
/// matching primitive. Unlisted types fall through to `$other`.
#[macro_export]
macro_rules! dispatch {
    ($elem_ty:expr, [$($variant:ident: $prim:ty),* $(,)?], $t:ident => $body:expr) => {
        match $elem_ty {
            $($crate::tensor::TensorElemType::$variant => {
                #[allow(dead_code)]
                type $t = $prim;
                $body
            })*
        }
    };
    ($elem_ty:expr, [$($variant:ident: $prim:ty),* $(,)?], $t:ident => $body:expr, $other:pat => $fallback:expr) => {
        match $elem_ty {
            $($crate::tensor::TensorElemType::$variant => {
                #[allow(dead_code)]
                type $t = $prim;
                $body
            })*
            #[allow(unreachable_patterns)]
            $other => $fallback,
        }
    };
}

#[macro_export]
macro_rules! dispatch_all {
    ($elem_ty:expr, $t:ident => $body:expr) => {
        $crate::dispatch!($elem_ty, [
            Bool: bool, I8: i8, I16: i16, I32: i32, I64: i64,
            U8: u8, U16: u16, U32: u32, U64: u64, F32: f32, F64: f64
        ], $t => $body)
    };
}

#[macro_export]
macro_rules! dispatch_numeric {
    ($elem_ty:expr, $t:ident => $body:expr, $other:pat => $fallback:expr) => {
        $crate::dispatch!($elem_ty, [
            I8: i8, I16: i16, I32: i32, I64: i64,
            U8: u8, U16: u16, U32: u32, U64: u64, F32: f32, F64: f64
        ], $t => $body, $other => $fallback)
    };
}

#[macro_export]
macro_rules! dispatch_signed {
    ($elem_ty:expr, $t:ident => $body:expr, $other:pat => $fallback:expr) => {
        $crate::dispatch!($elem_ty, [
            I8: i8, I16: i16, I32: i32, I64: i64, F32: f32, F64: f64
        ], $t => $body, $other => $fallback)
    };
}

#[macro_export]
macro_rules! dispatch_float {
    ($elem_ty:expr, $t:ident => $body:expr, $other:pat => $fallback:expr) => {
        $crate::dispatch!($elem_ty, [F32: f32, F64: f64], $t => $body, $other => $fallback)
    };
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn dump<T: fmt::Debug>(f: &mut fmt::Formatter<'_>, data: &[T]) -> fmt::Result {
            const MAX_ELEMS: usize = 10;
            if data.len() <= MAX_ELEMS {
                return write!(f, "{data:?}");
            }
            write!(f, "[")?;
            for e in data[..MAX_ELEMS / 2].iter() {
                write!(f, "{e:?}, ")?;
            }
            write!(f, "...")?;
            for e in data[data.len() - MAX_ELEMS / 2..].iter() {
                write!(f, ", {e:?}")?;
            }
            write!(f, "]")
        }

        write!(f, "Tensor({:?}, {:?}, ", self.dims, self.elem_ty())?;
        match &*self.data {
            TensorData::Bool(v) => dump(f, v)?,
            TensorData::I8(v) => dump(f, v)?,
            TensorData::I16(v) => dump(f, v)?,
            TensorData::I32(v) => dump(f, v)?,
            TensorData::I64(v) => dump(f, v)?,
            TensorData::U8(v) => dump(f, v)?,
            TensorData::U16(v) => dump(f, v)?,
            TensorData::U32(v) => dump(f, v)?,
            TensorData::U64(v) => dump(f, v)?,
            TensorData::F32(v) => dump(f, v)?,
            TensorData::F64(v) => dump(f, v)?,
        }
        write!(f, ")")
    }
}

#[test]
fn dump_f32_tensor() {
    let t = Tensor::zeros::<f32>(vec![2, 3, 4].into());
    insta::assert_snapshot!(t, @"Tensor([2, 3, 4], F32, [0.0, 0.0, 0.0, 0.0, 0.0, ..., 0.0, 0.0, 0.0, 0.0, 0.0])");
}

#[test]
fn dump_small_tensors() {
    let t = Tensor::new(vec![2, 2].into(), vec![1i64, 2, 3, 4]);
    insta::assert_snapshot!(t, @"Tensor([2, 2], I64, [1, 2, 3, 4])");
    let t = Tensor::scalar(true);
    insta::assert_snapshot!(t, @"Tensor([], Bool, [true])");
}

#[test]
fn create_tensors() {
    assert!(Tensor::zeros::<u8>(FixedDimensions(vec![1, 1, 28, 28])).verify());
    assert!(Tensor::zeros::<f32>(FixedDimensions(vec![1, 1, 28, 28])).verify());
    assert!(Tensor::zeros::<i32>(FixedDimensions(vec![1, 1, 28, 28])).verify());
    assert!(Tensor::zeros::<f64>(FixedDimensions(vec![1, 1, 28, 28])).verify());
    assert!(Tensor::try_new(vec![4, 4].into(), vec![0.0f32; 15]).is_err());
}

#[test]
fn typed_access() {
    let t = Tensor::new(vec![3].into(), vec![1i32, 2, 3]);
    assert_eq!(t.as_slice::<i32>().unwrap(), &[1, 2, 3]);
    assert_eq!(
        t.as_slice::<f32>().unwrap_err(),
        TensorError::TypeMismatch {
            expected: TensorElemType::F32,
            actual: TensorElemType::I32
        }
    );
}

#[test]
fn reshape_shares_buffer() {
    let t = Tensor::new(vec![2, 3].into(), vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let r = t.reshape(vec![3, 2]).unwrap();
    assert_eq!(r.dims(), &vec![3, 2].into());
    assert_eq!(r.as_slice::<f32>().unwrap(), t.as_slice::<f32>().unwrap());
    assert!(t.reshape(vec![4]).is_err());
}

#[test]
fn expand() {
    let t = Tensor::new(vec![2, 1].into(), vec![1i64, 2]);
    let e = t.expand_to(&vec![2, 3].into()).unwrap();
    assert_eq!(e.as_slice::<i64>().unwrap(), &[1, 1, 1, 2, 2, 2]);
    assert!(t.expand_to(&vec![3, 3].into()).is_err());
}

#[test]
fn from_non_standard_layout() {
    let a = ndarray::Array2::from_shape_vec((2, 3), vec![1, 2, 3, 4, 5, 6i32])
        .unwrap()
        .reversed_axes()
        .into_dyn();
    let t = Tensor::from_array(a);
    assert_eq!(t.dims(), &vec![3, 2].into());
    assert_eq!(t.as_slice::<i32>().unwrap(), &[1, 4, 2, 5, 3, 6]);
}

#[test]
fn test_tensor_elem_type() {
    assert_eq!(TensorElemType::Bool.size(), 1);
    assert_eq!(TensorElemType::F32.size(), 4);
    assert_eq!(TensorElemType::I32.size(), 4);
    assert_eq!(TensorElemType::I64.size(), 8);
    assert!(TensorElemType::F64.is_float());
    assert!(TensorElemType::U16.is_integer());
    assert!(!TensorElemType::U16.is_signed());
    for code in [1, 2, 3, 4, 5, 6, 7, 9, 11, 12, 13] {
        let ty = TensorElemType::from_onnx_data_type(code).unwrap();
        assert_eq!(ty.onnx_data_type(), code);
    }
    assert!(TensorElemType::from_onnx_data_type(8).is_none());
}

#[test]
fn test_tensor_rand_of_type() {
    use TensorElemType::*;

    fn check(ty: TensorElemType) {
        let shape = vec![3, 6, 2, 9, 1, 11];
        let x = Tensor::rand_of_type(ty, shape.to_owned().into());
        let y = Tensor::rand_of_type(ty, shape.into());
        assert_ne!(x, y);
    }

    check(F32);
    check(I32);
    check(I64);
    check(Bool);
}

#[test]
fn integer_arithmetic_wraps() {
    assert_eq!(NumericElem::wrapping_add(i32::MAX, 1), i32::MIN);
    assert_eq!(NumericElem::wrapping_sub(0u8, 1), 255);
    assert_eq!(NumericElem::wrapping_mul(i64::MAX, 2), -2);
    assert_eq!(NumericElem::wrapping_neg(i16::MIN), i16::MIN);
    assert_eq!(NumericElem::wrapping_abs(i8::MIN), i8::MIN);
    assert_eq!(NumericElem::wrapping_abs(7u32), 7);
    assert_eq!(NumericElem::checked_div(i64::MIN, -1), None);
    assert_eq!(NumericElem::checked_div(5i32, 0), None);
    assert_eq!(NumericElem::checked_div(-7i32, 2), Some(-3));
    assert_eq!(NumericElem::checked_div(1.0f32, 0.0), Some(f32::INFINITY));
    assert_eq!(NumericElem::wrapping_abs(-2.5f64), 2.5);
}

#[test]
fn seeded_rand_is_reproducible() {
    Tensor::seed_rng_from_u64(7);
    let x = Tensor::rand::<f32>(vec![4, 4].into());
    Tensor::seed_rng_from_u64(7);
    let y = Tensor::rand::<f32>(vec![4, 4].into());
    assert_eq!(x, y);
}
