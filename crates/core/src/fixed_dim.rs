use std::{
    fmt,
    ops::{Deref, Index, IndexMut},
    slice::SliceIndex,
};

pub type FixedDimension = usize;

/// Concrete shape of a tensor at run time.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct FixedDimensions(pub Vec<FixedDimension>);

impl fmt::Debug for FixedDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for FixedDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl FixedDimensions {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total_elems(&self) -> usize {
        self.0.iter().product()
    }

    pub fn as_slice(&self) -> &[FixedDimension] {
        self.0.as_slice()
    }

    pub fn as_mut_slice(&mut self) -> &mut [FixedDimension] {
        self.0.as_mut_slice()
    }

    pub fn to_i64_vec(&self) -> Vec<i64> {
        self.0.iter().map(|&x| x as i64).collect()
    }

    pub fn from_i64(dims: &[i64]) -> Self {
        Self(dims.iter().map(|&x| x as FixedDimension).collect())
    }

    /// Multidirectional broadcast of `self` and `other`.
    pub fn broadcast(&self, other: impl AsRef<Self>) -> Option<Self> {
        broadcast(&[self, other.as_ref()])
    }

    /// Unidirectional broadcast of `other` onto `self`. The result is always `self`.
    pub fn broadcast_from(&self, other: impl AsRef<Self>) -> Option<Self> {
        unidirectional_broadcast(self, other.as_ref())
    }

    /// Returns `self` left-padded with ones up to `rank`.
    pub fn pad_to_rank(&self, rank: usize) -> Self {
        let mut dims = vec![1; rank.saturating_sub(self.len())];
        dims.extend_from_slice(&self.0);
        dims.into()
    }

    pub fn to_fixed_dims<const N: usize>(&self) -> [FixedDimension; N] {
        let mut dims: [FixedDimension; N] = [0; N];
        dims.copy_from_slice(&self.0);
        dims
    }

    pub fn strides(&self) -> Self {
        compute_strides(self)
    }
}

fn compute_strides(dims: &FixedDimensions) -> FixedDimensions {
    let mut strides = vec![];
    for i in 0..dims.len() {
        strides.push(dims[i + 1..].iter().product());
    }
    strides.into()
}

/// Multidirectional broadcast of any number of shapes.
/// Returns `None` if two shapes disagree on an axis where neither is 1.
pub fn broadcast(shapes: &[impl AsRef<FixedDimensions>]) -> Option<FixedDimensions> {
    let mut shape = vec![];
    let max_len = shapes
        .iter()
        .map(AsRef::as_ref)
        .map(FixedDimensions::len)
        .max()?;
    for i in 0..max_len {
        let mut size = 1;
        for shape in shapes.iter().map(AsRef::as_ref) {
            let len = shape.len();
            let dim = if i < len { shape[len - i - 1] } else { 1 };
            if dim == 1 {
                continue;
            }
            if size != 1 && dim != size {
                return None;
            }
            size = dim
        }
        shape.push(size)
    }
    shape.reverse();
    Some(shape.into())
}

/// Unidirectional broadcast: `from` may be stretched onto `to`, never the other way.
pub fn unidirectional_broadcast(
    to: &FixedDimensions,
    from: &FixedDimensions,
) -> Option<FixedDimensions> {
    if from.len() > to.len() {
        return None;
    }
    let from = from.pad_to_rank(to.len());
    to.iter()
        .zip(from.iter())
        .all(|(&t, &f)| t == f || f == 1)
        .then(|| to.clone())
}

impl AsRef<FixedDimensions> for FixedDimensions {
    fn as_ref(&self) -> &FixedDimensions {
        self
    }
}

impl<I> Index<I> for FixedDimensions
where
    I: SliceIndex<[FixedDimension]>,
{
    type Output = <I as SliceIndex<[FixedDimension]>>::Output;

    fn index(&self, index: I) -> &Self::Output {
        &self.0[index]
    }
}

impl<I> IndexMut<I> for FixedDimensions
where
    I: SliceIndex<[FixedDimension]>,
{
    fn index_mut(&mut self, index: I) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl From<Vec<FixedDimension>> for FixedDimensions {
    fn from(v: Vec<FixedDimension>) -> FixedDimensions {
        FixedDimensions(v)
    }
}

impl From<&[FixedDimension]> for FixedDimensions {
    fn from(v: &[FixedDimension]) -> FixedDimensions {
        FixedDimensions(v.to_vec())
    }
}

impl<const N: usize> From<[FixedDimension; N]> for FixedDimensions {
    fn from(v: [FixedDimension; N]) -> FixedDimensions {
        FixedDimensions(v.to_vec())
    }
}

impl Deref for FixedDimensions {
    type Target = Vec<usize>;
    fn deref(&self) -> &Vec<usize> {
        &self.0
    }
}

#[test]
fn total_elems() {
    assert_eq!(FixedDimensions(vec![1, 1, 28, 28]).total_elems(), 784)
}

#[test]
fn total_elems_scalar() {
    assert_eq!(FixedDimensions(vec![]).total_elems(), 1)
}

#[test]
fn strides() {
    assert_eq!(
        FixedDimensions::from(vec![2, 3, 4]).strides(),
        vec![12, 4, 1].into()
    )
}

#[test]
fn broadcast_1() {
    let one = FixedDimensions::from(vec![1]);
    let shape = broadcast(&[&one]).unwrap();
    assert_eq!(shape, one)
}

#[test]
fn broadcast_2() {
    let one = FixedDimensions::from(vec![1]);
    let four = FixedDimensions::from(vec![4, 1]);
    let shape = broadcast(&[one, four]).unwrap();
    assert_eq!(shape, vec![4, 1].into())
}

#[test]
fn broadcast_incompatible() {
    let x = FixedDimensions::from(vec![10, 20]);
    let y = FixedDimensions::from(vec![10, 20, 30]);
    assert!(broadcast(&[y, x]).is_none());
}

#[test]
fn broadcast_both_sides_grow() {
    let x = FixedDimensions::from(vec![1, 3, 1]);
    let y = FixedDimensions::from(vec![5, 3, 10]);
    assert_eq!(x.broadcast(&y).unwrap(), vec![5, 3, 10].into());
    let x = FixedDimensions::from(vec![4, 1]);
    let y = FixedDimensions::from(vec![1, 6]);
    assert_eq!(x.broadcast(&y).unwrap(), vec![4, 6].into());
}

#[test]
fn broadcast_scalar() {
    let x = FixedDimensions::from(vec![]);
    let y = FixedDimensions::from(vec![2, 3]);
    assert_eq!(x.broadcast(&y).unwrap(), vec![2, 3].into());
}

#[test]
fn broadcast_unidirectional() {
    let a = FixedDimensions::from(vec![2, 3, 4]);
    assert_eq!(a.broadcast_from(FixedDimensions::from(vec![4])), Some(a.clone()));
    assert_eq!(a.broadcast_from(FixedDimensions::from(vec![3, 1])), Some(a.clone()));
    assert_eq!(a.broadcast_from(FixedDimensions::from(vec![1, 2, 3, 4])), None);
    assert_eq!(a.broadcast_from(FixedDimensions::from(vec![2, 1, 5])), None);
    // `a` never grows.
    let a = FixedDimensions::from(vec![1, 4]);
    assert_eq!(a.broadcast_from(FixedDimensions::from(vec![3, 4])), None);
}
