use std::fmt;

use crate::fixed_dim::{FixedDimension, FixedDimensions};

/// A dimension of a declared graph input or output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dimension {
    Fixed(FixedDimension),
    /// Symbolic dimension such as a batch size. Matches any size at run time.
    Dynamic(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Dimensions(pub Vec<Dimension>);

impl Dimension {
    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::Fixed(_))
    }

    pub fn as_fixed(&self) -> Option<FixedDimension> {
        match self {
            Self::Fixed(size) => Some(*size),
            Self::Dynamic(_) => None,
        }
    }

    /// Returns true if a tensor axis of length `size` satisfies this dimension.
    pub fn matches(&self, size: FixedDimension) -> bool {
        match self {
            Self::Fixed(fixed) => *fixed == size,
            Self::Dynamic(_) => true,
        }
    }
}

impl Dimensions {
    pub fn new(dims: Vec<Dimension>) -> Self {
        Self(dims)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Dimension] {
        self.0.as_slice()
    }

    pub fn is_fixed(&self) -> bool {
        self.0.iter().all(Dimension::is_fixed)
    }

    /// Returns true if `dims` has the same rank and every fixed dimension agrees.
    pub fn matches(&self, dims: &[FixedDimension]) -> bool {
        self.0.len() == dims.len() && self.0.iter().zip(dims).all(|(d, &s)| d.matches(s))
    }
}

impl From<Vec<Dimension>> for Dimensions {
    fn from(v: Vec<Dimension>) -> Dimensions {
        Dimensions(v)
    }
}

impl From<FixedDimensions> for Dimensions {
    fn from(dims: FixedDimensions) -> Dimensions {
        Dimensions(dims.0.into_iter().map(Dimension::Fixed).collect())
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(size) => write!(f, "{size}"),
            Self::Dynamic(name) if name.is_empty() => write!(f, "?"),
            Self::Dynamic(name) => write!(f, "{name}"),
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

#[test]
fn dynamic_matches_any_size() {
    let d = Dimension::Dynamic("batch".into());
    assert!(d.matches(0));
    assert!(d.matches(1));
    assert!(d.matches(128));
}

#[test]
fn fixed_zero_is_not_dynamic() {
    let d = Dimension::Fixed(0);
    assert!(d.matches(0));
    assert!(!d.matches(1));
}

#[test]
fn dims_match_rank_and_fixed_sizes() {
    let dims = Dimensions(vec![
        Dimension::Dynamic("N".into()),
        Dimension::Fixed(3),
        Dimension::Fixed(4),
    ]);
    assert!(dims.matches(&[7, 3, 4]));
    assert!(!dims.matches(&[7, 3, 5]));
    assert!(!dims.matches(&[3, 4]));
    assert_eq!(dims.to_string(), "[N, 3, 4]");
}
