//! Value-category tags and the composition rules operator nodes use to
//! derive their own shape from their children's.

use std::fmt;

use crate::error::AdError;

/// The value-category of a node's output: a single number, a dense
/// vector, or a dense row-major matrix.
///
/// Broadcasting is limited on purpose (§4.1): a scalar may combine with
/// any tensor shape, and two tensors combine elementwise only when their
/// shapes are identical. There is no NumPy-style rank promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Scalar,
    Vector(usize),
    Matrix(usize, usize),
}

impl Shape {
    /// Number of `f64` cells a value or adjoint of this shape occupies.
    pub fn len(&self) -> usize {
        match *self {
            Shape::Scalar => 1,
            Shape::Vector(n) => n,
            Shape::Matrix(r, c) => r * c,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Shape::Scalar)
    }

    /// Shape resulting from an elementwise binary operator applied to
    /// `self` and `other`: equal shapes pass through unchanged, a scalar
    /// combined with any shape broadcasts to that shape, two mismatched
    /// non-scalar shapes are a construction-time error.
    pub fn elementwise(self, other: Shape) -> Result<Shape, AdError> {
        match (self, other) {
            (a, b) if a == b => Ok(a),
            (Shape::Scalar, b) => Ok(b),
            (a, Shape::Scalar) => Ok(a),
            (a, b) => Err(AdError::ShapeMismatch {
                expected: a,
                actual: b,
            }),
        }
    }

    /// Shape of `dot(self, x)` where `self` is a matrix and `x` a vector
    /// of matching column count: `Matrix(r, c) . Vector(c) -> Vector(r)`.
    pub fn dot(self, x: Shape) -> Result<Shape, AdError> {
        match (self, x) {
            (Shape::Matrix(r, c), Shape::Vector(c2)) if c == c2 => Ok(Shape::Vector(r)),
            (a, b) => Err(AdError::ShapeMismatch {
                expected: a,
                actual: b,
            }),
        }
    }

    /// Reductions (`sum`, `norm`) always collapse to a scalar.
    pub fn reduced(self) -> Shape {
        Shape::Scalar
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Scalar => write!(f, "scalar"),
            Shape::Vector(n) => write!(f, "vector({n})"),
            Shape::Matrix(r, c) => write!(f, "matrix({r}x{c})"),
        }
    }
}
