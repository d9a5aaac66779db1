//! The public, operator-overloaded expression wrapper. `Expr<N>` is a
//! thin transparent newtype around any [`Node`]; it exists purely so
//! `x + y`, `-x`, `x.sin()` and friends can build new node trees without
//! every concrete node type re-implementing `std::ops` itself.

use std::ops;

use crate::binary::{Add, Div, Mul, Sub};
use crate::error::AdError;
use crate::leaf::{Constant, Leaf, View};
use crate::node::{Cursor, Node};
use crate::shape::Shape;
use crate::storage::StorageView;
use crate::unary::{Cos, Exp, Ln, Neg, Powi, Sin, Tan};

#[derive(Clone)]
pub struct Expr<N>(pub N);

impl<N> Expr<N> {
    pub fn into_inner(self) -> N {
        self.0
    }
}

impl<N: Node> Node for Expr<N> {
    fn shape(&self) -> Shape {
        self.0.shape()
    }

    fn value_buffer_size(&self) -> usize {
        self.0.value_buffer_size()
    }

    fn adjoint_buffer_size(&self) -> usize {
        self.0.adjoint_buffer_size()
    }

    fn bind(&mut self, cursor: &mut Cursor) -> Result<(), AdError> {
        self.0.bind(cursor)
    }

    fn feval(&mut self, values: &mut [f64]) {
        self.0.feval(values)
    }

    fn value<'v>(&'v self, values: &'v [f64]) -> StorageView<'v> {
        self.0.value(values)
    }

    fn beval(&mut self, values: &[f64], seed: StorageView<'_>) {
        self.0.beval(values, seed)
    }

    fn reset_adjoints(&mut self) {
        self.0.reset_adjoints()
    }

    fn deep_clone(&self) -> Self {
        Expr(self.0.deep_clone())
    }
}

/// Constructs a new, unshared input variable.
pub fn var(shape: Shape, init: impl Into<Vec<f64>>) -> Expr<Leaf> {
    let values = init.into();
    let leaf = match shape {
        Shape::Scalar => Leaf::scalar(values[0]),
        Shape::Vector(_) => Leaf::vector(values),
        Shape::Matrix(r, c) => Leaf::matrix(r, c, values),
    };
    Expr(leaf)
}

/// Wraps an already-constructed [`Leaf`] handle, e.g. to reuse one across
/// two independent expression trees (the only sharing mechanism in an
/// otherwise tree-shaped graph).
pub fn leaf_expr(leaf: Leaf) -> Expr<Leaf> {
    Expr(leaf)
}

/// Constructs a non-owning view over caller-provided storage.
pub fn view<'a>(shape: Shape, value: &'a mut [f64], adjoint: &'a mut [f64]) -> Expr<View<'a>> {
    Expr(View::new(shape, value, adjoint))
}

/// Constructs a compile-time-fixed constant.
pub fn constant(shape: Shape, values: impl Into<Vec<f64>>) -> Expr<Constant> {
    let data = values.into();
    let c = match shape {
        Shape::Scalar => Constant::scalar(data[0]),
        Shape::Vector(_) => Constant::vector(data),
        Shape::Matrix(r, c) => Constant::matrix(r, c, data),
    };
    Expr(c)
}

impl<N: Node> Expr<N> {
    pub fn sin(self) -> Expr<Sin<N>> {
        Expr(Sin::new(self.0))
    }

    pub fn cos(self) -> Expr<Cos<N>> {
        Expr(Cos::new(self.0))
    }

    pub fn tan(self) -> Expr<Tan<N>> {
        Expr(Tan::new(self.0))
    }

    pub fn exp(self) -> Expr<Exp<N>> {
        Expr(Exp::new(self.0))
    }

    pub fn ln(self) -> Expr<Ln<N>> {
        Expr(Ln::new(self.0))
    }

    pub fn powi(self, k: i32) -> Expr<Powi<N>> {
        Expr(Powi::new(self.0, k))
    }
}

impl<N: Node> ops::Neg for Expr<N> {
    type Output = Expr<Neg<N>>;

    fn neg(self) -> Self::Output {
        Expr(Neg::new(self.0))
    }
}

impl<L: Node, R: Node> ops::Add<Expr<R>> for Expr<L> {
    type Output = Result<Expr<Add<L, R>>, AdError>;

    fn add(self, rhs: Expr<R>) -> Self::Output {
        Ok(Expr(Add::new(self.0, rhs.0)?))
    }
}

impl<L: Node, R: Node> ops::Sub<Expr<R>> for Expr<L> {
    type Output = Result<Expr<Sub<L, R>>, AdError>;

    fn sub(self, rhs: Expr<R>) -> Self::Output {
        Ok(Expr(Sub::new(self.0, rhs.0)?))
    }
}

impl<L: Node, R: Node> ops::Mul<Expr<R>> for Expr<L> {
    type Output = Result<Expr<Mul<L, R>>, AdError>;

    fn mul(self, rhs: Expr<R>) -> Self::Output {
        Ok(Expr(Mul::new(self.0, rhs.0)?))
    }
}

impl<L: Node, R: Node> ops::Div<Expr<R>> for Expr<L> {
    type Output = Result<Expr<Div<L, R>>, AdError>;

    fn div(self, rhs: Expr<R>) -> Self::Output {
        Ok(Expr(Div::new(self.0, rhs.0)?))
    }
}
