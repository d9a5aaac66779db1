//! Reverse-mode automatic differentiation over expression graphs built
//! once at construction time and evaluated (possibly many times) through
//! a two-phase bind protocol.
//!
//! ```
//! use revad::prelude::*;
//!
//! let x = var(Shape::Scalar, vec![2.0]);
//! let y = var(Shape::Scalar, vec![3.0]);
//! let expr = (x.clone() * y.clone()).unwrap().sin();
//! let mut bound = bind(expr).unwrap();
//! let out = bound.autodiff();
//! assert!((out.get(0) - (6.0_f64).sin()).abs() < 1e-12);
//! ```
//!
//! The node algebra (§`node`, `leaf`, `unary`, `binary`, `assign`,
//! `glue`, `reduce`) is value-typed and ownership-composed: every
//! expression is a concrete, monomorphized type, and evaluation walks
//! two explicit scratch arenas rather than chasing pointers through a
//! heap-allocated graph. `bind` and `function` build the safe, typestate
//! entry points on top of that algebra.

pub mod assign;
pub mod binary;
pub mod bind;
pub mod config;
pub mod error;
pub mod function;
pub mod glue;
pub mod leaf;
pub mod node;
pub mod ops;
pub mod reduce;
pub mod shape;
pub mod storage;
pub mod unary;

/// Everything most callers need in scope: the operator-overloaded
/// expression wrapper, its constructors, and the bind entry points.
pub mod prelude {
    pub use crate::assign::{Assign, AssignAdd, AssignDiv, AssignMul, AssignSub, Assignable};
    pub use crate::bind::{bind, bind_with, BoundExpr};
    pub use crate::config::Config;
    pub use crate::error::AdError;
    pub use crate::function::Function;
    pub use crate::leaf::{Constant, Leaf, View};
    pub use crate::node::Node;
    pub use crate::ops::{constant, leaf_expr, var, view, Expr};
    pub use crate::reduce::{
        dot, for_each, norm, prod, sum, sum_elements, Dot, ForEach, Norm, Prod, Sum, SumElements,
    };
    pub use crate::shape::Shape;
}
