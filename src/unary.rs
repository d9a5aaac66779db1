//! Unary operators (§4.4): `sin`, `cos`, `tan`, `exp`, `ln`, unary minus,
//! and `powi`. Each wraps a single child node and contributes its own
//! shape-sized slot in the value arena (never the adjoint arena: the
//! backward pass for a unary node only ever needs a single elementwise
//! local-gradient vector, computed on the stack and handed straight to
//! the child's `beval`, so nothing needs to be cached across calls).

use crate::error::AdError;
use crate::node::{claim_slot, Cursor, Node};
use crate::shape::Shape;
use crate::storage::{StorageView, StorageViewMut};

/// Shared skeleton every unary node is built from: a child, the node's
/// own shape (identical to the child's — no unary operator changes
/// shape), and the value-arena offset claimed at bind time.
struct UnaryBase<C> {
    child: C,
    shape: Shape,
    offset: usize,
}

impl<C: Node> UnaryBase<C> {
    fn new(child: C) -> Self {
        let shape = child.shape();
        UnaryBase {
            child,
            shape,
            offset: 0,
        }
    }

    fn value_buffer_size(&self) -> usize {
        self.shape.len() + self.child.value_buffer_size()
    }

    fn bind(&mut self, cursor: &mut Cursor) -> Result<(), AdError> {
        self.child.bind(cursor)?;
        let (value_offset, _) = claim_slot(cursor, self.shape.len(), 0);
        self.offset = value_offset;
        Ok(())
    }

    fn own_slice<'v>(&self, values: &'v [f64]) -> &'v [f64] {
        &values[self.offset..self.offset + self.shape.len()]
    }

    fn own_slice_mut<'v>(&self, values: &'v mut [f64]) -> &'v mut [f64] {
        &mut values[self.offset..self.offset + self.shape.len()]
    }

    fn value<'v>(&'v self, values: &'v [f64]) -> StorageView<'v> {
        StorageView::new(self.shape, self.own_slice(values))
    }
}

/// Defines a unary node type `$name<C>` implementing `Node`, given the
/// forward formula and the local derivative expressed in terms of `x`
/// (the child's value) and `y` (this node's own, already-computed,
/// value) — whichever is cheaper for that particular operator.
macro_rules! unary_node {
    ($(#[$meta:meta])* $name:ident, |$x:ident| $fwd:expr, |$x2:ident, $y:ident| $bwd:expr) => {
        $(#[$meta])*
        pub struct $name<C> {
            base: UnaryBase<C>,
        }

        impl<C: Node> $name<C> {
            pub fn new(child: C) -> Self {
                $name {
                    base: UnaryBase::new(child),
                }
            }
        }

        impl<C: Node> Node for $name<C> {
            fn shape(&self) -> Shape {
                self.base.shape
            }

            fn value_buffer_size(&self) -> usize {
                self.base.value_buffer_size()
            }

            fn adjoint_buffer_size(&self) -> usize {
                self.base.child.adjoint_buffer_size()
            }

            fn bind(&mut self, cursor: &mut Cursor) -> Result<(), AdError> {
                self.base.bind(cursor)
            }

            fn feval(&mut self, values: &mut [f64]) {
                self.base.child.feval(values);
                let src = self.base.child.value(values);
                let shape = self.base.shape;
                let mut out = StorageViewMut::new(shape, self.base.own_slice_mut(values));
                out.apply_unary(src, |$x| $fwd);
            }

            fn value<'v>(&'v self, values: &'v [f64]) -> StorageView<'v> {
                self.base.value(values)
            }

            fn beval(&mut self, values: &[f64], seed: StorageView<'_>) {
                let x_view = self.base.child.value(values);
                let y_view = self.base.value(values);
                let n = self.base.shape.len();
                let mut local = vec![0.0; n];
                for i in 0..n {
                    let $x2 = x_view.get(i);
                    let $y = y_view.get(i);
                    let s = if seed.shape().is_scalar() {
                        seed.get(0)
                    } else {
                        seed.get(i)
                    };
                    local[i] = s * ($bwd);
                }
                let local_view = StorageView::new(self.base.shape, &local);
                self.base.child.beval(values, local_view);
            }

            fn reset_adjoints(&mut self) {
                self.base.child.reset_adjoints();
            }

            fn deep_clone(&self) -> Self {
                $name::new(self.base.child.deep_clone())
            }
        }
    };
}

unary_node!(
    /// `sin(x)`, backward `cos(x)`.
    Sin,
    |x| x.sin(),
    |x, _y| x.cos()
);

unary_node!(
    /// `cos(x)`, backward `-sin(x)`.
    Cos,
    |x| x.cos(),
    |x, _y| -x.sin()
);

unary_node!(
    /// `tan(x)`, backward `1 + tan(x)^2`.
    Tan,
    |x| x.tan(),
    |_x, y| 1.0 + y * y
);

unary_node!(
    /// `exp(x)`, backward `exp(x)` (its own value).
    Exp,
    |x| x.exp(),
    |_x, y| y
);

unary_node!(
    /// `ln(x)`, backward `1 / x`. Non-positive `x` propagates as
    /// `NaN`/`-inf` rather than trapping — see `crate::error`.
    Ln,
    |x| x.ln(),
    |x, _y| 1.0 / x
);

unary_node!(
    /// Unary minus, backward `-1`.
    Neg,
    |x| -x,
    |_x, _y| -1.0
);

/// `x^k` for a fixed non-negative integer exponent known at construction
/// time, backward `k * x^(k-1)`.
pub struct Powi<C> {
    base: UnaryBase<C>,
    k: i32,
}

impl<C: Node> Powi<C> {
    pub fn new(child: C, k: i32) -> Self {
        Powi {
            base: UnaryBase::new(child),
            k,
        }
    }
}

impl<C: Node> Node for Powi<C> {
    fn shape(&self) -> Shape {
        self.base.shape
    }

    fn value_buffer_size(&self) -> usize {
        self.base.value_buffer_size()
    }

    fn adjoint_buffer_size(&self) -> usize {
        self.base.child.adjoint_buffer_size()
    }

    fn bind(&mut self, cursor: &mut Cursor) -> Result<(), AdError> {
        self.base.bind(cursor)
    }

    fn feval(&mut self, values: &mut [f64]) {
        self.base.child.feval(values);
        let src = self.base.child.value(values);
        let shape = self.base.shape;
        let k = self.k;
        let mut out = StorageViewMut::new(shape, self.base.own_slice_mut(values));
        out.apply_unary(src, |x| x.powi(k));
    }

    fn value<'v>(&'v self, values: &'v [f64]) -> StorageView<'v> {
        self.base.value(values)
    }

    fn beval(&mut self, values: &[f64], seed: StorageView<'_>) {
        let x_view = self.base.child.value(values);
        let n = self.base.shape.len();
        let k = self.k;
        let mut local = vec![0.0; n];
        for i in 0..n {
            let x = x_view.get(i);
            let s = if seed.shape().is_scalar() {
                seed.get(0)
            } else {
                seed.get(i)
            };
            local[i] = s * (k as f64) * x.powi(k - 1);
        }
        let local_view = StorageView::new(self.base.shape, &local);
        self.base.child.beval(values, local_view);
    }

    fn reset_adjoints(&mut self) {
        self.base.child.reset_adjoints();
    }

    fn deep_clone(&self) -> Self {
        Powi::new(self.base.child.deep_clone(), self.k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf::Leaf;

    fn bind_and_run<N: Node>(mut n: N) -> (Vec<f64>, N) {
        let mut cursor = Cursor::default();
        n.bind(&mut cursor).unwrap();
        let mut values = vec![0.0; cursor.value];
        n.feval(&mut values);
        (values, n)
    }

    #[test]
    fn sin_forward_and_backward() {
        let x = Leaf::scalar(0.0);
        let (values, mut node) = bind_and_run(Sin::new(x.clone()));
        assert_eq!(node.value(&values).get(0), 0.0);
        let seed = [1.0];
        node.beval(&values, StorageView::new(Shape::Scalar, &seed));
        assert_eq!(x.get_adj(0), 1.0); // cos(0) = 1
    }

    #[test]
    fn exp_backward_is_its_own_value() {
        let x = Leaf::scalar(0.0);
        let (values, mut node) = bind_and_run(Exp::new(x.clone()));
        assert_eq!(node.value(&values).get(0), 1.0);
        let seed = [2.0];
        node.beval(&values, StorageView::new(Shape::Scalar, &seed));
        assert_eq!(x.get_adj(0), 2.0); // 2 * exp(0)
    }

    #[test]
    fn powi_backward() {
        let x = Leaf::scalar(3.0);
        let (values, mut node) = bind_and_run(Powi::new(x.clone(), 3));
        assert_eq!(node.value(&values).get(0), 27.0);
        let seed = [1.0];
        node.beval(&values, StorageView::new(Shape::Scalar, &seed));
        assert_eq!(x.get_adj(0), 27.0); // 3 * 3^2
    }
}
