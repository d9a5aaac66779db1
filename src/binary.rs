//! Binary operators (§4.4, §4.5): `add`, `sub`, `mul`, `div`. Each wraps
//! two children and elementwise-broadcasts per [`Shape::elementwise`] —
//! a scalar combines with any shape, two non-scalar shapes must match
//! exactly. When a child's shape is narrower than the node's own (the
//! scalar side of a broadcast), its backward contribution is the sum of
//! the per-element local gradient rather than a single element of it.

use crate::error::AdError;
use crate::node::{claim_slot, Cursor, Node};
use crate::shape::Shape;
use crate::storage::{StorageView, StorageViewMut};

struct BinaryBase<L, R> {
    lhs: L,
    rhs: R,
    shape: Shape,
    offset: usize,
}

impl<L: Node, R: Node> BinaryBase<L, R> {
    fn new(lhs: L, rhs: R) -> Result<Self, AdError> {
        let shape = lhs.shape().elementwise(rhs.shape())?;
        Ok(BinaryBase {
            lhs,
            rhs,
            shape,
            offset: 0,
        })
    }

    fn value_buffer_size(&self) -> usize {
        self.shape.len() + self.lhs.value_buffer_size() + self.rhs.value_buffer_size()
    }

    fn bind(&mut self, cursor: &mut Cursor) -> Result<(), AdError> {
        self.lhs.bind(cursor)?;
        self.rhs.bind(cursor)?;
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

fn broadcast_get(view: StorageView<'_>, i: usize) -> f64 {
    if view.shape().is_scalar() {
        view.get(0)
    } else {
        view.get(i)
    }
}

/// Collapses a per-element local-gradient buffer of `self`'s own shape
/// down to `child_shape` by summation, when the child was the scalar
/// side of a broadcast; returns it unchanged otherwise.
fn reduce_to(local: &[f64], child_shape: Shape) -> Vec<f64> {
    if child_shape.is_scalar() && local.len() > 1 {
        vec![local.iter().sum()]
    } else {
        local.to_vec()
    }
}

macro_rules! binary_node {
    ($(#[$meta:meta])* $name:ident,
     |$a:ident, $b:ident| $fwd:expr,
     |$a2:ident, $b2:ident, $y:ident| $dlhs:expr,
     |$a3:ident, $b3:ident, $y2:ident| $drhs:expr) => {
        $(#[$meta])*
        pub struct $name<L, R> {
            base: BinaryBase<L, R>,
        }

        impl<L: Node, R: Node> $name<L, R> {
            pub fn new(lhs: L, rhs: R) -> Result<Self, AdError> {
                Ok($name {
                    base: BinaryBase::new(lhs, rhs)?,
                })
            }
        }

        impl<L: Node, R: Node> Node for $name<L, R> {
            fn shape(&self) -> Shape {
                self.base.shape
            }

            fn value_buffer_size(&self) -> usize {
                self.base.value_buffer_size()
            }

            fn adjoint_buffer_size(&self) -> usize {
                self.base.lhs.adjoint_buffer_size() + self.base.rhs.adjoint_buffer_size()
            }

            fn bind(&mut self, cursor: &mut Cursor) -> Result<(), AdError> {
                self.base.bind(cursor)
            }

            fn feval(&mut self, values: &mut [f64]) {
                self.base.lhs.feval(values);
                self.base.rhs.feval(values);
                let a = self.base.lhs.value(values);
                let b = self.base.rhs.value(values);
                let shape = self.base.shape;
                let mut out = StorageViewMut::new(shape, self.base.own_slice_mut(values));
                out.apply_binary(a, b, |$a, $b| $fwd);
            }

            fn value<'v>(&'v self, values: &'v [f64]) -> StorageView<'v> {
                self.base.value(values)
            }

            fn beval(&mut self, values: &[f64], seed: StorageView<'_>) {
                let a_view = self.base.lhs.value(values);
                let b_view = self.base.rhs.value(values);
                let y_view = self.base.value(values);
                let n = self.base.shape.len();

                let mut dlhs = vec![0.0; n];
                let mut drhs = vec![0.0; n];
                for i in 0..n {
                    let $a2 = broadcast_get(a_view, i);
                    let $b2 = broadcast_get(b_view, i);
                    let $y = y_view.get(i);
                    let s = if seed.shape().is_scalar() {
                        seed.get(0)
                    } else {
                        seed.get(i)
                    };
                    dlhs[i] = s * ($dlhs);
                    let $a3 = broadcast_get(a_view, i);
                    let $b3 = broadcast_get(b_view, i);
                    let $y2 = y_view.get(i);
                    drhs[i] = s * ($drhs);
                }

                let lhs_seed = reduce_to(&dlhs, self.base.lhs.shape());
                let rhs_seed = reduce_to(&drhs, self.base.rhs.shape());
                self.base.lhs.beval(
                    values,
                    StorageView::new(self.base.lhs.shape(), &lhs_seed),
                );
                self.base.rhs.beval(
                    values,
                    StorageView::new(self.base.rhs.shape(), &rhs_seed),
                );
            }

            fn reset_adjoints(&mut self) {
                self.base.lhs.reset_adjoints();
                self.base.rhs.reset_adjoints();
            }

            fn deep_clone(&self) -> Self {
                $name::new(self.base.lhs.deep_clone(), self.base.rhs.deep_clone())
                    .expect("shape already validated at original construction")
            }
        }
    };
}

binary_node!(
    /// `a + b`, backward `(1, 1)`.
    Add,
    |a, b| a + b,
    |_a, _b, _y| 1.0,
    |_a, _b, _y| 1.0
);

binary_node!(
    /// `a - b`, backward `(1, -1)`.
    Sub,
    |a, b| a - b,
    |_a, _b, _y| 1.0,
    |_a, _b, _y| -1.0
);

binary_node!(
    /// `a * b`, backward `(b, a)`.
    Mul,
    |a, b| a * b,
    |_a, b, _y| b,
    |a, _b, _y| a
);

binary_node!(
    /// `a / b`, backward `(1/b, -a/b^2)`. Division by zero propagates as
    /// `inf`/`NaN` rather than trapping.
    Div,
    |a, b| a / b,
    |_a, b, _y| 1.0 / b,
    |a, b, _y| -a / (b * b)
);

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
    fn add_forward_and_backward() {
        let x = Leaf::scalar(2.0);
        let y = Leaf::scalar(3.0);
        let (values, mut node) = bind_and_run(Add::new(x.clone(), y.clone()).unwrap());
        assert_eq!(node.value(&values).get(0), 5.0);
        let seed = [1.0];
        node.beval(&values, StorageView::new(Shape::Scalar, &seed));
        assert_eq!(x.get_adj(0), 1.0);
        assert_eq!(y.get_adj(0), 1.0);
    }

    #[test]
    fn mul_backward_is_swapped_operand() {
        let x = Leaf::scalar(2.0);
        let y = Leaf::scalar(3.0);
        let (values, mut node) = bind_and_run(Mul::new(x.clone(), y.clone()).unwrap());
        assert_eq!(node.value(&values).get(0), 6.0);
        let seed = [1.0];
        node.beval(&values, StorageView::new(Shape::Scalar, &seed));
        assert_eq!(x.get_adj(0), 3.0);
        assert_eq!(y.get_adj(0), 2.0);
    }

    #[test]
    fn scalar_broadcast_reduces_adjoint_back_to_scalar() {
        let x = Leaf::scalar(2.0);
        let v = Leaf::vector(vec![1.0, 2.0, 3.0]);
        let (values, mut node) = bind_and_run(Add::new(x.clone(), v.clone()).unwrap());
        assert_eq!(node.value(&values).to_vec(), vec![3.0, 4.0, 5.0]);
        let seed = [1.0, 1.0, 1.0];
        node.beval(&values, StorageView::new(Shape::Vector(3), &seed));
        assert_eq!(x.get_adj(0), 3.0); // summed across broadcast positions
        assert_eq!(v.get_adj(0), 1.0);
    }

    #[test]
    fn shape_mismatch_rejected_at_construction() {
        let a = Leaf::vector(vec![1.0, 2.0]);
        let b = Leaf::vector(vec![1.0, 2.0, 3.0]);
        assert!(Add::new(a, b).is_err());
    }
}
