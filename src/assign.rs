//! Assignment and compound assignment (§4.6): wiring an expression's
//! result into a leaf or view's own storage rather than into a fresh
//! arena slot. These are the one place the node algebra lets a later
//! stage overwrite state a earlier stage reads, so glue sequencing's
//! forward-order/reverse-order contract (§4.7) is what keeps them
//! correct: by the time an assign node's `beval` runs, every later use
//! of its left-hand side has already deposited its adjoint there.

use crate::error::AdError;
use crate::leaf::Leaf;
use crate::node::{claim_slot, Cursor, Node};
use crate::shape::Shape;
use crate::storage::{StorageView, StorageViewMut};

/// A node that owns storage directly and can be the target of `assign`
/// or a compound assign. [`Leaf`] is the only implementor: its
/// `Rc<RefCell<..>>` handle gives it the `&self` interior mutability an
/// assign target needs, whereas [`crate::leaf::View`]'s exclusive
/// `&mut` borrow is consumed the moment it is placed into a tree
/// position and so cannot also be reached back into by an assign node
/// — views are read-only participants in this node algebra.
pub trait Assignable: Node {
    /// Overwrites this node's owned value and mirrors it into `values`
    /// at this node's own arena slot, so a `Node::value(values)` call
    /// against the same position immediately after sees the new value.
    fn write_value(&self, values: &mut [f64], src: StorageView<'_>);
    fn adjoint_snapshot(&self) -> Vec<f64>;
    fn set_adjoint(&self, src: StorageView<'_>);
}

impl Assignable for Leaf {
    fn write_value(&self, values: &mut [f64], src: StorageView<'_>) {
        Leaf::write_value(self, values, src)
    }

    fn adjoint_snapshot(&self) -> Vec<f64> {
        self.adj_to_vec()
    }

    fn set_adjoint(&self, src: StorageView<'_>) {
        Leaf::set_adj(self, src)
    }
}

/// `lhs.assign(rhs)`: forward copies `rhs`'s value into `lhs`'s
/// storage; backward hands `lhs`'s full accumulated adjoint to `rhs`
/// without resetting it, since `lhs` remains a valid gradient target in
/// its own right (it may also be read upstream of this assignment).
pub struct Assign<L, R> {
    lhs: L,
    rhs: R,
    shape: Shape,
}

impl<L: Assignable, R: Node> Assign<L, R> {
    pub fn new(lhs: L, rhs: R) -> Result<Self, AdError> {
        if lhs.shape() != rhs.shape() && !rhs.shape().is_scalar() {
            return Err(AdError::ShapeMismatch {
                expected: lhs.shape(),
                actual: rhs.shape(),
            });
        }
        let shape = lhs.shape();
        Ok(Assign { lhs, rhs, shape })
    }
}

impl<L: Assignable, R: Node> Node for Assign<L, R> {
    fn shape(&self) -> Shape {
        self.shape
    }

    fn value_buffer_size(&self) -> usize {
        self.lhs.value_buffer_size() + self.rhs.value_buffer_size()
    }

    fn adjoint_buffer_size(&self) -> usize {
        self.lhs.adjoint_buffer_size() + self.rhs.adjoint_buffer_size()
    }

    fn bind(&mut self, cursor: &mut Cursor) -> Result<(), AdError> {
        self.lhs.bind(cursor)?;
        self.rhs.bind(cursor)
    }

    fn feval(&mut self, values: &mut [f64]) {
        self.rhs.feval(values);
        let rhs_shape = self.rhs.shape();
        let rhs_value = self.rhs.value(values).to_vec();
        self.lhs
            .write_value(values, StorageView::new(rhs_shape, &rhs_value));
    }

    fn value<'v>(&'v self, values: &'v [f64]) -> StorageView<'v> {
        self.rhs.value(values)
    }

    fn beval(&mut self, values: &[f64], seed: StorageView<'_>) {
        self.lhs.beval(values, seed);
        let total = self.lhs.adjoint_snapshot();
        self.rhs
            .beval(values, StorageView::new(self.shape, &total));
    }

    fn reset_adjoints(&mut self) {
        self.lhs.reset_adjoints();
        self.rhs.reset_adjoints();
    }

    fn deep_clone(&self) -> Self {
        Assign::new(self.lhs.deep_clone(), self.rhs.deep_clone())
            .expect("shape already validated at original construction")
    }
}

/// Defines a compound-assign node (`+=`, `-=`, `*=`, `/=`). Because the
/// product rule for `*=`/`/=` needs the pre-op value of `lhs`, every
/// variant caches one shape-sized snapshot in the value arena — the one
/// genuine backward-time caching need in the whole node algebra (§9).
macro_rules! compound_assign {
    ($(#[$meta:meta])* $name:ident,
     |$old:ident, $rhs:ident| $fwd:expr,
     |$old2:ident, $rhs2:ident| $dold:expr,
     |$old3:ident, $rhs3:ident| $drhs:expr) => {
        $(#[$meta])*
        pub struct $name<L, R> {
            lhs: L,
            rhs: R,
            shape: Shape,
            snapshot_offset: usize,
        }

        impl<L: Assignable, R: Node> $name<L, R> {
            pub fn new(lhs: L, rhs: R) -> Result<Self, AdError> {
                let shape = lhs.shape().elementwise(rhs.shape())?;
                if shape != lhs.shape() {
                    return Err(AdError::ShapeMismatch {
                        expected: lhs.shape(),
                        actual: rhs.shape(),
                    });
                }
                Ok($name {
                    lhs,
                    rhs,
                    shape,
                    snapshot_offset: 0,
                })
            }
        }

        impl<L: Assignable, R: Node> Node for $name<L, R> {
            fn shape(&self) -> Shape {
                self.shape
            }

            fn value_buffer_size(&self) -> usize {
                self.lhs.value_buffer_size() + self.shape.len() + self.rhs.value_buffer_size()
            }

            fn adjoint_buffer_size(&self) -> usize {
                self.lhs.adjoint_buffer_size() + self.rhs.adjoint_buffer_size()
            }

            fn bind(&mut self, cursor: &mut Cursor) -> Result<(), AdError> {
                self.lhs.bind(cursor)?;
                self.rhs.bind(cursor)?;
                let (value_offset, _) = claim_slot(cursor, self.shape.len(), 0);
                self.snapshot_offset = value_offset;
                Ok(())
            }

            fn feval(&mut self, values: &mut [f64]) {
                self.rhs.feval(values);
                let shape = self.shape;
                let n = shape.len();

                let old_snapshot = self.lhs.value(values).to_vec();
                values[self.snapshot_offset..self.snapshot_offset + n]
                    .copy_from_slice(&old_snapshot);

                let rhs_view = self.rhs.value(values);
                let rhs_is_scalar = rhs_view.shape().is_scalar();
                let rhs_values: Vec<f64> = (0..n)
                    .map(|i| if rhs_is_scalar { rhs_view.get(0) } else { rhs_view.get(i) })
                    .collect();

                let mut new_value = vec![0.0; n];
                for i in 0..n {
                    let $old = old_snapshot[i];
                    let $rhs = rhs_values[i];
                    new_value[i] = $fwd;
                }
                self.lhs
                    .write_value(values, StorageView::new(shape, &new_value));
            }

            fn value<'v>(&'v self, values: &'v [f64]) -> StorageView<'v> {
                self.lhs.value(values)
            }

            fn beval(&mut self, values: &[f64], seed: StorageView<'_>) {
                self.lhs.beval(values, seed);
                let total = self.lhs.adjoint_snapshot();
                let n = self.shape.len();
                let snapshot = &values[self.snapshot_offset..self.snapshot_offset + n];
                let rhs_view = self.rhs.value(values);

                let mut d_old = vec![0.0; n];
                let mut d_rhs = vec![0.0; n];
                for i in 0..n {
                    let $old2 = snapshot[i];
                    let $rhs2 = if rhs_view.shape().is_scalar() {
                        rhs_view.get(0)
                    } else {
                        rhs_view.get(i)
                    };
                    let t = total[i];
                    d_old[i] = t * ($dold);
                    let $old3 = snapshot[i];
                    let $rhs3 = if rhs_view.shape().is_scalar() {
                        rhs_view.get(0)
                    } else {
                        rhs_view.get(i)
                    };
                    d_rhs[i] = t * ($drhs);
                }

                self.lhs
                    .set_adjoint(StorageView::new(self.shape, &d_old));
                let rhs_seed = if self.rhs.shape().is_scalar() && n > 1 {
                    vec![d_rhs.iter().sum()]
                } else {
                    d_rhs
                };
                self.rhs
                    .beval(values, StorageView::new(self.rhs.shape(), &rhs_seed));
            }

            fn reset_adjoints(&mut self) {
                self.lhs.reset_adjoints();
                self.rhs.reset_adjoints();
            }

            fn deep_clone(&self) -> Self {
                $name::new(self.lhs.deep_clone(), self.rhs.deep_clone())
                    .expect("shape already validated at original construction")
            }
        }
    };
}

compound_assign!(
    /// `lhs += rhs`.
    AssignAdd,
    |old, rhs| old + rhs,
    |_old, _rhs| 1.0,
    |_old, _rhs| 1.0
);

compound_assign!(
    /// `lhs -= rhs`.
    AssignSub,
    |old, rhs| old - rhs,
    |_old, _rhs| 1.0,
    |_old, _rhs| -1.0
);

compound_assign!(
    /// `lhs *= rhs`.
    AssignMul,
    |old, rhs| old * rhs,
    |_old, rhs| rhs,
    |old, _rhs| old
);

compound_assign!(
    /// `lhs /= rhs`.
    AssignDiv,
    |old, rhs| old / rhs,
    |_old, rhs| 1.0 / rhs,
    |old, rhs| -old / (rhs * rhs)
);
