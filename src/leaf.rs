//! Leaf (owning variable), View (non-owning variable), and Constant.
//!
//! `View` and `Constant` borrow/own their storage directly and never draw
//! on the shared scratch arena. `Leaf` is different: its canonical value
//! and adjoint live behind a shared `Rc<RefCell<..>>` (so clones can
//! alias one variable — see below), and a `RefCell` borrow's lifetime is
//! tied to the borrow call, not to `&self`, so it cannot honestly back a
//! `Node::value`-shaped return of `StorageView<'v>` without either an
//! extra indirection or an actual arena slot. Leaf claims a
//! shape-sized slot in the value arena like any composite node and
//! mirrors its RefCell-owned value into it on every `feval`/`write_value`,
//! so `Node::value` reads a plain arena slice exactly like every other
//! node does, with no unsafe code anywhere.
//!
//! `Leaf` is a cheap-to-clone handle rather than a bare struct: the
//! expression tree is built by ownership, so the only way the same input
//! variable can occur at more than one position in a tree — which §9
//! calls out as the *sole* sharing mechanism in an otherwise tree-shaped
//! graph — is for both positions to hold a clone of the same handle,
//! accumulating into the same underlying adjoint buffer. Each clone still
//! claims and mirrors into its own arena slot at its own tree position.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::AdError;
use crate::node::{claim_slot, Cursor, Node};
use crate::shape::Shape;
use crate::storage::{StorageView, StorageViewMut};

struct LeafInner {
    shape: Shape,
    value: Vec<f64>,
    adjoint: Vec<f64>,
}

/// An input variable. Owns both its value and its adjoint buffer,
/// shape-sized. Adjoints accumulate (`+=`) across every position a clone
/// of this handle occurs in, never overwrite (§3 invariant).
///
/// `value_offset` is this particular clone's own claim in the value
/// arena (see the module doc); it is not shared through `inner`, so two
/// clones of the same leaf occupying two tree positions each mirror into
/// their own slot.
#[derive(Clone)]
pub struct Leaf {
    inner: Rc<RefCell<LeafInner>>,
    value_offset: usize,
}

impl Leaf {
    pub fn new(shape: Shape) -> Self {
        Leaf {
            inner: Rc::new(RefCell::new(LeafInner {
                shape,
                value: vec![0.0; shape.len()],
                adjoint: vec![0.0; shape.len()],
            })),
            value_offset: 0,
        }
    }

    pub fn scalar(init: f64) -> Self {
        let leaf = Leaf::new(Shape::Scalar);
        leaf.inner.borrow_mut().value[0] = init;
        leaf
    }

    pub fn vector(values: impl Into<Vec<f64>>) -> Self {
        let value = values.into();
        let shape = Shape::Vector(value.len());
        Leaf {
            inner: Rc::new(RefCell::new(LeafInner {
                adjoint: vec![0.0; shape.len()],
                value,
                shape,
            })),
            value_offset: 0,
        }
    }

    pub fn matrix(rows: usize, cols: usize, values: impl Into<Vec<f64>>) -> Self {
        let value = values.into();
        assert_eq!(value.len(), rows * cols, "matrix data length mismatch");
        Leaf {
            inner: Rc::new(RefCell::new(LeafInner {
                shape: Shape::Matrix(rows, cols),
                adjoint: vec![0.0; value.len()],
                value,
            })),
            value_offset: 0,
        }
    }

    pub fn shape(&self) -> Shape {
        self.inner.borrow().shape
    }

    pub fn size(&self) -> usize {
        self.shape().len()
    }

    pub fn get(&self, i: usize) -> f64 {
        self.inner.borrow().value[i]
    }

    pub fn get2(&self, i: usize, j: usize) -> f64 {
        let inner = self.inner.borrow();
        match inner.shape {
            Shape::Matrix(_, c) => inner.value[i * c + j],
            _ => panic!("get2 on non-matrix leaf"),
        }
    }

    pub fn get_adj(&self, i: usize) -> f64 {
        self.inner.borrow().adjoint[i]
    }

    pub fn get_adj2(&self, i: usize, j: usize) -> f64 {
        let inner = self.inner.borrow();
        match inner.shape {
            Shape::Matrix(_, c) => inner.adjoint[i * c + j],
            _ => panic!("get_adj2 on non-matrix leaf"),
        }
    }

    pub fn set(&self, i: usize, value: f64) {
        self.inner.borrow_mut().value[i] = value;
    }

    /// Zero this leaf's adjoint buffer. Called automatically before each
    /// backward pass unless [`crate::config::Config::accumulate_leaf_adjoints`]
    /// is set.
    pub fn reset_adj(&self) {
        self.inner
            .borrow_mut()
            .adjoint
            .iter_mut()
            .for_each(|a| *a = 0.0);
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.inner.borrow().value.clone()
    }

    pub fn adj_to_vec(&self) -> Vec<f64> {
        self.inner.borrow().adjoint.clone()
    }

    /// Overwrites the whole value buffer, broadcasting a scalar `src`,
    /// then mirrors the new value into this clone's own arena slot so an
    /// immediately following [`Node::value`] call on the same position
    /// observes it. Used by [`crate::assign::Assign`] and the
    /// compound-assign nodes to copy a new value into this leaf's owned
    /// storage mid-`feval`.
    pub fn write_value(&self, values: &mut [f64], src: StorageView<'_>) {
        {
            let mut inner = self.inner.borrow_mut();
            let shape = inner.shape;
            StorageViewMut::new(shape, &mut inner.value).copy_from(src);
        }
        let inner = self.inner.borrow();
        let n = inner.value.len();
        values[self.value_offset..self.value_offset + n].copy_from_slice(&inner.value);
    }

    /// Overwrites (rather than accumulates into) the adjoint buffer.
    /// Used by compound-assign nodes to hand the "credit so far" off to
    /// the right-hand expression and replace it with the contribution
    /// flowing further back through the left-hand chain, in one step.
    pub fn set_adj(&self, src: StorageView<'_>) {
        let mut inner = self.inner.borrow_mut();
        let shape = inner.shape;
        StorageViewMut::new(shape, &mut inner.adjoint).copy_from(src);
    }

    /// True if `self` and `other` are clones of the same underlying
    /// variable (share storage), as opposed to two distinct leaves that
    /// merely hold equal values.
    pub fn is_same(&self, other: &Leaf) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Node for Leaf {
    fn shape(&self) -> Shape {
        Leaf::shape(self)
    }

    /// Claims a shape-sized slot, same as any composite node — see the
    /// module doc for why a leaf mirrors into the arena instead of
    /// handing back a borrow straight out of its `RefCell`.
    fn value_buffer_size(&self) -> usize {
        self.shape().len()
    }

    fn adjoint_buffer_size(&self) -> usize {
        0
    }

    fn bind(&mut self, cursor: &mut Cursor) -> Result<(), AdError> {
        let (value_offset, _) = claim_slot(cursor, self.shape().len(), 0);
        self.value_offset = value_offset;
        Ok(())
    }

    fn feval(&mut self, values: &mut [f64]) {
        let inner = self.inner.borrow();
        let n = inner.value.len();
        values[self.value_offset..self.value_offset + n].copy_from_slice(&inner.value);
    }

    fn value<'v>(&'v self, values: &'v [f64]) -> StorageView<'v> {
        let shape = self.shape();
        StorageView::new(shape, &values[self.value_offset..self.value_offset + shape.len()])
    }

    fn beval(&mut self, _values: &[f64], seed: StorageView<'_>) {
        let mut inner = self.inner.borrow_mut();
        let shape = inner.shape;
        let mut adj = StorageViewMut::new(shape, &mut inner.adjoint);
        adj.add_assign(seed);
    }

    fn reset_adjoints(&mut self) {
        Leaf::reset_adj(self);
    }

    fn deep_clone(&self) -> Self {
        let inner = self.inner.borrow();
        Leaf {
            inner: Rc::new(RefCell::new(LeafInner {
                shape: inner.shape,
                value: inner.value.clone(),
                adjoint: vec![0.0; inner.adjoint.len()],
            })),
            value_offset: 0,
        }
    }
}

/// A non-owning leaf: value and adjoint live in storage the caller
/// already owns (e.g. a slice of a larger `Vec`, or another `Leaf`'s
/// buffer sliced via `head`/`tail`). The caller must guarantee the
/// borrowed storage outlives the view and is not mutated concurrently
/// from elsewhere.
pub struct View<'a> {
    shape: Shape,
    value: &'a mut [f64],
    adjoint: &'a mut [f64],
}

impl<'a> View<'a> {
    pub fn new(shape: Shape, value: &'a mut [f64], adjoint: &'a mut [f64]) -> Self {
        assert_eq!(value.len(), shape.len());
        assert_eq!(adjoint.len(), shape.len());
        View {
            shape,
            value,
            adjoint,
        }
    }

    pub fn get(&self, i: usize) -> f64 {
        self.value[i]
    }

    pub fn get_adj(&self, i: usize) -> f64 {
        self.adjoint[i]
    }

    pub fn reset_adj(&mut self) {
        self.adjoint.iter_mut().for_each(|a| *a = 0.0);
    }

    pub fn write_value(&mut self, src: StorageView<'_>) {
        let shape = self.shape;
        StorageViewMut::new(shape, &mut *self.value).copy_from(src);
    }

    pub fn set_adj(&mut self, src: StorageView<'_>) {
        let shape = self.shape;
        StorageViewMut::new(shape, &mut *self.adjoint).copy_from(src);
    }

    pub fn adj_to_vec(&self) -> Vec<f64> {
        self.adjoint.to_vec()
    }
}

impl<'a> Node for View<'a> {
    fn shape(&self) -> Shape {
        self.shape
    }

    fn value_buffer_size(&self) -> usize {
        0
    }

    fn adjoint_buffer_size(&self) -> usize {
        0
    }

    fn bind(&mut self, _cursor: &mut Cursor) -> Result<(), AdError> {
        Ok(())
    }

    fn feval(&mut self, _values: &mut [f64]) {}

    fn value<'v>(&'v self, _values: &'v [f64]) -> StorageView<'v> {
        StorageView::new(self.shape, &*self.value)
    }

    fn beval(&mut self, _values: &[f64], seed: StorageView<'_>) {
        let mut adj = StorageViewMut::new(self.shape, &mut *self.adjoint);
        adj.add_assign(seed);
    }

    fn reset_adjoints(&mut self) {
        View::reset_adj(self);
    }

    fn deep_clone(&self) -> Self {
        panic!(
            "View cannot be deep-cloned: its storage is an exclusive borrow \
             rather than its own allocation. Parallel Jacobian dispatch needs \
             Leaf-owned inputs; build per-worker views from owned storage instead."
        )
    }
}

/// A compile-time-fixed value. Owns only a value; `beval` is a no-op and
/// `adjoint_buffer_size` is 0, so constants are effectively pruned from
/// the backward traversal (§3 invariant).
#[derive(Debug, Clone)]
pub struct Constant {
    shape: Shape,
    value: Vec<f64>,
}

impl Constant {
    pub fn scalar(value: f64) -> Self {
        Constant {
            shape: Shape::Scalar,
            value: vec![value],
        }
    }

    pub fn vector(values: impl Into<Vec<f64>>) -> Self {
        let value = values.into();
        Constant {
            shape: Shape::Vector(value.len()),
            value,
        }
    }

    pub fn matrix(rows: usize, cols: usize, values: impl Into<Vec<f64>>) -> Self {
        let value = values.into();
        assert_eq!(value.len(), rows * cols);
        Constant {
            shape: Shape::Matrix(rows, cols),
            value,
        }
    }
}

impl Node for Constant {
    fn shape(&self) -> Shape {
        self.shape
    }

    fn value_buffer_size(&self) -> usize {
        0
    }

    fn adjoint_buffer_size(&self) -> usize {
        0
    }

    fn bind(&mut self, _cursor: &mut Cursor) -> Result<(), AdError> {
        Ok(())
    }

    fn feval(&mut self, _values: &mut [f64]) {}

    fn value<'v>(&'v self, _values: &'v [f64]) -> StorageView<'v> {
        StorageView::new(self.shape, &self.value)
    }

    fn beval(&mut self, _values: &[f64], _seed: StorageView<'_>) {
        // Constants contribute no leaf adjoint: no-op by design.
    }

    fn reset_adjoints(&mut self) {}

    fn deep_clone(&self) -> Self {
        self.clone()
    }
}
