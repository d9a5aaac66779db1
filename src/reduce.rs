//! Reductions (§4.5): `sum`, `prod`, `norm`, `dot`, plus two supplements
//! ported from the originating test suite: `sum_elements` (collapse one
//! vector/matrix-shaped expression to the scalar sum of its own
//! components) and `for_each` (a runtime-sized, glue-style cumulative
//! chain built from a functor applied to each index, ported from that
//! suite's `foreach` scenario — a scan, not a reduction).

use crate::error::AdError;
use crate::node::{claim_slot, Cursor, Node};
use crate::shape::Shape;
use crate::storage::{StorageView, StorageViewMut};

/// Elementwise sum over a homogeneously-typed sequence of same-shaped
/// sub-expressions, e.g. `sum((0..n).map(|i| w[i].clone() * x[i].clone()))`.
pub struct Sum<N> {
    children: Vec<N>,
    shape: Shape,
    offset: usize,
}

impl<N: Node> Sum<N> {
    pub fn new(children: Vec<N>) -> Result<Self, AdError> {
        let shape = children
            .first()
            .map(|c| c.shape())
            .unwrap_or(Shape::Scalar);
        for c in &children {
            if c.shape() != shape {
                return Err(AdError::ShapeMismatch {
                    expected: shape,
                    actual: c.shape(),
                });
            }
        }
        Ok(Sum {
            children,
            shape,
            offset: 0,
        })
    }
}

impl<N: Node> Node for Sum<N> {
    fn shape(&self) -> Shape {
        self.shape
    }

    fn value_buffer_size(&self) -> usize {
        self.shape.len()
            + self
                .children
                .iter()
                .map(|c| c.value_buffer_size())
                .sum::<usize>()
    }

    fn adjoint_buffer_size(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.adjoint_buffer_size())
            .sum()
    }

    fn bind(&mut self, cursor: &mut Cursor) -> Result<(), AdError> {
        for c in self.children.iter_mut() {
            c.bind(cursor)?;
        }
        let (value_offset, _) = claim_slot(cursor, self.shape.len(), 0);
        self.offset = value_offset;
        Ok(())
    }

    fn feval(&mut self, values: &mut [f64]) {
        for c in self.children.iter_mut() {
            c.feval(values);
        }
        let shape = self.shape;
        let n = shape.len();
        let mut out = StorageViewMut::new(shape, &mut values[self.offset..self.offset + n]);
        out.zero();
        for c in &self.children {
            out.add_assign(c.value(values));
        }
    }

    fn value<'v>(&'v self, values: &'v [f64]) -> StorageView<'v> {
        StorageView::new(self.shape, &values[self.offset..self.offset + self.shape.len()])
    }

    fn beval(&mut self, values: &[f64], seed: StorageView<'_>) {
        let copy = seed.to_vec();
        let shape = seed.shape();
        for c in self.children.iter_mut() {
            c.beval(values, StorageView::new(shape, &copy));
        }
    }

    fn reset_adjoints(&mut self) {
        for c in self.children.iter_mut() {
            c.reset_adjoints();
        }
    }

    fn deep_clone(&self) -> Self {
        Sum {
            children: self.children.iter().map(|c| c.deep_clone()).collect(),
            shape: self.shape,
            offset: 0,
        }
    }
}

/// Elementwise product over a homogeneously-typed sequence.
pub struct Prod<N> {
    children: Vec<N>,
    shape: Shape,
    offset: usize,
}

impl<N: Node> Prod<N> {
    pub fn new(children: Vec<N>) -> Result<Self, AdError> {
        let shape = children
            .first()
            .map(|c| c.shape())
            .unwrap_or(Shape::Scalar);
        for c in &children {
            if c.shape() != shape {
                return Err(AdError::ShapeMismatch {
                    expected: shape,
                    actual: c.shape(),
                });
            }
        }
        Ok(Prod {
            children,
            shape,
            offset: 0,
        })
    }
}

impl<N: Node> Node for Prod<N> {
    fn shape(&self) -> Shape {
        self.shape
    }

    fn value_buffer_size(&self) -> usize {
        self.shape.len()
            + self
                .children
                .iter()
                .map(|c| c.value_buffer_size())
                .sum::<usize>()
    }

    fn adjoint_buffer_size(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.adjoint_buffer_size())
            .sum()
    }

    fn bind(&mut self, cursor: &mut Cursor) -> Result<(), AdError> {
        for c in self.children.iter_mut() {
            c.bind(cursor)?;
        }
        let (value_offset, _) = claim_slot(cursor, self.shape.len(), 0);
        self.offset = value_offset;
        Ok(())
    }

    fn feval(&mut self, values: &mut [f64]) {
        for c in self.children.iter_mut() {
            c.feval(values);
        }
        let shape = self.shape;
        let n = shape.len();
        let mut out = StorageViewMut::new(shape, &mut values[self.offset..self.offset + n]);
        out.fill(1.0);
        for c in &self.children {
            let cv = c.value(values);
            for i in 0..n {
                let cur = out.as_slice()[i];
                out.set(i, cur * cv.get(i));
            }
        }
    }

    fn value<'v>(&'v self, values: &'v [f64]) -> StorageView<'v> {
        StorageView::new(self.shape, &values[self.offset..self.offset + self.shape.len()])
    }

    fn beval(&mut self, values: &[f64], seed: StorageView<'_>) {
        let n = self.shape.len();
        let child_values: Vec<Vec<f64>> = self.children.iter().map(|c| c.value(values).to_vec()).collect();
        for (k, c) in self.children.iter_mut().enumerate() {
            let mut local = vec![0.0; n];
            for i in 0..n {
                let others: f64 = child_values
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != k)
                    .map(|(_, v)| v[i])
                    .product();
                local[i] = seed.get(if seed.shape().is_scalar() { 0 } else { i }) * others;
            }
            c.beval(values, StorageView::new(c.shape(), &local));
        }
    }

    fn reset_adjoints(&mut self) {
        for c in self.children.iter_mut() {
            c.reset_adjoints();
        }
    }

    fn deep_clone(&self) -> Self {
        Sum {
            children: self.children.iter().map(|c| c.deep_clone()).collect(),
            shape: self.shape,
            offset: 0,
        }
    }
}

/// Squared Euclidean norm, `Σ x_i²`, always collapsing to `Scalar`.
pub struct Norm<C> {
    child: C,
    shape: Shape,
    offset: usize,
}

impl<C: Node> Norm<C> {
    pub fn new(child: C) -> Self {
        Norm {
            child,
            shape: Shape::Scalar,
            offset: 0,
        }
    }
}

impl<C: Node> Node for Norm<C> {
    fn shape(&self) -> Shape {
        self.shape
    }

    fn value_buffer_size(&self) -> usize {
        1 + self.child.value_buffer_size()
    }

    fn adjoint_buffer_size(&self) -> usize {
        self.child.adjoint_buffer_size()
    }

    fn bind(&mut self, cursor: &mut Cursor) -> Result<(), AdError> {
        self.child.bind(cursor)?;
        let (value_offset, _) = claim_slot(cursor, 1, 0);
        self.offset = value_offset;
        Ok(())
    }

    fn feval(&mut self, values: &mut [f64]) {
        self.child.feval(values);
        let sq = self.child.value(values).squared_norm();
        values[self.offset] = sq;
    }

    fn value<'v>(&'v self, values: &'v [f64]) -> StorageView<'v> {
        StorageView::new(Shape::Scalar, &values[self.offset..self.offset + 1])
    }

    fn beval(&mut self, values: &[f64], seed: StorageView<'_>) {
        let s = seed.get(0);
        let child_shape = self.child.shape();
        let n = child_shape.len();
        let x = self.child.value(values);
        let local: Vec<f64> = (0..n).map(|i| 2.0 * s * x.get(i)).collect();
        self.child
            .beval(values, StorageView::new(child_shape, &local));
    }

    fn reset_adjoints(&mut self) {
        self.child.reset_adjoints();
    }

    fn deep_clone(&self) -> Self {
        Norm::new(self.child.deep_clone())
    }
}

/// Collapses a single vector/matrix-shaped child down to the scalar sum
/// of its own components (`ad::sum(vec_expr)` in the original), as
/// opposed to [`Sum`], which elementwise-sums several independent
/// same-shaped expressions. Same shape as [`Norm`], just with a flat
/// seed broadcast backward instead of `2 * s * x`.
pub struct SumElements<C> {
    child: C,
    shape: Shape,
    offset: usize,
}

impl<C: Node> SumElements<C> {
    pub fn new(child: C) -> Self {
        SumElements {
            child,
            shape: Shape::Scalar,
            offset: 0,
        }
    }
}

impl<C: Node> Node for SumElements<C> {
    fn shape(&self) -> Shape {
        self.shape
    }

    fn value_buffer_size(&self) -> usize {
        1 + self.child.value_buffer_size()
    }

    fn adjoint_buffer_size(&self) -> usize {
        self.child.adjoint_buffer_size()
    }

    fn bind(&mut self, cursor: &mut Cursor) -> Result<(), AdError> {
        self.child.bind(cursor)?;
        let (value_offset, _) = claim_slot(cursor, 1, 0);
        self.offset = value_offset;
        Ok(())
    }

    fn feval(&mut self, values: &mut [f64]) {
        self.child.feval(values);
        let total = self.child.value(values).sum();
        values[self.offset] = total;
    }

    fn value<'v>(&'v self, values: &'v [f64]) -> StorageView<'v> {
        StorageView::new(Shape::Scalar, &values[self.offset..self.offset + 1])
    }

    fn beval(&mut self, values: &[f64], seed: StorageView<'_>) {
        let s = seed.get(0);
        let child_shape = self.child.shape();
        let local = vec![s; child_shape.len()];
        self.child
            .beval(values, StorageView::new(child_shape, &local));
    }

    fn reset_adjoints(&mut self) {
        self.child.reset_adjoints();
    }

    fn deep_clone(&self) -> Self {
        SumElements::new(self.child.deep_clone())
    }
}

/// `dot(m, x)`: `Matrix(r, c) . Vector(c) -> Vector(r)`.
pub struct Dot<M, X> {
    m: M,
    x: X,
    shape: Shape,
    offset: usize,
}

impl<M: Node, X: Node> Dot<M, X> {
    pub fn new(m: M, x: X) -> Result<Self, AdError> {
        let shape = m.shape().dot(x.shape())?;
        Ok(Dot {
            m,
            x,
            shape,
            offset: 0,
        })
    }
}

impl<M: Node, X: Node> Node for Dot<M, X> {
    fn shape(&self) -> Shape {
        self.shape
    }

    fn value_buffer_size(&self) -> usize {
        self.shape.len() + self.m.value_buffer_size() + self.x.value_buffer_size()
    }

    fn adjoint_buffer_size(&self) -> usize {
        self.m.adjoint_buffer_size() + self.x.adjoint_buffer_size()
    }

    fn bind(&mut self, cursor: &mut Cursor) -> Result<(), AdError> {
        self.m.bind(cursor)?;
        self.x.bind(cursor)?;
        let (value_offset, _) = claim_slot(cursor, self.shape.len(), 0);
        self.offset = value_offset;
        Ok(())
    }

    fn feval(&mut self, values: &mut [f64]) {
        self.m.feval(values);
        self.x.feval(values);
        let mv = self.m.value(values).matvec(self.x.value(values));
        let n = mv.len();
        values[self.offset..self.offset + n].copy_from_slice(&mv);
    }

    fn value<'v>(&'v self, values: &'v [f64]) -> StorageView<'v> {
        StorageView::new(self.shape, &values[self.offset..self.offset + self.shape.len()])
    }

    fn beval(&mut self, values: &[f64], seed: StorageView<'_>) {
        let (rows, cols) = match self.m.shape() {
            Shape::Matrix(r, c) => (r, c),
            s => panic!("Dot lhs must be a matrix, got {s}"),
        };
        let x_view = self.x.value(values);

        // M_adj[i][j] += seed[i] * x[j]  (outer product)
        let mut m_local = vec![0.0; rows * cols];
        for i in 0..rows {
            for j in 0..cols {
                m_local[i * cols + j] = seed.get(i) * x_view.get(j);
            }
        }
        self.m
            .beval(values, StorageView::new(Shape::Matrix(rows, cols), &m_local));

        // x_adj += M^T . seed
        let x_local = self.m.value(values).matvec_transpose(seed);
        self.x
            .beval(values, StorageView::new(Shape::Vector(cols), &x_local));
    }

    fn reset_adjoints(&mut self) {
        self.m.reset_adjoints();
        self.x.reset_adjoints();
    }

    fn deep_clone(&self) -> Self {
        Dot::new(self.m.deep_clone(), self.x.deep_clone())
            .expect("shape already validated at original construction")
    }
}

/// Glues a sequence of homogeneously-typed stages built from an indexed
/// functor, forward in construction order and backward in reverse,
/// exactly like the fixed-arity tuples in [`crate::glue`] but for a
/// runtime-determined count. The functor is typically a closure over the
/// previous stage's output (see the original's `foreach` cumulative
/// product scan), so this never collapses to a scalar the way
/// [`Sum`]/[`Prod`] do — the glue's own value is simply its last stage's.
pub struct ForEach<N> {
    stages: Vec<N>,
    shape: Shape,
}

impl<N: Node> ForEach<N> {
    pub fn new(stages: Vec<N>) -> Result<Self, AdError> {
        let shape = stages
            .last()
            .map(|c| c.shape())
            .ok_or(AdError::UnboundEvaluation)?;
        Ok(ForEach { stages, shape })
    }
}

impl<N: Node> Node for ForEach<N> {
    fn shape(&self) -> Shape {
        self.shape
    }

    fn value_buffer_size(&self) -> usize {
        self.stages.iter().map(|c| c.value_buffer_size()).sum()
    }

    fn adjoint_buffer_size(&self) -> usize {
        self.stages.iter().map(|c| c.adjoint_buffer_size()).sum()
    }

    fn bind(&mut self, cursor: &mut Cursor) -> Result<(), AdError> {
        for c in self.stages.iter_mut() {
            c.bind(cursor)?;
        }
        Ok(())
    }

    fn feval(&mut self, values: &mut [f64]) {
        for c in self.stages.iter_mut() {
            c.feval(values);
        }
    }

    fn value<'v>(&'v self, values: &'v [f64]) -> StorageView<'v> {
        self.stages
            .last()
            .expect("ForEach::new rejects an empty stage list")
            .value(values)
    }

    fn beval(&mut self, values: &[f64], seed: StorageView<'_>) {
        let mut stages = self.stages.iter_mut().rev();
        if let Some(last) = stages.next() {
            last.beval(values, seed);
        }
        for c in stages {
            let shape = c.shape();
            let zero = vec![0.0; shape.len()];
            c.beval(values, StorageView::new(shape, &zero));
        }
    }

    fn reset_adjoints(&mut self) {
        for c in self.stages.iter_mut() {
            c.reset_adjoints();
        }
    }

    fn deep_clone(&self) -> Self {
        ForEach {
            stages: self.stages.iter().map(|c| c.deep_clone()).collect(),
            shape: self.shape,
        }
    }
}

/// Materializes `n` homogeneously-typed stages from a functor indexed
/// `0..n` and glues them in sequence (see [`ForEach`]); ported from the
/// original's `foreach` cumulative-scan scenario rather than a
/// sum/product reduction.
pub fn for_each<N: Node>(n: usize, mut f: impl FnMut(usize) -> N) -> Result<ForEach<N>, AdError> {
    ForEach::new((0..n).map(&mut f).collect())
}

pub fn sum<N: Node>(children: Vec<N>) -> Result<Sum<N>, AdError> {
    Sum::new(children)
}

pub fn prod<N: Node>(children: Vec<N>) -> Result<Prod<N>, AdError> {
    Prod::new(children)
}

pub fn norm<C: Node>(child: C) -> Norm<C> {
    Norm::new(child)
}

pub fn sum_elements<C: Node>(child: C) -> SumElements<C> {
    SumElements::new(child)
}

pub fn dot<M: Node, X: Node>(m: M, x: X) -> Result<Dot<M, X>, AdError> {
    Dot::new(m, x)
}
