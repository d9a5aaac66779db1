//! Uniform access to the dense, contiguous, row-major tensors that flow
//! through the node algebra. A "storage" is nothing more than a `Shape`
//! paired with a flat `f64` slice; [`StorageView`] borrows one
//! immutably, [`StorageViewMut`] mutably. Every node reads and writes
//! through this facade rather than poking at raw slices directly, so
//! the elementwise/reduction/matvec code lives in exactly one place.
//!
//! Matrix-vector products delegate to `ndarray`'s `Array2::dot`, which is
//! this crate's one piece of borrowed dense linear algebra (§4.2 scopes
//! a full numeric-library integration out, but a single `.dot()` call is
//! exactly the "callable matrix/vector facade" it does ask for).

use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::shape::Shape;

/// A read-only view into a contiguous, row-major tensor.
#[derive(Clone, Copy)]
pub struct StorageView<'a> {
    shape: Shape,
    data: &'a [f64],
}

impl<'a> StorageView<'a> {
    pub fn new(shape: Shape, data: &'a [f64]) -> Self {
        debug_assert_eq!(shape.len(), data.len());
        StorageView { shape, data }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn as_slice(&self) -> &'a [f64] {
        self.data
    }

    pub fn get(&self, i: usize) -> f64 {
        self.data[i]
    }

    /// Row-major element access for `Matrix(r, c)` storage.
    pub fn get2(&self, i: usize, j: usize) -> f64 {
        match self.shape {
            Shape::Matrix(_, c) => self.data[i * c + j],
            _ => panic!("get2 called on non-matrix storage {}", self.shape),
        }
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.data.to_vec()
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    pub fn product(&self) -> f64 {
        self.data.iter().product()
    }

    /// Squared Euclidean norm, `Σ x_i²`.
    pub fn squared_norm(&self) -> f64 {
        self.data.iter().map(|x| x * x).sum()
    }

    fn as_ndarray(&self) -> ArrayView1<'a, f64> {
        ArrayView1::from(self.data)
    }

    fn as_matrix(&self) -> ArrayView2<'a, f64> {
        match self.shape {
            Shape::Matrix(r, c) => ArrayView2::from_shape((r, c), self.data)
                .expect("row-major matrix storage is always reshape-able"),
            _ => panic!("as_matrix called on non-matrix storage {}", self.shape),
        }
    }

    /// `self . rhs` where `self` is `Matrix(r, c)` and `rhs` is `Vector(c)`.
    pub fn matvec(&self, rhs: StorageView<'_>) -> Vec<f64> {
        self.as_matrix().dot(&rhs.as_ndarray()).to_vec()
    }

    /// `self^T . rhs` where `self` is `Matrix(r, c)` and `rhs` is `Vector(r)`.
    pub fn matvec_transpose(&self, rhs: StorageView<'_>) -> Vec<f64> {
        self.as_matrix().t().dot(&rhs.as_ndarray()).to_vec()
    }

    pub fn head(&self, n: usize) -> StorageView<'a> {
        StorageView::new(Shape::Vector(n), &self.data[..n])
    }

    pub fn tail(&self, n: usize) -> StorageView<'a> {
        let len = self.data.len();
        StorageView::new(Shape::Vector(n), &self.data[len - n..])
    }
}

/// A mutable view into a contiguous, row-major tensor.
pub struct StorageViewMut<'a> {
    shape: Shape,
    data: &'a mut [f64],
}

impl<'a> StorageViewMut<'a> {
    pub fn new(shape: Shape, data: &'a mut [f64]) -> Self {
        debug_assert_eq!(shape.len(), data.len());
        StorageViewMut { shape, data }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn as_slice(&self) -> &[f64] {
        self.data
    }

    pub fn as_view(&self) -> StorageView<'_> {
        StorageView::new(self.shape, self.data)
    }

    pub fn fill(&mut self, value: f64) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    pub fn zero(&mut self) {
        self.fill(0.0);
    }

    pub fn set(&mut self, i: usize, value: f64) {
        self.data[i] = value;
    }

    pub fn copy_from(&mut self, src: StorageView<'_>) {
        match (self.shape, src.shape) {
            (a, b) if a == b => self.data.copy_from_slice(src.data),
            (a, Shape::Scalar) => self.data.iter_mut().for_each(|x| *x = src.data[0]),
            (a, b) => panic!("copy_from shape mismatch: {a} <- {b}"),
        }
    }

    /// Elementwise accumulate, `self[i] += rhs[i]`, broadcasting a scalar
    /// `rhs` across `self` when shapes differ.
    pub fn add_assign(&mut self, rhs: StorageView<'_>) {
        match rhs.shape {
            Shape::Scalar if !self.shape.is_scalar() => {
                let v = rhs.data[0];
                self.data.iter_mut().for_each(|x| *x += v);
            }
            _ => {
                debug_assert_eq!(self.data.len(), rhs.data.len());
                self.data
                    .iter_mut()
                    .zip(rhs.data.iter())
                    .for_each(|(x, y)| *x += y);
            }
        }
    }

    pub fn apply_unary(&mut self, src: StorageView<'_>, f: impl Fn(f64) -> f64) {
        debug_assert_eq!(self.data.len(), src.data.len());
        self.data
            .iter_mut()
            .zip(src.data.iter())
            .for_each(|(out, &x)| *out = f(x));
    }

    pub fn apply_binary(
        &mut self,
        lhs: StorageView<'_>,
        rhs: StorageView<'_>,
        f: impl Fn(f64, f64) -> f64,
    ) {
        let n = self.data.len();
        for i in 0..n {
            let a = broadcast_get(lhs, i);
            let b = broadcast_get(rhs, i);
            self.data[i] = f(a, b);
        }
    }

    pub fn head(&mut self, n: usize) -> StorageViewMut<'_> {
        StorageViewMut::new(Shape::Vector(n), &mut self.data[..n])
    }

    pub fn tail(&mut self, n: usize) -> StorageViewMut<'_> {
        let len = self.data.len();
        StorageViewMut::new(Shape::Vector(n), &mut self.data[len - n..])
    }
}

fn broadcast_get(view: StorageView<'_>, i: usize) -> f64 {
    if view.shape.is_scalar() {
        view.data[0]
    } else {
        view.data[i]
    }
}

/// Builds an owned row-major matrix from a closure, used by tests and by
/// [`crate::function::Function::jacobian`] to assemble the result.
pub fn owned_matrix(rows: usize, cols: usize, f: impl Fn(usize, usize) -> f64) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(i, j)| f(i, j))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_and_norm() {
        let data = [1.0, 2.0, 3.0];
        let v = StorageView::new(Shape::Vector(3), &data);
        assert_eq!(v.sum(), 6.0);
        assert_eq!(v.squared_norm(), 14.0);
        assert_eq!(v.product(), 6.0);
    }

    #[test]
    fn matvec_matches_manual() {
        // M = [[1,2],[3,4],[5,6]], x = [1, 1]
        let m = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let x = [1.0, 1.0];
        let mv = StorageView::new(Shape::Matrix(3, 2), &m);
        let xv = StorageView::new(Shape::Vector(2), &x);
        assert_eq!(mv.matvec(xv), vec![3.0, 7.0, 11.0]);
    }

    #[test]
    fn add_assign_broadcasts_scalar() {
        let mut buf = [0.0, 0.0, 0.0];
        {
            let mut out = StorageViewMut::new(Shape::Vector(3), &mut buf);
            let s = [5.0];
            out.add_assign(StorageView::new(Shape::Scalar, &s));
        }
        assert_eq!(buf, [5.0, 5.0, 5.0]);
    }

    #[test]
    fn head_tail_alias_into_parent() {
        let mut buf = [1.0, 2.0, 3.0, 4.0];
        {
            let mut view = StorageViewMut::new(Shape::Vector(4), &mut buf);
            let mut tail = view.tail(2);
            tail.fill(9.0);
        }
        assert_eq!(buf, [1.0, 2.0, 9.0, 9.0]);
    }
}
