//! Scenario-level integration tests, ported from the originating test
//! suite's node-algebra scenarios: leaves combined through unary and
//! binary operators, assignment/compound-assignment chains glued
//! together, and the four reductions.

use revad::assign::{Assign, AssignAdd, AssignDiv, AssignMul, AssignSub};
use revad::bind::bind;
use revad::binary::{Add, Mul, Sub};
use revad::leaf::{Constant, Leaf};
use revad::node::Node;
use revad::reduce::{dot, norm, sum, sum_elements};
use revad::unary::{Cos, Sin};

#[test]
fn leaf_unary() {
    let x = Leaf::scalar(1.0);
    let expr = Sin::new(x.clone());
    let mut bound = bind(expr).unwrap();
    let out = bound.autodiff();
    assert!((out.get(0) - 1.0_f64.sin()).abs() < 1e-12);
    assert!((x.get_adj(0) - 1.0_f64.cos()).abs() < 1e-12);
}

#[test]
fn leaf_unary_unary() {
    let x = Leaf::scalar(0.3);
    let expr = Cos::new(Sin::new(x.clone()));
    let mut bound = bind(expr).unwrap();
    let out = bound.autodiff();
    let fx = 0.3_f64.sin().cos();
    assert!((out.get(0) - fx).abs() < 1e-12);
    // d/dx cos(sin(x)) = -sin(sin(x)) * cos(x)
    let expected = -0.3_f64.sin().sin() * 0.3_f64.cos();
    assert!((x.get_adj(0) - expected).abs() < 1e-12);
}

#[test]
fn leaf_leaf_binary() {
    let x = Leaf::scalar(2.0);
    let y = Leaf::scalar(5.0);
    let expr = Mul::new(x.clone(), y.clone()).unwrap();
    let mut bound = bind(expr).unwrap();
    let out = bound.autodiff();
    assert_eq!(out.get(0), 10.0);
    assert_eq!(x.get_adj(0), 5.0);
    assert_eq!(y.get_adj(0), 2.0);
}

#[test]
fn leaf_unary_binary() {
    let x = Leaf::scalar(1.0);
    let y = Leaf::scalar(2.0);
    let expr = Add::new(Sin::new(x.clone()), y.clone()).unwrap();
    let mut bound = bind(expr).unwrap();
    let out = bound.autodiff();
    assert!((out.get(0) - (1.0_f64.sin() + 2.0)).abs() < 1e-12);
    assert!((x.get_adj(0) - 1.0_f64.cos()).abs() < 1e-12);
    assert_eq!(y.get_adj(0), 1.0);
}

#[test]
fn leaf_binary_eq_glue() {
    // x = a * b; y = x + a  (glue of an assign and a use of x)
    let a = Leaf::scalar(3.0);
    let b = Leaf::scalar(4.0);
    let x = Leaf::scalar(0.0);
    let y = Leaf::scalar(0.0);

    let stage1 = Assign::new(x.clone(), Mul::new(a.clone(), b.clone()).unwrap()).unwrap();
    let stage2 = Assign::new(y.clone(), Add::new(x.clone(), a.clone()).unwrap()).unwrap();
    let glued = (stage1, stage2);

    let mut bound = bind(glued).unwrap();
    let out = bound.autodiff();
    assert_eq!(out.get(0), 15.0); // (3*4) + 3
    // d(y)/d(a) via x-path = b = 4, plus direct a-path = 1 => 5
    assert_eq!(a.get_adj(0), 5.0);
    assert_eq!(b.get_adj(0), 3.0);
}

#[test]
fn leaf_opeq_chain() {
    // x = 2; x += a (a=3) ; x *= b (b=4) => x = (2+3)*4 = 20
    let a = Leaf::scalar(3.0);
    let b = Leaf::scalar(4.0);
    let x = Leaf::scalar(2.0);

    let stage1 = AssignAdd::new(x.clone(), a.clone()).unwrap();
    let stage2 = AssignMul::new(x.clone(), b.clone()).unwrap();
    let glued = (stage1, stage2);

    let mut bound = bind(glued).unwrap();
    let out = bound.autodiff();
    assert_eq!(out.get(0), 20.0);
    // d(x_final)/d(b) = old_x_before_mul = 5
    assert_eq!(b.get_adj(0), 5.0);
    // d(x_final)/d(a) = d(x_final)/d(x_after_add) * 1 = b = 4
    assert_eq!(a.get_adj(0), 4.0);
}

#[test]
fn leaf_opeq_many_nested() {
    // The full nine-stage compound-assign cascade: vec_expr (a vector)
    // and scl_expr (a scalar) are mutated through eight compound
    // assigns, glued to a final `sum_elements(vec_expr)`. Nested as two
    // glue groups (six stages, then three) since glue is only defined up
    // to arity six — nesting composes the same as one flat sequence,
    // since forward order and reverse order are both associative under
    // concatenation.
    let vec_expr = Leaf::vector(vec![1.0, 2.0, 3.0]);
    let scl_expr = Leaf::scalar(5.0);
    let n = 3.0;

    let group1 = (
        AssignMul::new(vec_expr.clone(), scl_expr.clone()).unwrap(), // vec *= scl
        AssignAdd::new(
            vec_expr.clone(),
            Sub::new(vec_expr.clone(), scl_expr.clone()).unwrap(),
        )
        .unwrap(), // vec += vec - scl
        AssignMul::new(
            scl_expr.clone(),
            Sub::new(scl_expr.clone(), Constant::scalar(2.0)).unwrap(),
        )
        .unwrap(), // scl *= scl - 2
        AssignDiv::new(scl_expr.clone(), Constant::scalar(1.0)).unwrap(), // scl /= 1
        AssignSub::new(
            vec_expr.clone(),
            Mul::new(Constant::scalar(2.0), vec_expr.clone()).unwrap(),
        )
        .unwrap(), // vec -= 2 * vec
        AssignMul::new(vec_expr.clone(), Constant::scalar(-1.0)).unwrap(), // vec *= -1
    );
    let group2 = (
        AssignSub::new(vec_expr.clone(), scl_expr.clone()).unwrap(), // vec -= scl
        AssignDiv::new(vec_expr.clone(), scl_expr.clone()).unwrap(), // vec /= scl
        sum_elements(vec_expr.clone()),
    );

    let vec_orig = vec_expr.to_vec();
    let scl_orig = scl_expr.get(0);
    let vec_sum: f64 = vec_orig.iter().sum();
    let expected = 1.0 / (scl_orig - 2.0) * (2.0 * vec_sum - n) - n;

    let mut bound = bind((group1, group2)).unwrap();
    let out = bound.autodiff();
    assert!((out.get(0) - expected).abs() < 1e-9);

    let expected_scl_adj =
        -1.0 / (scl_orig - 2.0).powi(2) * (2.0 * vec_sum - n);
    assert!((scl_expr.get_adj(0) - expected_scl_adj).abs() < 1e-9);

    let expected_vec_adj = 2.0 / (scl_orig - 2.0);
    for i in 0..3 {
        assert!((vec_expr.get_adj(i) - expected_vec_adj).abs() < 1e-9);
    }
}

#[test]
fn sumnode() {
    let w = vec![Leaf::scalar(2.0), Leaf::scalar(3.0)];
    let xs = vec![Leaf::scalar(5.0), Leaf::scalar(7.0)];
    let terms: Vec<_> = w
        .iter()
        .zip(xs.iter())
        .map(|(wi, xi)| Mul::new(wi.clone(), xi.clone()).unwrap())
        .collect();
    let expr = sum(terms).unwrap();
    let mut bound = bind(expr).unwrap();
    let out = bound.autodiff();
    assert_eq!(out.get(0), 2.0 * 5.0 + 3.0 * 7.0);
    assert_eq!(w[0].get_adj(0), 5.0);
    assert_eq!(xs[1].get_adj(0), 3.0);
}

#[test]
fn mat_scl_reduction() {
    let m = Leaf::matrix(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
    let x = Leaf::vector(vec![1.0, 1.0]);
    let reduced = norm(dot(m.clone(), x.clone()).unwrap());
    let mut bound = bind(reduced).unwrap();
    let out = bound.autodiff();
    // dot = [3, 7], norm = 9 + 49 = 58
    assert_eq!(out.get(0), 58.0);
}

#[test]
fn dot_sum_norm() {
    let m = Leaf::matrix(2, 2, vec![2.0, 0.0, 0.0, 2.0]);
    let x = Leaf::vector(vec![1.0, 2.0]);
    let expr = norm(dot(m.clone(), x.clone()).unwrap());
    let mut bound = bind(expr).unwrap();
    let out = bound.autodiff();
    // dot = [2, 4], norm = 4 + 16 = 20
    assert_eq!(out.get(0), 20.0);
    // x_adj = M^T . (2*dot) = M^T . [4, 8] = [8, 16]
    assert_eq!(x.get_adj(0), 8.0);
    assert_eq!(x.get_adj(1), 16.0);
}
