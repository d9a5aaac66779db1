//! Finite-difference harness and the universal testable properties
//! (determinism, adjoint-vs-finite-difference correctness, linearity of
//! the adjoint seed, additivity over a shared leaf, constant invariance,
//! rebind idempotence).

use approx_eq::assert_approx_eq;
use rand::{rngs::StdRng, Rng, SeedableRng};

use revad::bind::bind;
use revad::binary::{Add, Mul};
use revad::leaf::{Constant, Leaf};
use revad::node::Node;
use revad::shape::Shape;
use revad::storage::StorageView;
use revad::unary::{Exp, Sin};

const H: f64 = 1e-6;
const EPS: f64 = 1e-4;

/// Central finite difference of a scalar function of one scalar input.
fn finite_diff(f: impl Fn(f64) -> f64, x: f64) -> f64 {
    (f(x + H) - f(x - H)) / (2.0 * H)
}

/// `bind`/`BoundExpr` emit `trace!`/`debug!` spans; wiring up a subscriber
/// here lets `RUST_LOG=trace cargo test -- --nocapture` show them.
fn init_tracing() {
    use std::sync::Once;
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    });
}

#[test]
fn adjoint_matches_finite_difference_for_composite_expression() {
    init_tracing();
    // f(x) = exp(sin(x) * x)
    let f = |x: f64| (x.sin() * x).exp();
    let expected = finite_diff(f, 0.7);

    let x = Leaf::scalar(0.7);
    let expr = Exp::new(Mul::new(Sin::new(x.clone()), x.clone()).unwrap());
    let mut bound = bind(expr).unwrap();
    bound.autodiff();

    assert_approx_eq!(x.get_adj(0), expected, EPS);
}

#[test]
fn adjoint_matches_finite_difference_over_random_inputs() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let v: f64 = rng.gen_range(-3.0..3.0);
        let f = |x: f64| (x.sin() * x).exp();
        let expected = finite_diff(f, v);

        let x = Leaf::scalar(v);
        let expr = Exp::new(Mul::new(Sin::new(x.clone()), x.clone()).unwrap());
        let mut bound = bind(expr).unwrap();
        bound.autodiff();

        assert_approx_eq!(x.get_adj(0), expected, EPS);
    }
}

#[test]
fn forward_evaluation_is_deterministic() {
    let x = Leaf::scalar(1.23);
    let expr1 = Sin::new(x.clone());
    let mut b1 = bind(expr1).unwrap();
    let out1 = b1.feval().get(0);

    let x2 = Leaf::scalar(1.23);
    let expr2 = Sin::new(x2);
    let mut b2 = bind(expr2).unwrap();
    let out2 = b2.feval().get(0);

    assert_eq!(out1, out2);
}

#[test]
fn adjoint_is_linear_in_the_seed() {
    let x = Leaf::scalar(0.4);
    let expr = Sin::new(x.clone());
    let mut bound = bind(expr).unwrap();
    bound.feval();
    bound.beval(StorageView::new(Shape::Scalar, &[1.0]));
    let adj_unit = x.get_adj(0);

    let x2 = Leaf::scalar(0.4);
    let expr2 = Sin::new(x2.clone());
    let mut bound2 = bind(expr2).unwrap();
    bound2.feval();
    bound2.beval(StorageView::new(Shape::Scalar, &[3.0]));
    let adj_scaled = x2.get_adj(0);

    assert_approx_eq!(adj_scaled, 3.0 * adj_unit, 1e-12);
}

#[test]
fn adjoint_is_additive_over_a_shared_leaf() {
    // f(x) = x + x  => df/dx = 2, both occurrences share one Leaf.
    let x = Leaf::scalar(5.0);
    let expr = Add::new(x.clone(), x.clone()).unwrap();
    let mut bound = bind(expr).unwrap();
    bound.autodiff();
    assert_eq!(x.get_adj(0), 2.0);
}

#[test]
fn constants_do_not_accumulate_adjoint() {
    let x = Leaf::scalar(2.0);
    let c = Constant::scalar(10.0);
    let expr = Mul::new(x.clone(), c).unwrap();
    let mut bound = bind(expr).unwrap();
    bound.autodiff();
    assert_eq!(x.get_adj(0), 10.0);
    assert_eq!(bound.root().adjoint_buffer_size(), 0);
}

#[test]
fn rebind_does_not_change_forward_value() {
    let x = Leaf::scalar(1.5);
    let expr = Sin::new(x.clone());
    let mut bound = bind(expr).unwrap();
    let before = bound.feval().get(0);
    bound.rebind().unwrap();
    let after = bound.feval().get(0);
    assert_eq!(before, after);
}
