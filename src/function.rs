//! `Function`/Jacobian composition (§4.9): packages a set of scalar
//! outputs built from a common set of input leaves into a single object
//! that assembles their combined Jacobian, one row per output.
//!
//! A `Function` is constructed from a *builder* — `Fn(&[Leaf]) -> Vec<N>`
//! — rather than from already-built trees, because the parallel path
//! needs every row to own a fully independent set of input leaves
//! (`Leaf`'s `Rc<RefCell<..>>` is neither `Send` nor safe to accumulate
//! into from two rows at once) and the only way to get independent
//! leaves wired into an independent tree with *known* identity is to
//! rebuild the tree from them. Sequential assembly reuses one shared
//! leaf set across every row instead, resetting adjoints between rows.

use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::bind::bind_with;
use crate::config::Config;
use crate::error::AdError;
use crate::leaf::Leaf;
use crate::node::Node;
use crate::shape::Shape;

/// A set of scalar outputs sharing a common list of input leaves.
pub struct Function<N> {
    build: Box<dyn Fn(&[Leaf]) -> Vec<N> + Sync>,
    input_prototypes: Vec<Leaf>,
    config: Config,
}

impl<N: Node> Function<N> {
    /// `input_prototypes` fixes the column order and initial values of
    /// the Jacobian; `build` must return one `Scalar`-shaped output per
    /// row, constructed from whatever leaf set it is given (so it can be
    /// invoked again with a fresh, independent set for parallel rows).
    pub fn new(
        input_prototypes: Vec<Leaf>,
        build: impl Fn(&[Leaf]) -> Vec<N> + Sync + 'static,
    ) -> Self {
        Function {
            build: Box::new(build),
            input_prototypes,
            config: Config::default(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    fn column_count(&self) -> usize {
        self.input_prototypes.iter().map(Leaf::size).sum()
    }

    /// Assembles the Jacobian: row `i` holds `d(outputs[i])/d(inputs[*])`
    /// flattened in `input_prototypes` order, evaluated at
    /// `input_prototypes`' current values.
    ///
    /// Dispatches rows across a `rayon` pool when `config.parallel_jacobian`
    /// is set and the output count reaches
    /// `config.jacobian_parallel_threshold`; each parallel row gets its
    /// own deep-cloned leaf set (fresh `Rc`, same values, zero adjoint),
    /// so no two rows ever touch the same adjoint buffer. Sequential rows
    /// share one leaf set, safe because rows run one at a time and each
    /// bind resets adjoints before accumulating.
    pub fn jacobian(&self) -> Result<Array2<f64>, AdError> {
        let outputs = (self.build)(&self.input_prototypes);
        let m = outputs.len();
        let cols = self.column_count();
        for out in &outputs {
            if !out.shape().is_scalar() {
                return Err(AdError::ShapeMismatch {
                    expected: Shape::Scalar,
                    actual: out.shape(),
                });
            }
        }
        debug!(
            rows = m,
            cols,
            parallel = self.config.parallel_jacobian,
            "assembling jacobian"
        );

        if self.config.parallel_jacobian && m >= self.config.jacobian_parallel_threshold {
            self.jacobian_parallel(m, cols)
        } else {
            self.jacobian_sequential(outputs, cols)
        }
    }

    fn jacobian_sequential(&self, outputs: Vec<N>, cols: usize) -> Result<Array2<f64>, AdError> {
        let mut rows = vec![vec![0.0; cols]; outputs.len()];
        for (i, out) in outputs.into_iter().enumerate() {
            trace!(row = i, "sequential jacobian row");
            let mut bound = bind_with(out, self.config)?;
            bound.autodiff();
            rows[i] = gather_adjoints(&self.input_prototypes);
        }
        Ok(stack_rows(rows, cols))
    }

    fn jacobian_parallel(&self, m: usize, cols: usize) -> Result<Array2<f64>, AdError> {
        let config = self.config;
        // `Leaf`'s `Rc<RefCell<..>>` is neither `Send` nor `Sync`, so
        // nothing referencing `self.input_prototypes` directly can cross
        // into the parallel closure below. Snapshot each prototype to
        // plain, thread-safe `(Shape, Vec<f64>)` data on this thread
        // first; each row reconstructs its own fresh `Leaf`s from that
        // snapshot instead.
        let snapshots: Vec<(Shape, Vec<f64>)> = self
            .input_prototypes
            .iter()
            .map(|l| (l.shape(), l.to_vec()))
            .collect();
        let build = &self.build;

        let results: Result<Vec<Vec<f64>>, AdError> = (0..m)
            .into_par_iter()
            .map(|i| {
                trace!(row = i, "parallel jacobian row");
                let fresh_inputs: Vec<Leaf> = snapshots
                    .iter()
                    .map(|(shape, values)| leaf_from_snapshot(*shape, values.clone()))
                    .collect();
                let mut row_outputs = build(&fresh_inputs);
                let out = row_outputs.swap_remove(i);
                let mut bound = bind_with(out, config)?;
                bound.autodiff();
                Ok(gather_adjoints(&fresh_inputs))
            })
            .collect();
        Ok(stack_rows(results?, cols))
    }
}

fn leaf_from_snapshot(shape: Shape, values: Vec<f64>) -> Leaf {
    match shape {
        Shape::Scalar => Leaf::scalar(values[0]),
        Shape::Vector(_) => Leaf::vector(values),
        Shape::Matrix(r, c) => Leaf::matrix(r, c, values),
    }
}

fn gather_adjoints(inputs: &[Leaf]) -> Vec<f64> {
    inputs.iter().flat_map(Leaf::adj_to_vec).collect()
}

fn stack_rows(rows: Vec<Vec<f64>>, cols: usize) -> Array2<f64> {
    let m = rows.len();
    let mut out = Array2::zeros((m, cols));
    for (i, row) in rows.into_iter().enumerate() {
        for (j, v) in row.into_iter().enumerate() {
            out[[i, j]] = v;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduce::Norm;

    #[test]
    fn jacobian_of_norm_outputs() {
        let x0 = Leaf::vector(vec![1.0, 2.0]);
        let y0 = Leaf::vector(vec![3.0, 4.0]);

        let f = Function::new(vec![x0.clone(), y0.clone()], |inputs: &[Leaf]| {
            vec![Norm::new(inputs[0].clone())]
        });
        let jac = f.jacobian().unwrap();
        assert_eq!(jac.shape(), [1, 4]);
        assert_eq!(jac[[0, 0]], 2.0);
        assert_eq!(jac[[0, 1]], 4.0);
        assert_eq!(jac[[0, 2]], 0.0);
        assert_eq!(jac[[0, 3]], 0.0);
    }

    #[test]
    fn parallel_jacobian_matches_sequential() {
        let x0 = Leaf::vector(vec![1.0, -2.0, 3.0]);
        let build = |inputs: &[Leaf]| {
            vec![
                Norm::new(inputs[0].clone()),
                Norm::new(inputs[0].clone()),
                Norm::new(inputs[0].clone()),
            ]
        };

        let seq = Function::new(vec![x0.clone()], build);
        let seq_jac = seq.jacobian().unwrap();

        let mut cfg = Config::default();
        cfg.parallel_jacobian = true;
        cfg.jacobian_parallel_threshold = 1;
        let par = Function::new(vec![x0.clone()], build).with_config(cfg);
        let par_jac = par.jacobian().unwrap();

        assert_eq!(seq_jac, par_jac);
    }
}
