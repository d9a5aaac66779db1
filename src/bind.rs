//! The two-phase bind protocol (§4.8) and the typestate it produces.
//! [`bind`] is the only sanctioned way to get a [`BoundExpr`]: its
//! existence is the type-level proof that arena offsets have been
//! assigned, so `feval`/`beval`/`autodiff` can never hit
//! [`AdError::UnboundEvaluation`] through the safe API.

use tracing::{debug, trace};

use crate::config::Config;
use crate::error::AdError;
use crate::node::{Cursor, Node};
use crate::storage::StorageView;

/// An expression tree that has completed the size-query and layout
/// passes and owns arenas sized exactly to its own requirements.
pub struct BoundExpr<N> {
    root: N,
    values: Vec<f64>,
    adjoints: Vec<f64>,
    config: Config,
}

/// Runs the two-phase bind with default [`Config`].
pub fn bind<N: Node>(root: N) -> Result<BoundExpr<N>, AdError> {
    bind_with(root, Config::default())
}

/// Runs the two-phase bind with an explicit [`Config`].
pub fn bind_with<N: Node>(mut root: N, config: Config) -> Result<BoundExpr<N>, AdError> {
    let mut cursor = Cursor::default();
    trace!("binding expression tree");
    root.bind(&mut cursor)?;
    debug!(
        value_cells = cursor.value,
        adjoint_cells = cursor.adjoint,
        "bind complete"
    );
    Ok(BoundExpr {
        root,
        values: vec![0.0; cursor.value],
        adjoints: vec![0.0; cursor.adjoint],
        config,
    })
}

impl<N: Node> BoundExpr<N> {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn root(&self) -> &N {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut N {
        &mut self.root
    }

    /// Forward pass. Safe to call repeatedly without rebinding as long
    /// as the tree's shape hasn't changed.
    pub fn feval(&mut self) -> StorageView<'_> {
        trace!("forward evaluation");
        self.root.feval(&mut self.values);
        self.root.value(&self.values)
    }

    /// Backward pass seeded with `seed`, whose shape must match the
    /// root's own shape (or be `Scalar`, broadcasting). Call [`feval`]
    /// first: `beval` reads cached forward values, it doesn't recompute
    /// them.
    pub fn beval(&mut self, seed: StorageView<'_>) {
        if !self.config.accumulate_leaf_adjoints {
            self.root.reset_adjoints();
        }
        self.adjoints.iter_mut().for_each(|a| *a = 0.0);
        trace!("backward evaluation");
        self.root.beval(&self.values, seed);
    }

    /// Forward pass followed by a backward pass seeded with all-ones,
    /// the usual entry point when the root is the scalar (or tensor)
    /// quantity being differentiated.
    pub fn autodiff(&mut self) -> StorageView<'_> {
        let shape = {
            let out = self.feval();
            out.shape()
        };
        let ones = vec![1.0; shape.len()];
        self.beval(StorageView::new(shape, &ones));
        self.root.value(&self.values)
    }

    /// Re-runs the bind pass, reallocating both arenas. Needed only if
    /// the tree's shape has changed since the last bind (e.g. a leaf
    /// was resized) — ordinary repeated evaluation does not need it.
    pub fn rebind(&mut self) -> Result<(), AdError> {
        let mut cursor = Cursor::default();
        self.root.bind(&mut cursor)?;
        self.values = vec![0.0; cursor.value];
        self.adjoints = vec![0.0; cursor.adjoint];
        Ok(())
    }
}
