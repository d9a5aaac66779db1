//! Crate-wide configuration (§6). Construct with [`Config::default`] and
//! override individual fields.

/// Tunables for binding, evaluation, and Jacobian assembly.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Dispatch [`crate::function::Function::jacobian`]'s row-by-row
    /// backward passes across a `rayon` thread pool when the output
    /// dimension reaches [`Config::jacobian_parallel_threshold`].
    pub parallel_jacobian: bool,

    /// Minimum Jacobian output dimension `m` before parallel dispatch
    /// actually kicks in, even with `parallel_jacobian` set.
    pub jacobian_parallel_threshold: usize,

    /// Worker count for the Jacobian thread pool. Defaults to the
    /// machine's available parallelism.
    pub pool_size: usize,

    /// Skip the automatic leaf-adjoint reset that normally precedes
    /// every `autodiff`/`beval` call, so adjoints accumulate across
    /// repeated backward passes instead of restarting from zero.
    pub accumulate_leaf_adjoints: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            parallel_jacobian: false,
            jacobian_parallel_threshold: 10,
            pool_size: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            accumulate_leaf_adjoints: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = Config::default();
        assert!(!c.parallel_jacobian);
        assert_eq!(c.jacobian_parallel_threshold, 10);
        assert!(!c.accumulate_leaf_adjoints);
        assert!(c.pool_size >= 1);
    }
}
