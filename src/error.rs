//! Error type shared across the crate.

use thiserror::Error;

use crate::shape::Shape;

/// Errors raised by expression construction, binding, and evaluation.
///
/// Per the error handling design: shape and bind errors are reported at
/// their call site via `Result`; numeric domain issues (`log` of a
/// non-positive value, `0^0`, etc.) are *not* represented here by
/// default — they propagate as NaN/Inf, matching IEEE-754 passthrough.
/// `DomainError` exists for callers that opt into trapping such values
/// explicitly (see [`crate::config::Config`]).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdError {
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch { expected: Shape, actual: Shape },

    #[error("evaluation attempted before bind")]
    UnboundEvaluation,

    #[error("domain error: {0}")]
    DomainError(String),

    #[error("aliasing violation: {0}")]
    AliasingViolation(String),
}
