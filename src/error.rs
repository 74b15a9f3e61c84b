//! Error types for the circuit simulator core.
//!
//! Most numerical degeneracies described in the spec (a singular `A`, a
//! non-converging Newton-Raphson pass) are *not* propagated as errors out of
//! the per-tick pipeline — they are logged and the solver falls back to a
//! benign default (see [`crate::solver::MnaSolver::solve`]). [`CircuitError`]
//! covers the handful of operations that genuinely fail structurally, such as
//! frequency reconciliation across AC sources.

use thiserror::Error;

use crate::circuit::UnknownId;

/// Result type alias using [`CircuitError`].
pub type Result<T> = std::result::Result<T, CircuitError>;

/// Errors that can be returned from circuit-level operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CircuitError {
    /// The factorization of `A` is rank-deficient. Surfaced to callers only
    /// from APIs that report it explicitly; `process_tick` instead logs this
    /// and leaves `x` at zero.
    #[error("circuit matrix is singular; solution held at zero")]
    SingularMatrix,

    /// Two AC sources in the same circuit declared different non-zero
    /// frequencies.
    #[error("conflicting AC source frequencies: {previous} Hz vs {new} Hz")]
    FrequencyConflict { previous: f64, new: f64 },

    /// The Newton-Raphson loop exhausted its iteration budget without
    /// converging. The last iterate is used regardless.
    #[error(
        "Newton-Raphson did not converge after {iterations} iterations (max |dx|={max_delta:.3e})"
    )]
    NRNonConvergence { iterations: usize, max_delta: f64 },

    /// A component referenced an [`UnknownId`] whose index had already been
    /// invalidated by [`crate::solver::MnaSolver::remove_unknown`]. This is a
    /// programmer error: in debug builds it is additionally asserted at the
    /// call site, and in release builds the offending stamp becomes a no-op.
    #[error("unknown {0:?} has no matrix index (dangling or never added)")]
    DanglingUnknown(UnknownId),
}
