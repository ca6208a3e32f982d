//! Error types for the distributed solver crate.
//!
//! Local errors (bad indices, bad dimensions, bad controls) are raised at the
//! call site before any communication happens. Collective errors are raised
//! by the collective that detected them and are observed by every worker of
//! the group in the same epoch. All errors implement `std::error::Error` via
//! `thiserror`.

use crate::comm::CollectiveKind;
use crate::types::SolveReport;

/// Primary error type for matrix assembly, vector operations, and solves.
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    /// A matrix or vector was resized to dimensions that cannot be stored.
    #[error("invalid dimension {height}x{width}: {reason}")]
    InvalidDimension {
        /// Requested global height.
        height: usize,
        /// Requested global width.
        width: usize,
        /// Why the dimensions were rejected.
        reason: String,
    },

    /// An index passed to a local accessor or queue operation is out of range.
    #[error("{what} index {index} out of range (bound {bound})")]
    OutOfRange {
        /// Which index was rejected (`"local row"`, `"global column"`, ...).
        what: &'static str,
        /// The offending index.
        index: usize,
        /// Exclusive upper bound the index must respect.
        bound: usize,
    },

    /// Workers disagreed on which collective they were executing.
    ///
    /// This is a caller contract violation: every worker must issue the same
    /// collectives in the same order. The group is unusable afterwards.
    #[error("collective mismatch on rank {rank}: expected {expected:?}, found {found:?}")]
    CollectiveMismatch {
        /// Rank reporting the mismatch.
        rank: usize,
        /// Kind this rank issued.
        expected: CollectiveKind,
        /// First conflicting kind issued by a peer.
        found: CollectiveKind,
    },

    /// A peer left the worker group (returned or panicked) while this rank
    /// still expected it to participate in a collective.
    #[error("collective aborted on rank {rank}: a peer left the worker group")]
    CollectiveAborted {
        /// Rank that observed the abort.
        rank: usize,
    },

    /// The iterative solver exhausted its iteration budget.
    ///
    /// The best iterate found has already been written back to the solution
    /// vector; the report describes every column.
    #[error(
        "solver did not converge after {iterations} iterations (residual={residual:.2e}, tol={tolerance:.2e})"
    )]
    DidNotConverge {
        /// Outer iterations performed on the worst column.
        iterations: usize,
        /// Worst final relative residual.
        residual: f64,
        /// Relative tolerance that was not reached.
        tolerance: f64,
        /// Full per-column report of the failed solve.
        report: Box<SolveReport>,
    },

    /// A NaN or infinity appeared in the Krylov recurrence.
    #[error("numerical instability at iteration {iteration}: {detail}")]
    NumericalInstability {
        /// Outer iteration at which the instability was detected.
        iteration: usize,
        /// Human-readable explanation.
        detail: String,
    },

    /// The caller supplied invalid input (shapes, controls, values).
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),
}

/// Validation errors for solver inputs and controls.
///
/// These are raised eagerly before any computation begins so that callers get
/// clear diagnostics rather than mysterious numerical failures.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Operand shapes or partitions are inconsistent.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// A value is NaN or infinite where a finite number is required.
    #[error("non-finite value detected: {0}")]
    NonFiniteValue(String),

    /// A parameter is outside its valid range.
    #[error("parameter out of range: {name} = {value} (expected {expected})")]
    ParameterOutOfRange {
        /// Name of the parameter.
        name: String,
        /// The invalid value (as a string for flexibility).
        value: String,
        /// Human-readable description of the valid range.
        expected: String,
    },

    /// A control document could not be parsed.
    #[error("malformed control: {0}")]
    MalformedControl(#[from] serde_json::Error),
}

/// Crate-wide result alias.
pub type Result<T, E = SolverError> = std::result::Result<T, E>;
