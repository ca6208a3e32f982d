//! Event sourcing for solve calls.
//!
//! The drivers record [`SolverEvent`]s in the [`SolveReport`] so callers can
//! see what was requested, how the system was scaled, and how every column
//! converged, without enabling a tracing subscriber.
//!
//! [`SolveReport`]: crate::types::SolveReport

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Algorithm;

/// Events emitted during a solve call.
///
/// Events are tagged with `#[serde(tag = "type")]` so they serialise as
/// `{ "type": "SolveRequested", ... }` for easy ingestion into event stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SolverEvent {
    /// A solve request was validated and is about to begin.
    SolveRequested {
        /// Krylov strategy.
        algorithm: Algorithm,
        /// Global matrix height.
        height: usize,
        /// Global matrix width.
        width: usize,
        /// Global number of stored entries.
        nnz: usize,
        /// Number of right-hand-side columns.
        columns: usize,
        /// Size of the worker group.
        workers: usize,
    },

    /// Ruiz equilibration finished.
    Equilibrated {
        /// Sweeps performed.
        sweeps: usize,
        /// Smallest row or column scale factor applied.
        min_scale: f64,
        /// Largest row or column scale factor applied.
        max_scale: f64,
    },

    /// The system was divided by its estimated two-norm.
    TwoNormScaled {
        /// Power-iteration estimate of `||A||_2`.
        estimate: f64,
    },

    /// One outer (FGMRES) iteration completed.
    OuterIteration {
        /// Right-hand-side column.
        column: usize,
        /// Outer iteration number (1-based).
        iteration: usize,
        /// Estimated relative residual.
        relative_residual: f64,
    },

    /// One preconditioner application finished its refinement loop.
    RefinementCompleted {
        /// Right-hand-side column.
        column: usize,
        /// Outer iteration that requested the application.
        iteration: usize,
        /// Refinement passes performed.
        refine_iterations: usize,
        /// Relative residual of the inner system when refinement stopped.
        relative_residual: f64,
    },

    /// The Krylov basis was exhausted and the true residual recomputed.
    Restarted {
        /// Right-hand-side column.
        column: usize,
        /// Outer iterations performed so far.
        iteration: usize,
        /// True relative residual at the restart.
        relative_residual: f64,
    },

    /// A column reached `rel_tol`.
    ColumnConverged {
        /// Right-hand-side column.
        column: usize,
        /// Outer iterations performed.
        iterations: usize,
        /// Final relative residual.
        relative_residual: f64,
    },

    /// A column exhausted its iteration budget.
    ColumnFailed {
        /// Right-hand-side column.
        column: usize,
        /// Outer iterations performed.
        iterations: usize,
        /// Best relative residual reached.
        relative_residual: f64,
    },

    /// The call finished (successfully or not).
    SolveFinished {
        /// Krylov strategy.
        algorithm: Algorithm,
        /// `true` if every column converged.
        converged: bool,
        /// Wall time on this worker.
        wall_time: Duration,
    },
}
