//! Row-distributed sparse linear algebra for the ruvector ecosystem.
//!
//! This crate assembles sparse matrices and dense multi-vectors whose rows
//! are split across a group of workers, and solves `A X = B` (square) or
//! `min ||A x - b||` (tall) with a regularized-refinement FGMRES.
//!
//! # Worker model
//!
//! Every distributed object carries a [`WorkerContext`](context::WorkerContext)
//! naming the group it lives on. Operations marked *collective* must be
//! called by every worker of the group in the same order; a worker that
//! issues a different collective gets
//! [`CollectiveMismatch`](error::SolverError::CollectiveMismatch), and a
//! worker that leaves early makes its peers fail with
//! [`CollectiveAborted`](error::SolverError::CollectiveAborted).
//! [`ThreadGroup::run`](comm::ThreadGroup::run) spawns an in-process group;
//! [`WorkerContext::single`](context::WorkerContext::single) is a group of one.
//!
//! # Pipeline
//!
//! | Stage | Module |
//! |-------|--------|
//! | Queue updates, route, assemble | [`matrix`] |
//! | `Y := alpha op(A) X + beta Y` | [`multiply`] |
//! | Ruiz equilibration, two-norm scaling | [`equilibrate`] |
//! | Regularized ILU(0) / Jacobi | [`precond`] |
//! | Refined preconditioner | [`refine`] |
//! | Restarted FGMRES | [`fgmres`] |
//! | Linear solve / least squares | [`driver`] |
//!
//! # Example
//!
//! ```rust
//! use ruvector_dist_solver::comm::ThreadGroup;
//! use ruvector_dist_solver::control::LeastSquaresControl;
//! use ruvector_dist_solver::driver::linear_solve;
//! use ruvector_dist_solver::gallery::fd2d;
//! use ruvector_dist_solver::vector::DistMultiVec;
//!
//! let residuals = ThreadGroup::run(2, |ctx| {
//!     let a = fd2d(ctx.clone(), 6, 6).unwrap();
//!     let b = DistMultiVec::uniform_seeded(ctx, 36, 1, 42).unwrap();
//!     let mut x = b.clone();
//!     let report = linear_solve(&a, &mut x, &LeastSquaresControl::default()).unwrap();
//!     report.max_relative_residual()
//! });
//! assert!(residuals.iter().all(|&r| r <= 1e-7));
//! ```

pub mod blas;
pub mod comm;
pub mod context;
pub mod control;
pub mod driver;
pub mod equilibrate;
pub mod error;
pub mod events;
pub mod fgmres;
pub mod gallery;
mod ghost;
pub mod matrix;
pub mod multiply;
pub mod operator;
pub mod partition;
pub mod precond;
pub mod refine;
pub mod types;
pub mod validation;
pub mod vector;

pub use comm::ThreadGroup;
pub use context::WorkerContext;
pub use control::{LeastSquaresControl, SolveControl};
pub use driver::{least_squares, linear_solve};
pub use error::{SolverError, ValidationError};
pub use matrix::{DistSparseMatrix, DistSparseMatrixBuilder};
pub use multiply::multiply;
pub use types::{Algorithm, Orientation, SolveReport};
pub use vector::DistMultiVec;
