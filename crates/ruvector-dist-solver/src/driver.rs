//! Linear-solve and least-squares drivers.
//!
//! Both drivers run the same pipeline on every worker:
//!
//! 1. validate the controls and operand shapes,
//! 2. equilibrate (`R A C`, Ruiz) and divide by an estimate of `||A||_2`,
//! 3. build a local preconditioner,
//! 4. solve each right-hand-side column with restarted FGMRES whose
//!    preconditioner is refined against the scaled operator,
//! 5. undo the column scaling, `x = C y`.
//!
//! Every control-flow decision is taken on globally reduced values, so all
//! workers leave the call together, either with the same report or with the
//! same error variant.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::context::WorkerContext;
use crate::control::LeastSquaresControl;
use crate::equilibrate::{
    column_equilibrate, estimate_two_norm, global_scale_range, ruiz_equilibrate, scale_matrix,
    Equilibration,
};
use crate::error::{Result, SolverError, ValidationError};
use crate::events::SolverEvent;
use crate::fgmres::{fgmres, FgmresParams};
use crate::matrix::DistSparseMatrix;
use crate::multiply::multiply;
use crate::operator::{DistOperator, MatrixOperator, NormalOperator};
use crate::precond::{Jacobi, LocalPreconditioner, RegularizedIlu0};
use crate::refine::Refinement;
use crate::types::{ColumnReport, Orientation, SolveReport};
use crate::validation::validate_finite;
use crate::vector::DistMultiVec;

/// Collective: solve `A X = B` for a square `A`.
///
/// `x` holds `B` on entry and the solution on return. Columns are solved
/// independently; a zero column yields a zero solution.
///
/// # Errors
///
/// - [`SolverError::InvalidInput`] for bad controls, a non-square `A`, a
///   shape mismatch, or non-finite right-hand sides (on every worker).
/// - [`SolverError::DidNotConverge`] if any column exhausts its budget; the
///   best iterate of every column has been written to `x`.
/// - [`SolverError::NumericalInstability`] if the recurrence breaks down.
pub fn linear_solve(a: &DistSparseMatrix, x: &mut DistMultiVec, ctrl: &LeastSquaresControl) -> Result<SolveReport> {
    let start = Instant::now();
    ctrl.validate()?;
    if a.height() != a.width() {
        return Err(ValidationError::DimensionMismatch(format!(
            "linear_solve requires a square matrix, got {}x{}",
            a.height(),
            a.width(),
        ))
        .into());
    }
    check_operand(a, x, a.height(), "X")?;
    let ctx = a.context().clone();
    agree(&ctx, validate_finite("right-hand side", x.local_data()))?;

    let mut events = Vec::new();
    record_request(a, x.width(), ctrl, &mut events)?;

    let (scaled, eq) = if ctrl.equilibrate {
        let (scaled, eq) = ruiz_equilibrate(a, ctrl.equilibrate_iterations)?;
        record_equilibration(a, &eq, &mut events)?;
        (scaled, eq)
    } else {
        (a.clone(), Equilibration::identity(a))
    };

    let mut rhs = x.clone();
    scale_rows(&mut rhs, &eq.row_scale);
    let (scaled, two_norm_estimate) = scale_by_two_norm(scaled, &mut rhs, ctrl, &mut events)?;

    let ilu = RegularizedIlu0::factor(&scaled, ctrl.alpha)?;
    let op = MatrixOperator::new(&scaled)?;
    let refine = Refinement::new(
        &op,
        &ilu,
        ctrl.solve_ctrl.rel_tol_refine,
        ctrl.solve_ctrl.refine_budget(),
    );

    let mut y = DistMultiVec::zeros(ctx, a.width(), x.width())?;
    let columns = solve_columns(&op, &refine, &rhs, &mut y, ctrl, &mut events)?;

    scale_rows(&mut y, &eq.col_scale);
    x.copy_from(&y)?;

    finish(columns, eq.sweeps > 0, two_norm_estimate, ctrl, start, events)
}

/// Collective: minimize `||A x - b||^2 + alpha^2 ||x||^2` for every column
/// `b` of `B`, where `A` is `m x n` with `m >= n`.
///
/// The regularized normal equations `(A^T A + alpha^2 I) x = A^T b` are
/// solved matrix-free with FGMRES, preconditioned by the refined Jacobi
/// scaling `diag(A^T A) + alpha^2`. The regularization acts on the
/// equilibrated, two-norm scaled system. With `alpha == 0` both scalings
/// leave the minimizer unchanged.
///
/// `x` must be `n x k` for a `m x k` block `B`; its initial content is
/// ignored.
///
/// # Errors
///
/// As for [`linear_solve`], with `A` required to have at least as many rows
/// as columns.
pub fn least_squares(
    a: &DistSparseMatrix,
    b: &DistMultiVec,
    x: &mut DistMultiVec,
    ctrl: &LeastSquaresControl,
) -> Result<SolveReport> {
    let start = Instant::now();
    ctrl.validate()?;
    if a.height() < a.width() {
        return Err(ValidationError::DimensionMismatch(format!(
            "least_squares requires height >= width, got {}x{}",
            a.height(),
            a.width(),
        ))
        .into());
    }
    check_operand(a, b, a.height(), "B")?;
    check_operand(a, x, a.width(), "X")?;
    if b.width() != x.width() {
        return Err(ValidationError::DimensionMismatch(format!(
            "B has {} columns but X has {}",
            b.width(),
            x.width(),
        ))
        .into());
    }
    let ctx = a.context().clone();
    agree(&ctx, validate_finite("right-hand side", b.local_data()))?;

    let mut events = Vec::new();
    record_request(a, b.width(), ctrl, &mut events)?;

    let (scaled, eq) = if ctrl.equilibrate {
        let (scaled, eq) = column_equilibrate(a, ctrl.equilibrate_iterations)?;
        record_equilibration(a, &eq, &mut events)?;
        (scaled, eq)
    } else {
        (a.clone(), Equilibration::identity(a))
    };

    let mut rhs = b.clone();
    let (scaled, two_norm_estimate) = scale_by_two_norm(scaled, &mut rhs, ctrl, &mut events)?;

    let mut normal_rhs = DistMultiVec::zeros(ctx.clone(), a.width(), b.width())?;
    multiply(Orientation::Transpose, 1.0, &scaled, &rhs, 0.0, &mut normal_rhs)?;

    let jacobi = Jacobi::normal_equations(&scaled, ctrl.alpha)?;
    let op = NormalOperator::new(&scaled, ctrl.alpha);
    let refine = Refinement::new(
        &op,
        &jacobi,
        ctrl.solve_ctrl.rel_tol_refine,
        ctrl.solve_ctrl.refine_budget(),
    );

    let mut y = DistMultiVec::zeros(ctx, a.width(), b.width())?;
    let columns = solve_columns(&op, &refine, &normal_rhs, &mut y, ctrl, &mut events)?;

    scale_rows(&mut y, &eq.col_scale);
    x.copy_from(&y)?;

    finish(columns, eq.sweeps > 0, two_norm_estimate, ctrl, start, events)
}

// ---------------------------------------------------------------------------
// Pipeline stages
// ---------------------------------------------------------------------------

fn solve_columns<O, M>(
    op: &O,
    precond: &Refinement<'_, O, M>,
    rhs: &DistMultiVec,
    y: &mut DistMultiVec,
    ctrl: &LeastSquaresControl,
    events: &mut Vec<SolverEvent>,
) -> Result<Vec<ColumnReport>>
where
    O: DistOperator + ?Sized,
    M: LocalPreconditioner + ?Sized,
{
    let params = FgmresParams {
        rel_tol: ctrl.solve_ctrl.rel_tol,
        max_iterations: ctrl.solve_ctrl.max_iterations,
        basis_size: ctrl.basis_size,
        progress: ctrl.progress,
        refine_progress: ctrl.solve_ctrl.progress,
    };

    let mut columns = Vec::with_capacity(rhs.width());
    for j in 0..rhs.width() {
        let report = fgmres(op, precond, rhs.column(j), y.column_mut(j), &params, j, events)?;
        events.push(if report.converged {
            SolverEvent::ColumnConverged {
                column: j,
                iterations: report.iterations,
                relative_residual: report.relative_residual,
            }
        } else {
            SolverEvent::ColumnFailed {
                column: j,
                iterations: report.iterations,
                relative_residual: report.relative_residual,
            }
        });
        columns.push(report);
    }
    Ok(columns)
}

fn scale_by_two_norm(
    a: DistSparseMatrix,
    rhs: &mut DistMultiVec,
    ctrl: &LeastSquaresControl,
    events: &mut Vec<SolverEvent>,
) -> Result<(DistSparseMatrix, Option<f64>)> {
    if !ctrl.scale_two_norm {
        return Ok((a, None));
    }
    let estimate = estimate_two_norm(&a, ctrl.two_norm_iterations)?;
    if estimate <= 0.0 || !estimate.is_finite() {
        debug!("two-norm scaling skipped (estimate = {estimate:.3e})");
        return Ok((a, None));
    }
    rhs.scale(1.0 / estimate);
    events.push(SolverEvent::TwoNormScaled { estimate });
    debug!("two-norm scaling: ||A||_2 ~ {estimate:.6e}");
    Ok((scale_matrix(&a, estimate), Some(estimate)))
}

fn finish(
    columns: Vec<ColumnReport>,
    equilibrated: bool,
    two_norm_estimate: Option<f64>,
    ctrl: &LeastSquaresControl,
    start: Instant,
    mut events: Vec<SolverEvent>,
) -> Result<SolveReport> {
    let algorithm = ctrl.solve_ctrl.alg;
    let converged = columns.iter().all(|c| c.converged);
    let wall_time = start.elapsed();
    events.push(SolverEvent::SolveFinished {
        algorithm,
        converged,
        wall_time,
    });
    let report = SolveReport {
        algorithm,
        columns,
        equilibrated,
        two_norm_estimate,
        wall_time,
        events,
    };

    if converged {
        info!(
            "{algorithm}: converged in {} iterations (max rel = {:.3e}, {:?})",
            report.max_iterations(),
            report.max_relative_residual(),
            wall_time,
        );
        Ok(report)
    } else {
        warn!(
            "{algorithm}: did not converge (max rel = {:.3e}, tol = {:.3e})",
            report.max_relative_residual(),
            ctrl.solve_ctrl.rel_tol,
        );
        Err(SolverError::DidNotConverge {
            iterations: report.max_iterations(),
            residual: report.max_relative_residual(),
            tolerance: ctrl.solve_ctrl.rel_tol,
            report: Box::new(report),
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_operand(a: &DistSparseMatrix, v: &DistMultiVec, height: usize, name: &str) -> Result<()> {
    if !a.context().same_group(v.context()) {
        return Err(ValidationError::DimensionMismatch(format!(
            "{name} is distributed over a different worker group than A"
        ))
        .into());
    }
    if v.height() != height {
        return Err(ValidationError::DimensionMismatch(format!(
            "{name} has height {}, expected {height} for a {}x{} matrix",
            v.height(),
            a.height(),
            a.width(),
        ))
        .into());
    }
    Ok(())
}

/// Turn a local check into a group-wide verdict.
fn agree(ctx: &WorkerContext, check: Result<(), ValidationError>) -> Result<()> {
    let verdicts = ctx.all_gather(check.is_ok())?;
    check?;
    match verdicts.iter().position(|ok| !ok) {
        Some(rank) => Err(ValidationError::NonFiniteValue(format!(
            "rank {rank} holds a non-finite right-hand side"
        ))
        .into()),
        None => Ok(()),
    }
}

fn record_request(
    a: &DistSparseMatrix,
    columns: usize,
    ctrl: &LeastSquaresControl,
    events: &mut Vec<SolverEvent>,
) -> Result<()> {
    let nnz = a.nnz()?;
    debug!(
        "{}: {}x{} matrix, nnz={nnz}, columns={columns}, workers={}, m={}, alpha={:.2e}",
        ctrl.solve_ctrl.alg,
        a.height(),
        a.width(),
        a.context().size(),
        ctrl.basis_size,
        ctrl.alpha,
    );
    events.push(SolverEvent::SolveRequested {
        algorithm: ctrl.solve_ctrl.alg,
        height: a.height(),
        width: a.width(),
        nnz,
        columns,
        workers: a.context().size(),
    });
    Ok(())
}

fn record_equilibration(a: &DistSparseMatrix, eq: &Equilibration, events: &mut Vec<SolverEvent>) -> Result<()> {
    let (min_scale, max_scale) = global_scale_range(a, eq)?;
    debug!(
        "equilibration: sweeps={}, scale range [{min_scale:.3e}, {max_scale:.3e}]",
        eq.sweeps,
    );
    events.push(SolverEvent::Equilibrated {
        sweeps: eq.sweeps,
        min_scale,
        max_scale,
    });
    Ok(())
}

/// Multiply every column's owned rows by `scale`.
fn scale_rows(v: &mut DistMultiVec, scale: &[f64]) {
    for j in 0..v.width() {
        for (vi, &s) in v.column_mut(j).iter_mut().zip(scale) {
            *vi *= s;
        }
    }
}
