//! Restarted flexible GMRES over a distributed operator.
//!
//! FGMRES keeps the preconditioned directions `z_k = P(v_k)` next to the
//! Arnoldi basis, so the preconditioner may change from one step to the next.
//! That is what allows each application to be an inner refinement loop that
//! stops at a tolerance rather than a fixed linear map.
//!
//! # Algorithm
//!
//! ```text
//! r = b - A x,  beta = ||r||,  v_0 = r / beta,  g = beta e_1
//! for k = 0 .. m-1:
//!     z_k = P(v_k)                      (refined preconditioner)
//!     w   = A z_k
//!     h_jk = <v_j, w>,  w -= h_jk v_j   (modified Gram-Schmidt, j <= k)
//!     h_k+1,k = ||w||,  v_k+1 = w / h_k+1,k
//!     apply Givens rotations to column k, update g
//!     stop if |g_k+1| / ||b|| <= rel_tol
//! x += Z y  with  R y = g  (back substitution)
//! ```
//!
//! The true residual is recomputed at every restart and is the only value
//! that decides convergence. All dots and norms are global reductions, so
//! every worker takes the same branches.

use tracing::{debug, info, trace, warn};

use crate::blas;
use crate::error::{Result, SolverError};
use crate::events::SolverEvent;
use crate::operator::{residual, DistOperator};
use crate::precond::LocalPreconditioner;
use crate::refine::Refinement;
use crate::types::{ColumnReport, ConvergenceInfo};

/// Outer-loop parameters of one FGMRES solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FgmresParams {
    /// Relative residual target `||b - A x|| / ||b||`.
    pub rel_tol: f64,
    /// Outer iteration budget over all restarts.
    pub max_iterations: usize,
    /// Krylov basis size before a restart.
    pub basis_size: usize,
    /// Log and record every outer iteration.
    pub progress: bool,
    /// Log and record every refinement loop.
    pub refine_progress: bool,
}

/// Solve `A x = b` for one column, starting from the contents of `x`.
///
/// On return `x` holds the converged iterate, or the iterate with the lowest
/// true residual seen at a restart if the budget ran out (the report's
/// `converged` flag tells which). Progress events are appended to `events`
/// when enabled. Collective.
///
/// # Errors
///
/// [`SolverError::NumericalInstability`] if a NaN or infinity enters the
/// recurrence; collective errors from the reductions.
pub fn fgmres<O, M>(
    op: &O,
    precond: &Refinement<'_, O, M>,
    b: &[f64],
    x: &mut [f64],
    params: &FgmresParams,
    column: usize,
    events: &mut Vec<SolverEvent>,
) -> Result<ColumnReport>
where
    O: DistOperator + ?Sized,
    M: LocalPreconditioner + ?Sized,
{
    let ctx = op.context();
    let n = op.local_len();
    debug_assert_eq!(b.len(), n);
    debug_assert_eq!(x.len(), n);

    let b_norm = ctx.nrm2(b)?;
    if b_norm == 0.0 {
        debug!("FGMRES: zero RHS in column {column}, returning zero solution");
        x.fill(0.0);
        return Ok(ColumnReport {
            column,
            iterations: 0,
            refine_iterations: 0,
            relative_residual: 0.0,
            converged: true,
            history: Vec::new(),
        });
    }
    if !b_norm.is_finite() {
        return Err(SolverError::NumericalInstability {
            iteration: 0,
            detail: format!("||b|| = {b_norm} in column {column}"),
        });
    }

    let m = params.basis_size.max(1);
    let mut r = vec![0.0; n];
    residual(op, b, x, &mut r)?;
    let mut beta = ctx.nrm2(&r)?;
    let mut rel = beta / b_norm;
    check_finite(rel, 0, "initial residual")?;

    let mut iterations = 0usize;
    let mut refine_iterations = 0usize;
    let mut history = vec![ConvergenceInfo {
        iteration: 0,
        relative_residual: rel,
    }];
    let mut best_x = x.to_vec();
    let mut best_rel = rel;

    debug!(
        "FGMRES: column={column}, n_local={n}, tol={:.2e}, max_iter={}, m={m}, rel0={rel:.6e}",
        params.rel_tol, params.max_iterations,
    );

    while rel > params.rel_tol && iterations < params.max_iterations {
        // v_0 = r / beta
        let mut basis: Vec<Vec<f64>> = Vec::with_capacity(m + 1);
        let mut directions: Vec<Vec<f64>> = Vec::with_capacity(m);
        let inv_beta = 1.0 / beta;
        basis.push(r.iter().map(|&ri| ri * inv_beta).collect());

        // h[k][i] = H(i, k)
        let mut h: Vec<Vec<f64>> = Vec::with_capacity(m);
        let mut g = vec![0.0; m + 1];
        g[0] = beta;
        let mut cs = vec![0.0; m];
        let mut sn = vec![0.0; m];

        let mut k = 0;
        while k < m && iterations < params.max_iterations {
            iterations += 1;

            let mut z = vec![0.0; n];
            let outcome = precond.apply(&basis[k], &mut z)?;
            refine_iterations += outcome.iterations;
            if let Some(inner) = outcome.relative_residual {
                if params.refine_progress {
                    info!(
                        "refinement: column={column}, iter={iterations}, passes={}, rel={inner:.6e}",
                        outcome.iterations,
                    );
                    events.push(SolverEvent::RefinementCompleted {
                        column,
                        iteration: iterations,
                        refine_iterations: outcome.iterations,
                        relative_residual: inner,
                    });
                }
            }

            let mut w = vec![0.0; n];
            op.apply(&z, &mut w)?;
            directions.push(z);

            let mut hk = vec![0.0; m + 1];
            for (j, vj) in basis.iter().enumerate() {
                let hjk = ctx.dot(vj, &w)?;
                hk[j] = hjk;
                blas::axpy(-hjk, vj, &mut w);
            }
            let w_norm = ctx.nrm2(&w)?;
            hk[k + 1] = w_norm;
            let column_norm = hk[..=k + 1].iter().map(|v| v * v).sum::<f64>().sqrt();
            check_finite(column_norm, iterations, "Hessenberg column")?;

            // Apply previous rotations, then zero H(k+1, k).
            for j in 0..k {
                let temp = cs[j] * hk[j] + sn[j] * hk[j + 1];
                hk[j + 1] = -sn[j] * hk[j] + cs[j] * hk[j + 1];
                hk[j] = temp;
            }
            let (c, s) = givens_rotation(hk[k], hk[k + 1]);
            cs[k] = c;
            sn[k] = s;
            hk[k] = c * hk[k] + s * hk[k + 1];
            hk[k + 1] = 0.0;
            g[k + 1] = -s * g[k];
            g[k] *= c;
            h.push(hk);

            let estimate = g[k + 1].abs() / b_norm;
            history.push(ConvergenceInfo {
                iteration: iterations,
                relative_residual: estimate,
            });
            if params.progress {
                info!("FGMRES: column={column}, iter={iterations}, rel={estimate:.6e}");
                events.push(SolverEvent::OuterIteration {
                    column,
                    iteration: iterations,
                    relative_residual: estimate,
                });
            } else {
                trace!("FGMRES iter {iterations}: rel = {estimate:.6e}");
            }

            k += 1;
            // Happy breakdown: the Krylov space is invariant.
            if w_norm <= f64::EPSILON * column_norm {
                debug!("FGMRES: breakdown at iteration {iterations} (||w|| = {w_norm:.3e})");
                break;
            }
            if estimate <= params.rel_tol {
                break;
            }
            let inv_w = 1.0 / w_norm;
            basis.push(w.iter().map(|&wi| wi * inv_w).collect());
        }

        // R y = g, then x += Z y.
        let mut y = vec![0.0; k];
        for i in (0..k).rev() {
            let mut sum = g[i];
            for j in (i + 1)..k {
                sum -= h[j][i] * y[j];
            }
            y[i] = if h[i][i] != 0.0 { sum / h[i][i] } else { 0.0 };
        }
        for (zi, &yi) in directions.iter().zip(&y) {
            blas::axpy(yi, zi, x);
        }

        residual(op, b, x, &mut r)?;
        beta = ctx.nrm2(&r)?;
        rel = beta / b_norm;
        check_finite(rel, iterations, "restart residual")?;
        if rel < best_rel {
            best_rel = rel;
            best_x.copy_from_slice(x);
        }
        if params.progress {
            info!("FGMRES: column={column}, restart at iter={iterations}, true rel={rel:.6e}");
            events.push(SolverEvent::Restarted {
                column,
                iteration: iterations,
                relative_residual: rel,
            });
        }
    }

    let converged = rel <= params.rel_tol;
    if converged {
        debug!("FGMRES converged: column={column}, iterations={iterations}, rel={rel:.6e}");
    } else {
        warn!(
            "FGMRES: non-convergence in column {column} after {iterations} iterations, \
             best rel = {best_rel:.6e}",
        );
        x.copy_from_slice(&best_x);
        rel = best_rel;
    }

    Ok(ColumnReport {
        column,
        iterations,
        refine_iterations,
        relative_residual: rel,
        converged,
        history,
    })
}

fn check_finite(value: f64, iteration: usize, what: &str) -> Result<()> {
    if value.is_finite() {
        return Ok(());
    }
    warn!("FGMRES: non-finite {what} at iteration {iteration}");
    Err(SolverError::NumericalInstability {
        iteration,
        detail: format!("{what} is {value}"),
    })
}

/// Givens rotation `(c, s)` with `[c s; -s c] [a; b] = [r; 0]`.
fn givens_rotation(a: f64, b: f64) -> (f64, f64) {
    if b == 0.0 {
        return (1.0, 0.0);
    }
    let r = a.hypot(b);
    (a / r, b / r)
}
