//! Iterative refinement of a preconditioner application.
//!
//! Given a local approximate inverse `M^{-1}` and the true operator `A`,
//! [`Refinement::apply`] approximates `z = A^{-1} v` by
//!
//! ```text
//! z_0     = M^{-1} v
//! z_{k+1} = z_k + M^{-1} (v - A z_k)
//! ```
//!
//! stopping when `||v - A z|| / ||v|| <= rel_tol`, after `max_iterations`
//! corrections, or as soon as a correction fails to reduce the residual (the
//! best iterate is kept). With `max_iterations == 0` the application is the
//! plain `M^{-1} v` and nothing is communicated.

use tracing::trace;

use crate::error::Result;
use crate::operator::{residual, DistOperator};
use crate::precond::LocalPreconditioner;

/// Outcome of one refined preconditioner application.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefineOutcome {
    /// Corrections accepted.
    pub iterations: usize,
    /// Final `||v - A z|| / ||v||`, if it was measured.
    pub relative_residual: Option<f64>,
}

/// `M^{-1}` polished against `A` by iterative refinement.
pub struct Refinement<'a, O: ?Sized, M: ?Sized> {
    op: &'a O,
    base: &'a M,
    rel_tol: f64,
    max_iterations: usize,
}

impl<'a, O, M> Refinement<'a, O, M>
where
    O: DistOperator + ?Sized,
    M: LocalPreconditioner + ?Sized,
{
    /// Refine `base` against `op` to `rel_tol`, at most `max_iterations`
    /// corrections per application.
    pub fn new(op: &'a O, base: &'a M, rel_tol: f64, max_iterations: usize) -> Self {
        Self {
            op,
            base,
            rel_tol,
            max_iterations,
        }
    }

    /// Plain `M^{-1}` application with no refinement.
    pub fn unrefined(op: &'a O, base: &'a M) -> Self {
        Self::new(op, base, 0.0, 0)
    }

    /// `z ~= A^{-1} v`. Collective unless refinement is disabled.
    pub fn apply(&self, v: &[f64], z: &mut [f64]) -> Result<RefineOutcome> {
        self.base.apply(v, z);
        if self.max_iterations == 0 {
            return Ok(RefineOutcome {
                iterations: 0,
                relative_residual: None,
            });
        }

        let ctx = self.op.context();
        let v_norm = ctx.nrm2(v)?;
        if v_norm == 0.0 {
            return Ok(RefineOutcome {
                iterations: 0,
                relative_residual: Some(0.0),
            });
        }

        let n = v.len();
        let mut r = vec![0.0; n];
        residual(self.op, v, z, &mut r)?;
        let mut rel = ctx.nrm2(&r)? / v_norm;

        let mut dz = vec![0.0; n];
        let mut trial = vec![0.0; n];
        let mut trial_r = vec![0.0; n];
        let mut iterations = 0;
        while rel > self.rel_tol && iterations < self.max_iterations {
            self.base.apply(&r, &mut dz);
            for ((t, &zi), &di) in trial.iter_mut().zip(z.iter()).zip(&dz) {
                *t = zi + di;
            }
            residual(self.op, v, &trial, &mut trial_r)?;
            let trial_rel = ctx.nrm2(&trial_r)? / v_norm;
            trace!("refine pass {}: rel = {trial_rel:.6e}", iterations + 1);

            if trial_rel.is_nan() || trial_rel >= rel {
                break;
            }
            z.copy_from_slice(&trial);
            std::mem::swap(&mut r, &mut trial_r);
            rel = trial_rel;
            iterations += 1;
        }

        Ok(RefineOutcome {
            iterations,
            relative_residual: Some(rel),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::WorkerContext;
    use crate::matrix::DistSparseMatrixBuilder;
    use crate::operator::MatrixOperator;
    use crate::precond::Jacobi;

    fn diag_dominant(n: usize) -> crate::matrix::DistSparseMatrix {
        let mut b = DistSparseMatrixBuilder::with_dimensions(WorkerContext::single(), n, n).unwrap();
        for i in 0..n {
            b.queue_local_update(i, i, 4.0).unwrap();
            if i > 0 {
                b.queue_local_update(i, i - 1, 1.0).unwrap();
            }
            if i + 1 < n {
                b.queue_local_update(i, i + 1, 1.0).unwrap();
            }
        }
        b.process_queues().unwrap()
    }

    #[test]
    fn refinement_reaches_tolerance() {
        let a = diag_dominant(8);
        let op = MatrixOperator::new(&a).unwrap();
        let m = Jacobi::from_diagonal(&[4.0; 8]);
        let v = [1.0; 8];
        let mut z = [0.0; 8];
        let out = Refinement::new(&op, &m, 1e-10, 200).apply(&v, &mut z).unwrap();
        assert!(out.iterations > 0);
        assert!(out.relative_residual.unwrap() <= 1e-10);

        let mut r = [0.0; 8];
        residual(&op, &v, &z, &mut r).unwrap();
        assert!(r.iter().all(|ri| ri.abs() < 1e-9));
    }

    #[test]
    fn unrefined_applies_base_once() {
        let a = diag_dominant(3);
        let op = MatrixOperator::new(&a).unwrap();
        let m = Jacobi::from_diagonal(&[4.0; 3]);
        let mut z = [0.0; 3];
        let out = Refinement::unrefined(&op, &m).apply(&[4.0, 8.0, 12.0], &mut z).unwrap();
        assert_eq!(out.iterations, 0);
        assert_eq!(out.relative_residual, None);
        assert_eq!(z, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn iteration_cap_is_respected() {
        let a = diag_dominant(8);
        let op = MatrixOperator::new(&a).unwrap();
        let m = Jacobi::from_diagonal(&[4.0; 8]);
        let mut z = [0.0; 8];
        let out = Refinement::new(&op, &m, 1e-15, 2).apply(&[1.0; 8], &mut z).unwrap();
        assert!(out.iterations <= 2);
    }

    #[test]
    fn zero_rhs_short_circuits() {
        let a = diag_dominant(3);
        let op = MatrixOperator::new(&a).unwrap();
        let m = Jacobi::from_diagonal(&[4.0; 3]);
        let mut z = [1.0; 3];
        let out = Refinement::new(&op, &m, 1e-8, 10).apply(&[0.0; 3], &mut z).unwrap();
        assert_eq!(out.relative_residual, Some(0.0));
        assert_eq!(z, [0.0; 3]);
    }
}
