//! Distributed linear operators on owned slices.

use crate::context::WorkerContext;
use crate::error::{Result, ValidationError};
use crate::matrix::DistSparseMatrix;

/// A square distributed operator `y := Op x`.
///
/// Inputs and outputs are the calling worker's owned slices of vectors that
/// share one row partition. `apply` is collective.
pub trait DistOperator {
    /// Worker group the operator is distributed over.
    fn context(&self) -> &WorkerContext;

    /// Length of the owned slices.
    fn local_len(&self) -> usize;

    /// `y := Op x`.
    fn apply(&self, x: &[f64], y: &mut [f64]) -> Result<()>;
}

/// `b - Op x`, written into `r`. Collective.
pub fn residual<O: DistOperator + ?Sized>(op: &O, b: &[f64], x: &[f64], r: &mut [f64]) -> Result<()> {
    op.apply(x, r)?;
    for (ri, &bi) in r.iter_mut().zip(b) {
        *ri = bi - *ri;
    }
    Ok(())
}

/// A square [`DistSparseMatrix`] viewed as an operator.
#[derive(Debug, Clone, Copy)]
pub struct MatrixOperator<'a> {
    a: &'a DistSparseMatrix,
}

impl<'a> MatrixOperator<'a> {
    /// # Errors
    ///
    /// [`ValidationError::DimensionMismatch`] if `a` is not square.
    pub fn new(a: &'a DistSparseMatrix) -> Result<Self> {
        if a.height() != a.width() {
            return Err(ValidationError::DimensionMismatch(format!(
                "operator requires a square matrix, got {}x{}",
                a.height(),
                a.width(),
            ))
            .into());
        }
        Ok(Self { a })
    }
}

impl DistOperator for MatrixOperator<'_> {
    fn context(&self) -> &WorkerContext {
        self.a.context()
    }

    fn local_len(&self) -> usize {
        self.a.local_height()
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) -> Result<()> {
        self.a.apply(x, y)
    }
}

/// Matrix-free regularized normal operator `A^T A + alpha^2 I`.
///
/// Slices are distributed over the column partition of `A`.
#[derive(Debug, Clone, Copy)]
pub struct NormalOperator<'a> {
    a: &'a DistSparseMatrix,
    alpha_sq: f64,
}

impl<'a> NormalOperator<'a> {
    /// Wrap `A` with regularization `alpha`.
    pub fn new(a: &'a DistSparseMatrix, alpha: f64) -> Self {
        Self {
            a,
            alpha_sq: alpha * alpha,
        }
    }
}

impl DistOperator for NormalOperator<'_> {
    fn context(&self) -> &WorkerContext {
        self.a.context()
    }

    fn local_len(&self) -> usize {
        self.a.column_partition().local_height(self.a.context().rank())
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) -> Result<()> {
        let mut ax = vec![0.0; self.a.local_height()];
        self.a.apply(x, &mut ax)?;
        self.a.apply_t(&ax, y)?;
        if self.alpha_sq != 0.0 {
            for (yi, &xi) in y.iter_mut().zip(x) {
                *yi += self.alpha_sq * xi;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::DistSparseMatrixBuilder;

    #[test]
    fn normal_operator_matches_dense() {
        // A = [1 2; 0 3; 1 0], A^T A = [2 2; 2 13].
        let mut b = DistSparseMatrixBuilder::with_dimensions(WorkerContext::single(), 3, 2).unwrap();
        b.queue_local_update(0, 0, 1.0).unwrap();
        b.queue_local_update(0, 1, 2.0).unwrap();
        b.queue_local_update(1, 1, 3.0).unwrap();
        b.queue_local_update(2, 0, 1.0).unwrap();
        let a = b.process_queues().unwrap();
        let op = NormalOperator::new(&a, 2.0);
        assert_eq!(op.local_len(), 2);
        let mut y = [0.0; 2];
        op.apply(&[1.0, -1.0], &mut y).unwrap();
        // (A^T A + 4 I) [1, -1] = [0 + 4, -11 - 4]
        assert_eq!(y, [4.0, -15.0]);
    }

    #[test]
    fn matrix_operator_requires_square() {
        let a = DistSparseMatrixBuilder::with_dimensions(WorkerContext::single(), 3, 2)
            .unwrap()
            .process_queues()
            .unwrap();
        assert!(MatrixOperator::new(&a).is_err());
    }

    #[test]
    fn residual_of_identity() {
        let mut b = DistSparseMatrixBuilder::with_dimensions(WorkerContext::single(), 2, 2).unwrap();
        b.queue_local_update(0, 0, 1.0).unwrap();
        b.queue_local_update(1, 1, 1.0).unwrap();
        let a = b.process_queues().unwrap();
        let op = MatrixOperator::new(&a).unwrap();
        let mut r = [0.0; 2];
        residual(&op, &[3.0, 4.0], &[1.0, 1.0], &mut r).unwrap();
        assert_eq!(r, [2.0, 3.0]);
    }
}
