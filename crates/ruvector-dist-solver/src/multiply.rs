//! Distributed sparse matrix times multi-vector.
//!
//! `Y := alpha * op(A) * X + beta * Y` with `op(A)` either `A` or `A^T`.
//!
//! - NORMAL: the referenced rows of `X` are fetched into a ghost buffer with
//!   one all-to-all along the matrix's [`GhostPlan`](crate::ghost), then each
//!   owned row is reduced locally.
//! - TRANSPOSE: each worker accumulates `a_ij * x_i` per referenced column
//!   and ships the partial sums to the column owners with one all-to-all.
//!
//! As in BLAS, `beta == 0` overwrites `Y` without reading it.

use crate::error::{Result, ValidationError};
use crate::matrix::DistSparseMatrix;
use crate::types::Orientation;
use crate::vector::DistMultiVec;

/// `Y := alpha * op(A) * X + beta * Y`. Collective.
///
/// # Errors
///
/// [`SolverError::InvalidInput`](crate::error::SolverError::InvalidInput)
/// if the heights of `X` and `Y` do not match `op(A)`, their widths differ,
/// or they live on a different worker group than `A`.
pub fn multiply(
    orientation: Orientation,
    alpha: f64,
    a: &DistSparseMatrix,
    x: &DistMultiVec,
    beta: f64,
    y: &mut DistMultiVec,
) -> Result<()> {
    let (in_height, out_height) = match orientation {
        Orientation::Normal => (a.width(), a.height()),
        Orientation::Transpose => (a.height(), a.width()),
    };
    if x.height() != in_height || y.height() != out_height {
        return Err(ValidationError::DimensionMismatch(format!(
            "{orientation:?} multiply of {}x{} matrix: X has height {}, Y has height {}",
            a.height(),
            a.width(),
            x.height(),
            y.height(),
        ))
        .into());
    }
    if x.width() != y.width() {
        return Err(ValidationError::DimensionMismatch(format!(
            "X has {} columns but Y has {}",
            x.width(),
            y.width(),
        ))
        .into());
    }
    if !a.context().same_group(x.context()) || !a.context().same_group(y.context()) {
        return Err(ValidationError::DimensionMismatch(
            "operands are distributed over different worker groups".into(),
        )
        .into());
    }

    let ncols = x.width();
    let x_height = x.local_height();
    let y_height = y.local_height();
    match orientation {
        Orientation::Normal => {
            a.apply_normal(alpha, x.local_data(), x_height, ncols, beta, y.local_data_mut(), y_height)
        }
        Orientation::Transpose => {
            a.apply_transpose(alpha, x.local_data(), x_height, ncols, beta, y.local_data_mut(), y_height)
        }
    }
}

fn scale_output(beta: f64, y: &mut [f64]) {
    if beta == 0.0 {
        y.fill(0.0);
    } else if beta != 1.0 {
        for v in y.iter_mut() {
            *v *= beta;
        }
    }
}

impl DistSparseMatrix {
    /// `y := alpha * A * x + beta * y` on owned slices. Collective.
    ///
    /// `x` is column-major over the column partition (`x_height` owned rows),
    /// `y` over the row partition.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn apply_normal(
        &self,
        alpha: f64,
        x: &[f64],
        x_height: usize,
        ncols: usize,
        beta: f64,
        y: &mut [f64],
        y_height: usize,
    ) -> Result<()> {
        debug_assert_eq!(y_height, self.local_height());
        let ghost = self.plan().gather(self.context(), x, x_height, ncols)?;
        let nghost = self.plan().len();
        let block = self.local_block();
        let compressed = self.compressed_cols();

        for k in 0..ncols {
            let xg = &ghost[k * nghost..(k + 1) * nghost];
            let yk = &mut y[k * y_height..(k + 1) * y_height];
            let row_value = |i: usize| -> f64 {
                let mut sum = 0.0;
                for idx in block.row_ptr[i]..block.row_ptr[i + 1] {
                    sum += block.values[idx] * xg[compressed[idx]];
                }
                sum
            };

            #[cfg(feature = "parallel")]
            {
                use rayon::prelude::*;

                yk.par_iter_mut().enumerate().for_each(|(i, yi)| {
                    let ax = row_value(i);
                    *yi = if beta == 0.0 { alpha * ax } else { alpha * ax + beta * *yi };
                });
            }

            #[cfg(not(feature = "parallel"))]
            {
                for (i, yi) in yk.iter_mut().enumerate() {
                    let ax = row_value(i);
                    *yi = if beta == 0.0 { alpha * ax } else { alpha * ax + beta * *yi };
                }
            }
        }
        Ok(())
    }

    /// `y := alpha * A^T * x + beta * y` on owned slices. Collective.
    ///
    /// `x` is column-major over the row partition, `y` over the column
    /// partition.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn apply_transpose(
        &self,
        alpha: f64,
        x: &[f64],
        x_height: usize,
        ncols: usize,
        beta: f64,
        y: &mut [f64],
        y_height: usize,
    ) -> Result<()> {
        debug_assert_eq!(x_height, self.local_height());
        let nghost = self.plan().len();
        let block = self.local_block();
        let compressed = self.compressed_cols();

        let mut partial = vec![0.0; nghost * ncols];
        for k in 0..ncols {
            let xk = &x[k * x_height..(k + 1) * x_height];
            let pk = &mut partial[k * nghost..(k + 1) * nghost];
            for (i, &xi) in xk.iter().enumerate() {
                if xi == 0.0 {
                    continue;
                }
                for idx in block.row_ptr[i]..block.row_ptr[i + 1] {
                    pk[compressed[idx]] += block.values[idx] * xi;
                }
            }
        }

        scale_output(beta, y);
        self.plan()
            .scatter(self.context(), &partial, ncols, y, y_height, |acc, v| *acc += alpha * v)
    }

    /// Single-vector `y := A x` on owned slices. Collective.
    pub(crate) fn apply(&self, x: &[f64], y: &mut [f64]) -> Result<()> {
        self.apply_normal(1.0, x, x.len(), 1, 0.0, y, y.len())
    }

    /// Single-vector `y := A^T x` on owned slices. Collective.
    pub(crate) fn apply_t(&self, x: &[f64], y: &mut [f64]) -> Result<()> {
        self.apply_transpose(1.0, x, x.len(), 1, 0.0, y, y.len())
    }
}
