//! Local preconditioners applied inside the Krylov solver.
//!
//! Both preconditioners act on owned slices only and never communicate, so
//! the cost of one application is independent of the worker count.
//!
//! - [`RegularizedIlu0`]: block ILU(0) of the regularized diagonal block
//!   `A_loc + alpha * sign(diag(A_loc))`. Coupling to rows owned by other
//!   workers is dropped (block Jacobi), and the shift keeps every pivot away
//!   from zero.
//! - [`Jacobi`]: diagonal scaling, used for the matrix-free normal operator
//!   of least squares.

use tracing::{debug, warn};

use crate::error::{Result, ValidationError};
use crate::matrix::DistSparseMatrix;
use crate::types::CsrMatrix;

/// `z := M^{-1} r` on owned slices, without communication.
pub trait LocalPreconditioner: Send + Sync {
    /// Apply the approximate inverse.
    fn apply(&self, r: &[f64], z: &mut [f64]);

    /// Length of the owned slices this preconditioner accepts.
    fn local_len(&self) -> usize;
}

// ---------------------------------------------------------------------------
// Regularized block ILU(0)
// ---------------------------------------------------------------------------

/// Incomplete LU factorization with zero fill of the regularized local
/// diagonal block.
///
/// `L` (unit lower) and `U` share one CSR pattern with local column
/// indices; `diag[i]` points at `U_ii`.
#[derive(Debug, Clone)]
pub struct RegularizedIlu0 {
    lu: CsrMatrix<f64>,
    diag: Vec<usize>,
    replaced_pivots: usize,
}

impl RegularizedIlu0 {
    /// Factor the owned diagonal block of a square matrix.
    ///
    /// Every diagonal entry `d` is shifted to `d + alpha * sign(d)` (with
    /// `sign(0) = +1`); rows without a stored diagonal get one. Pivots that
    /// still fall below `eps * max|row|` are replaced by `alpha` (or the row
    /// scale when `alpha == 0`) and counted.
    ///
    /// # Errors
    ///
    /// [`ValidationError::DimensionMismatch`] if `a` is not square.
    pub fn factor(a: &DistSparseMatrix, alpha: f64) -> Result<Self> {
        if a.height() != a.width() {
            return Err(ValidationError::DimensionMismatch(format!(
                "ILU(0) requires a square matrix, got {}x{}",
                a.height(),
                a.width(),
            ))
            .into());
        }

        let n = a.local_height();
        let first = a.first_local_row();
        let block = a.local_block();

        let mut entries = Vec::with_capacity(block.nnz() + n);
        let mut row_max = vec![0.0f64; n];
        for (i, rmax) in row_max.iter_mut().enumerate() {
            for (col, &v) in block.row_entries(i) {
                *rmax = rmax.max(v.abs());
                if col >= first && col < first + n {
                    entries.push((i, col - first, v));
                }
            }
            entries.push((i, i, 0.0));
        }
        let mut lu = CsrMatrix::from_coo_summed(n, n, entries);

        let mut diag = Vec::with_capacity(n);
        for i in 0..n {
            let idx = lu.find(i, i).ok_or_else(|| {
                ValidationError::DimensionMismatch(format!("missing diagonal in local row {i}"))
            })?;
            let d = lu.values[idx];
            lu.values[idx] = d + alpha * if d < 0.0 { -1.0 } else { 1.0 };
            diag.push(idx);
        }

        let mut replaced_pivots = 0;
        let mut marker = vec![usize::MAX; n];
        for i in 0..n {
            let (start, end) = (lu.row_ptr[i], lu.row_ptr[i + 1]);
            for idx in start..end {
                marker[lu.col_indices[idx]] = idx;
            }

            for idx in start..end {
                let k = lu.col_indices[idx];
                if k >= i {
                    break;
                }
                let lik = lu.values[idx] / lu.values[diag[k]];
                lu.values[idx] = lik;
                for kdx in diag[k] + 1..lu.row_ptr[k + 1] {
                    let pos = marker[lu.col_indices[kdx]];
                    if pos != usize::MAX {
                        lu.values[pos] -= lik * lu.values[kdx];
                    }
                }
            }

            let pivot = lu.values[diag[i]];
            let floor = f64::EPSILON * row_max[i].max(alpha).max(f64::MIN_POSITIVE);
            if !pivot.is_finite() || pivot.abs() <= floor {
                let magnitude = if alpha > 0.0 { alpha } else { row_max[i].max(1.0) };
                lu.values[diag[i]] = if pivot < 0.0 { -magnitude } else { magnitude };
                replaced_pivots += 1;
            }

            for idx in start..end {
                marker[lu.col_indices[idx]] = usize::MAX;
            }
        }

        if replaced_pivots > 0 {
            warn!("ILU(0): replaced {replaced_pivots} tiny pivots (alpha={alpha:.2e})");
        }
        debug!("ILU(0): n={n}, nnz={}, alpha={alpha:.2e}", lu.nnz());

        Ok(Self {
            lu,
            diag,
            replaced_pivots,
        })
    }

    /// Number of pivots replaced by the breakdown guard.
    pub fn replaced_pivots(&self) -> usize {
        self.replaced_pivots
    }
}

impl LocalPreconditioner for RegularizedIlu0 {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        let lu = &self.lu;
        let n = lu.rows;
        debug_assert_eq!(r.len(), n);
        debug_assert_eq!(z.len(), n);

        // L y = r (unit diagonal).
        for i in 0..n {
            let mut sum = r[i];
            for idx in lu.row_ptr[i]..self.diag[i] {
                sum -= lu.values[idx] * z[lu.col_indices[idx]];
            }
            z[i] = sum;
        }
        // U z = y.
        for i in (0..n).rev() {
            let mut sum = z[i];
            for idx in self.diag[i] + 1..lu.row_ptr[i + 1] {
                sum -= lu.values[idx] * z[lu.col_indices[idx]];
            }
            z[i] = sum / lu.values[self.diag[i]];
        }
    }

    fn local_len(&self) -> usize {
        self.lu.rows
    }
}

// ---------------------------------------------------------------------------
// Jacobi
// ---------------------------------------------------------------------------

/// Diagonal preconditioner `z[i] = r[i] / d[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Jacobi {
    inv_diag: Vec<f64>,
}

impl Jacobi {
    /// From the owned diagonal entries. Zero or non-finite entries act as one.
    pub fn from_diagonal(diag: &[f64]) -> Self {
        let inv_diag = diag
            .iter()
            .map(|&d| if d.abs() > f64::EPSILON && d.is_finite() { 1.0 / d } else { 1.0 })
            .collect();
        Self { inv_diag }
    }

    /// Collective: diagonal of `A^T A + alpha^2 I` over the owned columns.
    pub fn normal_equations(a: &DistSparseMatrix, alpha: f64) -> Result<Self> {
        let ctx = a.context();
        let plan = a.plan();
        let block = a.local_block();
        let compressed = a.compressed_cols();
        let owned = a.column_partition().local_height(ctx.rank());

        let mut ghost_sq = vec![0.0; plan.len()];
        for (idx, &v) in block.values.iter().enumerate() {
            ghost_sq[compressed[idx]] += v * v;
        }
        let mut diag = vec![alpha * alpha; owned];
        plan.scatter(ctx, &ghost_sq, 1, &mut diag, owned, |acc, v| *acc += v)?;
        Ok(Self::from_diagonal(&diag))
    }
}

impl LocalPreconditioner for Jacobi {
    #[inline]
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        debug_assert_eq!(r.len(), self.inv_diag.len());
        for ((zi, &ri), &di) in z.iter_mut().zip(r).zip(&self.inv_diag) {
            *zi = ri * di;
        }
    }

    fn local_len(&self) -> usize {
        self.inv_diag.len()
    }
}
