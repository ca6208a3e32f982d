//! Core types shared by the distributed containers and the solvers.
//!
//! Provides the local [`CsrMatrix`] block each worker stores, the
//! [`Algorithm`] identifiers, and the per-column / per-solve report types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::events::SolverEvent;

// ---------------------------------------------------------------------------
// CsrMatrix<T>
// ---------------------------------------------------------------------------

/// Compressed Sparse Row (CSR) matrix.
///
/// Each worker keeps the rows it owns in one of these. Row indices are local
/// (`0..rows`); column indices are whatever index space the owner chose
/// (global columns for the assembled block, local columns for the
/// preconditioner's diagonal block).
///
/// # Layout
///
/// For a matrix with `m` rows and `nnz` non-zeros:
/// - `row_ptr` has length `m + 1`
/// - `col_indices` and `values` each have length `nnz`
/// - Row `i` spans indices `row_ptr[i]..row_ptr[i+1]`
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix<T> {
    /// Row pointers: `row_ptr[i]` is the start index in `col_indices`/`values`
    /// for row `i`.
    pub row_ptr: Vec<usize>,
    /// Column indices for each non-zero entry.
    pub col_indices: Vec<usize>,
    /// Values for each non-zero entry.
    pub values: Vec<T>,
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
}

impl<T> CsrMatrix<T> {
    /// Empty `rows x cols` matrix with no stored entries.
    pub fn empty(rows: usize, cols: usize) -> Self {
        Self {
            row_ptr: vec![0; rows + 1],
            col_indices: Vec::new(),
            values: Vec::new(),
            rows,
            cols,
        }
    }

    /// Number of non-zero entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Iterate over `(col_index, &value)` pairs for the given row.
    #[inline]
    pub fn row_entries(&self, row: usize) -> impl Iterator<Item = (usize, &T)> {
        let start = self.row_ptr[row];
        let end = self.row_ptr[row + 1];
        self.col_indices[start..end]
            .iter()
            .copied()
            .zip(self.values[start..end].iter())
    }

    /// Position of `(row, col)` in the entry arrays, if stored.
    ///
    /// Requires column indices sorted within the row.
    pub fn find(&self, row: usize, col: usize) -> Option<usize> {
        let start = self.row_ptr[row];
        let end = self.row_ptr[row + 1];
        self.col_indices[start..end]
            .binary_search(&col)
            .ok()
            .map(|offset| start + offset)
    }
}

impl<T: Copy + std::ops::AddAssign> CsrMatrix<T> {
    /// Build a CSR matrix from COO triplets, summing duplicates.
    ///
    /// Entries are stably sorted by `(row, col)`, so duplicates are summed in
    /// the order they were supplied. Out-of-range indices are the caller's
    /// responsibility; they are checked before triplets reach this point.
    pub fn from_coo_summed(
        rows: usize,
        cols: usize,
        entries: impl IntoIterator<Item = (usize, usize, T)>,
    ) -> Self {
        let mut sorted: Vec<_> = entries.into_iter().collect();
        sorted.sort_by_key(|(r, c, _)| (*r, *c));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_indices: Vec<usize> = Vec::with_capacity(sorted.len());
        let mut values: Vec<T> = Vec::with_capacity(sorted.len());
        let mut last: Option<(usize, usize)> = None;

        for (r, c, v) in sorted {
            debug_assert!(r < rows, "row index {r} out of bounds (rows={rows})");
            debug_assert!(c < cols, "col index {c} out of bounds (cols={cols})");
            if last == Some((r, c)) {
                if let Some(acc) = values.last_mut() {
                    *acc += v;
                }
                continue;
            }
            row_ptr[r + 1] += 1;
            col_indices.push(c);
            values.push(v);
            last = Some((r, c));
        }
        for i in 1..=rows {
            row_ptr[i] += row_ptr[i - 1];
        }

        Self {
            row_ptr,
            col_indices,
            values,
            rows,
            cols,
        }
    }
}

// ---------------------------------------------------------------------------
// Algorithms and operand orientation
// ---------------------------------------------------------------------------

/// Krylov strategy used by the linear-solve and least-squares drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// Flexible GMRES whose preconditioner application is polished by
    /// iterative refinement against the true operator.
    ///
    /// Each outer step solves `A z = v` to `rel_tol_refine` using the
    /// regularized factorization as the inner correction.
    RegRefineFgmres,
    /// Flexible GMRES applying the regularized factorization once per step.
    Fgmres,
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Algorithm::RegRefineFgmres => write!(f, "reg-refine-fgmres"),
            Algorithm::Fgmres => write!(f, "fgmres"),
        }
    }
}

/// Whether a multiply applies `A` or `A^T`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    /// `op(A) = A`.
    Normal,
    /// `op(A) = A^T`.
    Transpose,
}

// ---------------------------------------------------------------------------
// Solve reports
// ---------------------------------------------------------------------------

/// Per-iteration convergence snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceInfo {
    /// Outer iteration index (1-based; 0 is the initial residual).
    pub iteration: usize,
    /// Relative residual `||b - A x|| / ||b||` (estimated inside a cycle,
    /// exact at restarts).
    pub relative_residual: f64,
}

/// Outcome of the Krylov solve for one right-hand-side column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnReport {
    /// Column index within the right-hand-side block.
    pub column: usize,
    /// Outer iterations performed.
    pub iterations: usize,
    /// Inner refinement iterations summed over all outer iterations.
    pub refine_iterations: usize,
    /// Final relative residual of the scaled system.
    pub relative_residual: f64,
    /// `true` if `relative_residual <= rel_tol`.
    pub converged: bool,
    /// Residual after every outer iteration.
    pub history: Vec<ConvergenceInfo>,
}

/// Result of a [`linear_solve`](crate::driver::linear_solve) or
/// [`least_squares`](crate::driver::least_squares) call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    /// Algorithm that produced the result.
    pub algorithm: Algorithm,
    /// One entry per right-hand-side column, in column order.
    pub columns: Vec<ColumnReport>,
    /// `true` if Ruiz equilibration was applied.
    pub equilibrated: bool,
    /// Two-norm estimate the system was divided by, if two-norm scaling ran.
    pub two_norm_estimate: Option<f64>,
    /// Wall-clock time of the whole call on this worker.
    pub wall_time: Duration,
    /// Progress events recorded during the call.
    pub events: Vec<SolverEvent>,
}

impl SolveReport {
    /// `true` if every column converged.
    pub fn converged(&self) -> bool {
        self.columns.iter().all(|c| c.converged)
    }

    /// Largest outer iteration count over all columns.
    pub fn max_iterations(&self) -> usize {
        self.columns.iter().map(|c| c.iterations).max().unwrap_or(0)
    }

    /// Largest final relative residual over all columns.
    pub fn max_relative_residual(&self) -> f64 {
        self.columns
            .iter()
            .map(|c| c.relative_residual)
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_coo_summed_merges_duplicates_in_order() {
        let m = CsrMatrix::from_coo_summed(
            2,
            3,
            vec![(1, 2, 1.0), (0, 1, 2.0), (1, 2, 0.5), (0, 0, 1.0), (0, 1, 3.0)],
        );
        assert_eq!(m.row_ptr, vec![0, 2, 3]);
        assert_eq!(m.col_indices, vec![0, 1, 2]);
        assert_eq!(m.values, vec![1.0, 5.0, 1.5]);
    }

    #[test]
    fn find_locates_sorted_entries() {
        let m = CsrMatrix::from_coo_summed(2, 4, vec![(0, 3, 1.0), (0, 1, 2.0), (1, 0, 3.0)]);
        assert_eq!(m.find(0, 1), Some(0));
        assert_eq!(m.find(0, 3), Some(1));
        assert_eq!(m.find(0, 2), None);
        assert_eq!(m.find(1, 0), Some(2));
    }

    #[test]
    fn empty_matrix_has_no_entries() {
        let m = CsrMatrix::<f64>::empty(3, 5);
        assert_eq!(m.nnz(), 0);
        assert_eq!(m.row_entries(2).count(), 0);
    }

    #[test]
    fn algorithm_display() {
        assert_eq!(Algorithm::RegRefineFgmres.to_string(), "reg-refine-fgmres");
        assert_eq!(Algorithm::Fgmres.to_string(), "fgmres");
    }

    #[test]
    fn report_aggregates() {
        let col = |iterations, relative_residual, converged| ColumnReport {
            column: 0,
            iterations,
            refine_iterations: 0,
            relative_residual,
            converged,
            history: Vec::new(),
        };
        let report = SolveReport {
            algorithm: Algorithm::Fgmres,
            columns: vec![col(3, 1e-9, true), col(7, 1e-3, false)],
            equilibrated: false,
            two_norm_estimate: None,
            wall_time: Duration::ZERO,
            events: Vec::new(),
        };
        assert!(!report.converged());
        assert_eq!(report.max_iterations(), 7);
        assert_eq!(report.max_relative_residual(), 1e-3);
    }
}
