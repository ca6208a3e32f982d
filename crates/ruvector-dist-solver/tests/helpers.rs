//! Shared test helpers for the ruvector-dist-solver integration test suite.
//!
//! Provides deterministic random entry generators, distributed assembly from
//! a global entry list, gathering of distributed vectors, and dense reference
//! solvers used across all test modules.

#![allow(dead_code)]

use ruvector_dist_solver::matrix::{DistSparseMatrix, DistSparseMatrixBuilder};
use ruvector_dist_solver::vector::DistMultiVec;
use ruvector_dist_solver::WorkerContext;

// ---------------------------------------------------------------------------
// Random number generator (simple LCG for deterministic reproducibility)
// ---------------------------------------------------------------------------

/// A minimal linear congruential generator for deterministic test data.
pub struct Lcg {
    state: u64,
}

impl Lcg {
    /// Create a new LCG with the given seed.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate the next u64 value.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.state
    }

    /// Generate a uniform f64 in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Generate a uniform f64 in [lo, hi).
    pub fn next_f64_range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }
}

// ---------------------------------------------------------------------------
// Entry generators
// ---------------------------------------------------------------------------

/// Random nonsymmetric, diagonally dominant `n x n` entries.
///
/// Off-diagonal entries are placed with probability `density`. Each row
/// draws its own scale in `[1e-2, 1e2)`, so rows are badly scaled relative
/// to each other, and its diagonal is `scale + sum |off-diagonal|`.
pub fn random_nonsymmetric_entries(n: usize, density: f64, seed: u64) -> Vec<(usize, usize, f64)> {
    let mut rng = Lcg::new(seed);
    let mut entries = Vec::new();
    for i in 0..n {
        let row_scale = 10f64.powf(rng.next_f64_range(-2.0, 2.0));
        let mut off_diag = 0.0;
        for j in 0..n {
            if i != j && rng.next_f64() < density {
                let v = rng.next_f64_range(-1.0, 1.0) * row_scale;
                off_diag += v.abs();
                entries.push((i, j, v));
            }
        }
        entries.push((i, i, off_diag + row_scale));
    }
    entries
}

/// Random dense vector of length `n` in `[-1, 1)`.
pub fn random_vector(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = Lcg::new(seed);
    (0..n).map(|_| rng.next_f64_range(-1.0, 1.0)).collect()
}

// ---------------------------------------------------------------------------
// Distributed assembly and gathering
// ---------------------------------------------------------------------------

/// Collective: assemble a `height x width` matrix from a global entry list.
///
/// Entry `k` is queued by worker `k mod size` through `queue_update`, so most
/// entries cross workers before landing on their owner.
pub fn assemble_scattered(
    ctx: WorkerContext,
    height: usize,
    width: usize,
    entries: &[(usize, usize, f64)],
) -> DistSparseMatrix {
    let size = ctx.size();
    let rank = ctx.rank();
    let mut builder = DistSparseMatrixBuilder::with_dimensions(ctx, height, width).unwrap();
    for (k, &(i, j, v)) in entries.iter().enumerate() {
        if k % size == rank {
            builder.queue_update(i, j, v).unwrap();
        }
    }
    builder.process_queues().unwrap()
}

/// Collective: a distributed vector filled from a global dense column-major
/// array.
pub fn distribute(ctx: WorkerContext, height: usize, width: usize, global: &[f64]) -> DistMultiVec {
    let mut v = DistMultiVec::zeros(ctx, height, width).unwrap();
    v.index_dependent_fill(|i, j| global[j * height + i]);
    v
}

/// Collective: column `j` of `v`, gathered on every worker.
pub fn gather_column(v: &DistMultiVec, j: usize) -> Vec<f64> {
    let parts = v.context().all_gather(v.column(j).to_vec()).unwrap();
    parts.concat()
}

/// Collective: the `(column, value)` entries of every row of `a`, indexed by
/// global row and gathered on every worker.
pub fn gather_rows(a: &DistSparseMatrix) -> Vec<Vec<(usize, f64)>> {
    let local: Vec<Vec<(usize, f64)>> = (0..a.local_height()).map(|l| a.local_row(l).collect()).collect();
    a.context().all_gather(local).unwrap().concat()
}

// ---------------------------------------------------------------------------
// Dense reference
// ---------------------------------------------------------------------------

/// Dense `height x width` row-major matrix with duplicates summed.
pub fn to_dense(height: usize, width: usize, entries: &[(usize, usize, f64)]) -> Vec<Vec<f64>> {
    let mut dense = vec![vec![0.0; width]; height];
    for &(i, j, v) in entries {
        dense[i][j] += v;
    }
    dense
}

/// `A x` for a dense row-major `A`.
pub fn dense_matvec(a: &[Vec<f64>], x: &[f64]) -> Vec<f64> {
    a.iter().map(|row| row.iter().zip(x).map(|(aij, xj)| aij * xj).sum()).collect()
}

/// `A^T y` for a dense row-major `A`.
pub fn dense_matvec_t(a: &[Vec<f64>], y: &[f64]) -> Vec<f64> {
    let width = a.first().map_or(0, Vec::len);
    let mut out = vec![0.0; width];
    for (row, &yi) in a.iter().zip(y) {
        for (o, &aij) in out.iter_mut().zip(row) {
            *o += aij * yi;
        }
    }
    out
}

/// Solve a dense square system by Gaussian elimination with partial
/// pivoting.
///
/// # Panics
///
/// Panics if the matrix is singular or dimensions are inconsistent.
pub fn dense_solve(a: &[Vec<f64>], rhs: &[f64]) -> Vec<f64> {
    let n = a.len();
    assert_eq!(rhs.len(), n, "rhs length must match matrix dimension");

    let mut aug: Vec<Vec<f64>> = a
        .iter()
        .zip(rhs)
        .map(|(row, &b)| {
            assert_eq!(row.len(), n, "dense_solve requires a square matrix");
            let mut r = row.clone();
            r.push(b);
            r
        })
        .collect();

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = aug[col][col].abs();
        for row in (col + 1)..n {
            if aug[row][col].abs() > max_val {
                max_val = aug[row][col].abs();
                max_row = row;
            }
        }
        assert!(max_val > 1e-15, "matrix is singular or near-singular");
        aug.swap(col, max_row);

        let pivot = aug[col][col];
        for row in (col + 1)..n {
            let factor = aug[row][col] / pivot;
            for j in col..=n {
                aug[row][j] -= factor * aug[col][j];
            }
        }
    }

    let mut x = vec![0.0f64; n];
    for i in (0..n).rev() {
        let mut sum = aug[i][n];
        for j in (i + 1)..n {
            sum -= aug[i][j] * x[j];
        }
        x[i] = sum / aug[i][i];
    }
    x
}

/// Least-squares solution via the dense normal equations `A^T A x = A^T b`.
pub fn dense_least_squares(a: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let width = a.first().map_or(0, Vec::len);
    let mut ata = vec![vec![0.0; width]; width];
    for row in a {
        for (p, &ap) in row.iter().enumerate() {
            for (q, &aq) in row.iter().enumerate() {
                ata[p][q] += ap * aq;
            }
        }
    }
    dense_solve(&ata, &dense_matvec_t(a, b))
}

// ---------------------------------------------------------------------------
// Floating-point comparison utilities
// ---------------------------------------------------------------------------

/// Compute the L2 norm of a vector.
pub fn l2_norm(v: &[f64]) -> f64 {
    v.iter().map(|&x| x * x).sum::<f64>().sqrt()
}

/// Compute the relative error ||approx - exact|| / ||exact||.
///
/// Returns absolute error if the exact solution has zero norm.
pub fn relative_error(approx: &[f64], exact: &[f64]) -> f64 {
    assert_eq!(approx.len(), exact.len(), "vectors must have same length");
    let error = approx
        .iter()
        .zip(exact)
        .map(|(a, e)| (a - e) * (a - e))
        .sum::<f64>()
        .sqrt();
    let exact_norm = l2_norm(exact);
    if exact_norm > 1e-15 {
        error / exact_norm
    } else {
        error
    }
}
