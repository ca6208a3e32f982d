//! Matrix equilibration and two-norm scaling.
//!
//! Ruiz equilibration computes diagonal scalings `R` and `C` such that every
//! row and column of `R A C` has an infinity-norm close to one. Solving
//! `A x = b` then becomes `(R A C)(C^-1 x) = R b`, and the solution of the
//! original system is recovered as `x = C y`.
//!
//! Two-norm scaling divides the (already equilibrated) matrix and the
//! right-hand side by a power-iteration estimate of `||A||_2`, which leaves
//! the solution unchanged and brings the spectrum near unit scale so that the
//! regularization parameter has a consistent meaning.

use tracing::debug;

use crate::error::Result;
use crate::matrix::DistSparseMatrix;

/// Diagonal scalings produced by [`ruiz_equilibrate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Equilibration {
    /// `R`, over the owned rows (distributed like `b`).
    pub row_scale: Vec<f64>,
    /// `C`, over the owned columns (distributed like `x`).
    pub col_scale: Vec<f64>,
    /// Sweeps performed.
    pub sweeps: usize,
}

impl Equilibration {
    /// Identity scaling for `a` (no sweeps).
    pub fn identity(a: &DistSparseMatrix) -> Self {
        let rank = a.context().rank();
        Self {
            row_scale: vec![1.0; a.local_height()],
            col_scale: vec![1.0; a.column_partition().local_height(rank)],
            sweeps: 0,
        }
    }
}

/// Collective: Ruiz equilibration with `sweeps` simultaneous row/column
/// passes.
///
/// Every pass divides each row by `sqrt(max_j |a_ij|)` and each column by
/// `sqrt(max_i |a_ij|)`, both measured on the matrix entering the pass.
/// Column maxima are reduced to the column owners along the matrix's ghost
/// plan and the resulting factors are gathered back. Empty rows and columns
/// keep a factor of one.
pub fn ruiz_equilibrate(a: &DistSparseMatrix, sweeps: usize) -> Result<(DistSparseMatrix, Equilibration)> {
    scale_sweeps(a, sweeps, true)
}

/// Collective: column-only Ruiz scaling.
///
/// Column scaling changes the variables but not the residual, so the
/// minimizer of `||A x - b||` is preserved. Used by least squares, where a
/// row scaling would reweight the objective.
pub fn column_equilibrate(a: &DistSparseMatrix, sweeps: usize) -> Result<(DistSparseMatrix, Equilibration)> {
    scale_sweeps(a, sweeps, false)
}

fn scale_sweeps(a: &DistSparseMatrix, sweeps: usize, scale_rows: bool) -> Result<(DistSparseMatrix, Equilibration)> {
    let ctx = a.context();
    let plan = a.plan();
    let block = a.local_block();
    let compressed = a.compressed_cols();
    let owned_cols = a.column_partition().local_height(ctx.rank());

    let mut eq = Equilibration::identity(a);
    let mut values = block.values.clone();

    for _ in 0..sweeps {
        // Row factors (local).
        let dr: Vec<f64> = (0..block.rows)
            .map(|i| {
                if !scale_rows {
                    return 1.0;
                }
                let m = values[block.row_ptr[i]..block.row_ptr[i + 1]]
                    .iter()
                    .fold(0.0f64, |m, v| m.max(v.abs()));
                inv_sqrt_or_one(m)
            })
            .collect();

        // Column factors (owner-reduced, then gathered to the ghosts).
        let mut ghost_max = vec![0.0f64; plan.len()];
        for (idx, &v) in values.iter().enumerate() {
            let slot = &mut ghost_max[compressed[idx]];
            *slot = slot.max(v.abs());
        }
        let mut col_max = vec![0.0f64; owned_cols];
        plan.scatter(ctx, &ghost_max, 1, &mut col_max, owned_cols, |acc, v| {
            *acc = acc.max(v)
        })?;
        let dc: Vec<f64> = col_max.iter().map(|&m| inv_sqrt_or_one(m)).collect();
        let dc_ghost = plan.gather(ctx, &dc, owned_cols, 1)?;

        for (i, &r) in dr.iter().enumerate() {
            for idx in block.row_ptr[i]..block.row_ptr[i + 1] {
                values[idx] *= r * dc_ghost[compressed[idx]];
            }
        }
        for (s, d) in eq.row_scale.iter_mut().zip(&dr) {
            *s *= d;
        }
        for (s, d) in eq.col_scale.iter_mut().zip(&dc) {
            *s *= d;
        }
        eq.sweeps += 1;
    }

    debug!(rank = ctx.rank(), sweeps, scale_rows, "equilibrated matrix");
    Ok((a.with_values(values), eq))
}

fn inv_sqrt_or_one(m: f64) -> f64 {
    if m > 0.0 && m.is_finite() {
        1.0 / m.sqrt()
    } else {
        1.0
    }
}

/// Collective: global `(min, max)` over every row and column factor.
pub fn global_scale_range(a: &DistSparseMatrix, eq: &Equilibration) -> Result<(f64, f64)> {
    let (lo, hi) = eq
        .row_scale
        .iter()
        .chain(&eq.col_scale)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));
    let mut buf = [-lo, hi];
    a.context().all_reduce_max(&mut buf)?;
    Ok((-buf[0], buf[1]))
}

/// Collective: power-iteration estimate of `||A||_2`.
///
/// Iterates `v <- A^T A v / ||A^T A v||` from the normalized all-ones vector
/// and returns `sqrt(||A^T A v||)`. Returns zero for a zero matrix.
pub fn estimate_two_norm(a: &DistSparseMatrix, iterations: usize) -> Result<f64> {
    let ctx = a.context();
    let owned_cols = a.column_partition().local_height(ctx.rank());
    let mut v = vec![1.0; owned_cols];
    let n0 = ctx.nrm2(&v)?;
    if n0 == 0.0 {
        return Ok(0.0);
    }
    v.iter_mut().for_each(|x| *x /= n0);

    let mut w = vec![0.0; a.local_height()];
    let mut u = vec![0.0; owned_cols];
    let mut estimate = 0.0;
    for _ in 0..iterations {
        a.apply(&v, &mut w)?;
        a.apply_t(&w, &mut u)?;
        let norm = ctx.nrm2(&u)?;
        if norm == 0.0 || !norm.is_finite() {
            return Ok(if norm == 0.0 { 0.0 } else { norm });
        }
        estimate = norm.sqrt();
        for (vi, &ui) in v.iter_mut().zip(&u) {
            *vi = ui / norm;
        }
    }
    debug!(rank = ctx.rank(), iterations, estimate, "estimated two-norm");
    Ok(estimate)
}

/// Divide every entry of `a` by `factor`.
pub fn scale_matrix(a: &DistSparseMatrix, factor: f64) -> DistSparseMatrix {
    let values = a.local_block().values.iter().map(|v| v / factor).collect();
    a.with_values(values)
}
