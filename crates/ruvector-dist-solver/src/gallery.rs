//! Test matrices assembled through the distributed builder.

use tracing::debug;

use crate::context::WorkerContext;
use crate::error::{Result, SolverError};
use crate::matrix::{DistSparseMatrix, DistSparseMatrixBuilder};

/// Collective: nonsymmetric five-point finite-difference operator on an
/// `n0 x n1` grid, plus a dense last column.
///
/// Row `s` is grid point `(s mod n0, s div n0)` with diagonal `11`, west
/// `-1`, east `2`, south `-3`, north `4` (neighbors outside the grid are
/// dropped), and `-10 / (n0 n1)` in the last column. The dense entry is
/// summed into any stencil entry it coincides with.
pub fn fd2d(ctx: WorkerContext, n0: usize, n1: usize) -> Result<DistSparseMatrix> {
    let n = n0.checked_mul(n1).ok_or_else(|| SolverError::InvalidDimension {
        height: n0,
        width: n1,
        reason: format!("grid of {n0} x {n1} points overflows usize"),
    })?;
    let mut builder = DistSparseMatrixBuilder::with_dimensions(ctx, n, n)?;
    builder.reserve(6 * builder.local_height());
    let dense = -10.0 / n as f64;

    for l in 0..builder.local_height() {
        let s = builder.global_row(l);
        let (x0, x1) = (s % n0, s / n0);
        builder.queue_local_update(l, s, 11.0)?;
        if x0 > 0 {
            builder.queue_local_update(l, s - 1, -1.0)?;
        }
        if x0 + 1 < n0 {
            builder.queue_local_update(l, s + 1, 2.0)?;
        }
        if x1 > 0 {
            builder.queue_local_update(l, s - n0, -3.0)?;
        }
        if x1 + 1 < n1 {
            builder.queue_local_update(l, s + n0, 4.0)?;
        }
        builder.queue_local_update(l, n - 1, dense)?;
    }
    debug!("FD2D: {n0}x{n1} grid, {} queued updates on this worker", builder.queued());
    builder.process_queues()
}

/// Collective: the `(n + 1) x n` Lauchli matrix.
///
/// Row 0 is all ones and `A(i + 1, i) = mu`. The ones of row 0 are queued
/// by the owners of the matching columns and routed to the owner of row 0,
/// so assembly exercises cross-worker updates.
pub fn lauchli(ctx: WorkerContext, n: usize, mu: f64) -> Result<DistSparseMatrix> {
    let height = n.checked_add(1).ok_or_else(|| SolverError::InvalidDimension {
        height: n,
        width: n,
        reason: "height n + 1 overflows usize".into(),
    })?;
    let mut builder = DistSparseMatrixBuilder::with_dimensions(ctx, height, n)?;
    let size = builder.context().size();
    let rank = builder.context().rank();
    let chunk = n.div_ceil(size.max(1));
    let cols = (rank * chunk).min(n)..((rank + 1) * chunk).min(n);

    builder.reserve(builder.local_height() + cols.len());
    for j in cols {
        builder.queue_update(0, j, 1.0)?;
    }
    for l in 0..builder.local_height() {
        let i = builder.global_row(l);
        if i > 0 {
            builder.queue_local_update(l, i - 1, mu)?;
        }
    }
    builder.process_queues()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fd2d_3x3_rows() {
        let a = fd2d(WorkerContext::single(), 3, 3).unwrap();
        assert_eq!(a.height(), 9);
        let dense = -10.0 / 9.0;

        // Corner (0, 0): diagonal, east, north, dense.
        let row0: Vec<(usize, f64)> = a.local_row(0).collect();
        assert_eq!(row0, vec![(0, 11.0), (1, 2.0), (3, 4.0), (8, dense)]);

        // Center (1, 1): full stencil.
        let row4: Vec<(usize, f64)> = a.local_row(4).collect();
        assert_eq!(row4, vec![(1, -3.0), (3, -1.0), (4, 11.0), (5, 2.0), (7, 4.0), (8, dense)]);

        // Last row: the dense entry merges with the diagonal.
        let row8: Vec<(usize, f64)> = a.local_row(8).collect();
        assert_eq!(row8, vec![(5, -3.0), (7, -1.0), (8, 11.0 + dense)]);

        // Row 7: the dense entry merges with the east neighbor.
        assert_eq!(a.get_local(7, 8).unwrap(), 2.0 + dense);
    }

    #[test]
    fn lauchli_shape() {
        let a = lauchli(WorkerContext::single(), 4, 0.5).unwrap();
        assert_eq!((a.height(), a.width()), (5, 4));
        assert_eq!(a.local_row(0).count(), 4);
        for i in 1..5 {
            let row: Vec<(usize, f64)> = a.local_row(i).collect();
            assert_eq!(row, vec![(i - 1, 0.5)]);
        }
        assert_eq!(a.nnz().unwrap(), 8);
    }

    #[test]
    fn oversized_grids_are_rejected() {
        let err = fd2d(WorkerContext::single(), usize::MAX, 2).unwrap_err();
        assert!(matches!(err, SolverError::InvalidDimension { height: usize::MAX, width: 2, .. }));
        assert!(matches!(
            lauchli(WorkerContext::single(), usize::MAX, 1.0),
            Err(SolverError::InvalidDimension { .. })
        ));
    }
}
