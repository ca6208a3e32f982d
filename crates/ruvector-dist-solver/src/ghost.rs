//! Ghost-column exchange plan of an assembled matrix.
//!
//! A worker's rows reference a set of global columns, most of which are owned
//! by other workers under the column partition. The plan records, per peer,
//! which referenced columns that peer owns and which of the caller's owned
//! columns the peer references. It is built once at assembly with a single
//! all-to-all and then reused by every multiply:
//!
//! - [`GhostPlan::gather`] pulls the referenced entries of a column-partitioned
//!   operand into a compact ghost buffer (NORMAL multiply).
//! - [`GhostPlan::scatter`] pushes per-ghost contributions back to the column
//!   owners and combines them there (TRANSPOSE multiply, column maxima).

use crate::context::WorkerContext;
use crate::error::{Result, ValidationError};
use crate::partition::RowPartition;

/// Communication plan between a worker's referenced columns and their owners.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GhostPlan {
    /// Sorted, unique global columns referenced by the local rows.
    cols: Vec<usize>,
    /// For each owner rank, positions into `cols` of the columns it owns.
    recv_positions: Vec<Vec<usize>>,
    /// For each requesting rank, the caller's local column rows it needs.
    send_rows: Vec<Vec<usize>>,
}

impl GhostPlan {
    /// Collective: exchange column requests and build the plan.
    ///
    /// `referenced` must be sorted and free of duplicates.
    pub(crate) fn build(
        ctx: &WorkerContext,
        col_partition: &RowPartition,
        referenced: Vec<usize>,
    ) -> Result<Self> {
        let size = ctx.size();
        let mut recv_positions = vec![Vec::new(); size];
        let mut requests: Vec<Vec<usize>> = vec![Vec::new(); size];
        for (pos, &col) in referenced.iter().enumerate() {
            let owner = col_partition.owner(col);
            recv_positions[owner].push(pos);
            requests[owner].push(col);
        }

        let first_owned = col_partition.first_row(ctx.rank());
        let owned = col_partition.local_height(ctx.rank());
        let incoming = ctx.all_to_all(requests)?;
        let mut send_rows = Vec::with_capacity(size);
        for (src, cols) in incoming.into_iter().enumerate() {
            let mut rows = Vec::with_capacity(cols.len());
            for col in cols {
                let local = col.wrapping_sub(first_owned);
                if local >= owned {
                    return Err(ValidationError::DimensionMismatch(format!(
                        "rank {src} requested column {col}, not owned by rank {}",
                        ctx.rank(),
                    ))
                    .into());
                }
                rows.push(local);
            }
            send_rows.push(rows);
        }

        Ok(Self {
            cols: referenced,
            recv_positions,
            send_rows,
        })
    }

    /// Number of distinct referenced columns.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.cols.len()
    }

    /// Referenced global columns, sorted.
    #[cfg(test)]
    pub(crate) fn columns(&self) -> &[usize] {
        &self.cols
    }

    /// Position of a referenced global column in the ghost buffer.
    pub(crate) fn position(&self, global_col: usize) -> Option<usize> {
        self.cols.binary_search(&global_col).ok()
    }

    /// Collective: fetch the referenced rows of a column-partitioned operand.
    ///
    /// `owned` is column-major with `owned_height` rows and `ncols` columns;
    /// the result is column-major with [`len`](Self::len) rows.
    pub(crate) fn gather(
        &self,
        ctx: &WorkerContext,
        owned: &[f64],
        owned_height: usize,
        ncols: usize,
    ) -> Result<Vec<f64>> {
        let outgoing: Vec<Vec<f64>> = self
            .send_rows
            .iter()
            .map(|rows| {
                let mut buf = Vec::with_capacity(rows.len() * ncols);
                for k in 0..ncols {
                    let column = &owned[k * owned_height..(k + 1) * owned_height];
                    buf.extend(rows.iter().map(|&l| column[l]));
                }
                buf
            })
            .collect();

        let incoming = ctx.all_to_all(outgoing)?;
        let n = self.cols.len();
        let mut ghost = vec![0.0; n * ncols];
        for (src, msg) in incoming.iter().enumerate() {
            let positions = &self.recv_positions[src];
            check_len(src, msg.len(), positions.len() * ncols)?;
            for k in 0..ncols {
                let chunk = &msg[k * positions.len()..(k + 1) * positions.len()];
                for (&pos, &v) in positions.iter().zip(chunk) {
                    ghost[k * n + pos] = v;
                }
            }
        }
        Ok(ghost)
    }

    /// Collective: ship per-ghost contributions to the column owners and fold
    /// them into `owned` with `combine`.
    ///
    /// Contributions arrive and are combined in source-rank order.
    pub(crate) fn scatter<F>(
        &self,
        ctx: &WorkerContext,
        contributions: &[f64],
        ncols: usize,
        owned: &mut [f64],
        owned_height: usize,
        combine: F,
    ) -> Result<()>
    where
        F: Fn(&mut f64, f64),
    {
        let n = self.cols.len();
        let outgoing: Vec<Vec<f64>> = self
            .recv_positions
            .iter()
            .map(|positions| {
                let mut buf = Vec::with_capacity(positions.len() * ncols);
                for k in 0..ncols {
                    buf.extend(positions.iter().map(|&pos| contributions[k * n + pos]));
                }
                buf
            })
            .collect();

        let incoming = ctx.all_to_all(outgoing)?;
        for (src, msg) in incoming.iter().enumerate() {
            let rows = &self.send_rows[src];
            check_len(src, msg.len(), rows.len() * ncols)?;
            for k in 0..ncols {
                let chunk = &msg[k * rows.len()..(k + 1) * rows.len()];
                for (&l, &v) in rows.iter().zip(chunk) {
                    combine(&mut owned[k * owned_height + l], v);
                }
            }
        }
        Ok(())
    }
}

fn check_len(src: usize, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(ValidationError::DimensionMismatch(format!(
            "ghost exchange with rank {src}: expected {expected} values, got {got}"
        ))
        .into());
    }
    Ok(())
}
