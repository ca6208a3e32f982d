//! Even block partition of global rows across workers.
//!
//! With `p` workers and `n` rows, every worker owns a contiguous block of
//! `ceil(n / p)` rows, clipped at `n`. Trailing workers may own no rows when
//! `n` is not much larger than `p`. Matrices and vectors that interact must be
//! built with the same height and the same worker count so that they share a
//! partition.

use std::ops::Range;

/// Contiguous block partition of `[0, height)` over `workers` ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowPartition {
    height: usize,
    workers: usize,
    block: usize,
}

impl RowPartition {
    /// Partition `height` rows over `workers` ranks (`workers >= 1`).
    pub fn new(height: usize, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            height,
            workers,
            block: height.div_ceil(workers),
        }
    }

    /// Global number of rows.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of ranks the rows are spread over.
    #[inline]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Rows per full block (`ceil(height / workers)`).
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block
    }

    /// Global row range owned by `rank`.
    #[inline]
    pub fn range(&self, rank: usize) -> Range<usize> {
        let start = rank.saturating_mul(self.block).min(self.height);
        let end = start.saturating_add(self.block).min(self.height);
        start..end
    }

    /// First global row owned by `rank` (equal to `height` for empty ranks).
    #[inline]
    pub fn first_row(&self, rank: usize) -> usize {
        self.range(rank).start
    }

    /// Number of rows owned by `rank`.
    #[inline]
    pub fn local_height(&self, rank: usize) -> usize {
        self.range(rank).len()
    }

    /// Rank owning `global_row`. Callers must pass `global_row < height`.
    #[inline]
    pub fn owner(&self, global_row: usize) -> usize {
        debug_assert!(global_row < self.height, "row {global_row} >= {}", self.height);
        global_row / self.block
    }

    /// `(owner, local_row)` for a global row.
    #[inline]
    pub fn locate(&self, global_row: usize) -> (usize, usize) {
        let owner = self.owner(global_row);
        (owner, global_row - owner * self.block)
    }
}
