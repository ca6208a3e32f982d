//! Row-partitioned distributed sparse matrix.
//!
//! Construction is two-phase. A [`DistSparseMatrixBuilder`] accepts queued
//! `(row, column, value)` updates without communicating; the collective
//! [`process_queues`](DistSparseMatrixBuilder::process_queues) routes updates
//! to the workers that own their rows, sorts every row by column, sums
//! duplicates, and returns an immutable [`DistSparseMatrix`].
//!
//! ```
//! use ruvector_dist_solver::context::WorkerContext;
//! use ruvector_dist_solver::matrix::DistSparseMatrixBuilder;
//!
//! let mut b = DistSparseMatrixBuilder::new(WorkerContext::single());
//! b.resize(2, 2).unwrap();
//! b.queue_local_update(0, 0, 1.0).unwrap();
//! b.queue_local_update(0, 0, 2.0).unwrap();
//! b.queue_update(1, 0, -1.0).unwrap();
//! let a = b.process_queues().unwrap();
//! assert_eq!(a.get_local(0, 0).unwrap(), 3.0);
//! assert_eq!(a.local_nnz(), 2);
//! ```

use tracing::debug;

use crate::context::WorkerContext;
use crate::error::{Result, SolverError, ValidationError};
use crate::ghost::GhostPlan;
use crate::partition::RowPartition;
use crate::types::CsrMatrix;
use crate::validation::{validate_dimensions, validate_local_block};

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Queue of pending updates for a distributed sparse matrix.
#[derive(Debug, Clone)]
pub struct DistSparseMatrixBuilder {
    ctx: WorkerContext,
    rows: RowPartition,
    width: usize,
    /// `(local_row, global_col, value)` for owned rows.
    local: Vec<(usize, usize, f64)>,
    /// `(global_row, global_col, value)` for rows owned elsewhere.
    remote: Vec<(usize, usize, f64)>,
}

impl DistSparseMatrixBuilder {
    /// Empty `0 x 0` builder bound to `ctx`.
    pub fn new(ctx: WorkerContext) -> Self {
        let rows = RowPartition::new(0, ctx.size());
        Self {
            ctx,
            rows,
            width: 0,
            local: Vec::new(),
            remote: Vec::new(),
        }
    }

    /// Builder already resized to `height x width`.
    pub fn with_dimensions(ctx: WorkerContext, height: usize, width: usize) -> Result<Self> {
        let mut builder = Self::new(ctx);
        builder.resize(height, width)?;
        Ok(builder)
    }

    /// Set the global dimensions and discard every queued update.
    ///
    /// # Errors
    ///
    /// [`SolverError::InvalidDimension`] if either side exceeds
    /// [`MAX_DIMENSION`](crate::validation::MAX_DIMENSION).
    pub fn resize(&mut self, height: usize, width: usize) -> Result<()> {
        validate_dimensions(height, width)?;
        self.rows = RowPartition::new(height, self.ctx.size());
        self.width = width;
        self.local.clear();
        self.remote.clear();
        Ok(())
    }

    /// Capacity hint for the number of updates about to be queued.
    pub fn reserve(&mut self, capacity: usize) {
        self.local.reserve(capacity);
    }

    /// Queue `A[global_row(local_row), global_col] += value`.
    ///
    /// # Errors
    ///
    /// [`SolverError::OutOfRange`] if `local_row >= local_height()` or
    /// `global_col >= width()`.
    #[inline]
    pub fn queue_local_update(&mut self, local_row: usize, global_col: usize, value: f64) -> Result<()> {
        let local_height = self.local_height();
        if local_row >= local_height {
            return Err(SolverError::OutOfRange {
                what: "local row",
                index: local_row,
                bound: local_height,
            });
        }
        self.check_col(global_col)?;
        self.local.push((local_row, global_col, value));
        Ok(())
    }

    /// Queue `A[global_row, global_col] += value` for any row.
    ///
    /// Rows owned by another worker are shipped to their owner during
    /// [`process_queues`](Self::process_queues).
    ///
    /// # Errors
    ///
    /// [`SolverError::OutOfRange`] on a bad row or column.
    pub fn queue_update(&mut self, global_row: usize, global_col: usize, value: f64) -> Result<()> {
        if global_row >= self.height() {
            return Err(SolverError::OutOfRange {
                what: "global row",
                index: global_row,
                bound: self.height(),
            });
        }
        self.check_col(global_col)?;
        let (owner, local_row) = self.rows.locate(global_row);
        if owner == self.ctx.rank() {
            self.local.push((local_row, global_col, value));
        } else {
            self.remote.push((global_row, global_col, value));
        }
        Ok(())
    }

    /// Global height.
    #[inline]
    pub fn height(&self) -> usize {
        self.rows.height()
    }

    /// Global width.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows owned by the calling worker.
    #[inline]
    pub fn local_height(&self) -> usize {
        self.rows.local_height(self.ctx.rank())
    }

    /// First global row owned by the calling worker.
    #[inline]
    pub fn first_local_row(&self) -> usize {
        self.rows.first_row(self.ctx.rank())
    }

    /// Global index of an owned row.
    #[inline]
    pub fn global_row(&self, local_row: usize) -> usize {
        debug_assert!(local_row < self.local_height());
        self.first_local_row() + local_row
    }

    /// Number of updates queued on this worker so far.
    pub fn queued(&self) -> usize {
        self.local.len() + self.remote.len()
    }

    /// Worker context the matrix is distributed over.
    #[inline]
    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    /// Collective: route, sort, and merge the queued updates.
    ///
    /// Rows owned elsewhere are sent to their owner in one all-to-all. Each
    /// owner applies its own queue first and then the received updates in
    /// source-rank order, each in the order it was queued, so duplicate sums
    /// are formed in a deterministic order.
    ///
    /// # Errors
    ///
    /// [`SolverError::InvalidInput`] on every worker if the workers disagree
    /// on the global dimensions; collective errors from the exchange.
    pub fn process_queues(self) -> Result<DistSparseMatrix> {
        let Self {
            ctx,
            rows,
            width,
            mut local,
            remote,
        } = self;
        let height = rows.height();

        agree_on_dimensions(&ctx, height, width)?;

        let mut outgoing: Vec<Vec<(usize, usize, f64)>> = vec![Vec::new(); ctx.size()];
        for (global_row, col, value) in remote {
            let (owner, local_row) = rows.locate(global_row);
            outgoing[owner].push((local_row, col, value));
        }
        let routed: usize = outgoing.iter().map(Vec::len).sum();

        let incoming = ctx.all_to_all(outgoing)?;
        let local_height = rows.local_height(ctx.rank());
        for (src, updates) in incoming.into_iter().enumerate() {
            if let Some(&(row, _, _)) = updates.iter().find(|(r, c, _)| *r >= local_height || *c >= width) {
                return Err(ValidationError::DimensionMismatch(format!(
                    "rank {src} routed local row {row} to rank {} (local height {local_height})",
                    ctx.rank(),
                ))
                .into());
            }
            local.extend(updates);
        }

        let block = CsrMatrix::from_coo_summed(local_height, width, local);
        debug!(
            rank = ctx.rank(),
            height,
            width,
            local_height,
            local_nnz = block.nnz(),
            routed,
            "assembled distributed matrix"
        );
        DistSparseMatrix::finish(ctx, rows, width, block)
    }

    fn check_col(&self, global_col: usize) -> Result<()> {
        if global_col >= self.width {
            return Err(SolverError::OutOfRange {
                what: "global column",
                index: global_col,
                bound: self.width,
            });
        }
        Ok(())
    }
}

/// All workers must call with the same global shape.
fn agree_on_dimensions(ctx: &WorkerContext, height: usize, width: usize) -> Result<()> {
    let dims = ctx.all_gather((height, width))?;
    if let Some((rank, other)) = dims.iter().enumerate().find(|(_, d)| **d != dims[0]) {
        return Err(ValidationError::DimensionMismatch(format!(
            "rank 0 assembles {}x{} but rank {rank} assembles {}x{}",
            dims[0].0, dims[0].1, other.0, other.1,
        ))
        .into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Assembled matrix
// ---------------------------------------------------------------------------

/// Assembled, immutable distributed sparse matrix.
///
/// Each worker stores its owned rows as a CSR block with global, sorted,
/// duplicate-free column indices, plus the [`GhostPlan`] used by multiplies.
#[derive(Debug, Clone)]
pub struct DistSparseMatrix {
    ctx: WorkerContext,
    rows: RowPartition,
    cols: RowPartition,
    block: CsrMatrix<f64>,
    /// Per-entry position of the entry's column in the ghost buffer.
    compressed: Vec<usize>,
    plan: GhostPlan,
}

impl DistSparseMatrix {
    /// Collective: wrap a pre-assembled local block.
    ///
    /// `block` must hold this worker's rows of the even block partition with
    /// global, strictly increasing column indices.
    ///
    /// # Errors
    ///
    /// [`SolverError::InvalidInput`] on every worker if any worker's block is
    /// malformed or the workers disagree on the dimensions.
    pub fn from_local_block(
        ctx: WorkerContext,
        height: usize,
        width: usize,
        block: CsrMatrix<f64>,
    ) -> Result<Self> {
        validate_dimensions(height, width)?;
        let rows = RowPartition::new(height, ctx.size());
        let local_height = rows.local_height(ctx.rank());

        let local_check = if block.rows != local_height || block.cols != width {
            Err(ValidationError::DimensionMismatch(format!(
                "block is {}x{}, expected {local_height}x{width}",
                block.rows, block.cols,
            )))
        } else {
            validate_local_block(&block)
        };

        let verdicts = ctx.all_gather(local_check.is_ok())?;
        local_check?;
        if let Some(bad) = verdicts.iter().position(|ok| !ok) {
            return Err(ValidationError::DimensionMismatch(format!(
                "rank {bad} supplied a malformed block"
            ))
            .into());
        }
        agree_on_dimensions(&ctx, height, width)?;
        Self::finish(ctx, rows, width, block)
    }

    fn finish(ctx: WorkerContext, rows: RowPartition, width: usize, block: CsrMatrix<f64>) -> Result<Self> {
        let cols = RowPartition::new(width, ctx.size());
        let mut referenced = block.col_indices.clone();
        referenced.sort_unstable();
        referenced.dedup();

        let plan = GhostPlan::build(&ctx, &cols, referenced)?;
        let compressed = block
            .col_indices
            .iter()
            .map(|&c| plan.position(c))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ValidationError::DimensionMismatch("ghost plan misses a column".into()))?;

        debug!(
            rank = ctx.rank(),
            ghosts = plan.len(),
            "built ghost exchange plan"
        );
        Ok(Self {
            ctx,
            rows,
            cols,
            block,
            compressed,
            plan,
        })
    }

    /// Global height.
    #[inline]
    pub fn height(&self) -> usize {
        self.rows.height()
    }

    /// Global width.
    #[inline]
    pub fn width(&self) -> usize {
        self.cols.height()
    }

    /// Number of rows owned by the calling worker.
    #[inline]
    pub fn local_height(&self) -> usize {
        self.block.rows
    }

    /// First global row owned by the calling worker.
    #[inline]
    pub fn first_local_row(&self) -> usize {
        self.rows.first_row(self.ctx.rank())
    }

    /// Global index of an owned row.
    #[inline]
    pub fn global_row(&self, local_row: usize) -> usize {
        debug_assert!(local_row < self.local_height());
        self.first_local_row() + local_row
    }

    /// Partition of the rows (and of vectors multiplied from the left).
    #[inline]
    pub fn partition(&self) -> &RowPartition {
        &self.rows
    }

    /// Partition of the columns (and of vectors multiplied from the right).
    #[inline]
    pub fn column_partition(&self) -> &RowPartition {
        &self.cols
    }

    /// Stored entries on the calling worker.
    #[inline]
    pub fn local_nnz(&self) -> usize {
        self.block.nnz()
    }

    /// Collective: stored entries over all workers.
    pub fn nnz(&self) -> Result<usize> {
        Ok(self.ctx.all_gather(self.local_nnz())?.into_iter().sum())
    }

    /// `(global_col, value)` pairs of an owned row, by increasing column.
    pub fn local_row(&self, local_row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.block.row_entries(local_row).map(|(c, &v)| (c, v))
    }

    /// Value at `(global_row(local_row), global_col)`; zero if not stored.
    pub fn get_local(&self, local_row: usize, global_col: usize) -> Result<f64> {
        if local_row >= self.local_height() {
            return Err(SolverError::OutOfRange {
                what: "local row",
                index: local_row,
                bound: self.local_height(),
            });
        }
        if global_col >= self.width() {
            return Err(SolverError::OutOfRange {
                what: "global column",
                index: global_col,
                bound: self.width(),
            });
        }
        Ok(self
            .block
            .find(local_row, global_col)
            .map_or(0.0, |idx| self.block.values[idx]))
    }

    /// The calling worker's CSR block (global column indices).
    #[inline]
    pub fn local_block(&self) -> &CsrMatrix<f64> {
        &self.block
    }

    /// Worker context the matrix is distributed over.
    #[inline]
    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    #[inline]
    pub(crate) fn plan(&self) -> &GhostPlan {
        &self.plan
    }

    /// Ghost-buffer position of every stored entry's column.
    #[inline]
    pub(crate) fn compressed_cols(&self) -> &[usize] {
        &self.compressed
    }

    /// Same structure and distribution with new entry values.
    pub(crate) fn with_values(&self, values: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), self.block.nnz());
        let mut scaled = self.clone();
        scaled.block.values = values;
        scaled
    }
}
