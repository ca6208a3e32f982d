//! Row-partitioned distributed dense multi-vector.
//!
//! A [`DistMultiVec`] of global size `height x width` stores, on each worker,
//! the owned rows of every column in column-major order. Its row partition is
//! the same even block partition a [`DistSparseMatrix`] of the same height
//! uses, so the two can be multiplied without redistribution.
//!
//! [`DistSparseMatrix`]: crate::matrix::DistSparseMatrix

use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::blas;
use crate::context::WorkerContext;
use crate::error::{Result, SolverError, ValidationError};
use crate::partition::RowPartition;
use crate::validation::validate_dimensions;

/// Distributed dense `height x width` block of column vectors.
#[derive(Debug, Clone)]
pub struct DistMultiVec {
    ctx: WorkerContext,
    rows: RowPartition,
    width: usize,
    /// Column-major `local_height x width`.
    data: Vec<f64>,
}

impl DistMultiVec {
    /// Zero-filled `height x width` multi-vector.
    ///
    /// # Errors
    ///
    /// [`SolverError::InvalidDimension`] if the shape cannot be stored.
    pub fn zeros(ctx: WorkerContext, height: usize, width: usize) -> Result<Self> {
        let mut v = Self {
            rows: RowPartition::new(0, ctx.size()),
            ctx,
            width: 0,
            data: Vec::new(),
        };
        v.resize(height, width)?;
        Ok(v)
    }

    /// Uniform samples in `[-1, 1)` from an entropy-seeded generator.
    pub fn uniform(ctx: WorkerContext, height: usize, width: usize) -> Result<Self> {
        let mut v = Self::zeros(ctx, height, width)?;
        v.make_uniform(&mut StdRng::from_entropy(), 0.0, 1.0)?;
        Ok(v)
    }

    /// Uniform samples in `[-1, 1)`, reproducible for a given `seed` and
    /// worker count. Each worker seeds its generator with `seed + rank`.
    pub fn uniform_seeded(ctx: WorkerContext, height: usize, width: usize, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(ctx.rank() as u64));
        let mut v = Self::zeros(ctx, height, width)?;
        v.make_uniform(&mut rng, 0.0, 1.0)?;
        Ok(v)
    }

    /// Overwrite the owned entries with samples from
    /// `[center - radius, center + radius)`. A zero radius fills with
    /// `center`.
    ///
    /// # Errors
    ///
    /// [`ValidationError::ParameterOutOfRange`] if `radius` is negative or
    /// either argument is not finite.
    pub fn make_uniform<R: Rng + ?Sized>(&mut self, rng: &mut R, center: f64, radius: f64) -> Result<()> {
        if !center.is_finite() || !radius.is_finite() || radius < 0.0 {
            return Err(ValidationError::ParameterOutOfRange {
                name: "radius".into(),
                value: format!("center={center}, radius={radius}"),
                expected: "finite center, finite radius >= 0".into(),
            }
            .into());
        }
        if radius == 0.0 {
            self.data.fill(center);
            return Ok(());
        }
        let dist = Uniform::new(center - radius, center + radius);
        for v in self.data.iter_mut() {
            *v = dist.sample(rng);
        }
        Ok(())
    }

    /// Overwrite the owned entries with normal samples `N(mean, stddev^2)`.
    ///
    /// # Errors
    ///
    /// [`ValidationError::ParameterOutOfRange`] if `stddev` is negative or
    /// not finite.
    pub fn make_gaussian<R: Rng + ?Sized>(&mut self, rng: &mut R, mean: f64, stddev: f64) -> Result<()> {
        let dist = Normal::new(mean, stddev)
            .ok()
            .filter(|_| mean.is_finite() && stddev.is_finite() && stddev >= 0.0)
            .ok_or_else(|| ValidationError::ParameterOutOfRange {
                name: "stddev".into(),
                value: format!("mean={mean}, stddev={stddev}"),
                expected: "finite mean, finite stddev >= 0".into(),
            })?;
        for v in self.data.iter_mut() {
            *v = dist.sample(rng);
        }
        Ok(())
    }

    /// Normal samples `N(mean, stddev^2)` from an entropy-seeded generator.
    pub fn gaussian(ctx: WorkerContext, height: usize, width: usize, mean: f64, stddev: f64) -> Result<Self> {
        let mut v = Self::zeros(ctx, height, width)?;
        v.make_gaussian(&mut StdRng::from_entropy(), mean, stddev)?;
        Ok(v)
    }

    /// Normal samples `N(mean, stddev^2)`, each worker seeded with
    /// `seed + rank`.
    pub fn gaussian_seeded(
        ctx: WorkerContext,
        height: usize,
        width: usize,
        mean: f64,
        stddev: f64,
        seed: u64,
    ) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(ctx.rank() as u64));
        let mut v = Self::zeros(ctx, height, width)?;
        v.make_gaussian(&mut rng, mean, stddev)?;
        Ok(v)
    }

    /// Set every owned entry `(i, j)` to `f(global_row, column)`.
    ///
    /// Independent of the worker count, so useful for building operands that
    /// must agree between serial and distributed runs.
    pub fn index_dependent_fill<F: Fn(usize, usize) -> f64>(&mut self, f: F) {
        let first = self.first_local_row();
        let lh = self.local_height();
        for j in 0..self.width {
            for (l, v) in self.data[j * lh..(j + 1) * lh].iter_mut().enumerate() {
                *v = f(first + l, j);
            }
        }
    }

    /// Reshape to `height x width`; every entry becomes zero.
    pub fn resize(&mut self, height: usize, width: usize) -> Result<()> {
        validate_dimensions(height, width)?;
        self.rows = RowPartition::new(height, self.ctx.size());
        self.width = width;
        self.data.clear();
        self.data.resize(self.local_height() * width, 0.0);
        Ok(())
    }

    /// Deep copy of `src` into `self`, adopting its shape.
    ///
    /// # Errors
    ///
    /// [`ValidationError::DimensionMismatch`] if `src` lives on another
    /// worker group.
    pub fn copy_from(&mut self, src: &DistMultiVec) -> Result<()> {
        if !self.ctx.same_group(&src.ctx) {
            return Err(ValidationError::DimensionMismatch(
                "copy between different worker groups".into(),
            )
            .into());
        }
        self.rows = src.rows;
        self.width = src.width;
        self.data.clear();
        self.data.extend_from_slice(&src.data);
        Ok(())
    }

    // -- shape ---------------------------------------------------------------

    /// Global number of rows.
    #[inline]
    pub fn height(&self) -> usize {
        self.rows.height()
    }

    /// Number of columns.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Rows owned by the calling worker.
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

    /// Row partition.
    #[inline]
    pub fn partition(&self) -> &RowPartition {
        &self.rows
    }

    /// Worker context the vector is distributed over.
    #[inline]
    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    // -- local access --------------------------------------------------------

    /// Owned entry at `(local_row, column)`.
    pub fn get_local(&self, local_row: usize, column: usize) -> Result<f64> {
        let idx = self.local_index(local_row, column)?;
        Ok(self.data[idx])
    }

    /// Overwrite the owned entry at `(local_row, column)`.
    pub fn set_local(&mut self, local_row: usize, column: usize, value: f64) -> Result<()> {
        let idx = self.local_index(local_row, column)?;
        self.data[idx] = value;
        Ok(())
    }

    /// Owned rows of column `j`.
    #[inline]
    pub fn column(&self, j: usize) -> &[f64] {
        let lh = self.local_height();
        &self.data[j * lh..(j + 1) * lh]
    }

    /// Mutable owned rows of column `j`.
    #[inline]
    pub fn column_mut(&mut self, j: usize) -> &mut [f64] {
        let lh = self.local_height();
        &mut self.data[j * lh..(j + 1) * lh]
    }

    /// All owned entries, column-major.
    #[inline]
    pub fn local_data(&self) -> &[f64] {
        &self.data
    }

    /// All owned entries, column-major, mutable.
    #[inline]
    pub fn local_data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    fn local_index(&self, local_row: usize, column: usize) -> Result<usize> {
        let lh = self.local_height();
        if local_row >= lh {
            return Err(SolverError::OutOfRange {
                what: "local row",
                index: local_row,
                bound: lh,
            });
        }
        if column >= self.width {
            return Err(SolverError::OutOfRange {
                what: "column",
                index: column,
                bound: self.width,
            });
        }
        Ok(column * lh + local_row)
    }

    // -- reductions ----------------------------------------------------------

    /// Collective: Frobenius norm over all workers and columns.
    ///
    /// Each worker reduces its entries to a scaled sum of squares; the pairs
    /// are gathered and merged in rank order, so entries near `f64::MAX` do
    /// not overflow and every worker returns the same value.
    pub fn nrm2(&self) -> Result<f64> {
        self.ctx.nrm2(&self.data)
    }

    /// Collective: Euclidean norm of every column.
    pub fn column_nrm2s(&self) -> Result<Vec<f64>> {
        let local: Vec<(f64, f64)> = (0..self.width)
            .map(|j| blas::lassq(self.column(j), 0.0, 1.0))
            .collect();
        let parts = self.ctx.all_gather(local)?;
        Ok((0..self.width)
            .map(|j| {
                let column: Vec<(f64, f64)> = parts.iter().map(|p| p[j]).collect();
                blas::combine_ssq(&column)
            })
            .collect())
    }

    /// Collective: Frobenius inner product `sum_ij self_ij * other_ij`.
    pub fn dot(&self, other: &DistMultiVec) -> Result<f64> {
        self.check_compatible(other)?;
        self.ctx.dot(&self.data, &other.data)
    }

    /// Collective: inner product of every pair of matching columns.
    pub fn column_dots(&self, other: &DistMultiVec) -> Result<Vec<f64>> {
        self.check_compatible(other)?;
        let mut dots: Vec<f64> = (0..self.width)
            .map(|j| blas::dot(self.column(j), other.column(j)))
            .collect();
        self.ctx.all_reduce_sum(&mut dots)?;
        Ok(dots)
    }

    /// `self += alpha * x`.
    pub fn axpy(&mut self, alpha: f64, x: &DistMultiVec) -> Result<()> {
        self.check_compatible(x)?;
        blas::axpy(alpha, &x.data, &mut self.data);
        Ok(())
    }

    /// `self *= alpha`.
    pub fn scale(&mut self, alpha: f64) {
        blas::scal(alpha, &mut self.data);
    }

    fn check_compatible(&self, other: &DistMultiVec) -> Result<()> {
        if !self.ctx.same_group(&other.ctx) {
            return Err(ValidationError::DimensionMismatch(
                "operands are distributed over different worker groups".into(),
            )
            .into());
        }
        if self.height() != other.height() || self.width != other.width {
            return Err(ValidationError::DimensionMismatch(format!(
                "{}x{} vs {}x{}",
                self.height(),
                self.width,
                other.height(),
                other.width,
            ))
            .into());
        }
        Ok(())
    }
}
