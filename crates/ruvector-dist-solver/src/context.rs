//! Explicit worker context passed to every collective-capable operation.
//!
//! A [`WorkerContext`] wraps a [`Communicator`] and layers typed collectives
//! on top of its type-erased exchange. Reductions are evaluated in rank
//! order on every worker, so all workers obtain bitwise-identical results.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use crate::blas;
use crate::comm::{CollectiveKind, Communicator, Payload, SelfComm};
use crate::error::{Result, SolverError};

/// Handle to the calling worker's position in its group.
///
/// Cheap to clone; clones share the same communicator.
#[derive(Clone)]
pub struct WorkerContext {
    comm: Arc<dyn Communicator>,
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("rank", &self.rank())
            .field("size", &self.size())
            .finish()
    }
}

impl WorkerContext {
    /// Wrap an existing communicator.
    pub fn new(comm: Arc<dyn Communicator>) -> Self {
        Self { comm }
    }

    /// Context for a serial (single-worker) run.
    pub fn single() -> Self {
        Self::new(Arc::new(SelfComm))
    }

    /// Rank of the calling worker.
    #[inline]
    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    /// Number of workers in the group.
    #[inline]
    pub fn size(&self) -> usize {
        self.comm.size()
    }

    /// `true` if both handles share the same communicator instance, or both
    /// are serial. Independent serial contexts never exchange data, so any
    /// two of them are interchangeable.
    pub fn same_group(&self, other: &WorkerContext) -> bool {
        Arc::ptr_eq(&self.comm, &other.comm) || (self.size() == 1 && other.size() == 1)
    }

    /// Block until every worker has reached the barrier.
    pub fn barrier(&self) -> Result<()> {
        let outgoing = (0..self.size()).map(|_| Box::new(()) as Payload).collect();
        self.comm.exchange(CollectiveKind::Barrier, outgoing)?;
        Ok(())
    }

    /// Element-wise global sum, written back into `values`.
    pub fn all_reduce_sum(&self, values: &mut [f64]) -> Result<()> {
        let kind = CollectiveKind::AllReduceSum { len: values.len() };
        let contributions = self.replicate(kind, values.to_vec())?;
        values.fill(0.0);
        for contribution in contributions {
            for (acc, v) in values.iter_mut().zip(contribution) {
                *acc += v;
            }
        }
        Ok(())
    }

    /// Element-wise global maximum, written back into `values`.
    pub fn all_reduce_max(&self, values: &mut [f64]) -> Result<()> {
        let kind = CollectiveKind::AllReduceMax { len: values.len() };
        let contributions = self.replicate(kind, values.to_vec())?;
        values.fill(f64::NEG_INFINITY);
        for contribution in contributions {
            for (acc, v) in values.iter_mut().zip(contribution) {
                *acc = acc.max(v);
            }
        }
        Ok(())
    }

    /// Global sum of one scalar.
    pub fn all_reduce_sum_scalar(&self, value: f64) -> Result<f64> {
        let mut buf = [value];
        self.all_reduce_sum(&mut buf)?;
        Ok(buf[0])
    }

    /// Inner product of two distributed vectors given their owned slices.
    pub fn dot(&self, a: &[f64], b: &[f64]) -> Result<f64> {
        self.all_reduce_sum_scalar(blas::dot(a, b))
    }

    /// Euclidean norm of a distributed vector given its owned slice.
    ///
    /// Per-worker scaled sums of squares are gathered and merged in rank
    /// order, so the result does not overflow for entries near `f64::MAX`.
    pub fn nrm2(&self, x: &[f64]) -> Result<f64> {
        let parts = self.all_gather(blas::lassq(x, 0.0, 1.0))?;
        Ok(blas::combine_ssq(&parts))
    }

    /// Gather one value from every worker, in rank order, on every worker.
    pub fn all_gather<T: Clone + Send + 'static>(&self, value: T) -> Result<Vec<T>> {
        let kind = CollectiveKind::AllGather {
            payload: type_name::<T>(),
        };
        let outgoing = (0..self.size())
            .map(|_| Box::new(value.clone()) as Payload)
            .collect();
        let incoming = self.comm.exchange(kind, outgoing)?;
        incoming
            .into_iter()
            .map(|payload| self.downcast::<T>(payload))
            .collect()
    }

    /// Personalized exchange: `outgoing[dest]` is sent to `dest`; the result
    /// holds at index `src` what `src` sent to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::InvalidInput`] if `outgoing` does not have one
    /// buffer per worker (checked locally before communicating).
    pub fn all_to_all<T: Send + 'static>(&self, outgoing: Vec<Vec<T>>) -> Result<Vec<Vec<T>>> {
        if outgoing.len() != self.size() {
            return Err(crate::error::ValidationError::DimensionMismatch(format!(
                "all_to_all expects {} buffers, got {}",
                self.size(),
                outgoing.len(),
            ))
            .into());
        }
        let kind = CollectiveKind::AllToAll {
            payload: type_name::<T>(),
        };
        let outgoing = outgoing
            .into_iter()
            .map(|buf| Box::new(buf) as Payload)
            .collect();
        let incoming = self.comm.exchange(kind, outgoing)?;
        incoming
            .into_iter()
            .map(|payload| self.downcast::<Vec<T>>(payload))
            .collect()
    }

    fn replicate(&self, kind: CollectiveKind, values: Vec<f64>) -> Result<Vec<Vec<f64>>> {
        let outgoing = (0..self.size())
            .map(|_| Box::new(values.clone()) as Payload)
            .collect();
        let incoming = self.comm.exchange(kind, outgoing)?;
        incoming
            .into_iter()
            .map(|payload| self.downcast::<Vec<f64>>(payload))
            .collect()
    }

    fn downcast<T: 'static>(&self, payload: Payload) -> Result<T> {
        payload
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| SolverError::CollectiveAborted { rank: self.rank() })
    }
}
