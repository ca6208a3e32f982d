//! Worker communication layer.
//!
//! Every distributed structure in this crate talks to its peers through a
//! [`Communicator`]. The trait exposes a single primitive, a personalized
//! all-to-all [`exchange`](Communicator::exchange) of type-erased payloads,
//! from which [`WorkerContext`](crate::context::WorkerContext) derives the
//! typed collectives (barrier, all-reduce, all-gather, all-to-all).
//!
//! Two implementations ship with the crate:
//!
//! | Communicator | Workers | Use |
//! |--------------|---------|-----|
//! | [`SelfComm`] | 1 | serial runs, unit tests |
//! | [`ThreadComm`] | N OS threads | in-process multi-worker runs via [`ThreadGroup`] |
//!
//! # Collective ordering
//!
//! Each exchange is tagged with a [`CollectiveKind`]. When the last worker
//! of a round arrives the kinds are compared; if any worker issued a
//! different collective, every worker of the round receives
//! [`SolverError::CollectiveMismatch`] and the group is poisoned. A worker
//! that leaves its closure (normally or by panic) also poisons the group so
//! that peers blocked in a collective fail with
//! [`SolverError::CollectiveAborted`] instead of hanging.

use std::any::Any;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::context::WorkerContext;
use crate::error::{Result, SolverError};

/// Type-erased message exchanged between workers.
pub type Payload = Box<dyn Any + Send>;

/// Identifies which collective a worker is executing.
///
/// Compared across workers at every exchange to detect divergent collective
/// sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectiveKind {
    /// Synchronisation only.
    Barrier,
    /// Element-wise sum of a vector of the given length.
    AllReduceSum {
        /// Number of reduced elements.
        len: usize,
    },
    /// Element-wise maximum of a vector of the given length.
    AllReduceMax {
        /// Number of reduced elements.
        len: usize,
    },
    /// Every worker contributes one value and receives all of them.
    AllGather {
        /// Rust type name of the gathered value.
        payload: &'static str,
    },
    /// Personalized exchange of one buffer per destination.
    AllToAll {
        /// Rust type name of the buffer element.
        payload: &'static str,
    },
}

/// Transport used by a [`WorkerContext`].
///
/// Implementations must be collective: `exchange` only returns once every
/// worker of the group has called it (or the group has failed).
pub trait Communicator: Send + Sync {
    /// Rank of the calling worker in `[0, size)`.
    fn rank(&self) -> usize;

    /// Number of workers in the group.
    fn size(&self) -> usize;

    /// Personalized all-to-all exchange.
    ///
    /// `outgoing[dest]` is delivered to worker `dest`; the returned vector
    /// holds, at index `src`, the payload worker `src` addressed to the
    /// caller. `outgoing.len()` must equal [`size`](Self::size).
    ///
    /// # Errors
    ///
    /// [`SolverError::CollectiveMismatch`] if peers issued a different
    /// [`CollectiveKind`]; [`SolverError::CollectiveAborted`] if a peer left
    /// the group.
    fn exchange(&self, kind: CollectiveKind, outgoing: Vec<Payload>) -> Result<Vec<Payload>>;
}

// ---------------------------------------------------------------------------
// SelfComm
// ---------------------------------------------------------------------------

/// Communicator for a group of exactly one worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfComm;

impl Communicator for SelfComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn exchange(&self, _kind: CollectiveKind, outgoing: Vec<Payload>) -> Result<Vec<Payload>> {
        debug_assert_eq!(outgoing.len(), 1, "SelfComm::exchange expects one payload");
        Ok(outgoing)
    }
}

// ---------------------------------------------------------------------------
// ThreadComm
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Workers are depositing their outgoing payloads.
    Gathering,
    /// Every worker has deposited; workers are collecting their inboxes.
    Draining,
}

/// One collective round shared by all workers of a [`ThreadGroup`].
struct Round {
    phase: Phase,
    arrived: usize,
    drained: usize,
    kinds: Vec<Option<CollectiveKind>>,
    /// `slots[src][dest]`
    slots: Vec<Vec<Option<Payload>>>,
    /// Number of workers that have left their closure.
    exited: usize,
    /// Set once the group can no longer complete collectives.
    poisoned: bool,
}

struct GroupShared {
    size: usize,
    round: Mutex<Round>,
    cond: Condvar,
}

impl GroupShared {
    fn new(size: usize) -> Self {
        Self {
            size,
            round: Mutex::new(Round {
                phase: Phase::Gathering,
                arrived: 0,
                drained: 0,
                kinds: vec![None; size],
                slots: (0..size).map(|_| (0..size).map(|_| None).collect()).collect(),
                exited: 0,
                poisoned: false,
            }),
            cond: Condvar::new(),
        }
    }

    fn mark_exited(&self) {
        let mut round = self.round.lock();
        round.exited += 1;
        self.cond.notify_all();
    }
}

/// Communicator for one worker thread of a [`ThreadGroup`].
pub struct ThreadComm {
    rank: usize,
    shared: Arc<GroupShared>,
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn exchange(&self, kind: CollectiveKind, outgoing: Vec<Payload>) -> Result<Vec<Payload>> {
        let shared = &*self.shared;
        let size = shared.size;
        let rank = self.rank;
        debug_assert_eq!(outgoing.len(), size, "exchange expects one payload per worker");

        let mut round = shared.round.lock();

        // The previous round must be fully drained before slots are reused.
        while round.phase == Phase::Draining && !round.poisoned {
            shared.cond.wait(&mut round);
        }
        if round.poisoned || round.exited > 0 {
            round.poisoned = true;
            shared.cond.notify_all();
            return Err(SolverError::CollectiveAborted { rank });
        }

        trace!(rank, ?kind, "entering collective");
        round.kinds[rank] = Some(kind);
        for (dest, payload) in outgoing.into_iter().enumerate() {
            round.slots[rank][dest] = Some(payload);
        }
        round.arrived += 1;

        if round.arrived == size {
            round.phase = Phase::Draining;
            shared.cond.notify_all();
        } else {
            while round.phase == Phase::Gathering {
                if round.poisoned || round.exited > 0 {
                    round.poisoned = true;
                    shared.cond.notify_all();
                    return Err(SolverError::CollectiveAborted { rank });
                }
                shared.cond.wait(&mut round);
            }
        }

        // Draining: compare kinds, then collect the inbox.
        let mine = round.kinds[rank].clone();
        let conflict = round
            .kinds
            .iter()
            .flatten()
            .find(|other| Some(*other) != mine.as_ref())
            .cloned();

        let result = match (conflict, mine) {
            (Some(found), Some(expected)) => {
                warn!(rank, ?expected, ?found, "collective mismatch");
                Err(SolverError::CollectiveMismatch {
                    rank,
                    expected,
                    found,
                })
            }
            _ => {
                let mut inbox = Vec::with_capacity(size);
                for src in 0..size {
                    match round.slots[src][rank].take() {
                        Some(payload) => inbox.push(payload),
                        None => {
                            round.poisoned = true;
                            break;
                        }
                    }
                }
                if inbox.len() == size {
                    Ok(inbox)
                } else {
                    Err(SolverError::CollectiveAborted { rank })
                }
            }
        };

        round.drained += 1;
        if round.drained == size {
            if result.is_err() {
                round.poisoned = true;
            }
            round.phase = Phase::Gathering;
            round.arrived = 0;
            round.drained = 0;
            for k in round.kinds.iter_mut() {
                *k = None;
            }
            for row in round.slots.iter_mut() {
                for slot in row.iter_mut() {
                    *slot = None;
                }
            }
            shared.cond.notify_all();
        }

        result
    }
}

/// Marks the worker as exited when its closure returns or unwinds.
struct ExitGuard {
    shared: Arc<GroupShared>,
    rank: usize,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            warn!(rank = self.rank, "worker panicked; aborting collectives");
        }
        self.shared.mark_exited();
    }
}

// ---------------------------------------------------------------------------
// ThreadGroup
// ---------------------------------------------------------------------------

/// Runs a closure on `size` worker threads sharing one [`ThreadComm`] group.
///
/// # Example
///
/// ```
/// use ruvector_dist_solver::comm::ThreadGroup;
///
/// let sums = ThreadGroup::run(3, |ctx| {
///     ctx.all_reduce_sum_scalar(ctx.rank() as f64 + 1.0).unwrap()
/// });
/// assert_eq!(sums, vec![6.0, 6.0, 6.0]);
/// ```
pub struct ThreadGroup;

impl ThreadGroup {
    /// Spawn `size` workers, run `f` on each, and return the results in rank
    /// order.
    ///
    /// If any worker panics, the remaining workers observe
    /// [`SolverError::CollectiveAborted`] at their next collective, all
    /// threads are joined, and the first panic is resumed on the caller.
    pub fn run<R, F>(size: usize, f: F) -> Vec<R>
    where
        F: Fn(WorkerContext) -> R + Sync,
        R: Send,
    {
        if size == 0 {
            return Vec::new();
        }
        let shared = Arc::new(GroupShared::new(size));
        debug!(size, "spawning worker group");

        let joined: Vec<std::thread::Result<R>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..size)
                .map(|rank| {
                    let shared = Arc::clone(&shared);
                    let f = &f;
                    scope.spawn(move || {
                        let _guard = ExitGuard {
                            shared: Arc::clone(&shared),
                            rank,
                        };
                        let comm = ThreadComm { rank, shared };
                        f(WorkerContext::new(Arc::new(comm)))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join()).collect()
        });

        let mut results = Vec::with_capacity(size);
        for outcome in joined {
            match outcome {
                Ok(value) => results.push(value),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        results
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
