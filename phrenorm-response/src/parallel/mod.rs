// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Parallel
//!
//! The q-points of a calculation are split into contiguous blocks, one block per worker, in rank
//! order. Each worker evaluates its block without communicating and the blocks are reassembled by
//! a collective gather. All of this goes through an explicit [`Communicator`] which is handed to
//! every distributed calculation, so the same code runs on a [`SerialCommunicator`] in tests, on
//! the threads of a [`LocalWorld`] and, with the `mpi` feature, on the processes of an MPI world.

mod local;
#[cfg(feature = "mpi")]
mod mpi;

pub use local::{LocalCommunicator, LocalWorld};
#[cfg(feature = "mpi")]
pub use self::mpi::MpiCommunicator;

use miette::Diagnostic;
use ndarray::{Array, Axis, Dimension};
use serde::{de::DeserializeOwned, Serialize};
use std::ops::Range;

/// Elements which can be exchanged between workers
///
/// Workers sharing an address space pass elements by value, workers in separate processes send
/// their serialised form.
pub trait Message: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> Message for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

#[derive(thiserror::Error, Debug, Diagnostic)]
/// Failures of the collective operations
pub enum ParallelError {
    /// A block does not have the extent declared by the partition
    #[error("worker {rank} holds {found} elements but {expected} were declared")]
    #[diagnostic(code(phrenorm::parallel::size_mismatch))]
    SizeMismatch {
        /// The rank of the offending worker
        rank: usize,
        /// The number of elements found
        found: usize,
        /// The number of elements declared
        expected: usize,
    },
    /// Another worker failed and the collective was abandoned
    #[error("the collective was aborted after worker {0} failed")]
    #[diagnostic(code(phrenorm::parallel::aborted))]
    Aborted(usize),
    /// A received payload was not of the requested type
    #[error("received a payload of unexpected type from worker {0}")]
    #[diagnostic(code(phrenorm::parallel::type_mismatch))]
    TypeMismatch(usize),
    /// The broadcasting worker had nothing to send
    #[error("worker {0} was asked to broadcast but holds no value")]
    #[diagnostic(code(phrenorm::parallel::missing_root))]
    MissingRoot(usize),
    /// A rank outside the world
    #[error("rank {rank} is outside a world of {size} workers")]
    #[diagnostic(code(phrenorm::parallel::rank))]
    InvalidRank {
        /// The requested rank
        rank: usize,
        /// The number of workers
        size: usize,
    },
    /// A world needs at least one worker
    #[error("a world needs at least one worker")]
    #[diagnostic(code(phrenorm::parallel::empty))]
    EmptyWorld,
    /// A worker panicked
    #[error("worker {0} panicked")]
    #[diagnostic(code(phrenorm::parallel::panic))]
    WorkerPanic(usize),
    /// The shared state was poisoned by a panicking worker
    #[error("the collective state was poisoned")]
    #[diagnostic(code(phrenorm::parallel::poisoned))]
    Poisoned,
    /// The gathered elements do not fill the global array
    #[error(transparent)]
    #[diagnostic(code(phrenorm::parallel::shape))]
    Shape(#[from] ndarray::ShapeError),
    /// A message exceeds the element count addressable by MPI
    #[cfg(feature = "mpi")]
    #[error("a message of {0} bytes is too large to be sent")]
    #[diagnostic(code(phrenorm::parallel::message_size))]
    MessageTooLarge(usize),
    /// A message could not be encoded or decoded
    #[cfg(feature = "mpi")]
    #[error(transparent)]
    #[diagnostic(code(phrenorm::parallel::encoding))]
    Encoding(#[from] bincode::Error),
    /// MPI could not be initialised, or was initialised before
    #[cfg(feature = "mpi")]
    #[error("failed to initialise MPI")]
    #[diagnostic(code(phrenorm::parallel::initialisation))]
    Initialisation,
}

/// The collective operations available to a distributed calculation
pub trait Communicator {
    /// The index of this worker
    fn rank(&self) -> usize;
    /// The number of workers
    fn size(&self) -> usize;
    /// Block until every worker has arrived
    fn barrier(&self) -> Result<(), ParallelError>;
    /// Distribute the value held by `root` to every worker
    fn broadcast<T: Message>(
        &self,
        value: Option<T>,
        root: usize,
    ) -> Result<T, ParallelError>;
    /// Concatenate the `local` elements of every worker in rank order, where worker `r` contributes
    /// exactly `counts[r]` elements
    fn all_gather_varcount<T: Message>(
        &self,
        local: &[T],
        counts: &[usize],
    ) -> Result<Vec<T>, ParallelError>;

    /// Whether this worker leads the world
    fn is_root(&self) -> bool {
        self.rank() == 0
    }
}

/// A world consisting of a single worker
#[derive(Copy, Clone, Debug, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) -> Result<(), ParallelError> {
        Ok(())
    }

    fn broadcast<T: Message>(
        &self,
        value: Option<T>,
        root: usize,
    ) -> Result<T, ParallelError> {
        if root != 0 {
            return Err(ParallelError::InvalidRank {
                rank: root,
                size: 1,
            });
        }
        value.ok_or(ParallelError::MissingRoot(0))
    }

    fn all_gather_varcount<T: Message>(
        &self,
        local: &[T],
        counts: &[usize],
    ) -> Result<Vec<T>, ParallelError> {
        let expected = counts.first().copied().unwrap_or(0);
        if counts.len() != 1 || local.len() != expected {
            return Err(ParallelError::SizeMismatch {
                rank: 0,
                found: local.len(),
                expected,
            });
        }
        Ok(local.to_vec())
    }
}

/// Contiguous blocks of a sequence distributed over the workers in rank order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    sizes: Vec<usize>,
    bounds: Vec<usize>,
}

impl Partition {
    /// Split `total` items over `workers`: every block holds `total / workers` items and the lowest
    /// `total % workers` ranks hold one more
    pub fn new(total: usize, workers: usize) -> Result<Self, ParallelError> {
        if workers == 0 {
            return Err(ParallelError::EmptyWorld);
        }
        let sizes = (0..workers)
            .map(|rank| total / workers + usize::from(rank < total % workers))
            .collect::<Vec<_>>();
        let bounds = std::iter::once(0)
            .chain(sizes.iter().scan(0, |offset, size| {
                *offset += size;
                Some(*offset)
            }))
            .collect();
        Ok(Self { sizes, bounds })
    }

    /// The partition of `total` items over the workers of `comm`
    pub fn for_communicator<C: Communicator>(comm: &C, total: usize) -> Result<Self, ParallelError> {
        Self::new(total, comm.size())
    }

    /// The number of items held by each worker
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// The offsets of the blocks, with `bounds[r]..bounds[r + 1]` held by worker `r`
    pub fn bounds(&self) -> &[usize] {
        &self.bounds
    }

    /// The number of items over all workers
    pub fn total(&self) -> usize {
        self.bounds.last().copied().unwrap_or(0)
    }

    /// The global indices held by worker `rank`
    pub fn range(&self, rank: usize) -> Range<usize> {
        self.bounds[rank]..self.bounds[rank + 1]
    }
}

/// Assemble the blocks computed by every worker into the global array
///
/// `local` carries the block of the calling worker along its leading axis. The extent of the
/// block is checked against the partition before the collective starts so that a worker with a
/// mismatched block can not shift the results of its peers.
pub fn gather_blocks<C, A, D>(
    comm: &C,
    partition: &Partition,
    local: Array<A, D>,
) -> Result<Array<A, D>, ParallelError>
where
    C: Communicator,
    A: Message,
    D: Dimension,
{
    let rank = comm.rank();
    let expected = partition.sizes()[rank];
    let found = local.len_of(Axis(0));
    if found != expected {
        return Err(ParallelError::SizeMismatch {
            rank,
            found,
            expected,
        });
    }

    let stride = local.shape().iter().skip(1).product::<usize>();
    let counts = partition
        .sizes()
        .iter()
        .map(|size| size * stride)
        .collect::<Vec<_>>();
    let flat = local.iter().cloned().collect::<Vec<_>>();
    let gathered = comm.all_gather_varcount(&flat, &counts)?;

    let mut shape = local.raw_dim();
    shape[0] = partition.total();
    Ok(Array::from_shape_vec(shape, gathered)?)
}
