// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Workers in separate processes of an MPI world
//!
//! Elements travel as `bincode` bytes. Every collective first exchanges a header so that all
//! processes agree on the byte counts, or on the failure of one of them, before any payload moves.

use super::{Communicator, Message, ParallelError};
use ::mpi::{
    datatype::PartitionMut,
    topology::SimpleCommunicator,
    traits::{Communicator as _, CommunicatorCollectives, Root},
    Count,
};

/// Marks a worker which failed before the payload exchange
const FAILED: u64 = u64::MAX;

/// The handle of one process of an MPI world
pub struct MpiCommunicator {
    world: SimpleCommunicator,
}

impl MpiCommunicator {
    /// Wrap the world communicator of an initialised universe
    pub fn new(world: SimpleCommunicator) -> Self {
        Self { world }
    }

    /// Terminate every process of the world
    pub fn abort(&self, code: i32) -> ! {
        self.world.abort(code)
    }
}

fn count(bytes: u64) -> Result<Count, ParallelError> {
    Count::try_from(bytes).map_err(|_| ParallelError::MessageTooLarge(bytes as usize))
}

impl Communicator for MpiCommunicator {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn barrier(&self) -> Result<(), ParallelError> {
        self.world.barrier();
        Ok(())
    }

    fn broadcast<T: Message>(&self, value: Option<T>, root: usize) -> Result<T, ParallelError> {
        let size = self.size();
        if root >= size {
            return Err(ParallelError::InvalidRank { rank: root, size });
        }
        let process = self.world.process_at_rank(root as i32);

        let encoded = if self.rank() == root {
            value.as_ref().map(bincode::serialize)
        } else {
            None
        };
        let mut header = match &encoded {
            Some(Ok(bytes)) => [1, bytes.len() as u64],
            _ => [0, 0],
        };
        process.broadcast_into(&mut header[..]);
        if header[0] == 0 {
            return Err(match encoded {
                Some(Err(error)) => error.into(),
                _ => ParallelError::MissingRoot(root),
            });
        }

        let mut bytes = match encoded {
            Some(Ok(bytes)) => bytes,
            _ => vec![0; header[1] as usize],
        };
        process.broadcast_into(&mut bytes[..]);
        Ok(bincode::deserialize(&bytes)?)
    }

    fn all_gather_varcount<T: Message>(
        &self,
        local: &[T],
        counts: &[usize],
    ) -> Result<Vec<T>, ParallelError> {
        let (rank, size) = (self.rank(), self.size());
        let encoded = if counts.len() != size {
            Err(ParallelError::InvalidRank {
                rank: counts.len(),
                size,
            })
        } else if local.len() != counts[rank] {
            Err(ParallelError::SizeMismatch {
                rank,
                found: local.len(),
                expected: counts[rank],
            })
        } else {
            bincode::serialize(local).map_err(ParallelError::from)
        };

        let length = encoded
            .as_ref()
            .map_or(FAILED, |bytes| bytes.len() as u64);
        let mut lengths = vec![0u64; size];
        self.world.all_gather_into(&length, &mut lengths[..]);
        let encoded = encoded?;
        if let Some(origin) = lengths.iter().position(|&length| length == FAILED) {
            return Err(ParallelError::Aborted(origin));
        }

        let byte_counts = lengths
            .iter()
            .map(|&length| count(length))
            .collect::<Result<Vec<_>, _>>()?;
        let displacements = byte_counts
            .iter()
            .scan(0, |offset, &count| {
                let start = *offset;
                *offset += count;
                Some(start)
            })
            .collect::<Vec<Count>>();
        let mut buffer = vec![0u8; lengths.iter().sum::<u64>() as usize];
        {
            let mut partition =
                PartitionMut::new(&mut buffer[..], &byte_counts[..], &displacements[..]);
            self.world
                .all_gather_varcount_into(&encoded[..], &mut partition);
        }

        let mut gathered = Vec::with_capacity(counts.iter().sum());
        for (rank, ((&expected, &start), &length)) in counts
            .iter()
            .zip(&displacements)
            .zip(&byte_counts)
            .enumerate()
        {
            let (start, end) = (start as usize, (start + length) as usize);
            let block: Vec<T> = bincode::deserialize(&buffer[start..end])?;
            if block.len() != expected {
                return Err(ParallelError::SizeMismatch {
                    rank,
                    found: block.len(),
                    expected,
                });
            }
            gathered.extend(block);
        }
        Ok(gathered)
    }
}
