// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! An in-process world of workers on scoped threads
//!
//! Collectives meet at a shared rendezvous: every worker deposits its payload in its own slot, a
//! barrier waits for all deposits, every worker takes a snapshot of the slots and a second barrier
//! keeps the slots untouched until the last snapshot is taken. A worker which fails, or panics,
//! aborts the rendezvous so that its peers return [`ParallelError::Aborted`] instead of waiting
//! for it forever.

use super::{Communicator, Message, ParallelError};
use std::{
    any::Any,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
};

type Slot = Arc<dyn Any + Send + Sync>;

struct State {
    arrived: usize,
    generation: u64,
    aborted_by: Option<usize>,
    slots: Vec<Option<Slot>>,
}

struct Rendezvous {
    size: usize,
    state: Mutex<State>,
    signal: Condvar,
}

impl Rendezvous {
    fn new(size: usize) -> Self {
        Self {
            size,
            state: Mutex::new(State {
                arrived: 0,
                generation: 0,
                aborted_by: None,
                slots: vec![None; size],
            }),
            signal: Condvar::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, ParallelError> {
        self.state.lock().map_err(|_| ParallelError::Poisoned)
    }

    fn abort(&self, rank: usize) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.aborted_by.get_or_insert(rank);
        self.signal.notify_all();
    }

    fn aborted_by(&self) -> Option<usize> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .aborted_by
    }
}

/// A fixed number of workers which run the same task concurrently
#[derive(Copy, Clone, Debug)]
pub struct LocalWorld {
    size: usize,
}

impl LocalWorld {
    /// A world of `size` workers
    pub fn new(size: usize) -> Result<Self, ParallelError> {
        if size == 0 {
            return Err(ParallelError::EmptyWorld);
        }
        Ok(Self { size })
    }

    /// The number of workers
    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `task` on every worker and return the outcomes in rank order
    ///
    /// When any worker fails the error of the worker which failed first is returned.
    pub fn run<F, R, E>(&self, task: F) -> Result<Vec<R>, E>
    where
        F: Fn(&LocalCommunicator<'_>) -> Result<R, E> + Sync,
        R: Send,
        E: From<ParallelError> + Send,
    {
        let rendezvous = Rendezvous::new(self.size);
        let task = &task;

        let mut outcomes = std::thread::scope(|scope| {
            let handles = (0..self.size)
                .map(|rank| {
                    let comm = LocalCommunicator {
                        rank,
                        rendezvous: &rendezvous,
                    };
                    scope.spawn(move || {
                        let _guard = AbortOnPanic(&comm);
                        let outcome = task(&comm);
                        if outcome.is_err() {
                            comm.abort();
                        }
                        outcome
                    })
                })
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(ParallelError::WorkerPanic(rank).into()))
                })
                .collect::<Vec<_>>()
        });

        if let Some(origin) = rendezvous.aborted_by() {
            if outcomes[origin].is_err() {
                if let Err(error) = outcomes.swap_remove(origin) {
                    return Err(error);
                }
            }
        }
        outcomes.into_iter().collect()
    }
}

struct AbortOnPanic<'a, 'w>(&'a LocalCommunicator<'w>);

impl Drop for AbortOnPanic<'_, '_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.abort();
        }
    }
}

/// The handle of one worker of a [`LocalWorld`]
pub struct LocalCommunicator<'w> {
    rank: usize,
    rendezvous: &'w Rendezvous,
}

impl LocalCommunicator<'_> {
    /// Abandon every pending and future collective of the world
    pub fn abort(&self) {
        self.rendezvous.abort(self.rank);
    }

    fn fail<T>(&self, error: ParallelError) -> Result<T, ParallelError> {
        self.abort();
        Err(error)
    }

    fn exchange(&self, payload: Option<Slot>) -> Result<Vec<Option<Slot>>, ParallelError> {
        {
            let mut state = self.rendezvous.lock()?;
            if let Some(origin) = state.aborted_by {
                return Err(ParallelError::Aborted(origin));
            }
            state.slots[self.rank] = payload;
        }
        self.barrier()?;
        let snapshot = self.rendezvous.lock()?.slots.clone();
        self.barrier()?;
        self.rendezvous.lock()?.slots[self.rank] = None;
        Ok(snapshot)
    }
}

impl Communicator for LocalCommunicator<'_> {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.rendezvous.size
    }

    fn barrier(&self) -> Result<(), ParallelError> {
        let mut state = self.rendezvous.lock()?;
        if let Some(origin) = state.aborted_by {
            return Err(ParallelError::Aborted(origin));
        }
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.rendezvous.size {
            state.arrived = 0;
            state.generation += 1;
            self.rendezvous.signal.notify_all();
            return Ok(());
        }
        while state.generation == generation && state.aborted_by.is_none() {
            state = self
                .rendezvous
                .signal
                .wait(state)
                .map_err(|_| ParallelError::Poisoned)?;
        }
        match state.aborted_by {
            Some(origin) if state.generation == generation => Err(ParallelError::Aborted(origin)),
            _ => Ok(()),
        }
    }

    fn broadcast<T: Message>(
        &self,
        value: Option<T>,
        root: usize,
    ) -> Result<T, ParallelError> {
        let size = self.size();
        if root >= size {
            return self.fail(ParallelError::InvalidRank { rank: root, size });
        }
        let payload = if self.rank == root {
            match value {
                Some(value) => Some(Arc::new(value) as Slot),
                None => return self.fail(ParallelError::MissingRoot(root)),
            }
        } else {
            None
        };

        let snapshot = self.exchange(payload)?;
        snapshot[root]
            .as_ref()
            .and_then(|payload| payload.downcast_ref::<T>())
            .cloned()
            .ok_or(ParallelError::TypeMismatch(root))
    }

    fn all_gather_varcount<T: Message>(
        &self,
        local: &[T],
        counts: &[usize],
    ) -> Result<Vec<T>, ParallelError> {
        if counts.len() != self.size() {
            return self.fail(ParallelError::InvalidRank {
                rank: counts.len(),
                size: self.size(),
            });
        }
        if local.len() != counts[self.rank] {
            return self.fail(ParallelError::SizeMismatch {
                rank: self.rank,
                found: local.len(),
                expected: counts[self.rank],
            });
        }

        let snapshot = self.exchange(Some(Arc::new(local.to_vec()) as Slot))?;
        let mut gathered = Vec::with_capacity(counts.iter().sum());
        for (rank, (slot, &expected)) in snapshot.iter().zip(counts).enumerate() {
            let block = slot
                .as_ref()
                .and_then(|payload| payload.downcast_ref::<Vec<T>>())
                .ok_or(ParallelError::TypeMismatch(rank))?;
            if block.len() != expected {
                return Err(ParallelError::SizeMismatch {
                    rank,
                    found: block.len(),
                    expected,
                });
            }
            gathered.extend_from_slice(block);
        }
        Ok(gathered)
    }
}
