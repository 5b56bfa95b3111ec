//! In-process communication group: one rank per thread.
//!
//! All ranks share one [`Shared`] block guarded by a mutex. Barriers are
//! generation counted so the same group can be reused for any number of
//! collectives, and an abort wakes every waiter.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::group::{CommError, CommGroup};

#[derive(Debug)]
struct State {
    arrived: usize,
    generation: u64,
    aborted_by: Option<usize>,
    slots: Vec<Vec<f32>>,
}

#[derive(Debug)]
struct Shared {
    size: usize,
    state: Mutex<State>,
    turnover: Condvar,
}

/// Handle held by one rank of an in-process group.
#[derive(Debug, Clone)]
pub struct LocalGroup {
    rank: usize,
    shared: Arc<Shared>,
}

impl LocalGroup {
    /// Create the handles for a group of `size` ranks, in rank order.
    ///
    /// # Panics
    /// Panics if `size` is zero.
    pub fn create(size: usize) -> Vec<LocalGroup> {
        assert!(size > 0, "group size must be >= 1");
        let shared = Arc::new(Shared {
            size,
            state: Mutex::new(State {
                arrived: 0,
                generation: 0,
                aborted_by: None,
                slots: vec![Vec::new(); size],
            }),
            turnover: Condvar::new(),
        });
        (0..size).map(|rank| LocalGroup { rank, shared: Arc::clone(&shared) }).collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking rank poisons the mutex; the state itself stays
        // consistent because every mutation completes under the lock.
        self.shared.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn wait_all<'a>(
        &'a self,
        mut state: MutexGuard<'a, State>,
    ) -> Result<MutexGuard<'a, State>, CommError> {
        if let Some(by) = state.aborted_by {
            return Err(CommError::Aborted { by });
        }
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.shared.size {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.shared.turnover.notify_all();
            return Ok(state);
        }
        while state.generation == generation && state.aborted_by.is_none() {
            state = self
                .shared
                .turnover
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        if state.generation == generation {
            if let Some(by) = state.aborted_by {
                return Err(CommError::Aborted { by });
            }
        }
        Ok(state)
    }
}

impl CommGroup for LocalGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) -> Result<(), CommError> {
        let state = self.lock();
        self.wait_all(state).map(drop)
    }

    fn all_gather_into(&self, dest: &mut [f32], src: &[f32]) -> Result<(), CommError> {
        let size = self.shared.size;
        let expected = src.len() * size;
        if dest.len() != expected {
            return Err(CommError::LengthMismatch { expected, actual: dest.len() });
        }

        let mut state = self.lock();
        if let Some(by) = state.aborted_by {
            return Err(CommError::Aborted { by });
        }
        state.slots[self.rank].clear();
        state.slots[self.rank].extend_from_slice(src);

        // Every rank has published once this returns.
        let state = self.wait_all(state)?;
        let chunk = state.slots[0].len();
        let ragged = state
            .slots
            .iter()
            .enumerate()
            .find(|(_, slot)| slot.len() != chunk)
            .map(|(rank, slot)| CommError::RaggedGather {
                rank,
                expected: chunk,
                actual: slot.len(),
            });
        if ragged.is_none() {
            for (rank, slot) in state.slots.iter().enumerate() {
                dest[rank * chunk..(rank + 1) * chunk].copy_from_slice(slot);
            }
        }

        // Nobody may republish before every rank has copied out.
        drop(self.wait_all(state)?);
        debug!(rank = self.rank, elements = expected, "all_gather_into complete");
        match ragged {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn abort(&self) {
        let mut state = self.lock();
        if state.aborted_by.is_none() {
            warn!(rank = self.rank, "aborting communication group");
            state.aborted_by = Some(self.rank);
        }
        self.shared.turnover.notify_all();
    }
}
