//! A group wrapper that counts the collectives issued through it.
//!
//! Lock-step execution requires every rank to issue the same number of
//! barriers and gathers; wrapping each rank's group in a [`CountingGroup`]
//! makes that checkable after the fact.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::group::{CommError, CommGroup};

/// Collective calls issued through a [`CountingGroup`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectiveCounts {
    pub barriers: usize,
    pub gathers: usize,
}

impl CollectiveCounts {
    pub fn total(&self) -> usize {
        self.barriers + self.gathers
    }
}

/// Forwards to an inner group while counting barriers and gathers.
#[derive(Debug)]
pub struct CountingGroup<G> {
    inner: G,
    barriers: AtomicUsize,
    gathers: AtomicUsize,
}

impl<G: CommGroup> CountingGroup<G> {
    pub fn new(inner: G) -> Self {
        Self { inner, barriers: AtomicUsize::new(0), gathers: AtomicUsize::new(0) }
    }

    /// Calls issued so far, successful or not.
    pub fn counts(&self) -> CollectiveCounts {
        CollectiveCounts {
            barriers: self.barriers.load(Ordering::Relaxed),
            gathers: self.gathers.load(Ordering::Relaxed),
        }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }
}

impl<G: CommGroup> CommGroup for CountingGroup<G> {
    fn rank(&self) -> usize {
        self.inner.rank()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn barrier(&self) -> Result<(), CommError> {
        self.barriers.fetch_add(1, Ordering::Relaxed);
        self.inner.barrier()
    }

    fn all_gather_into(&self, dest: &mut [f32], src: &[f32]) -> Result<(), CommError> {
        self.gathers.fetch_add(1, Ordering::Relaxed);
        self.inner.all_gather_into(dest, src)
    }

    fn abort(&self) {
        self.inner.abort()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LocalGroup;

    #[test]
    fn counts_each_kind() {
        let group = CountingGroup::new(LocalGroup::create(1).pop().unwrap());
        group.barrier().unwrap();
        group.barrier().unwrap();
        let mut dest = [0.0; 1];
        group.all_gather_into(&mut dest, &[1.0]).unwrap();
        assert_eq!(group.counts(), CollectiveCounts { barriers: 2, gathers: 1 });
        assert_eq!(group.counts().total(), 3);
    }
}
