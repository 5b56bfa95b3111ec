//! The communication-group contract.

use std::fmt;

use thiserror::Error;

/// Errors produced by collective operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommError {
    /// Another rank aborted the group; the collective could not complete.
    #[error("group aborted by rank {by}")]
    Aborted { by: usize },

    /// Destination buffer does not hold exactly one chunk per rank.
    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Ranks contributed chunks of different sizes to one collective.
    #[error("rank {rank} contributed {actual} elements, rank 0 contributed {expected}")]
    RaggedGather { rank: usize, expected: usize, actual: usize },
}

/// Collective primitives over a fixed set of cooperating ranks.
///
/// Every rank must issue the same sequence of collective calls; a rank that
/// skips one leaves its peers blocked until the group is aborted.
pub trait CommGroup: Send + Sync + fmt::Debug {
    /// This rank's index (0-based).
    fn rank(&self) -> usize;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Block until every rank has reached the same barrier.
    fn barrier(&self) -> Result<(), CommError>;

    /// Gather every rank's `src` into `dest` in rank order.
    ///
    /// `dest.len()` must equal `src.len() * size()`. Every rank receives the
    /// same concatenation.
    fn all_gather_into(&self, dest: &mut [f32], src: &[f32]) -> Result<(), CommError>;

    /// Tear the group down; pending and future collectives on every rank
    /// fail with [`CommError::Aborted`].
    fn abort(&self);
}

impl<G: CommGroup + ?Sized> CommGroup for &G {
    fn rank(&self) -> usize {
        (**self).rank()
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn barrier(&self) -> Result<(), CommError> {
        (**self).barrier()
    }

    fn all_gather_into(&self, dest: &mut [f32], src: &[f32]) -> Result<(), CommError> {
        (**self).all_gather_into(dest, src)
    }

    fn abort(&self) {
        (**self).abort()
    }
}
