//! Position of this process in the SPMD group.
//!
//! Read from the launcher environment (`RANK`, `LOCAL_RANK`,
//! `LOCAL_WORLD_SIZE`, `WORLD_SIZE`) with the same defaults a single
//! process run would have.

use thiserror::Error;

/// Errors produced while deriving a [`Topology`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("invalid environment value {key}={value}: {reason}")]
    InvalidValue { key: &'static str, value: String, reason: String },

    #[error("world size must be >= 1")]
    EmptyWorld,

    #[error("rank {rank} >= world size {world_size}")]
    RankOutOfRange { rank: usize, world_size: usize },

    #[error("local rank {local_rank} >= local world size {local_world_size}")]
    LocalRankOutOfRange { local_rank: usize, local_world_size: usize },

    #[error("world size {world_size} is not a multiple of local world size {local_world_size}")]
    UnevenNodes { world_size: usize, local_world_size: usize },
}

/// Where one process sits in the group and how the group spans nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Topology {
    pub rank: usize,
    pub local_rank: usize,
    pub local_world_size: usize,
    pub world_size: usize,
}

impl Default for Topology {
    fn default() -> Self {
        Self { rank: 0, local_rank: 0, local_world_size: 1, world_size: 1 }
    }
}

impl Topology {
    /// Topology of `rank` in a group of `world_size` processes placed
    /// `local_world_size` per node, in rank order.
    pub fn for_rank(
        rank: usize,
        world_size: usize,
        local_world_size: usize,
    ) -> Result<Self, TopologyError> {
        let local_rank = if local_world_size == 0 { 0 } else { rank % local_world_size };
        let topo = Self { rank, local_rank, local_world_size, world_size };
        topo.validate()?;
        Ok(topo)
    }

    /// Read the topology from process environment variables.
    pub fn from_env() -> Result<Self, TopologyError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the topology through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, TopologyError> {
        let read = |key: &'static str, default: usize| -> Result<usize, TopologyError> {
            match lookup(key) {
                None => Ok(default),
                Some(value) => value.trim().parse::<usize>().map_err(|e| {
                    TopologyError::InvalidValue { key, value: value.clone(), reason: e.to_string() }
                }),
            }
        };
        let topo = Self {
            rank: read("RANK", 0)?,
            local_rank: read("LOCAL_RANK", 0)?,
            local_world_size: read("LOCAL_WORLD_SIZE", 1)?,
            world_size: read("WORLD_SIZE", 1)?,
        };
        topo.validate()?;
        Ok(topo)
    }

    pub fn validate(&self) -> Result<(), TopologyError> {
        if self.world_size == 0 || self.local_world_size == 0 {
            return Err(TopologyError::EmptyWorld);
        }
        if self.rank >= self.world_size {
            return Err(TopologyError::RankOutOfRange {
                rank: self.rank,
                world_size: self.world_size,
            });
        }
        if self.local_rank >= self.local_world_size {
            return Err(TopologyError::LocalRankOutOfRange {
                local_rank: self.local_rank,
                local_world_size: self.local_world_size,
            });
        }
        if self.world_size % self.local_world_size != 0 {
            return Err(TopologyError::UnevenNodes {
                world_size: self.world_size,
                local_world_size: self.local_world_size,
            });
        }
        Ok(())
    }

    /// Number of nodes the group spans.
    pub fn nnodes(&self) -> usize {
        self.world_size / self.local_world_size
    }

    /// Whether this process is the one that prints progress and artifacts.
    pub fn is_coordinator(&self) -> bool {
        self.rank == 0
    }
}
