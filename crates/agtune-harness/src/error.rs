//! Errors that abort a tuning sweep.

use std::path::PathBuf;

use agtune_comm::CommError;
use agtune_common::{Mismatch, PreconditionError, ShapeError, TopologyError, TuningConfig};
use agtune_kernels::KernelError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum HarnessError {
    /// The configuration cannot be partitioned over the group.
    #[error("precondition failed for {config}: {source}")]
    Precondition {
        config: TuningConfig,
        #[source]
        source: PreconditionError,
    },

    /// Kernel and reference disagree beyond tolerance on `rank`.
    #[error("kernel output mismatch for {config} on rank {rank}: {detail}")]
    Mismatch {
        config: TuningConfig,
        rank: usize,
        #[source]
        detail: Mismatch,
    },

    /// The kernel collaborator rejected or failed the configuration.
    #[error("kernel failed for {config}: {source}")]
    Kernel {
        config: TuningConfig,
        #[source]
        source: KernelError,
    },

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Comm(#[from] CommError),

    #[error("output directory {} does not exist", .0.display())]
    MissingOutputDir(PathBuf),

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// An external launcher started this process as one rank of a
    /// multi-process group; the in-process backend runs the whole group.
    #[error(
        "started as rank {rank} of {world_size} by an external launcher; agtune runs every \
         rank in-process, start a single process with --world-size {world_size} instead"
    )]
    ExternalLaunch { rank: usize, world_size: usize },

    #[error("failed to start rank threads: {0}")]
    Launch(#[source] std::io::Error),
}

impl HarnessError {
    /// Whether this error only reports that another rank aborted the group.
    pub fn is_abort_echo(&self) -> bool {
        matches!(
            self,
            Self::Comm(CommError::Aborted { .. })
                | Self::Kernel { source: KernelError::Comm(CommError::Aborted { .. }), .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
