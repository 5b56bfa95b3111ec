//! The tuning configuration record: one point of the sweep.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::DType;

/// A configuration that cannot be run on the current group.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("{dim}={value} is not divisible by group size {group_size}")]
    NotDivisible { dim: &'static str, value: usize, group_size: usize },

    #[error("{dim} must be positive")]
    ZeroDimension { dim: &'static str },
}

/// Problem shape and numeric flags for one tuning run.
///
/// `m` and `n` are the full logical dimensions; every rank holds
/// `m / size` input rows and `n / size` weight rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TuningConfig {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub transpose_weight: bool,
    pub dtype: DType,
    pub has_bias: bool,
}

impl TuningConfig {
    /// Check that the shape can be partitioned over `group_size` ranks.
    pub fn check(&self, group_size: usize) -> Result<(), PreconditionError> {
        for (dim, value) in [("M", self.m), ("N", self.n), ("K", self.k)] {
            if value == 0 {
                return Err(PreconditionError::ZeroDimension { dim });
            }
        }
        for (dim, value) in [("M", self.m), ("N", self.n)] {
            if group_size == 0 || value % group_size != 0 {
                return Err(PreconditionError::NotDivisible { dim, value, group_size });
            }
        }
        Ok(())
    }

    /// Rows of the input shard held by each rank.
    pub fn local_m(&self, group_size: usize) -> usize {
        self.m / group_size
    }

    /// Rows of the weight shard held by each rank (its output columns).
    pub fn local_n(&self, group_size: usize) -> usize {
        self.n / group_size
    }
}

impl std::fmt::Display for TuningConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TuningConfig(M={}, N={}, K={}, transpose_weight={}, dtype={}, has_bias={})",
            self.m, self.n, self.k, self.transpose_weight, self.dtype, self.has_bias
        )
    }
}
