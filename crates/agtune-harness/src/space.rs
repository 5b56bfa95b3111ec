//! The configuration space swept by a tuning run.

use agtune_common::{DType, TuningConfig};
use serde::{Deserialize, Serialize};

/// Candidate values for every axis of the sweep.
///
/// The declared field order is the iteration order: `m` varies slowest,
/// `has_bias` fastest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningSpace {
    pub m: Vec<usize>,
    pub n: Vec<usize>,
    pub k: Vec<usize>,
    pub transpose_weight: Vec<bool>,
    pub dtype: Vec<DType>,
    pub has_bias: Vec<bool>,
}

impl Default for TuningSpace {
    fn default() -> Self {
        Self {
            m: vec![64, 256, 512, 1024, 2048, 4096, 8192],
            n: vec![16384, 49152],
            k: vec![12288],
            transpose_weight: vec![true, false],
            dtype: vec![DType::BF16, DType::F16],
            has_bias: vec![false, true],
        }
    }
}

impl TuningSpace {
    /// Number of configurations the space expands to.
    pub fn len(&self) -> usize {
        self.m.len()
            * self.n.len()
            * self.k.len()
            * self.transpose_weight.len()
            * self.dtype.len()
            * self.has_bias.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cartesian product of the candidate lists in declared order.
    pub fn iter(&self) -> impl Iterator<Item = TuningConfig> + '_ {
        self.m.iter().flat_map(move |&m| {
            self.n.iter().flat_map(move |&n| {
                self.k.iter().flat_map(move |&k| {
                    self.transpose_weight.iter().flat_map(move |&transpose_weight| {
                        self.dtype.iter().flat_map(move |&dtype| {
                            self.has_bias.iter().map(move |&has_bias| TuningConfig {
                                m,
                                n,
                                k,
                                transpose_weight,
                                dtype,
                                has_bias,
                            })
                        })
                    })
                })
            })
        })
    }
}

/// Expand `space` into the ordered list every rank sweeps.
///
/// Pure and deterministic, so ranks never need to exchange the list.
pub fn gen_tuning_space(space: &TuningSpace) -> Vec<TuningConfig> {
    space.iter().collect()
}
