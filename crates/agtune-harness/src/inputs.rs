//! Deterministic fabrication of per-rank input shards.

use agtune_common::{Matrix, TuningConfig};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// This rank's operands for one configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalShards {
    /// `local_m x k` rows of the input.
    pub input: Matrix,
    /// `local_n x k` rows of the weight.
    pub weight: Matrix,
    /// `m x local_n` bias, when the configuration has one.
    pub bias: Option<Matrix>,
}

/// Per-rank generator seeded once per run.
///
/// The stream continues across configurations, so the shards of a
/// configuration depend on its position in the sweep but are identical
/// between runs with the same seed, rank and space.
#[derive(Debug, Clone)]
pub struct ShardFactory {
    rng: ChaCha8Rng,
    rank: usize,
}

impl ShardFactory {
    pub fn new(base_seed: u64, rank: usize) -> Self {
        Self { rng: ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(rank as u64)), rank }
    }

    fn uniform(&mut self, rows: usize, cols: usize, scale: f32, config: &TuningConfig) -> Matrix {
        let rng = &mut self.rng;
        let mut m = Matrix::from_fn(rows, cols, |_, _| rng.random::<f32>() * scale);
        m.round_to(config.dtype);
        m
    }

    /// Draw input, weight and optional bias for `config` on a group of
    /// `group_size` ranks.
    ///
    /// Input and weight are uniform in `[0, 1)` scaled by `(rank + 1) / 100`;
    /// the bias is unscaled. The caller has already checked divisibility.
    pub fn fabricate(&mut self, config: &TuningConfig, group_size: usize) -> LocalShards {
        let local_m = config.local_m(group_size);
        let local_n = config.local_n(group_size);
        let scale = (self.rank + 1) as f32 / 100.0;
        let input = self.uniform(local_m, config.k, scale, config);
        let weight = self.uniform(local_n, config.k, scale, config);
        let bias = config.has_bias.then(|| self.uniform(config.m, local_n, 1.0, config));
        LocalShards { input, weight, bias }
    }
}
