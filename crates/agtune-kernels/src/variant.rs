//! Implementation variants searched by the kernel's profiler.

use serde::{Deserialize, Serialize};

/// Order in which gathered row blocks are multiplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatherOrder {
    /// Row blocks in rank order 0, 1, ..., size-1.
    RankOrder,
    /// Own block first, then the following ranks, wrapping around.
    Ring,
}

impl GatherOrder {
    /// Block indices visited by `rank` in a group of `size`.
    pub fn blocks(self, rank: usize, size: usize) -> impl Iterator<Item = usize> {
        (0..size).map(move |i| match self {
            Self::RankOrder => i,
            Self::Ring => (rank + i) % size,
        })
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::RankOrder => "rank_order",
            Self::Ring => "ring",
        }
    }
}

/// One implementation variant of the fused kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KernelVariant {
    pub tile_m: usize,
    pub tile_n: usize,
    pub tile_k: usize,
    /// Number of rotating partial accumulators along K.
    pub stages: usize,
    pub gather: GatherOrder,
}

impl KernelVariant {
    /// Staging footprint of one tile pipeline, in bytes, for 2-byte elements.
    pub fn scratch_bytes(&self) -> usize {
        (self.tile_m * self.tile_k + self.tile_n * self.tile_k) * 2 * self.stages
    }
}

impl std::fmt::Display for KernelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "tile={}x{}x{} stages={} gather={}",
            self.tile_m,
            self.tile_n,
            self.tile_k,
            self.stages,
            self.gather.name()
        )
    }
}

/// Search space of kernel variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantSpace {
    /// `(tile_m, tile_n, tile_k)` candidates.
    pub tile_shapes: Vec<(usize, usize, usize)>,
    pub stages: Vec<usize>,
    pub gather_orders: Vec<GatherOrder>,
    /// Variants whose staging footprint exceeds this are skipped.
    pub scratch_budget: usize,
}

impl Default for VariantSpace {
    fn default() -> Self {
        Self {
            tile_shapes: vec![(128, 128, 32), (128, 128, 64), (128, 256, 32)],
            stages: vec![3, 4],
            gather_orders: vec![GatherOrder::Ring, GatherOrder::RankOrder],
            scratch_budget: 96 * 1024,
        }
    }
}

impl VariantSpace {
    /// Every combination, tile shape outermost, gather order innermost.
    pub fn iter(&self) -> impl Iterator<Item = KernelVariant> + '_ {
        self.tile_shapes.iter().flat_map(move |&(tile_m, tile_n, tile_k)| {
            self.stages.iter().flat_map(move |&stages| {
                self.gather_orders.iter().map(move |&gather| KernelVariant {
                    tile_m,
                    tile_n,
                    tile_k,
                    stages,
                    gather,
                })
            })
        })
    }

    /// Variants that are well formed and fit the scratch budget.
    pub fn candidates(&self) -> Vec<KernelVariant> {
        self.iter()
            .filter(|v| v.tile_m > 0 && v.tile_n > 0 && v.tile_k > 0 && v.stages > 0)
            .filter(|v| v.scratch_bytes() <= self.scratch_budget)
            .collect()
    }

    /// Total number of combinations before filtering.
    pub fn total_combinations(&self) -> usize {
        self.tile_shapes.len() * self.stages.len() * self.gather_orders.len()
    }
}
