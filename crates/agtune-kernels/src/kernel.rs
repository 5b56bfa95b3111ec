//! The fused all-gather GEMM kernel.
//!
//! Each rank holds `m / size` rows of the input and a weight shard with
//! `n` output columns. A forward pass gathers the input rows of every rank
//! and multiplies the full `m x k` input by the weight shard, tile by tile,
//! one gathered row block at a time. With `local_copy` the rank's own block
//! is read straight from its input shard instead of the gathered buffer.

use std::time::{Duration, Instant};

use agtune_comm::CommGroup;
use agtune_common::{DType, Matrix};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::KernelError;
use crate::profiling::{ProblemKey, ProfRecord, ProfilingContext};
use crate::variant::{KernelVariant, VariantSpace};

/// Iteration counts used while timing variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSettings {
    pub warmup_iters: usize,
    pub profile_iters: usize,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self { warmup_iters: 2, profile_iters: 5 }
    }
}

/// Handle for one problem shape on one rank of a tensor-parallel group.
#[derive(Debug)]
pub struct AgGemmKernel<'g, G: ?Sized> {
    group: &'g G,
    nnodes: usize,
    m: usize,
    n: usize,
    k: usize,
    dtype: DType,
    transpose_weight: bool,
    local_copy: bool,
    space: VariantSpace,
    settings: ProfileSettings,
}

impl<'g, G: CommGroup + ?Sized> AgGemmKernel<'g, G> {
    /// Construct a kernel for a full `m x k` input and an `n`-column weight
    /// shard. With `transpose_weight` the weight is laid out `k x n`,
    /// otherwise `n x k`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        group: &'g G,
        nnodes: usize,
        m: usize,
        n: usize,
        k: usize,
        dtype: DType,
        transpose_weight: bool,
        local_copy: bool,
    ) -> Result<Self, KernelError> {
        let size = group.size();
        if m == 0 || n == 0 || k == 0 {
            return Err(KernelError::UnsupportedShape(format!(
                "zero-sized problem M={m} N={n} K={k}"
            )));
        }
        if m % size != 0 {
            return Err(KernelError::UnsupportedShape(format!(
                "M={m} is not divisible by world size {size}"
            )));
        }
        if nnodes == 0 || size % nnodes != 0 {
            return Err(KernelError::UnsupportedShape(format!(
                "world size {size} cannot be split over {nnodes} nodes"
            )));
        }
        Ok(Self {
            group,
            nnodes,
            m,
            n,
            k,
            dtype,
            transpose_weight,
            local_copy,
            space: VariantSpace::default(),
            settings: ProfileSettings::default(),
        })
    }

    pub fn with_variant_space(mut self, space: VariantSpace) -> Self {
        self.space = space;
        self
    }

    pub fn with_settings(mut self, settings: ProfileSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn nnodes(&self) -> usize {
        self.nnodes
    }

    fn local_m(&self) -> usize {
        self.m / self.group.size()
    }

    fn problem(&self, has_bias: bool) -> ProblemKey {
        ProblemKey {
            m: self.m,
            n: self.n,
            k: self.k,
            dtype: self.dtype,
            transpose_weight: self.transpose_weight,
            has_bias,
        }
    }

    fn check_operands(
        &self,
        input: &Matrix,
        weight: &Matrix,
        bias: Option<&Matrix>,
    ) -> Result<(), KernelError> {
        input.expect_shape("input", self.local_m(), self.k)?;
        if self.transpose_weight {
            weight.expect_shape("weight", self.k, self.n)?;
        } else {
            weight.expect_shape("weight", self.n, self.k)?;
        }
        if let Some(bias) = bias {
            bias.expect_shape("bias", self.m, self.n)?;
        }
        Ok(())
    }

    #[inline]
    fn weight_at(&self, weight: &[f32], col: usize, kk: usize) -> f32 {
        if self.transpose_weight { weight[kk * self.n + col] } else { weight[col * self.k + kk] }
    }

    /// One gather + GEMM pass with a fixed variant.
    pub fn forward(
        &self,
        input: &Matrix,
        weight: &Matrix,
        bias: Option<&Matrix>,
        variant: &KernelVariant,
    ) -> Result<Matrix, KernelError> {
        self.check_operands(input, weight, bias)?;
        let size = self.group.size();
        let rank = self.group.rank();
        let local_m = self.local_m();
        let (n, k) = (self.n, self.k);

        let mut gathered = Matrix::zeros(self.m, k);
        self.group.all_gather_into(gathered.as_mut_slice(), input.as_slice())?;

        let w = weight.as_slice();
        let mut out = Matrix::zeros(self.m, n);
        let mut partials = vec![0.0f32; variant.stages * variant.tile_m * variant.tile_n];

        for block in variant.gather.blocks(rank, size) {
            let (src, src_offset) = if self.local_copy && block == rank {
                (input.as_slice(), 0)
            } else {
                (gathered.as_slice(), block * local_m)
            };
            let row_base = block * local_m;

            for i0 in (0..local_m).step_by(variant.tile_m) {
                let i1 = (i0 + variant.tile_m).min(local_m);
                for j0 in (0..n).step_by(variant.tile_n) {
                    let j1 = (j0 + variant.tile_n).min(n);
                    partials.fill(0.0);

                    for (k_tile, k0) in (0..k).step_by(variant.tile_k).enumerate() {
                        let k1 = (k0 + variant.tile_k).min(k);
                        let stage = k_tile % variant.stages;
                        let acc = &mut partials[stage * variant.tile_m * variant.tile_n..];
                        for i in i0..i1 {
                            let a_row = &src[(src_offset + i) * k..(src_offset + i + 1) * k];
                            for j in j0..j1 {
                                let mut sum = 0.0f32;
                                for kk in k0..k1 {
                                    sum += a_row[kk] * self.weight_at(w, j, kk);
                                }
                                acc[(i - i0) * variant.tile_n + (j - j0)] += sum;
                            }
                        }
                    }

                    // Epilogue: reduce stages, add bias, round once.
                    for i in i0..i1 {
                        let row = row_base + i;
                        for j in j0..j1 {
                            let slot = (i - i0) * variant.tile_n + (j - j0);
                            let mut value: f32 = (0..variant.stages)
                                .map(|s| partials[s * variant.tile_m * variant.tile_n + slot])
                                .sum();
                            if let Some(bias) = bias {
                                value += bias.get(row, j);
                            }
                            out.set(row, j, self.dtype.round(value));
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn time_variant(
        &self,
        input: &Matrix,
        weight: &Matrix,
        bias: Option<&Matrix>,
        variant: &KernelVariant,
    ) -> Result<Duration, KernelError> {
        for _ in 0..self.settings.warmup_iters {
            self.forward(input, weight, bias, variant)?;
        }
        let iters = self.settings.profile_iters.max(1);
        let mut samples = Vec::with_capacity(iters);
        for _ in 0..iters {
            let start = Instant::now();
            self.forward(input, weight, bias, variant)?;
            samples.push(start.elapsed());
        }
        samples.sort_unstable();
        Ok(samples[samples.len() / 2])
    }

    /// Time every candidate variant, select the group-wide winner, record
    /// the results in `ctx` and return the winner's output.
    ///
    /// The winner is the variant with the smallest median on the slowest
    /// rank; every rank exchanges its medians so all agree on it.
    #[instrument(skip_all, fields(rank = self.group.rank(), m = self.m, n = self.n, k = self.k))]
    pub fn profiling(
        &self,
        input: &Matrix,
        weight: &Matrix,
        bias: Option<&Matrix>,
        ctx: &mut ProfilingContext,
    ) -> Result<Matrix, KernelError> {
        self.check_operands(input, weight, bias)?;
        let candidates = self.space.candidates();
        if candidates.is_empty() {
            return Err(KernelError::NoVariant { m: self.m, n: self.n, k: self.k });
        }

        let mut medians_ms = Vec::with_capacity(candidates.len());
        for variant in &candidates {
            let median = self.time_variant(input, weight, bias, variant)?;
            debug!(%variant, median_us = median.as_micros() as u64, "profiled variant");
            medians_ms.push(median.as_secs_f64() * 1e3);
        }

        let size = self.group.size();
        let local: Vec<f32> = medians_ms.iter().map(|&ms| ms as f32).collect();
        let mut all = vec![0.0f32; local.len() * size];
        self.group.all_gather_into(&mut all, &local)?;
        let worst_ms: Vec<f64> = (0..candidates.len())
            .map(|v| {
                (0..size)
                    .map(|r| f64::from(all[r * candidates.len() + v]))
                    .fold(f64::NEG_INFINITY, f64::max)
            })
            .collect();

        let problem = self.problem(bias.is_some());
        let mut best = 0;
        for (idx, variant) in candidates.iter().enumerate() {
            if worst_ms[idx] < worst_ms[best] {
                best = idx;
            }
            ctx.add_record(ProfRecord {
                problem,
                variant: *variant,
                median_ms: medians_ms[idx],
                worst_rank_ms: worst_ms[idx],
                best: false,
            });
        }
        ctx.record_best(ProfRecord {
            problem,
            variant: candidates[best],
            median_ms: medians_ms[best],
            worst_rank_ms: worst_ms[best],
            best: true,
        });

        self.forward(input, weight, bias, &candidates[best])
    }
}
