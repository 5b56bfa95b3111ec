//! Translates a [`TuningConfig`] into a profiled kernel call.

use agtune_comm::CommGroup;
use agtune_common::{Matrix, TuningConfig};
use agtune_kernels::{AgGemmKernel, ProfileSettings, ProfilingContext, VariantSpace};
use tracing::debug;

use crate::error::{HarnessError, Result};
use crate::inputs::LocalShards;

/// Builds kernel handles for each configuration of a sweep.
#[derive(Debug, Clone)]
pub struct KernelInvoker {
    nnodes: usize,
    settings: ProfileSettings,
    variants: VariantSpace,
}

impl KernelInvoker {
    pub fn new(nnodes: usize) -> Self {
        Self { nnodes, settings: ProfileSettings::default(), variants: VariantSpace::default() }
    }

    pub fn with_settings(mut self, settings: ProfileSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_variant_space(mut self, variants: VariantSpace) -> Self {
        self.variants = variants;
        self
    }

    /// Profile the kernel on this rank's shards and return its
    /// `m x local_n` output.
    ///
    /// With `transpose_weight` the weight shard is handed over as a
    /// contiguous `k x local_n` copy. Kernel errors are returned as they
    /// come, tagged with the configuration.
    pub fn run<G: CommGroup + ?Sized>(
        &self,
        group: &G,
        config: &TuningConfig,
        shards: &LocalShards,
        ctx: &mut ProfilingContext,
    ) -> Result<Matrix> {
        let size = group.size();
        config
            .check(size)
            .map_err(|source| HarnessError::Precondition { config: *config, source })?;
        let local_n = config.local_n(size);

        let transposed;
        let weight = if config.transpose_weight {
            transposed = shards.weight.transpose();
            &transposed
        } else {
            &shards.weight
        };

        let tag = |source| HarnessError::Kernel { config: *config, source };
        let kernel = AgGemmKernel::new(
            group,
            self.nnodes,
            config.m,
            local_n,
            config.k,
            config.dtype,
            config.transpose_weight,
            true,
        )
        .map_err(tag)?
        .with_settings(self.settings)
        .with_variant_space(self.variants.clone());

        debug!(rank = group.rank(), %config, "invoking kernel profiler");
        kernel.profiling(&shards.input, weight, shards.bias.as_ref(), ctx).map_err(tag)
    }
}
