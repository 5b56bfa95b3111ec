//! Kernel-independent reference for the fused gather + GEMM.
//!
//! Built only from the group's generic collectives and a plain host matrix
//! product, so it cannot share a bug with the kernel under test.

use agtune_comm::CommGroup;
use agtune_common::{Matrix, TuningConfig};
use tracing::trace;

use crate::error::{HarnessError, Result};

/// Compute this rank's reference block of `input_full · weightᵀ (+ bias)`.
///
/// `input` is this rank's `local_m x k` shard, `weight` its `local_n x k`
/// shard (untransposed) and `bias`, if any, `m x local_n`. The result is
/// `m x local_n`, rounded to the configuration's element type after the
/// product and again after the bias.
///
/// Divisibility is checked before the first barrier, so a malformed
/// configuration fails without entering any collective.
pub fn reference_output<G: CommGroup + ?Sized>(
    group: &G,
    config: &TuningConfig,
    input: &Matrix,
    weight: &Matrix,
    bias: Option<&Matrix>,
) -> Result<Matrix> {
    let size = group.size();
    config
        .check(size)
        .map_err(|source| HarnessError::Precondition { config: *config, source })?;
    let local_m = config.local_m(size);
    let local_n = config.local_n(size);
    input.expect_shape("input", local_m, config.k)?;
    weight.expect_shape("weight", local_n, config.k)?;
    if let Some(bias) = bias {
        bias.expect_shape("bias", config.m, local_n)?;
    }

    group.barrier()?;
    let mut gathered = Matrix::zeros(config.m, config.k);
    group.all_gather_into(gathered.as_mut_slice(), input.as_slice())?;
    trace!(rank = group.rank(), rows = config.m, "gathered reference input");

    let mut out = gathered.matmul_transposed(weight)?;
    out.round_to(config.dtype);
    if let Some(bias) = bias {
        out.add_assign(bias)?;
        out.round_to(config.dtype);
    }
    group.barrier()?;
    Ok(out)
}
