//! Fused all-gather + GEMM kernel for tensor-parallel groups.
//!
//! [`AgGemmKernel`] gathers every rank's row shard of the input and
//! multiplies the full input by this rank's weight shard. Each call to
//! [`AgGemmKernel::profiling`] times every [`KernelVariant`] of the shape,
//! agrees on a winner across the group and records the timings plus the
//! generated registration source in a [`ProfilingContext`].

pub mod codegen;
pub mod error;
pub mod kernel;
pub mod profiling;
pub mod variant;

pub use codegen::CodeGen;
pub use error::KernelError;
pub use kernel::{AgGemmKernel, ProfileSettings};
pub use profiling::{ProblemKey, ProfRecord, ProfilingContext};
pub use variant::{GatherOrder, KernelVariant, VariantSpace};

/// Environment variable naming the target architecture tag.
pub const ARCH_ENV: &str = "AGTUNE_ARCH";

/// Architecture tag used to name tuning artifacts.
///
/// Reads [`ARCH_ENV`]; the host CPU backend reports `0` when it is unset or
/// not a number.
pub fn get_arch() -> u32 {
    match std::env::var(ARCH_ENV) {
        Ok(value) => value.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(%value, "ignoring non-numeric {ARCH_ENV}");
            0
        }),
        Err(_) => 0,
    }
}
