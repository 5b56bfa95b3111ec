//! Offline autotuning and validation harness for the fused all-gather GEMM.
//!
//! Every rank of a tensor-parallel group walks the same [`TuningSpace`] in
//! lock-step. For each configuration it fabricates seeded input shards,
//! computes a kernel-independent reference, lets the kernel profile its
//! variants, and checks the kernel output against the reference one rank at
//! a time. Rank 0 then emits the generated best-variant source and every
//! timing record.

pub mod config;
pub mod emit;
pub mod error;
pub mod inputs;
pub mod invoker;
pub mod oracle;
pub mod run;
pub mod space;
pub mod sweep;
pub mod validator;

pub use config::{ConfigError, HarnessConfig, SeedConfig, TimingConfig};
pub use emit::{Artifacts, Destination, artifact_name, emit, write_console, write_files};
pub use error::{HarnessError, Result};
pub use inputs::{LocalShards, ShardFactory};
pub use invoker::KernelInvoker;
pub use oracle::reference_output;
pub use run::{
    RankOutcome, RunOptions, ensure_single_process, root_failure, run_local, run_rank,
};
pub use space::{TuningSpace, gen_tuning_space};
pub use sweep::{ConfigState, Sweep, SweepSummary};
pub use validator::{Turnstile, validate};
