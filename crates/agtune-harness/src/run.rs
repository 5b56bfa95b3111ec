//! Whole-run orchestration: sweep on every rank, emit on the coordinator.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use agtune_comm::{CommGroup, launch_local_group};
use agtune_common::Topology;
use agtune_kernels::ProfilingContext;
use tracing::{error, info, info_span, warn};

use crate::config::HarnessConfig;
use crate::emit::{Artifacts, Destination, artifact_name, emit};
use crate::error::{HarnessError, Result};
use crate::sweep::{Sweep, SweepSummary};

/// Everything a rank needs to take part in a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: HarnessConfig,
    pub destination: Destination,
    pub arch: u32,
    pub world_size: usize,
    pub local_world_size: usize,
}

impl RunOptions {
    pub fn nnodes(&self) -> usize {
        self.world_size / self.local_world_size.max(1)
    }

    /// Name of the profiling context and of the emitted artifacts.
    pub fn run_name(&self) -> String {
        artifact_name(self.arch, self.world_size, self.nnodes())
    }
}

/// What one rank produced.
#[derive(Debug)]
pub struct RankOutcome {
    pub rank: usize,
    pub summary: SweepSummary,
    /// Set on the coordinator when results went to a directory.
    pub artifacts: Option<Artifacts>,
    pub context: ProfilingContext,
}

/// Run the sweep on this rank and, on rank 0, emit the results.
///
/// `stdout` receives the coordinator's progress lines and, for
/// [`Destination::Stdout`], the results.
pub fn run_rank<G, W>(group: &G, options: &RunOptions, stdout: &mut W) -> Result<RankOutcome>
where
    G: CommGroup + ?Sized,
    W: Write + ?Sized,
{
    let topology =
        Topology::for_rank(group.rank(), options.world_size, options.local_world_size)?;
    let _span =
        info_span!("rank", rank = topology.rank, local_rank = topology.local_rank).entered();

    let mut ctx = ProfilingContext::new(options.run_name());
    let mut sweep = Sweep::new(group, topology.nnodes(), &options.config);
    let summary = sweep.run(&mut ctx, stdout)?;

    let artifacts = if topology.is_coordinator() {
        emit(&ctx, &options.destination, stdout)?
    } else {
        None
    };
    Ok(RankOutcome { rank: topology.rank, summary, artifacts, context: ctx })
}

/// Run a whole group in this process, one thread per rank.
///
/// Only rank 0 writes to `stdout`. On failure the returned error is the
/// first one that did not merely report a peer's abort.
pub fn run_local<W>(options: &RunOptions, stdout: &Mutex<W>) -> Result<Vec<RankOutcome>>
where
    W: Write + Send,
{
    Topology::for_rank(0, options.world_size, options.local_world_size)?;
    info!(
        world_size = options.world_size,
        nnodes = options.nnodes(),
        configs = options.config.space.len(),
        "launching local group"
    );
    let results = launch_local_group(options.world_size, |group| {
        if group.rank() == 0 {
            let mut out = stdout.lock().unwrap_or_else(PoisonError::into_inner);
            run_rank(&group, options, &mut *out)
        } else {
            run_rank(&group, options, &mut std::io::sink())
        }
    })
    .map_err(HarnessError::Launch)?;

    let mut outcomes = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for (rank, result) in results.into_iter().enumerate() {
        match result {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => {
                if !err.is_abort_echo() {
                    error!(rank, %err, "rank failed");
                }
                failures.push(err);
            }
        }
    }
    match root_failure(failures) {
        Some(err) => Err(err),
        None => Ok(outcomes),
    }
}

/// Refuse to run under a multi-process launcher.
///
/// Each launched process would run the full group and write the same
/// artifacts, so only rank 0 may start; it runs every rank itself.
pub fn ensure_single_process(env: &Topology) -> Result<()> {
    if env.world_size > 1 && env.rank != 0 {
        return Err(HarnessError::ExternalLaunch { rank: env.rank, world_size: env.world_size });
    }
    if env.world_size > 1 {
        warn!(
            world_size = env.world_size,
            "WORLD_SIZE is set; running all ranks as threads of this process"
        );
    }
    Ok(())
}

/// The first failure that is not an abort echo, else the first failure.
pub fn root_failure(failures: Vec<HarnessError>) -> Option<HarnessError> {
    let root = failures.iter().position(|e| !e.is_abort_echo()).unwrap_or(0);
    failures.into_iter().nth(root)
}
