//! Lock-step sweep over the tuning space.
//!
//! Every rank walks the same configuration list in the same order and
//! issues the same collectives per configuration:
//!
//! 1. reference: barrier, all-gather, barrier
//! 2. kernel: barrier, profile (the kernel's own collectives), barrier
//! 3. validation: `size` barriers, one per turn
//!
//! followed by a settle pause. The first error on any rank ends its sweep;
//! the launcher aborts the group so peers stop at their next collective.

use std::io::Write;
use std::thread;
use std::time::Duration;

use agtune_comm::CommGroup;
use agtune_common::TuningConfig;
use agtune_kernels::ProfilingContext;
use tracing::{debug, info, info_span};

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::inputs::ShardFactory;
use crate::invoker::KernelInvoker;
use crate::oracle::reference_output;
use crate::space::gen_tuning_space;
use crate::validator::validate;

/// Progress of one configuration through the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigState {
    Pending,
    InputsGenerated,
    Validated,
    Done,
}

/// Outcome of a completed sweep on one rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepSummary {
    pub configs: usize,
    pub states: Vec<ConfigState>,
}

/// Drives one rank through the whole tuning space.
#[derive(Debug)]
pub struct Sweep<'g, G: ?Sized> {
    group: &'g G,
    configs: Vec<TuningConfig>,
    shards: ShardFactory,
    invoker: KernelInvoker,
    settle: Duration,
    states: Vec<ConfigState>,
}

impl<'g, G: CommGroup + ?Sized> Sweep<'g, G> {
    /// Prepare a sweep of `config.space` for this rank of a group spanning
    /// `nnodes` nodes.
    pub fn new(group: &'g G, nnodes: usize, config: &HarnessConfig) -> Self {
        let configs = gen_tuning_space(&config.space);
        let states = vec![ConfigState::Pending; configs.len()];
        Self {
            group,
            shards: ShardFactory::new(config.seed.base_seed, group.rank()),
            invoker: KernelInvoker::new(nnodes)
                .with_settings(config.timing.profile_settings())
                .with_variant_space(config.variants.clone()),
            settle: Duration::from_millis(config.timing.settle_ms),
            configs,
            states,
        }
    }

    pub fn configs(&self) -> &[TuningConfig] {
        &self.configs
    }

    pub fn states(&self) -> &[ConfigState] {
        &self.states
    }

    fn is_coordinator(&self) -> bool {
        self.group.rank() == 0
    }

    /// Run every configuration in order, accumulating kernel timings in
    /// `ctx`. The coordinating rank writes progress lines to `progress`.
    pub fn run<W: Write + ?Sized>(
        &mut self,
        ctx: &mut ProfilingContext,
        progress: &mut W,
    ) -> Result<SweepSummary> {
        let total = self.configs.len();
        let rank = self.group.rank();
        info!(rank, total, "starting sweep");

        for index in 0..total {
            let config = self.configs[index];
            let _span = info_span!("config", rank, index = index + 1, %config).entered();
            if self.is_coordinator() {
                let ordinal = index + 1;
                self.report(progress, format_args!("==== #{ordinal}/{total} Tuning for {config}"))?;
            }

            self.tune_one(index, &config, ctx)?;

            if self.is_coordinator() {
                if let Some(record) = ctx.get_latest_prof_result() {
                    self.report(progress, format_args!("{record}"))?;
                }
            }
            self.states[index] = ConfigState::Done;
        }

        info!(rank, total, "sweep complete");
        Ok(SweepSummary { configs: total, states: self.states.clone() })
    }

    fn tune_one(
        &mut self,
        index: usize,
        config: &TuningConfig,
        ctx: &mut ProfilingContext,
    ) -> Result<()> {
        let group = self.group;
        config
            .check(group.size())
            .map_err(|source| HarnessError::Precondition { config: *config, source })?;

        let shards = self.shards.fabricate(config, group.size());
        self.states[index] = ConfigState::InputsGenerated;

        let reference =
            reference_output(group, config, &shards.input, &shards.weight, shards.bias.as_ref())?;
        group.barrier()?;
        let output = self.invoker.run(group, config, &shards, ctx)?;
        group.barrier()?;

        validate(group, config, &output, &reference)?;
        self.states[index] = ConfigState::Validated;
        debug!(rank = group.rank(), "validated");

        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }
        Ok(())
    }

    fn report<W: Write + ?Sized>(
        &self,
        progress: &mut W,
        line: std::fmt::Arguments<'_>,
    ) -> Result<()> {
        writeln!(progress, "{line}")
            .and_then(|()| progress.flush())
            .map_err(|source| HarnessError::Io { path: "<progress>".into(), source })
    }
}
