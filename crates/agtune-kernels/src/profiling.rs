//! Accumulated timing records and best-variant table for one tuning run.

use agtune_common::DType;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::codegen::CodeGen;
use crate::variant::KernelVariant;

/// The problem a kernel was profiled for, as seen by one rank.
///
/// `n` is the rank-local output width (its weight shard's row count).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProblemKey {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub dtype: DType,
    pub transpose_weight: bool,
    pub has_bias: bool,
}

impl std::fmt::Display for ProblemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "M={} N={} K={} dtype={} transpose_weight={} has_bias={}",
            self.m, self.n, self.k, self.dtype, self.transpose_weight, self.has_bias
        )
    }
}

/// Timing of one variant for one problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfRecord {
    pub problem: ProblemKey,
    pub variant: KernelVariant,
    /// Median over the profiled iterations on this rank.
    pub median_ms: f64,
    /// Largest median reported by any rank of the group.
    pub worst_rank_ms: f64,
    /// Whether this record announces the variant selected for `problem`.
    pub best: bool,
}

impl std::fmt::Display for ProfRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} AgGemm {} {} median={:.4}ms worst_rank={:.4}ms",
            if self.best { "*" } else { " " },
            self.problem,
            self.variant,
            self.median_ms,
            self.worst_rank_ms
        )
    }
}

/// Process-wide accumulator for one tuning run.
///
/// Records are append-only and kept in profiling order, so the latest one
/// always belongs to the most recently profiled problem. The best table
/// keeps one entry per problem in first-profiled order; re-profiling a
/// problem replaces its entry in place.
#[derive(Debug, Clone)]
pub struct ProfilingContext {
    name: String,
    records: Vec<ProfRecord>,
    best: Vec<ProfRecord>,
}

impl ProfilingContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), records: Vec::new(), best: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append one variant's timing.
    pub fn add_record(&mut self, record: ProfRecord) {
        self.records.push(record);
    }

    /// Append the winning record for its problem and update the best table.
    pub fn record_best(&mut self, mut record: ProfRecord) {
        record.best = true;
        info!(
            problem = %record.problem,
            variant = %record.variant,
            worst_rank_ms = record.worst_rank_ms,
            "selected variant"
        );
        match self.best.iter_mut().find(|b| b.problem == record.problem) {
            Some(slot) => *slot = record.clone(),
            None => self.best.push(record.clone()),
        }
        self.records.push(record);
    }

    /// The most recently appended record.
    pub fn get_latest_prof_result(&self) -> Option<&ProfRecord> {
        self.records.last()
    }

    /// Every record in the order it was appended.
    pub fn get_all_prof_results(&self) -> &[ProfRecord] {
        &self.records
    }

    /// Winning records, one per profiled problem.
    pub fn best_results(&self) -> &[ProfRecord] {
        &self.best
    }

    pub fn best_for(&self, problem: &ProblemKey) -> Option<&KernelVariant> {
        self.best.iter().find(|b| &b.problem == problem).map(|b| &b.variant)
    }

    /// Generated source registering the best variant of every problem.
    pub fn get_code(&self) -> String {
        CodeGen::new(&self.name, &self.best).gen_code()
    }
}
