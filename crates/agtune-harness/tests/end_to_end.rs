//! Whole sweeps over a four-rank in-process group.

use std::convert::Infallible;
use std::fs;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use agtune_comm::{CollectiveCounts, CommError, CommGroup, CountingGroup, launch_local_group};
use agtune_common::DType;
use agtune_harness::{
    ConfigState, Destination, HarnessConfig, HarnessError, RunOptions, ShardFactory, TimingConfig,
    TuningSpace, gen_tuning_space, root_failure, run_local, run_rank, write_files,
};
use agtune_kernels::{GatherOrder, VariantSpace};

const WORLD: usize = 4;

fn quick_timing() -> TimingConfig {
    TimingConfig { settle_ms: 0, warmup_iters: 0, profile_iters: 1 }
}

fn small_variants() -> VariantSpace {
    VariantSpace {
        tile_shapes: vec![(8, 4, 8)],
        stages: vec![1, 2],
        gather_orders: vec![GatherOrder::Ring, GatherOrder::RankOrder],
        scratch_budget: usize::MAX,
    }
}

/// Scenario 1 scaled down to CPU-friendly sizes.
fn small_options(destination: Destination) -> RunOptions {
    RunOptions {
        config: HarnessConfig {
            space: TuningSpace {
                m: vec![16],
                n: vec![8],
                k: vec![24],
                transpose_weight: vec![false, true],
                dtype: vec![DType::BF16],
                has_bias: vec![false, true],
            },
            timing: quick_timing(),
            variants: small_variants(),
            ..HarnessConfig::default()
        },
        destination,
        arch: 0,
        world_size: WORLD,
        local_world_size: WORLD,
    }
}

#[test]
fn directory_run_writes_one_source_and_one_log() {
    let dir = tempfile::tempdir().unwrap();
    let options = small_options(Destination::Directory(dir.path().to_path_buf()));
    let stdout = Mutex::new(Vec::new());
    let outcomes = run_local(&options, &stdout).unwrap();

    assert_eq!(outcomes.len(), WORLD);
    for outcome in &outcomes {
        assert_eq!(outcome.summary.configs, 4);
        assert!(outcome.summary.states.iter().all(|s| *s == ConfigState::Done));
        assert_eq!(outcome.artifacts.is_some(), outcome.rank == 0);
    }

    let mut names: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "config_ag_gemm_kernel_sm0_tp4_nnodes1.cu".to_string(),
            "config_ag_gemm_kernel_sm0_tp4_nnodes1.prof.log".to_string(),
        ]
    );

    let artifacts = outcomes[0].artifacts.as_ref().unwrap();
    let log = fs::read_to_string(&artifacts.log).unwrap();
    // four candidates plus the winner, per configuration
    assert_eq!(log.lines().count(), 4 * 5);
    assert_eq!(log.lines().filter(|l| l.starts_with('*')).count(), 4);
    let code = fs::read_to_string(&artifacts.code).unwrap();
    assert!(code.contains("kTuned_3"));

    let progress = String::from_utf8(stdout.into_inner().unwrap()).unwrap();
    assert_eq!(progress.lines().filter(|l| l.starts_with("==== #")).count(), 4);
    assert!(!progress.contains("Generated Code:"));
}

#[test]
fn all_ranks_agree_on_winners() {
    let options = small_options(Destination::Stdout);
    let outcomes = run_local(&options, &Mutex::new(std::io::sink())).unwrap();
    let winners = |i: usize| -> Vec<_> {
        outcomes[i].context.best_results().iter().map(|r| r.variant).collect()
    };
    for rank in 1..WORLD {
        assert_eq!(winners(rank), winners(0));
    }
}

#[test]
fn stdout_run_matches_file_content() {
    let stdout = Mutex::new(Vec::new());
    let outcomes = run_local(&small_options(Destination::Stdout), &stdout).unwrap();
    assert!(outcomes.iter().all(|o| o.artifacts.is_none()));
    let text = String::from_utf8(stdout.into_inner().unwrap()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let artifacts = write_files(&outcomes[0].context, dir.path()).unwrap();
    let code = fs::read_to_string(&artifacts.code).unwrap();
    let log = fs::read_to_string(&artifacts.log).unwrap();

    let (_, results) = text.split_once("Generated Code:\n").unwrap();
    let (printed_code, printed_log) = results.split_once("\nProfiling Results:\n").unwrap();
    assert_eq!(printed_code.trim_end(), code.trim_end());
    assert_eq!(printed_log, log);
}

#[test]
fn indivisible_m_aborts_the_run() {
    let mut options = small_options(Destination::Stdout);
    options.config.space.m = vec![16, 255];
    let err = run_local(&options, &Mutex::new(std::io::sink())).unwrap_err();
    match err {
        HarnessError::Precondition { config, .. } => assert_eq!(config.m, 255),
        other => panic!("expected precondition failure, got {other}"),
    }
}

/// Per configuration: two oracle barriers, two around the kernel and one
/// validator turn per rank; one oracle gather, one gather per timed variant
/// run, one for the shared medians and one for the winner's final run.
#[test]
fn every_rank_issues_the_same_collectives() {
    let options = small_options(Destination::Stdout);
    let configs = options.config.space.len();
    let variants = options.config.variants.candidates().len();
    let counts = launch_local_group(WORLD, |group| -> Result<_, Infallible> {
        let group = CountingGroup::new(group);
        let outcome = run_rank(&group, &options, &mut std::io::sink());
        Ok((outcome.map(|o| o.summary.configs), group.counts()))
    })
    .unwrap();

    let expected = CollectiveCounts {
        barriers: configs * (4 + WORLD),
        gathers: configs * (1 + variants + 2),
    };
    for (rank, result) in counts.into_iter().enumerate() {
        let (outcome, counts) = result.unwrap();
        assert_eq!(outcome.unwrap(), configs, "rank {rank}");
        assert_eq!(counts, expected, "rank {rank}");
    }
}

/// Fails one rank's `nth` barrier (1-based) without entering it.
#[derive(Debug)]
struct FailingBarrier<G> {
    inner: G,
    failing_rank: usize,
    nth: usize,
    seen: AtomicUsize,
}

impl<G: CommGroup> CommGroup for FailingBarrier<G> {
    fn rank(&self) -> usize {
        self.inner.rank()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn barrier(&self) -> Result<(), CommError> {
        let count = self.seen.fetch_add(1, Ordering::Relaxed) + 1;
        if self.rank() == self.failing_rank && count == self.nth {
            return Err(CommError::LengthMismatch { expected: 1, actual: 0 });
        }
        self.inner.barrier()
    }

    fn all_gather_into(&self, dest: &mut [f32], src: &[f32]) -> Result<(), CommError> {
        self.inner.all_gather_into(dest, src)
    }

    fn abort(&self) {
        self.inner.abort()
    }
}

#[test]
fn one_failing_rank_stops_every_peer() {
    let options = small_options(Destination::Stdout);
    // Second configuration, inside the validator turns.
    let nth = (4 + WORLD) + 6;
    let results = launch_local_group(WORLD, |group| {
        let group =
            FailingBarrier { inner: group, failing_rank: 2, nth, seen: AtomicUsize::new(0) };
        run_rank(&group, &options, &mut std::io::sink())
    })
    .unwrap();

    let failures: Vec<HarnessError> = results
        .into_iter()
        .map(|r| r.expect_err("no rank may finish the sweep"))
        .collect();
    for (rank, err) in failures.iter().enumerate() {
        if rank == 2 {
            assert!(matches!(err, HarnessError::Comm(CommError::LengthMismatch { .. })), "{err}");
        } else {
            assert!(err.is_abort_echo(), "rank {rank}: {err}");
        }
    }
    match root_failure(failures) {
        Some(HarnessError::Comm(CommError::LengthMismatch { .. })) => {}
        other => panic!("unexpected root failure: {other:?}"),
    }
}

#[test]
fn missing_output_directory_is_rejected_up_front() {
    let dir = tempfile::tempdir().unwrap();
    let err = Destination::from_option(Some(dir.path().join("absent"))).unwrap_err();
    assert!(err.to_string().contains("does not exist"));
}

#[test]
fn shards_are_bit_identical_across_runs() {
    let configs = gen_tuning_space(&small_options(Destination::Stdout).config.space);
    for rank in 0..WORLD {
        let mut first = ShardFactory::new(3, rank);
        let mut second = ShardFactory::new(3, rank);
        for config in &configs {
            let a = first.fabricate(config, WORLD);
            let b = second.fabricate(config, WORLD);
            let bits = |m: &agtune_common::Matrix| -> Vec<u32> {
                m.as_slice().iter().map(|v| v.to_bits()).collect()
            };
            assert_eq!(bits(&a.input), bits(&b.input));
            assert_eq!(bits(&a.weight), bits(&b.weight));
            assert_eq!(a.bias.as_ref().map(bits), b.bias.as_ref().map(bits));
        }
    }
}

/// Full-size scenario: M=256, N=16384, K=12288, bf16, no bias, four ranks.
#[test]
#[ignore = "multi-minute CPU run"]
fn full_size_bf16_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let options = RunOptions {
        config: HarnessConfig {
            space: TuningSpace {
                m: vec![256],
                n: vec![16384],
                k: vec![12288],
                transpose_weight: vec![false],
                dtype: vec![DType::BF16],
                has_bias: vec![false],
            },
            timing: quick_timing(),
            ..HarnessConfig::default()
        },
        destination: Destination::Directory(dir.path().to_path_buf()),
        arch: 0,
        world_size: WORLD,
        local_world_size: WORLD,
    };
    let outcomes = run_local(&options, &Mutex::new(std::io::sink())).unwrap();
    let artifacts = outcomes[0].artifacts.as_ref().unwrap();
    assert!(artifacts.code.exists());
    assert!(!fs::read_to_string(&artifacts.log).unwrap().is_empty());
}
