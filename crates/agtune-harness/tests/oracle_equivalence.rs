//! The reference oracle against an independent gather-then-multiply.

use std::convert::Infallible;

use agtune_comm::{CommGroup, CountingGroup, LocalGroup, launch_local_group};
use agtune_common::{DType, Matrix, Tolerance, TuningConfig};
use agtune_harness::{HarnessError, KernelInvoker, ShardFactory, reference_output};
use agtune_kernels::ProfilingContext;

/// Multiply the local rows first, then gather the row blocks of the result.
fn multiply_then_gather<G: CommGroup>(
    group: &G,
    config: &TuningConfig,
    input: &Matrix,
    weight: &Matrix,
    bias: Option<&Matrix>,
) -> Matrix {
    let local_n = config.local_n(group.size());
    let mut partial = input.matmul_transposed(weight).unwrap();
    partial.round_to(config.dtype);
    let mut out = Matrix::zeros(config.m, local_n);
    group.all_gather_into(out.as_mut_slice(), partial.as_slice()).unwrap();
    if let Some(bias) = bias {
        out.add_assign(bias).unwrap();
        out.round_to(config.dtype);
    }
    out
}

fn check(config: TuningConfig, size: usize) {
    let results = launch_local_group(size, |group| -> Result<_, Infallible> {
        let shards = ShardFactory::new(3, group.rank()).fabricate(&config, size);
        let bias = shards.bias.as_ref();
        let oracle =
            reference_output(&group, &config, &shards.input, &shards.weight, bias).unwrap();
        let other = multiply_then_gather(&group, &config, &shards.input, &shards.weight, bias);
        Ok((oracle, other))
    })
    .unwrap();

    let tolerance = Tolerance::for_dtype(config.dtype);
    for result in results {
        let (oracle, other) = result.unwrap();
        assert_eq!(oracle.shape(), (config.m, config.n / size));
        tolerance.check(&oracle, &other).unwrap();
    }
}

#[test]
fn oracle_matches_alternative_bf16_with_bias() {
    check(
        TuningConfig {
            m: 16,
            n: 8,
            k: 24,
            transpose_weight: false,
            dtype: DType::BF16,
            has_bias: true,
        },
        4,
    );
}

#[test]
fn oracle_matches_alternative_f16() {
    check(
        TuningConfig {
            m: 12,
            n: 6,
            k: 40,
            transpose_weight: true,
            dtype: DType::F16,
            has_bias: false,
        },
        3,
    );
}

#[test]
fn every_rank_holds_its_own_column_block() {
    let config = TuningConfig {
        m: 4,
        n: 4,
        k: 3,
        transpose_weight: false,
        dtype: DType::F16,
        has_bias: false,
    };
    let blocks = launch_local_group(2, |group| -> Result<_, Infallible> {
        let rank = group.rank() as f32;
        let input = Matrix::from_fn(2, 3, |r, _| rank * 2.0 + r as f32);
        let weight =
            Matrix::from_fn(2, 3, |r, c| if c == 0 { rank * 2.0 + r as f32 + 1.0 } else { 0.0 });
        Ok(reference_output(&group, &config, &input, &weight, None).unwrap())
    })
    .unwrap();
    // out[i][j] = i * (2 * rank + j + 1)
    for (rank, block) in blocks.into_iter().enumerate() {
        let block = block.unwrap();
        for i in 0..4 {
            for j in 0..2 {
                assert_eq!(block.get(i, j), (i * (2 * rank + j + 1)) as f32);
            }
        }
    }
}

/// M = 255 cannot be split over four ranks; neither entry point may touch
/// the group before rejecting it.
#[test]
fn indivisible_m_fails_before_any_collective() {
    let config = TuningConfig {
        m: 255,
        n: 16,
        k: 8,
        transpose_weight: false,
        dtype: DType::BF16,
        has_bias: false,
    };
    for group in LocalGroup::create(4) {
        let group = CountingGroup::new(group);
        let shards = agtune_harness::LocalShards {
            input: Matrix::zeros(63, 8),
            weight: Matrix::zeros(4, 8),
            bias: None,
        };

        let err =
            reference_output(&group, &config, &shards.input, &shards.weight, None).unwrap_err();
        assert!(matches!(err, HarnessError::Precondition { .. }), "{err}");

        let mut ctx = ProfilingContext::new("m255");
        let err = KernelInvoker::new(1).run(&group, &config, &shards, &mut ctx).unwrap_err();
        assert!(matches!(err, HarnessError::Precondition { .. }), "{err}");

        assert_eq!(group.counts().total(), 0);
        assert!(ctx.get_all_prof_results().is_empty());
    }
}
