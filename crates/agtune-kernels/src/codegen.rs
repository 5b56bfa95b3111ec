//! Source generation for tuned kernel registrations.
//!
//! The generated file registers, for every profiled problem, the variant
//! the profiler selected. It is meant to be compiled into the kernel
//! library so later runs dispatch straight to the tuned variant.

use crate::profiling::ProfRecord;
use crate::variant::GatherOrder;

const HEADER_TPL: &str = r#"// Auto-generated by agtune - do not edit.
// Tuning run: @RUN_NAME@
#include "agtune/ag_gemm_registry.h"

namespace agtune {
"#;

const ENTRY_TPL: &str = r#"
// @PROBLEM@ (worst-rank median @WORST_MS@ ms)
static const AgGemmTuned kTuned_@REG_IDX@ = {
    /*meta=*/{DType::@DTYPE@, /*transpose_weight=*/@TRANSPOSE@, /*has_bias=*/@HAS_BIAS@},
    /*problem=*/{@M@, @N@, @K@},
    /*hparams=*/{/*tile=*/{@TILE_M@, @TILE_N@, @TILE_K@}, /*stages=*/@STAGES@, GatherOrder::@GATHER@},
};
"#;

const TAIL_REG_TPL: &str = "    TuningRegistry::instance().add(kTuned_@REG_IDX@),\n";

/// Renders the registration source for a list of winning records.
#[derive(Debug)]
pub struct CodeGen<'a> {
    run_name: &'a str,
    entries: &'a [ProfRecord],
}

impl<'a> CodeGen<'a> {
    pub fn new(run_name: &'a str, entries: &'a [ProfRecord]) -> Self {
        Self { run_name, entries }
    }

    fn gen_header(&self) -> String {
        HEADER_TPL.replace("@RUN_NAME@", self.run_name)
    }

    fn gen_body(&self) -> String {
        let mut out = String::new();
        for (idx, entry) in self.entries.iter().enumerate() {
            let p = &entry.problem;
            let v = &entry.variant;
            let gather = match v.gather {
                GatherOrder::RankOrder => "kRankOrder",
                GatherOrder::Ring => "kRing",
            };
            let dtype = match p.dtype {
                agtune_common::DType::BF16 => "kBF16",
                agtune_common::DType::F16 => "kFP16",
            };
            let code = ENTRY_TPL
                .replace("@PROBLEM@", &p.to_string())
                .replace("@WORST_MS@", &format!("{:.4}", entry.worst_rank_ms))
                .replace("@REG_IDX@", &idx.to_string())
                .replace("@DTYPE@", dtype)
                .replace("@TRANSPOSE@", bool_lit(p.transpose_weight))
                .replace("@HAS_BIAS@", bool_lit(p.has_bias))
                .replace("@M@", &p.m.to_string())
                .replace("@N@", &p.n.to_string())
                .replace("@K@", &p.k.to_string())
                .replace("@TILE_M@", &v.tile_m.to_string())
                .replace("@TILE_N@", &v.tile_n.to_string())
                .replace("@TILE_K@", &v.tile_k.to_string())
                .replace("@STAGES@", &v.stages.to_string())
                .replace("@GATHER@", gather);
            out.push_str(&code);
        }
        out
    }

    fn gen_tail(&self) -> String {
        let mut out = String::from("\nstatic bool _ag_gemm_tuned_reg [[maybe_unused]] = (\n");
        for idx in 0..self.entries.len() {
            out.push_str(&TAIL_REG_TPL.replace("@REG_IDX@", &idx.to_string()));
        }
        out.push_str("    true);\n\n}  // namespace agtune\n");
        out
    }

    pub fn gen_code(&self) -> String {
        let mut code = self.gen_header();
        code.push_str(&self.gen_body());
        code.push_str(&self.gen_tail());
        code
    }
}

fn bool_lit(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiling::ProblemKey;
    use crate::variant::KernelVariant;
    use agtune_common::DType;

    fn entry(m: usize) -> ProfRecord {
        ProfRecord {
            problem: ProblemKey {
                m,
                n: 4096,
                k: 12288,
                dtype: DType::BF16,
                transpose_weight: false,
                has_bias: true,
            },
            variant: KernelVariant {
                tile_m: 128,
                tile_n: 256,
                tile_k: 32,
                stages: 3,
                gather: GatherOrder::Ring,
            },
            median_ms: 1.0,
            worst_rank_ms: 1.5,
            best: true,
        }
    }

    #[test]
    fn empty_table_still_compiles_shape() {
        let code = CodeGen::new("run", &[]).gen_code();
        assert!(code.starts_with("// Auto-generated by agtune"));
        assert!(code.contains("// Tuning run: run"));
        assert!(code.contains("    true);"));
        assert!(!code.contains("kTuned_"));
    }

    #[test]
    fn one_block_per_entry() {
        let entries = [entry(64), entry(256)];
        let code = CodeGen::new("config_ag_gemm_kernel_sm0_tp4_nnodes1", &entries).gen_code();
        assert!(code.contains("static const AgGemmTuned kTuned_0"));
        assert!(code.contains("static const AgGemmTuned kTuned_1"));
        assert!(code.contains("TuningRegistry::instance().add(kTuned_1),"));
        assert!(code.contains("/*problem=*/{256, 4096, 12288}"));
        assert!(code.contains("/*tile=*/{128, 256, 32}, /*stages=*/3, GatherOrder::kRing"));
        assert!(code.contains("DType::kBF16, /*transpose_weight=*/false, /*has_bias=*/true"));
        assert!(!code.contains('@'));
    }
}
