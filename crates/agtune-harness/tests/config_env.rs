//! Configuration loading with `AGTUNE_*` environment overrides.

use std::io::Write;

use agtune_common::Topology;
use agtune_harness::{ConfigError, HarnessConfig, HarnessError, ensure_single_process};
use serial_test::serial;

const OVERRIDES: [&str; 4] =
    ["AGTUNE_BASE_SEED", "AGTUNE_SETTLE_MS", "AGTUNE_WARMUP_ITERS", "AGTUNE_PROFILE_ITERS"];

fn cleared<R>(f: impl FnOnce() -> R) -> R {
    let vars: Vec<(&str, Option<&str>)> = OVERRIDES.iter().map(|k| (*k, None)).collect();
    temp_env::with_vars(vars, f)
}

#[test]
#[serial(agtune_env)]
fn env_overrides_defaults() {
    cleared(|| {
        temp_env::with_vars(
            [("AGTUNE_BASE_SEED", Some("11")), ("AGTUNE_SETTLE_MS", Some(" 0 "))],
            || {
                let cfg = HarnessConfig::from_env().unwrap();
                assert_eq!(cfg.seed.base_seed, 11);
                assert_eq!(cfg.timing.settle_ms, 0);
                assert_eq!(cfg.timing.profile_iters, 5);
            },
        )
    });
}

#[test]
#[serial(agtune_env)]
fn env_wins_over_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[timing]\nwarmup_iters = 7\nprofile_iters = 9\n").unwrap();
    writeln!(file, "[seed]\nbase_seed = 1").unwrap();
    cleared(|| {
        temp_env::with_var("AGTUNE_PROFILE_ITERS", Some("2"), || {
            let cfg = HarnessConfig::load(file.path()).unwrap();
            assert_eq!(cfg.timing.warmup_iters, 7);
            assert_eq!(cfg.timing.profile_iters, 2);
            assert_eq!(cfg.seed.base_seed, 1);
        })
    });
}

#[test]
#[serial(agtune_env)]
fn malformed_override_is_reported() {
    cleared(|| {
        temp_env::with_var("AGTUNE_WARMUP_ITERS", Some("many"), || {
            match HarnessConfig::from_env() {
                Err(ConfigError::EnvOverride { key, value, .. }) => {
                    assert_eq!(key, "AGTUNE_WARMUP_ITERS");
                    assert_eq!(value, "many");
                }
                other => panic!("expected env override error, got {other:?}"),
            }
        })
    });
}

#[test]
#[serial(agtune_env)]
fn zero_profile_iters_fails_validation() {
    cleared(|| {
        temp_env::with_var("AGTUNE_PROFILE_ITERS", Some("0"), || {
            assert!(matches!(HarnessConfig::from_env(), Err(ConfigError::Validation(_))));
        })
    });
}

#[test]
#[serial(agtune_env)]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = HarnessConfig::load(&dir.path().join("agtune.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
#[serial(agtune_env)]
fn launcher_started_peer_is_refused() {
    let group = |rank| {
        [
            ("RANK", Some(rank)),
            ("LOCAL_RANK", Some(rank)),
            ("WORLD_SIZE", Some("2")),
            ("LOCAL_WORLD_SIZE", Some("2")),
        ]
    };
    temp_env::with_vars(group("1"), || {
        let env = Topology::from_env().unwrap();
        let err = ensure_single_process(&env).unwrap_err();
        assert!(matches!(err, HarnessError::ExternalLaunch { rank: 1, world_size: 2 }), "{err}");
        assert!(err.to_string().contains("--world-size 2"));
    });
    temp_env::with_vars(group("0"), || {
        ensure_single_process(&Topology::from_env().unwrap()).unwrap();
    });
}
