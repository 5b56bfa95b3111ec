//! Harness configuration.
//!
//! Loads [`HarnessConfig`] from an optional TOML file, then applies
//! `AGTUNE_*` environment overrides, then validates.

use std::path::Path;

use agtune_kernels::{ProfileSettings, VariantSpace};
use serde::{Deserialize, Serialize};

use crate::space::TuningSpace;

/// Seeding of the per-rank input generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// Rank `r` seeds its generator with `base_seed + r`.
    /// Override: `AGTUNE_BASE_SEED`
    pub base_seed: u64,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self { base_seed: 3 }
    }
}

/// Timing knobs for the sweep and the kernel profiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Pause after each configuration's validation, in milliseconds.
    /// Override: `AGTUNE_SETTLE_MS`
    pub settle_ms: u64,
    /// Untimed runs per variant.
    /// Override: `AGTUNE_WARMUP_ITERS`
    pub warmup_iters: usize,
    /// Timed runs per variant.
    /// Override: `AGTUNE_PROFILE_ITERS`
    pub profile_iters: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        let profile = ProfileSettings::default();
        Self {
            settle_ms: 1000,
            warmup_iters: profile.warmup_iters,
            profile_iters: profile.profile_iters,
        }
    }
}

impl TimingConfig {
    pub fn profile_settings(&self) -> ProfileSettings {
        ProfileSettings { warmup_iters: self.warmup_iters, profile_iters: self.profile_iters }
    }
}

/// Complete harness configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub space: TuningSpace,
    pub seed: SeedConfig,
    pub timing: TimingConfig,
    pub variants: VariantSpace,
}

/// Errors that can occur when loading or validating a [`HarnessConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid environment override {key}={value}: {reason}")]
    EnvOverride { key: String, value: String, reason: String },
}

impl HarnessConfig {
    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load from a TOML string; missing fields keep their defaults.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut cfg: HarnessConfig = toml::from_str(toml_str)?;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let space = &self.space;
        let axes = [
            ("space.m", space.m.is_empty()),
            ("space.n", space.n.is_empty()),
            ("space.k", space.k.is_empty()),
            ("space.transpose_weight", space.transpose_weight.is_empty()),
            ("space.dtype", space.dtype.is_empty()),
            ("space.has_bias", space.has_bias.is_empty()),
        ];
        if let Some((axis, _)) = axes.iter().find(|(_, empty)| *empty) {
            return Err(ConfigError::Validation(format!("{axis} must not be empty")));
        }
        let sizes = [("space.m", &space.m), ("space.n", &space.n), ("space.k", &space.k)];
        for (axis, values) in sizes {
            if values.contains(&0) {
                let reason = format!("{axis} must only hold positive sizes");
                return Err(ConfigError::Validation(reason));
            }
        }
        if self.timing.profile_iters == 0 {
            return Err(ConfigError::Validation("timing.profile_iters must be > 0".into()));
        }
        if self.variants.candidates().is_empty() {
            return Err(ConfigError::Validation(
                "variants: no kernel variant fits the scratch budget".into(),
            ));
        }
        Ok(())
    }

    /// Apply `AGTUNE_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = env_parse::<u64>("AGTUNE_BASE_SEED")? {
            self.seed.base_seed = v;
        }
        if let Some(v) = env_parse::<u64>("AGTUNE_SETTLE_MS")? {
            self.timing.settle_ms = v;
        }
        if let Some(v) = env_parse::<usize>("AGTUNE_WARMUP_ITERS")? {
            self.timing.warmup_iters = v;
        }
        if let Some(v) = env_parse::<usize>("AGTUNE_PROFILE_ITERS")? {
            self.timing.profile_iters = v;
        }
        Ok(())
    }

    /// Generate the default configuration as TOML.
    pub fn default_toml() -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&Self::default())
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value.trim().parse::<T>().map(Some).map_err(|e| ConfigError::EnvOverride {
            key: key.into(),
            value: value.clone(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        HarnessConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: HarnessConfig = toml::from_str(
            r#"
            [space]
            m = [256]
            dtype = ["bf16"]

            [timing]
            settle_ms = 0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.space.m, vec![256]);
        assert_eq!(cfg.space.n, TuningSpace::default().n);
        assert_eq!(cfg.timing.settle_ms, 0);
        assert_eq!(cfg.timing.profile_iters, TimingConfig::default().profile_iters);
        assert_eq!(cfg.seed.base_seed, 3);
    }

    #[test]
    fn empty_axis_rejected() {
        let cfg = HarnessConfig {
            space: TuningSpace { has_bias: vec![], ..TuningSpace::default() },
            ..HarnessConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("space.has_bias"));
    }

    #[test]
    fn zero_dimension_rejected() {
        let cfg = HarnessConfig {
            space: TuningSpace { k: vec![0], ..TuningSpace::default() },
            ..HarnessConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn default_toml_round_trips() {
        let text = HarnessConfig::default_toml().unwrap();
        let parsed: HarnessConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, HarnessConfig::default());
    }
}
