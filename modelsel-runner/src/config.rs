//! Run configuration for candidate selection.
//!
//! Loaded from TOML (every field optional, defaults below) and overridable
//! field by field from the command line. Unknown strategy, measure or model
//! variant names are rejected at load time; `validate()` rejects numeric
//! settings that cannot produce a meaningful run.

use std::path::Path;

use modelsel_core::normalization::NormalizationMode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::linear_model::ModelVariant;
use crate::measures::{CompositeMeasure, RewardMeasure};
use crate::strategy::RankingStrategy;

/// Configuration errors are fatal: they indicate a caller mistake, not bad data.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{0}")]
    UnknownName(String),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Every knob of one selection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectionConfig {
    pub strategy: RankingStrategy,
    /// Reward for COLOR scoring and significance.
    pub reward: RewardMeasure,
    /// Composite for CV-family strategies.
    pub composite: CompositeMeasure,
    pub top_k: usize,
    pub normalization_mode: NormalizationMode,
    /// Composite scores use population-normalized measures.
    pub normalize_composite: bool,

    // ── Outlier detector ──
    pub z_threshold: f64,
    /// Neighbor radius as a fraction of the candidate's |AUC + MCC|.
    pub neighbor_distance: f64,
    pub min_neighbors: usize,

    /// Candidates without a held-out test record are never eligible.
    pub require_test_set: bool,
    pub model_variant: ModelVariant,

    // ── Significance ──
    pub n_resamples: usize,
    pub master_seed: u64,

    /// Worker threads for per-triple processing; `None` uses rayon's default.
    pub threads: Option<usize>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            strategy: RankingStrategy::Cv,
            reward: RewardMeasure::MccAuc,
            composite: CompositeMeasure::MccAuc,
            top_k: 10,
            normalization_mode: NormalizationMode::Mean,
            normalize_composite: false,
            z_threshold: 2.0,
            neighbor_distance: 0.03,
            min_neighbors: 3,
            require_test_set: false,
            model_variant: ModelVariant::Full,
            n_resamples: 1000,
            master_seed: 42,
            threads: None,
        }
    }
}

impl SelectionConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(invalid("top_k", "must be at least 1"));
        }
        if !(self.z_threshold.is_finite() && self.z_threshold > 0.0) {
            return Err(invalid("z_threshold", "must be a positive number"));
        }
        if !(self.neighbor_distance.is_finite() && self.neighbor_distance > 0.0) {
            return Err(invalid("neighbor_distance", "must be a positive number"));
        }
        if self.min_neighbors < 2 {
            // One neighbor has no sample standard deviation.
            return Err(invalid("min_neighbors", "must be at least 2"));
        }
        if self.threads == Some(0) {
            return Err(invalid("threads", "must be at least 1 when set"));
        }
        Ok(())
    }

    /// Apply a `name = value` override, as given on the command line.
    pub fn set(&mut self, field: &str, value: &str) -> Result<(), ConfigError> {
        match field {
            "strategy" => self.strategy = value.parse().map_err(ConfigError::UnknownName)?,
            "reward" => self.reward = value.parse().map_err(ConfigError::UnknownName)?,
            "composite" => self.composite = value.parse().map_err(ConfigError::UnknownName)?,
            "model_variant" => {
                self.model_variant = value.parse().map_err(ConfigError::UnknownName)?
            }
            "normalization_mode" => {
                self.normalization_mode = value.parse().map_err(ConfigError::UnknownName)?
            }
            "top_k" => self.top_k = parse_number("top_k", value)?,
            "z_threshold" => self.z_threshold = parse_number("z_threshold", value)?,
            "neighbor_distance" => {
                self.neighbor_distance = parse_number("neighbor_distance", value)?
            }
            "min_neighbors" => self.min_neighbors = parse_number("min_neighbors", value)?,
            "n_resamples" => self.n_resamples = parse_number("n_resamples", value)?,
            "master_seed" => self.master_seed = parse_number("master_seed", value)?,
            "threads" => self.threads = Some(parse_number("threads", value)?),
            "require_test_set" => {
                self.require_test_set = parse_number("require_test_set", value)?
            }
            "normalize_composite" => {
                self.normalize_composite = parse_number("normalize_composite", value)?
            }
            other => {
                return Err(ConfigError::UnknownName(format!(
                    "unknown config field '{other}'"
                )))
            }
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

fn parse_number<T>(field: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        field,
        reason: format!("'{value}': {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = SelectionConfig::default();
        c.validate().unwrap();
        assert_eq!(c.top_k, 10);
        assert!((c.z_threshold - 2.0).abs() < 1e-10);
        assert!((c.neighbor_distance - 0.03).abs() < 1e-10);
        assert_eq!(c.min_neighbors, 3);
        assert_eq!(c.reward, RewardMeasure::MccAuc);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        assert_eq!(
            SelectionConfig::from_toml("").unwrap(),
            SelectionConfig::default()
        );
    }

    #[test]
    fn toml_overrides() {
        let c = SelectionConfig::from_toml(
            r#"
            strategy = "COLOR"
            reward = "min_auc"
            composite = "MCC"
            top_k = 5
            normalization_mode = "max"
            model_variant = "MINIMAL"
            master_seed = 7
            threads = 4
            "#,
        )
        .unwrap();
        assert_eq!(c.strategy, RankingStrategy::Color);
        assert_eq!(c.reward, RewardMeasure::MinAuc);
        assert_eq!(c.composite, CompositeMeasure::Mcc);
        assert_eq!(c.top_k, 5);
        assert_eq!(c.normalization_mode, NormalizationMode::Max);
        assert_eq!(c.model_variant, ModelVariant::Minimal);
        assert_eq!(c.master_seed, 7);
        assert_eq!(c.threads, Some(4));
    }

    #[test]
    fn unknown_strategy_is_fatal() {
        let err = SelectionConfig::from_toml(r#"strategy = "BEST""#).unwrap_err();
        assert!(err.to_string().contains("unknown ranking strategy 'BEST'"));
    }

    #[test]
    fn unknown_field_is_fatal() {
        assert!(SelectionConfig::from_toml("topk = 3").is_err());
    }

    #[test]
    fn zero_k_rejected() {
        let err = SelectionConfig::from_toml("top_k = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "top_k", .. }));
    }

    #[test]
    fn negative_threshold_rejected() {
        assert!(SelectionConfig::from_toml("z_threshold = -1.0").is_err());
        assert!(SelectionConfig::from_toml("neighbor_distance = 0.0").is_err());
    }

    #[test]
    fn set_overrides_by_name() {
        let mut c = SelectionConfig::default();
        c.set("strategy", "submission_rank").unwrap();
        c.set("top_k", "2").unwrap();
        c.set("require_test_set", "true").unwrap();
        assert_eq!(c.strategy, RankingStrategy::SubmissionRank);
        assert_eq!(c.top_k, 2);
        assert!(c.require_test_set);

        assert!(matches!(
            c.set("reward", "f1"),
            Err(ConfigError::UnknownName(_))
        ));
        assert!(matches!(
            c.set("top_k", "many"),
            Err(ConfigError::Invalid { field: "top_k", .. })
        ));
        assert!(c.set("colour", "x").is_err());
    }

    #[test]
    fn toml_round_trip() {
        let c = SelectionConfig {
            strategy: RankingStrategy::Model,
            threads: Some(2),
            ..SelectionConfig::default()
        };
        let text = toml::to_string(&c).unwrap();
        assert_eq!(SelectionConfig::from_toml(&text).unwrap(), c);
    }
}
