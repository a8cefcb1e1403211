//! Pipeline configuration
//!
//! Layered from an optional TOML file and `DECIDER_*` environment variables
//! (nested keys use `__`, e.g. `DECIDER_WEIGHTS__TECHNICAL=0.25`). Validated
//! once at load; a bad weight set never reaches a request.

use common::{PipelineError, SourceId};
use portfolio_risk::RiskConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "DECIDER";

/// Absolute tolerance for the weights-sum-to-one check
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// What happens when a fan-out branch errors, times out or panics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchPolicy {
    /// Replace the branch with a neutral record and continue
    #[default]
    Downgrade,
    /// Fail the whole run
    Abort,
}

/// Fusion weights. `risk` is reserved: it counts toward the sum but never votes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub technical: f64,
    pub sentiment: f64,
    pub social: f64,
    pub risk: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            technical: 0.25,
            sentiment: 0.10,
            social: 0.15,
            risk: 0.50,
        }
    }
}

impl FusionWeights {
    /// Vote weight of an analysis branch
    pub fn weight(&self, source: SourceId) -> f64 {
        match source {
            SourceId::Technical => self.technical,
            SourceId::Sentiment => self.sentiment,
            SourceId::Social => self.social,
        }
    }

    pub fn total(&self) -> f64 {
        self.technical + self.sentiment + self.social + self.risk
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let named = [
            ("technical", self.technical),
            ("sentiment", self.sentiment),
            ("social", self.social),
            ("risk", self.risk),
        ];
        for (name, weight) in named {
            if !weight.is_finite() || weight < 0.0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "weight '{}' must be a non-negative number, got {}",
                    name, weight
                )));
            }
        }

        let total = self.total();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(PipelineError::InvalidConfig(format!(
                "fusion weights sum to {}, expected 1.0",
                total
            )));
        }
        Ok(())
    }
}

/// Everything the pipeline needs to know up front
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub weights: FusionWeights,

    /// `|score|` below this is NEUTRAL
    pub neutral_threshold: f64,

    /// Same bound for every fan-out branch
    pub branch_timeout_ms: u64,

    pub branch_policy: BranchPolicy,

    pub risk: RiskConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            weights: FusionWeights::default(),
            neutral_threshold: 0.1,
            branch_timeout_ms: 10_000,
            branch_policy: BranchPolicy::Downgrade,
            risk: RiskConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.weights.validate()?;

        if !(self.neutral_threshold.is_finite() && (0.0..1.0).contains(&self.neutral_threshold)) {
            return Err(PipelineError::InvalidConfig(format!(
                "neutral_threshold must be in [0, 1), got {}",
                self.neutral_threshold
            )));
        }
        if self.branch_timeout_ms == 0 {
            return Err(PipelineError::InvalidConfig(
                "branch_timeout_ms must be positive".to_string(),
            ));
        }
        self.risk
            .validate()
            .map_err(|e| PipelineError::InvalidConfig(format!("risk: {}", e)))
    }

    pub fn branch_timeout(&self) -> Duration {
        Duration::from_millis(self.branch_timeout_ms)
    }

    /// Load from an optional TOML file overlaid with the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        Self::load_with_env(path, None)
    }

    /// Like [`PipelineConfig::load`], reading variables from `env` instead of
    /// the process environment when given
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, PipelineError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config: PipelineConfig = builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;

        config.validate()?;
        info!(
            policy = ?config.branch_policy,
            timeout_ms = config.branch_timeout_ms,
            neutral_threshold = config.neutral_threshold,
            "Pipeline configuration loaded"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use uuid::Uuid;

    fn temp_toml(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("decider-{}.toml", Uuid::new_v4()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.branch_policy, BranchPolicy::Downgrade);
        assert_eq!(config.branch_timeout(), Duration::from_secs(10));
        assert!((config.weights.total() - 1.0).abs() <= WEIGHT_SUM_TOLERANCE);
    }

    #[test]
    fn test_bad_weight_sum_rejected() {
        let config = PipelineConfig {
            weights: FusionWeights {
                technical: 0.30,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let weights = FusionWeights {
            technical: 0.40,
            sentiment: -0.05,
            ..Default::default()
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let path = temp_toml(
            "branch_policy = \"abort\"\nbranch_timeout_ms = 250\n\n[risk]\nvolatility_lookback = 20\n",
        );
        let config = PipelineConfig::load_with_env(Some(&path), Some(HashMap::new())).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(config.branch_policy, BranchPolicy::Abort);
        assert_eq!(config.branch_timeout_ms, 250);
        assert_eq!(config.risk.volatility_lookback, 20);
        assert_eq!(config.weights, FusionWeights::default());
    }

    #[test]
    fn test_env_overrides_file() {
        let path = temp_toml("neutral_threshold = 0.2\n");
        let env = HashMap::from([
            ("DECIDER_NEUTRAL_THRESHOLD".to_string(), "0.15".to_string()),
            ("DECIDER_BRANCH_TIMEOUT_MS".to_string(), "500".to_string()),
        ]);
        let config = PipelineConfig::load_with_env(Some(&path), Some(env)).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(config.neutral_threshold, 0.15);
        assert_eq!(config.branch_timeout_ms, 500);
    }

    #[test]
    fn test_misconfigured_weights_fail_at_load() {
        let path = temp_toml("[weights]\ntechnical = 0.5\n");
        let result = PipelineConfig::load_with_env(Some(&path), Some(HashMap::new()));
        fs::remove_file(&path).ok();
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }
}
