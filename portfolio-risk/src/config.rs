//! Risk evaluation configuration

use serde::{Deserialize, Serialize};

/// Parameters of the fixed stop-loss / take-profit rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Number of most recent candles used for the volatility estimate
    #[serde(default = "default_volatility_lookback")]
    pub volatility_lookback: usize,

    /// Minimum number of log returns required before a profile can be built
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,

    /// Stop loss distance as a multiple of daily realized volatility
    #[serde(default = "default_stop_loss_vol_multiple")]
    pub stop_loss_vol_multiple: f64,

    /// Take profit distance as a multiple of the stop loss distance
    #[serde(default = "default_reward_risk_ratio")]
    pub reward_risk_ratio: f64,

    /// Floor for the stop loss (percent)
    #[serde(default = "default_min_stop_loss_pct")]
    pub min_stop_loss_pct: f64,

    /// Ceiling for the stop loss (percent)
    #[serde(default = "default_max_stop_loss_pct")]
    pub max_stop_loss_pct: f64,

    /// Confidence level for historical VaR (0.95 = 95%)
    #[serde(default = "default_var_confidence")]
    pub var_confidence: f64,

    /// Trading periods per year, for annualizing volatility (crypto trades daily)
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            volatility_lookback: default_volatility_lookback(),
            min_observations: default_min_observations(),
            stop_loss_vol_multiple: default_stop_loss_vol_multiple(),
            reward_risk_ratio: default_reward_risk_ratio(),
            min_stop_loss_pct: default_min_stop_loss_pct(),
            max_stop_loss_pct: default_max_stop_loss_pct(),
            var_confidence: default_var_confidence(),
            periods_per_year: default_periods_per_year(),
        }
    }
}

impl RiskConfig {
    /// Reject parameter sets the evaluator cannot work with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.min_observations < 2 {
            anyhow::bail!("min_observations must be at least 2, got {}", self.min_observations);
        }
        if self.volatility_lookback <= self.min_observations {
            anyhow::bail!(
                "volatility_lookback ({}) must exceed min_observations ({})",
                self.volatility_lookback,
                self.min_observations
            );
        }
        if !(self.stop_loss_vol_multiple.is_finite() && self.stop_loss_vol_multiple > 0.0) {
            anyhow::bail!("stop_loss_vol_multiple must be positive");
        }
        if !(self.reward_risk_ratio.is_finite() && self.reward_risk_ratio > 0.0) {
            anyhow::bail!("reward_risk_ratio must be positive");
        }
        if !(self.min_stop_loss_pct > 0.0 && self.min_stop_loss_pct <= self.max_stop_loss_pct) {
            anyhow::bail!(
                "stop loss bounds must satisfy 0 < min ({}) <= max ({})",
                self.min_stop_loss_pct,
                self.max_stop_loss_pct
            );
        }
        if !(self.var_confidence > 0.5 && self.var_confidence < 1.0) {
            anyhow::bail!("var_confidence must be in (0.5, 1), got {}", self.var_confidence);
        }
        if !(self.periods_per_year > 0.0) {
            anyhow::bail!("periods_per_year must be positive");
        }
        Ok(())
    }
}

fn default_volatility_lookback() -> usize {
    30
}

fn default_min_observations() -> usize {
    5
}

fn default_stop_loss_vol_multiple() -> f64 {
    2.0
}

fn default_reward_risk_ratio() -> f64 {
    2.0
}

fn default_min_stop_loss_pct() -> f64 {
    0.5
}

fn default_max_stop_loss_pct() -> f64 {
    25.0
}

fn default_var_confidence() -> f64 {
    0.95
}

fn default_periods_per_year() -> f64 {
    365.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RiskConfig::default();
        assert_eq!(config.stop_loss_vol_multiple, 2.0);
        assert_eq!(config.reward_risk_ratio, 2.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = RiskConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: RiskConfig = toml::from_str(&serialized).unwrap();

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: RiskConfig = toml::from_str("reward_risk_ratio = 3.0").unwrap();
        assert_eq!(config.reward_risk_ratio, 3.0);
        assert_eq!(config.volatility_lookback, 30);
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let config = RiskConfig {
            min_stop_loss_pct: 10.0,
            max_stop_loss_pct: 5.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
