//! Risk evaluation - hard position and exit constraints for one request

use crate::config::RiskConfig;
use crate::metrics::{historical_var, log_returns, max_drawdown, realized_volatility, RiskMetrics};
use common::{Candle, Portfolio, RiskComputationError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// The stop-loss / take-profit rule parameters a profile was built with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopRule {
    pub vol_multiple: f64,
    pub reward_risk_ratio: f64,
    pub min_pct: f64,
    pub max_pct: f64,
}

/// Hard constraints for the current request. Required before fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    /// `cash * leverage * risk_fraction`
    #[serde(with = "rust_decimal::serde::float")]
    pub max_position_margin: Decimal,

    /// Stop loss distance from entry, in percent
    pub stop_loss_pct: f64,

    /// Take profit distance from entry, in percent
    pub take_profit_pct: f64,

    pub risk_metrics: RiskMetrics,

    /// Portfolio the cap was computed from
    pub portfolio: Portfolio,

    pub stop_rule: StopRule,
}

impl RiskProfile {
    /// Stop loss as shown to the caller, e.g. `"4.12%"`
    pub fn stop_loss(&self) -> String {
        format!("{:.2}%", self.stop_loss_pct)
    }

    /// Take profit as shown to the caller, e.g. `"8.24%"`
    pub fn take_profit(&self) -> String {
        format!("{:.2}%", self.take_profit_pct)
    }
}

/// Computes a complete `RiskProfile` or fails; never returns a partial one
#[derive(Debug, Clone)]
pub struct RiskEvaluator {
    config: RiskConfig,
}

impl RiskEvaluator {
    pub fn new(config: RiskConfig) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// `cash * leverage * risk_fraction`, after validating each input
    pub fn max_position_margin(portfolio: &Portfolio) -> Result<Decimal, RiskComputationError> {
        if portfolio.cash <= Decimal::ZERO {
            return Err(RiskComputationError::NonPositiveCash(portfolio.cash.to_string()));
        }
        if portfolio.leverage < Decimal::ONE {
            return Err(RiskComputationError::InvalidLeverage(portfolio.leverage.to_string()));
        }
        if portfolio.risk_fraction <= Decimal::ZERO || portfolio.risk_fraction > Decimal::ONE {
            return Err(RiskComputationError::InvalidRiskFraction(
                portfolio.risk_fraction.to_string(),
            ));
        }

        portfolio
            .cash
            .checked_mul(portfolio.leverage)
            .and_then(|v| v.checked_mul(portfolio.risk_fraction))
            .ok_or_else(|| {
                RiskComputationError::Overflow(format!(
                    "{} * {} * {}",
                    portfolio.cash, portfolio.leverage, portfolio.risk_fraction
                ))
            })
    }

    /// Build the profile from the portfolio and the ingested candles
    pub fn evaluate(
        &self,
        portfolio: &Portfolio,
        candles: &[Candle],
    ) -> Result<RiskProfile, RiskComputationError> {
        let max_position_margin = Self::max_position_margin(portfolio)?;

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let window_start = closes.len().saturating_sub(self.config.volatility_lookback);
        let window = &closes[window_start..];

        // Report bad closes by their index in `candles`, not in the window
        let returns = log_returns(window).map_err(|e| match e {
            RiskComputationError::InvalidPrice(i) => RiskComputationError::InvalidPrice(window_start + i),
            other => other,
        })?;
        if returns.len() < self.config.min_observations {
            warn!(
                required = self.config.min_observations,
                available = returns.len(),
                "Not enough history for volatility"
            );
            return Err(RiskComputationError::InsufficientHistory {
                required: self.config.min_observations,
                available: returns.len(),
            });
        }

        let daily_volatility =
            realized_volatility(&returns).ok_or(RiskComputationError::NonFiniteVolatility)?;

        let stop_loss_pct = (self.config.stop_loss_vol_multiple * daily_volatility * 100.0)
            .clamp(self.config.min_stop_loss_pct, self.config.max_stop_loss_pct);
        let take_profit_pct = stop_loss_pct * self.config.reward_risk_ratio;

        let risk_metrics = RiskMetrics {
            daily_volatility,
            annualized_volatility: daily_volatility * self.config.periods_per_year.sqrt(),
            var_95: historical_var(&returns, self.config.var_confidence),
            max_drawdown: max_drawdown(window),
            observations: returns.len(),
            last_close: window.last().copied().unwrap_or_default(),
        };

        debug!(
            daily_volatility,
            var_95 = ?risk_metrics.var_95,
            max_drawdown = risk_metrics.max_drawdown,
            observations = risk_metrics.observations,
            "Risk metrics computed"
        );

        info!(
            max_position_margin = %max_position_margin,
            stop_loss_pct,
            take_profit_pct,
            "Risk profile ready"
        );

        Ok(RiskProfile {
            max_position_margin,
            stop_loss_pct,
            take_profit_pct,
            risk_metrics,
            portfolio: *portfolio,
            stop_rule: StopRule {
                vol_multiple: self.config.stop_loss_vol_multiple,
                reward_risk_ratio: self.config.reward_risk_ratio,
                min_pct: self.config.min_stop_loss_pct,
                max_pct: self.config.max_stop_loss_pct,
            },
        })
    }
}

impl Default for RiskEvaluator {
    fn default() -> Self {
        Self {
            config: RiskConfig::default(),
        }
    }
}
