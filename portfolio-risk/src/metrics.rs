//! Market risk metrics derived from a close-price series

use common::RiskComputationError;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Evidence the risk evaluator based its profile on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// Sample standard deviation of daily log returns
    pub daily_volatility: f64,

    /// `daily_volatility * sqrt(periods_per_year)`
    pub annualized_volatility: f64,

    /// Historical one-day Value at Risk, as a positive fraction
    pub var_95: Option<f64>,

    /// Maximum peak-to-trough decline of the closes (0.0 to 1.0)
    pub max_drawdown: f64,

    /// Number of log returns used
    pub observations: usize,

    pub last_close: f64,
}

/// Close-to-close log returns.
///
/// Every close must be strictly positive and finite.
pub fn log_returns(closes: &[f64]) -> Result<Vec<f64>, RiskComputationError> {
    if let Some(index) = closes.iter().position(|c| !(c.is_finite() && *c > 0.0)) {
        return Err(RiskComputationError::InvalidPrice(index));
    }

    Ok(closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect())
}

/// Sample standard deviation of returns; `None` below two observations
pub fn realized_volatility(returns: &[f64]) -> Option<f64> {
    if returns.len() < 2 {
        return None;
    }
    let vol = returns.iter().std_dev();
    vol.is_finite().then_some(vol)
}

/// Historical VaR: the loss not exceeded at `confidence`, as a positive fraction.
///
/// Returns `None` when there are fewer than two returns.
pub fn historical_var(returns: &[f64], confidence: f64) -> Option<f64> {
    if returns.len() < 2 {
        return None;
    }

    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let index = (((1.0 - confidence) * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    Some((-sorted[index]).max(0.0))
}

/// Drawdown calculation helper
#[derive(Debug, Clone)]
pub struct DrawdownCalculator {
    peak: f64,
    max_drawdown: f64,
    current_value: f64,
}

impl DrawdownCalculator {
    pub fn new() -> Self {
        Self {
            peak: 0.0,
            max_drawdown: 0.0,
            current_value: 0.0,
        }
    }

    /// Update with a new price
    pub fn update(&mut self, value: f64) {
        self.current_value = value;

        if value > self.peak {
            self.peak = value;
        }

        if self.peak > 0.0 {
            let drawdown = (self.peak - value) / self.peak;
            if drawdown > self.max_drawdown {
                self.max_drawdown = drawdown;
            }
        }
    }

    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }

    pub fn current_drawdown(&self) -> f64 {
        if self.peak > 0.0 {
            (self.peak - self.current_value) / self.peak
        } else {
            0.0
        }
    }
}

impl Default for DrawdownCalculator {
    fn default() -> Self {
        Self::new()
    }
}

/// Maximum drawdown over a whole series
pub fn max_drawdown(closes: &[f64]) -> f64 {
    let mut calc = DrawdownCalculator::new();
    for close in closes {
        calc.update(*close);
    }
    calc.max_drawdown()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drawdown_calculator() {
        let mut calc = DrawdownCalculator::new();

        calc.update(100.0);
        assert_eq!(calc.max_drawdown(), 0.0);

        calc.update(90.0);
        assert_eq!(calc.current_drawdown(), 0.1);
        assert_eq!(calc.max_drawdown(), 0.1);

        calc.update(95.0);
        assert_eq!(calc.current_drawdown(), 0.05);
        assert_eq!(calc.max_drawdown(), 0.1);

        calc.update(110.0);
        assert_eq!(calc.current_drawdown(), 0.0);
    }

    #[test]
    fn test_log_returns_reject_bad_prices() {
        assert_eq!(
            log_returns(&[100.0, 0.0, 101.0]),
            Err(RiskComputationError::InvalidPrice(1))
        );
        assert_eq!(
            log_returns(&[f64::NAN]),
            Err(RiskComputationError::InvalidPrice(0))
        );
    }

    #[test]
    fn test_realized_volatility_is_sample_std_dev() {
        // Returns alternate +r / -r around zero mean.
        let r = 0.02;
        let returns = vec![r, -r, r, -r];
        let vol = realized_volatility(&returns).unwrap();
        let expected = (4.0 * r * r / 3.0_f64).sqrt();
        assert!((vol - expected).abs() < 1e-12);

        assert_eq!(realized_volatility(&[0.01]), None);
    }

    #[test]
    fn test_constant_prices_have_zero_volatility() {
        let returns = log_returns(&[50.0; 10]).unwrap();
        assert_eq!(realized_volatility(&returns), Some(0.0));
    }

    #[test]
    fn test_historical_var() {
        let returns: Vec<f64> = (0..20).map(|i| (i as f64 - 10.0) / 100.0).collect();
        // Sorted lowest is -0.10; index floor(0.05 * 20) = 1 -> -0.09
        let var = historical_var(&returns, 0.95).unwrap();
        assert!((var - 0.09).abs() < 1e-12);

        let all_gains = vec![0.01, 0.02, 0.03];
        assert_eq!(historical_var(&all_gains, 0.95), Some(0.0));
    }

    #[test]
    fn test_max_drawdown_series() {
        assert!((max_drawdown(&[100.0, 120.0, 90.0, 130.0]) - 0.25).abs() < 1e-12);
    }
}
