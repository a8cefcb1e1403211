//! Technical Agent - price-series strategies combined into one signal
//!
//! Four independent strategies each vote `(direction, confidence)`:
//! - trend following on EMA alignment
//! - mean reversion on the z-score of the last close
//! - momentum over short and medium horizons
//! - volatility regime (short over long realized volatility)
//!
//! The votes are combined with fixed strategy weights.

use super::agent::{format_percent, Agent, AgentConfig, AgentInput, AgentOutput};
use anyhow::{bail, Result};
use async_trait::async_trait;
use common::{Direction, SourceId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Instant;
use tracing::{debug, info};

/// Strategy weights; normalized by their total when combined
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyWeights {
    pub trend: f64,
    pub mean_reversion: f64,
    pub momentum: f64,
    pub volatility: f64,
}

impl Default for StrategyWeights {
    fn default() -> Self {
        Self {
            trend: 0.30,
            mean_reversion: 0.25,
            momentum: 0.30,
            volatility: 0.15,
        }
    }
}

/// Technical agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalAgentConfig {
    pub base: AgentConfig,
    pub weights: StrategyWeights,
    pub ema_fast: usize,
    pub ema_medium: usize,
    pub ema_slow: usize,
    pub zscore_window: usize,
    pub zscore_entry: f64,
    pub momentum_short: usize,
    pub momentum_long: usize,
    pub momentum_entry: f64,
    pub vol_short: usize,
    pub vol_long: usize,
    /// `|combined|` above this is a directional call
    pub signal_threshold: f64,
}

impl Default for TechnicalAgentConfig {
    fn default() -> Self {
        Self {
            base: AgentConfig::new("technical-agent", "Technical Analysis Agent"),
            weights: StrategyWeights::default(),
            ema_fast: 5,
            ema_medium: 10,
            ema_slow: 20,
            zscore_window: 20,
            zscore_entry: 2.0,
            momentum_short: 5,
            momentum_long: 20,
            momentum_entry: 0.05,
            vol_short: 5,
            vol_long: 20,
            signal_threshold: 0.2,
        }
    }
}

impl TechnicalAgentConfig {
    /// Fewest candles every strategy can work with
    pub fn min_candles(&self) -> usize {
        [
            self.ema_slow,
            self.zscore_window,
            self.momentum_long + 1,
            self.vol_long + 1,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

/// One strategy's vote
#[derive(Debug, Clone, PartialEq)]
pub struct StrategySignal {
    pub direction: Direction,
    pub confidence: f64,
    pub metrics: Value,
}

impl StrategySignal {
    fn neutral(metrics: Value) -> Self {
        Self {
            direction: Direction::Neutral,
            confidence: 0.5,
            metrics,
        }
    }

    fn to_json(&self) -> Value {
        json!({
            "signal": self.direction.label(),
            "confidence": format_percent(self.confidence),
            "metrics": self.metrics,
        })
    }
}

/// EMA seeded with the SMA of the first `period` values; last value only
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;
    Some(values[period..].iter().fold(seed, |prev, v| alpha * v + (1.0 - alpha) * prev))
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn log_returns(closes: &[f64]) -> Vec<f64> {
    closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect()
}

/// Technical Agent - analyzes the ingested price series
pub struct TechnicalAgent {
    config: TechnicalAgentConfig,
}

impl TechnicalAgent {
    pub fn new(config: TechnicalAgentConfig) -> Self {
        Self { config }
    }

    fn trend_following(&self, closes: &[f64]) -> StrategySignal {
        let (Some(fast), Some(medium), Some(slow)) = (
            ema(closes, self.config.ema_fast),
            ema(closes, self.config.ema_medium),
            ema(closes, self.config.ema_slow),
        ) else {
            return StrategySignal::neutral(json!({}));
        };

        let metrics = json!({"ema_fast": fast, "ema_medium": medium, "ema_slow": slow});
        let direction = if fast > medium && medium > slow {
            Direction::Bullish
        } else if fast < medium && medium < slow {
            Direction::Bearish
        } else {
            return StrategySignal::neutral(metrics);
        };

        StrategySignal {
            direction,
            confidence: ((fast / slow - 1.0).abs() * 10.0).min(1.0),
            metrics,
        }
    }

    fn mean_reversion(&self, closes: &[f64]) -> StrategySignal {
        let window = &closes[closes.len().saturating_sub(self.config.zscore_window)..];
        let (mean, std) = mean_std(window);
        let last = window.last().copied().unwrap_or(mean);
        if std <= f64::EPSILON || !std.is_finite() {
            return StrategySignal::neutral(json!({"z_score": 0.0}));
        }

        let z = (last - mean) / std;
        let metrics = json!({"z_score": z, "mean": mean, "std_dev": std});
        let direction = if z < -self.config.zscore_entry {
            Direction::Bullish
        } else if z > self.config.zscore_entry {
            Direction::Bearish
        } else {
            return StrategySignal::neutral(metrics);
        };

        StrategySignal {
            direction,
            confidence: (z.abs() / 4.0).min(1.0),
            metrics,
        }
    }

    fn momentum(&self, closes: &[f64]) -> StrategySignal {
        let last = closes[closes.len() - 1];
        let ret = |lag: usize| last / closes[closes.len() - 1 - lag] - 1.0;
        let short = ret(self.config.momentum_short);
        let long = ret(self.config.momentum_long);
        let m = 0.6 * short + 0.4 * long;

        let metrics = json!({"return_short": short, "return_long": long, "momentum": m});
        let direction = if m > self.config.momentum_entry {
            Direction::Bullish
        } else if m < -self.config.momentum_entry {
            Direction::Bearish
        } else {
            return StrategySignal::neutral(metrics);
        };

        StrategySignal {
            direction,
            confidence: (m.abs() * 5.0).min(1.0),
            metrics,
        }
    }

    fn volatility_regime(&self, closes: &[f64]) -> StrategySignal {
        let returns = log_returns(closes);
        let tail = |n: usize| &returns[returns.len().saturating_sub(n)..];
        let (_, short_vol) = mean_std(tail(self.config.vol_short));
        let (_, long_vol) = mean_std(tail(self.config.vol_long));
        if long_vol <= f64::EPSILON || !long_vol.is_finite() {
            return StrategySignal::neutral(json!({"vol_ratio": 1.0}));
        }

        let ratio = short_vol / long_vol;
        let metrics = json!({"short_vol": short_vol, "long_vol": long_vol, "vol_ratio": ratio});
        let direction = if ratio < 0.8 {
            Direction::Bullish
        } else if ratio > 1.2 {
            Direction::Bearish
        } else {
            return StrategySignal::neutral(metrics);
        };

        StrategySignal {
            direction,
            confidence: (ratio - 1.0).abs().min(1.0),
            metrics,
        }
    }

    /// Run every strategy and combine; errors on too little or bad history
    pub fn evaluate(&self, closes: &[f64]) -> Result<(Direction, f64, Vec<(&'static str, StrategySignal)>)> {
        let required = self.config.min_candles();
        if closes.len() < required {
            bail!("technical analysis needs {} candles, got {}", required, closes.len());
        }
        if let Some(i) = closes.iter().position(|c| !(c.is_finite() && *c > 0.0)) {
            bail!("invalid close at index {}", i);
        }

        let w = &self.config.weights;
        let strategies = vec![
            ("trend_following", w.trend, self.trend_following(closes)),
            ("mean_reversion", w.mean_reversion, self.mean_reversion(closes)),
            ("momentum", w.momentum, self.momentum(closes)),
            ("volatility", w.volatility, self.volatility_regime(closes)),
        ];

        let total_weight: f64 = strategies.iter().map(|(_, weight, _)| weight).sum();
        if total_weight <= 0.0 {
            bail!("strategy weights sum to zero");
        }
        let combined = strategies
            .iter()
            .map(|(_, weight, s)| s.direction.as_f64() * s.confidence * weight)
            .sum::<f64>()
            / total_weight;

        let direction = if combined > self.config.signal_threshold {
            Direction::Bullish
        } else if combined < -self.config.signal_threshold {
            Direction::Bearish
        } else {
            Direction::Neutral
        };

        Ok((
            direction,
            combined.abs().min(1.0),
            strategies.into_iter().map(|(name, _, s)| (name, s)).collect(),
        ))
    }
}

impl Default for TechnicalAgent {
    fn default() -> Self {
        Self::new(TechnicalAgentConfig::default())
    }
}

#[async_trait]
impl Agent for TechnicalAgent {
    fn config(&self) -> &AgentConfig {
        &self.config.base
    }

    fn source(&self) -> SourceId {
        SourceId::Technical
    }

    async fn analyze(&self, input: AgentInput) -> Result<AgentOutput> {
        let start = Instant::now();
        let closes = input.snapshot.closes();
        let (direction, confidence, strategies) = self.evaluate(&closes)?;

        let mut strategy_signals = Map::new();
        let mut lines = Vec::with_capacity(strategies.len());
        for (name, s) in &strategies {
            debug!(strategy = *name, signal = s.direction.label(), confidence = s.confidence);
            lines.push(format!("{}: {} ({})", name, s.direction.label(), format_percent(s.confidence)));
            strategy_signals.insert(name.to_string(), s.to_json());
        }

        info!(
            symbol = %input.snapshot.crypto,
            signal = direction.label(),
            confidence,
            candles = closes.len(),
            "Technical signal computed"
        );

        let raw = json!({
            "signal": direction.label(),
            "confidence": format_percent(confidence),
            "strategy_signals": strategy_signals,
            "reasoning": format!("Technical Analysis for {}: {}", input.snapshot.crypto, lines.join("; ")),
        });

        Ok(AgentOutput::new(&self.config.base, self.source(), raw, start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trending(n: usize, step: f64) -> Vec<f64> {
        (0..n).map(|i| 100.0 * (1.0 + step).powi(i as i32)).collect()
    }

    #[test]
    fn test_ema_constant_series() {
        assert!((ema(&[10.0; 30], 5).unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(ema(&[10.0; 3], 5), None);
    }

    #[test]
    fn test_min_candles() {
        assert_eq!(TechnicalAgentConfig::default().min_candles(), 21);
    }

    #[test]
    fn test_uptrend_is_bullish() {
        let agent = TechnicalAgent::default();
        let closes = trending(31, 0.02);

        let trend = agent.trend_following(&closes);
        assert_eq!(trend.direction, Direction::Bullish);

        let momentum = agent.momentum(&closes);
        assert_eq!(momentum.direction, Direction::Bullish);
        assert_eq!(momentum.confidence, 1.0);

        let (direction, confidence, strategies) = agent.evaluate(&closes).unwrap();
        assert_eq!(direction, Direction::Bullish);
        assert!(confidence > 0.2);
        assert_eq!(strategies.len(), 4);
    }

    #[test]
    fn test_downtrend_is_bearish() {
        let agent = TechnicalAgent::default();
        let (direction, _, _) = agent.evaluate(&trending(31, -0.02)).unwrap();
        assert_eq!(direction, Direction::Bearish);
    }

    #[test]
    fn test_flat_series_is_neutral() {
        let agent = TechnicalAgent::default();
        let (direction, confidence, _) = agent.evaluate(&[100.0; 30]).unwrap();
        assert_eq!(direction, Direction::Neutral);
        assert!(confidence < 1e-9);
    }

    #[test]
    fn test_mean_reversion_spike() {
        let agent = TechnicalAgent::default();
        let mut closes = vec![100.0; 19];
        closes.push(150.0);
        let signal = agent.mean_reversion(&closes);
        // mean 102.5, population std ~10.9, z ~4.36
        assert_eq!(signal.direction, Direction::Bearish);
        assert!(signal.confidence > 0.5);
    }

    #[test]
    fn test_short_history_is_error() {
        let agent = TechnicalAgent::default();
        assert!(agent.evaluate(&trending(10, 0.01)).is_err());
    }

    #[test]
    fn test_bad_close_is_error() {
        let agent = TechnicalAgent::default();
        let mut closes = trending(30, 0.01);
        closes[7] = 0.0;
        assert!(agent.evaluate(&closes).is_err());
    }
}
