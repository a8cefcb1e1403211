//! Decision Fuser - weighted fusion under the risk cap
//!
//! `score = Σ direction × confidence × weight` over the three analysis
//! branches, always summed in the same order. The risk profile bounds the
//! position; it never votes. The reasoning trail prints every number with
//! Rust's shortest round-trip float formatting so the score can be
//! recomputed from the text alone.

use crate::config::{FusionWeights, PipelineConfig};
use crate::context::Context;
use common::{Direction, NormalizationFallback, PipelineError, SourceId};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::fmt::{self, Write};
use tracing::{debug, info};

/// Fused call, upper-case on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FusedSignal {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for FusedSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FusedSignal::Bullish => "BULLISH",
            FusedSignal::Bearish => "BEARISH",
            FusedSignal::Neutral => "NEUTRAL",
        })
    }
}

/// Suggester opinion after normalization
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Advisory {
    pub suggester: String,
    pub direction: Direction,
    /// Fraction, 0-1
    pub confidence: f64,
    pub raw: serde_json::Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<NormalizationFallback>,
}

/// Final recommendation. Only the fuser can build one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    signal: FusedSignal,

    /// Percent, 0-100; `"NN.N%"` on the wire
    #[serde(serialize_with = "serialize_percent")]
    confidence: f64,

    #[serde(with = "rust_decimal::serde::float")]
    position_size: Decimal,

    stop_loss: String,
    take_profit: String,
    reasoning: String,

    /// Normalized suggester opinion; reported, never fused
    #[serde(skip_serializing_if = "Option::is_none")]
    advisory: Option<Advisory>,

    #[serde(skip)]
    score: f64,
}

fn serialize_percent<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{:.1}%", value))
}

impl Decision {
    pub fn signal(&self) -> FusedSignal {
        self.signal
    }

    /// Percent, 0-100
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// `"NN.N%"`
    pub fn confidence_label(&self) -> String {
        format!("{:.1}%", self.confidence)
    }

    pub fn position_size(&self) -> Decimal {
        self.position_size
    }

    pub fn stop_loss(&self) -> &str {
        &self.stop_loss
    }

    pub fn take_profit(&self) -> &str {
        &self.take_profit
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn advisory(&self) -> Option<&Advisory> {
        self.advisory.as_ref()
    }

    /// Raw fused score the decision was taken on
    pub fn score(&self) -> f64 {
        self.score
    }

    pub(crate) fn with_advisory(mut self, advisory: Advisory) -> Self {
        self.advisory = Some(advisory);
        self
    }
}

#[derive(Debug, Clone)]
pub struct DecisionFuser {
    weights: FusionWeights,
    neutral_threshold: f64,
}

impl DecisionFuser {
    pub fn new(weights: FusionWeights, neutral_threshold: f64) -> Result<Self, PipelineError> {
        weights.validate()?;
        Ok(Self {
            weights,
            neutral_threshold,
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        Self::new(config.weights.clone(), config.neutral_threshold)
    }

    pub fn weights(&self) -> &FusionWeights {
        &self.weights
    }

    /// Fuse the three branch records under the context's risk profile.
    ///
    /// Fails with `MissingSignal` unless every branch and the risk profile are
    /// present; never returns a partial decision.
    pub fn fuse(&self, context: &Context) -> Result<Decision, PipelineError> {
        let mut records = Vec::with_capacity(SourceId::ANALYSIS.len());
        for source in SourceId::ANALYSIS {
            let record = context
                .signal(source)
                .ok_or_else(|| PipelineError::MissingSignal(source.to_string()))?;
            records.push(record);
        }
        let risk = context
            .risk_profile()
            .ok_or_else(|| PipelineError::MissingSignal("risk".to_string()))?;

        let mut trail = format!("Decision for {}\n", context.crypto);
        let mut contributions = Vec::with_capacity(records.len());

        for record in &records {
            let source = record.source_id();
            let weight = self.weights.weight(source);
            let contribution = record.direction().as_f64() * record.confidence() * weight;
            contributions.push(contribution);

            let _ = write!(
                trail,
                "{}: direction={} confidence={} weight={} contribution={}",
                source,
                record.direction().value(),
                record.confidence(),
                weight,
                contribution
            );
            if let Some(reason) = record.degraded_reason() {
                let _ = write!(trail, " [degraded: {}]", reason);
            }
            trail.push('\n');
        }

        let score: f64 = contributions.iter().sum();
        let terms: Vec<String> = contributions.iter().map(|c| c.to_string()).collect();
        let _ = writeln!(trail, "score = {} = {}", terms.join(" + "), score);

        let (signal, confidence, position_size) = if score.abs() < self.neutral_threshold {
            let _ = writeln!(
                trail,
                "|score| {} < neutral_threshold {} -> NEUTRAL, confidence 50.0%, no position",
                score.abs(),
                self.neutral_threshold
            );
            (FusedSignal::Neutral, 50.0, Decimal::ZERO)
        } else {
            let (signal, position) = if score > 0.0 {
                (FusedSignal::Bullish, risk.max_position_margin)
            } else {
                (FusedSignal::Bearish, -risk.max_position_margin)
            };
            let confidence = (score.abs() * 100.0).min(100.0);
            let _ = writeln!(
                trail,
                "|score| {} >= neutral_threshold {} -> {}, confidence min(|score| x 100, 100) = {}%",
                score.abs(),
                self.neutral_threshold,
                signal,
                confidence
            );
            (signal, confidence, position)
        };

        let portfolio = &risk.portfolio;
        let _ = writeln!(
            trail,
            "risk weight {} is a hard cap, not a vote: cap = cash {} x leverage {} x risk_fraction {} = {}",
            self.weights.risk,
            portfolio.cash,
            portfolio.leverage,
            portfolio.risk_fraction,
            risk.max_position_margin
        );
        let _ = writeln!(trail, "position_size = {}", position_size);

        let rule = &risk.stop_rule;
        let _ = write!(
            trail,
            "stop_loss = clamp({} x daily_volatility {} x 100, {}, {}) = {}%; take_profit = {} x {} = {}%",
            rule.vol_multiple,
            risk.risk_metrics.daily_volatility,
            rule.min_pct,
            rule.max_pct,
            risk.stop_loss_pct,
            risk.stop_loss_pct,
            rule.reward_risk_ratio,
            risk.take_profit_pct
        );

        debug!(score, contributions = ?contributions, "Signals fused");
        info!(
            crypto = %context.crypto,
            signal = %signal,
            confidence,
            position_size = %position_size,
            "Decision produced"
        );

        Ok(Decision {
            signal,
            confidence,
            position_size,
            stop_loss: risk.stop_loss(),
            take_profit: risk.take_profit(),
            reasoning: trail,
            advisory: None,
            score,
        })
    }
}
