//! Social Agent - turns social-media activity metrics into a signal
//!
//! Activity counters are capped against `min_engagement` and blended with the
//! feed's own sentiment reading into a single 0-1 score.

use super::agent::{format_percent, Agent, AgentConfig, AgentInput, AgentOutput};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use common::SourceId;
use data_ingestion::SocialSource;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Metrics the score is built from. Extra keys in the feed are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialMetrics {
    pub social_volume: f64,
    pub social_engagement: f64,
    pub social_contributors: f64,
    /// Feed sentiment, 0 (bearish) to 1 (bullish)
    pub social_sentiment: f64,
    #[serde(default)]
    pub alt_rank: Option<f64>,
    #[serde(default)]
    pub social_dominance: Option<f64>,
}

/// Blend weights for the social score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialWeights {
    pub volume: f64,
    pub engagement: f64,
    pub contributors: f64,
    pub sentiment: f64,
}

impl Default for SocialWeights {
    fn default() -> Self {
        Self {
            volume: 0.2,
            engagement: 0.3,
            contributors: 0.2,
            sentiment: 0.3,
        }
    }
}

/// Social agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialAgentConfig {
    pub base: AgentConfig,
    pub weights: SocialWeights,
    /// Counter value that saturates a normalized metric at 1.0
    pub min_engagement: f64,
    pub bullish_above: f64,
    pub bearish_below: f64,
}

impl Default for SocialAgentConfig {
    fn default() -> Self {
        Self {
            base: AgentConfig::new("social-agent", "Social Monitor Agent"),
            weights: SocialWeights::default(),
            min_engagement: 1000.0,
            bullish_above: 0.6,
            bearish_below: 0.4,
        }
    }
}

/// Social Agent - reads a `SocialSource` for the requested symbol
pub struct SocialAgent {
    config: SocialAgentConfig,
    source: Arc<dyn SocialSource>,
}

impl SocialAgent {
    pub fn new(config: SocialAgentConfig, source: Arc<dyn SocialSource>) -> Self {
        Self { config, source }
    }

    /// Parse the loosely-typed feed blob; missing required metrics is an error
    pub fn parse_metrics(blob: &serde_json::Value) -> Result<SocialMetrics> {
        let metrics: SocialMetrics =
            serde_json::from_value(blob.clone()).context("social metrics blob is incomplete")?;

        let counters = [
            metrics.social_volume,
            metrics.social_engagement,
            metrics.social_contributors,
            metrics.social_sentiment,
        ];
        if counters.iter().any(|v| !v.is_finite()) {
            return Err(anyhow!("social metrics contain non-finite values"));
        }
        Ok(metrics)
    }

    /// Weighted blend of the capped counters and feed sentiment, in `[0, 1]`
    pub fn score(&self, metrics: &SocialMetrics) -> f64 {
        let cap = |v: f64| (v / self.config.min_engagement).clamp(0.0, 1.0);
        let w = &self.config.weights;

        let score = w.volume * cap(metrics.social_volume)
            + w.engagement * cap(metrics.social_engagement)
            + w.contributors * cap(metrics.social_contributors)
            + w.sentiment * metrics.social_sentiment;

        score.clamp(0.0, 1.0)
    }

    /// Map a score to `(signal, confidence)`
    pub fn classify(&self, score: f64) -> (&'static str, f64) {
        if score > self.config.bullish_above {
            ("bullish", score)
        } else if score < self.config.bearish_below {
            ("bearish", 1.0 - score)
        } else {
            ("neutral", 0.5)
        }
    }
}

#[async_trait]
impl Agent for SocialAgent {
    fn config(&self) -> &AgentConfig {
        &self.config.base
    }

    fn source(&self) -> SourceId {
        SourceId::Social
    }

    async fn analyze(&self, input: AgentInput) -> Result<AgentOutput> {
        let start = Instant::now();
        let symbol = &input.snapshot.crypto;

        let blob = self
            .source
            .social_metrics(symbol)
            .await
            .with_context(|| format!("{} has no social metrics for {}", self.source.name(), symbol))?;
        let metrics = Self::parse_metrics(&blob)?;

        let score = self.score(&metrics);
        let (signal, confidence) = self.classify(score);
        debug!(?metrics, score, "Social metrics scored");
        info!(symbol = %symbol, signal, score, "Social signal computed");

        let reasoning = format!(
            "Social Media Analysis for {symbol}:\n\
             1. Activity: volume {:.0}, engagement {:.0}, contributors {:.0}\n\
             2. Feed sentiment: {:.2}\n\
             3. Overall social score: {:.2}",
            metrics.social_volume,
            metrics.social_engagement,
            metrics.social_contributors,
            metrics.social_sentiment,
            score,
        );

        let raw = json!({
            "signal": signal,
            "confidence": format_percent(confidence),
            "reasoning": reasoning,
            "social_metrics": metrics,
            "sentiment_score": score,
        });

        Ok(AgentOutput::new(&self.config.base, self.source(), raw, start))
    }
}
