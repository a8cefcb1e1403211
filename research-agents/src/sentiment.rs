//! Sentiment Agent - reads positioning from the long/short open interest split
//!
//! By default the signal is derived from the `LongShort` pair in the ingested
//! snapshot. When an external `SentimentSource` is attached, its blob is
//! forwarded untouched and the normalizer deals with whatever shape it has.

use super::agent::{format_percent, Agent, AgentConfig, AgentInput, AgentOutput};
use anyhow::{bail, Result};
use async_trait::async_trait;
use common::{LongShort, SourceId};
use data_ingestion::SentimentSource;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Sentiment agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentAgentConfig {
    pub base: AgentConfig,
}

impl Default for SentimentAgentConfig {
    fn default() -> Self {
        Self {
            base: AgentConfig::new("sentiment-agent", "Sentiment Analysis Agent"),
        }
    }
}

/// Which side of the book dominates, and by how much
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositioningScore {
    pub bull_pct: f64,
    pub bear_pct: f64,
    pub bullish: bool,
    /// Percentage of the dominant side (0-100)
    pub confidence_pct: f64,
}

/// Sentiment Agent - positioning based signal
pub struct SentimentAgent {
    config: SentimentAgentConfig,
    source: Option<Arc<dyn SentimentSource>>,
}

impl SentimentAgent {
    /// Create a new sentiment agent working from the snapshot's long/short pair
    pub fn new(config: SentimentAgentConfig) -> Self {
        Self { config, source: None }
    }

    /// Forward an external source's blob instead of computing positioning
    pub fn with_source(mut self, source: Arc<dyn SentimentSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Dominant side wins; an exact tie is reported as bearish.
    pub fn positioning(long_short: &LongShort) -> Result<PositioningScore> {
        let total = long_short.total();
        if !total.is_finite() || total <= 0.0 || long_short.long < 0.0 || long_short.short < 0.0 {
            bail!(
                "invalid long/short split: long={} short={}",
                long_short.long,
                long_short.short
            );
        }

        let bull_pct = long_short.long / total * 100.0;
        let bear_pct = long_short.short / total * 100.0;
        let bullish = bull_pct > bear_pct;

        Ok(PositioningScore {
            bull_pct,
            bear_pct,
            bullish,
            confidence_pct: if bullish { bull_pct } else { bear_pct },
        })
    }

    fn reasoning(symbol: &str, long_short: &LongShort, score: &PositioningScore) -> String {
        let ratio = long_short
            .ratio()
            .map(|r| format!("{:.2}", r))
            .unwrap_or_else(|| "n/a".to_string());

        format!(
            "Sentiment Analysis for {symbol}:\n\
             1. Positioning: long {:.0} ({:.1}%), short {:.0} ({:.1}%), total {:.0}\n\
             2. Long/Short ratio: {ratio} (>1 indicates bullish bias)\n\
             3. Confidence: {:.1}% from the dominant side",
            long_short.long,
            score.bull_pct,
            long_short.short,
            score.bear_pct,
            long_short.total(),
            score.confidence_pct,
        )
    }
}

#[async_trait]
impl Agent for SentimentAgent {
    fn config(&self) -> &AgentConfig {
        &self.config.base
    }

    fn source(&self) -> SourceId {
        SourceId::Sentiment
    }

    async fn analyze(&self, input: AgentInput) -> Result<AgentOutput> {
        let start = Instant::now();
        let snapshot = &input.snapshot;

        if let Some(source) = &self.source {
            let blob = source.sentiment(&snapshot.crypto).await?;
            debug!(source = source.name(), symbol = %snapshot.crypto, "Forwarding external sentiment");
            return Ok(AgentOutput::new(&self.config.base, self.source(), blob, start));
        }

        let score = Self::positioning(&snapshot.long_short)?;
        let signal = if score.bullish { "bullish" } else { "bearish" };

        info!(
            symbol = %snapshot.crypto,
            signal,
            confidence_pct = score.confidence_pct,
            "Sentiment computed"
        );

        let raw = json!({
            "signal": signal,
            "confidence": format_percent(score.confidence_pct / 100.0),
            "reasoning": Self::reasoning(&snapshot.crypto, &snapshot.long_short, &score),
            "positioning": score,
        });

        Ok(AgentOutput::new(&self.config.base, self.source(), raw, start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentInput;
    use chrono::NaiveDate;
    use common::{DateRange, MarketSnapshot};
    use uuid::Uuid;

    struct StaticSentiment;

    #[async_trait]
    impl SentimentSource for StaticSentiment {
        fn name(&self) -> &str {
            "static"
        }

        async fn sentiment(&self, _symbol: &str) -> Result<serde_json::Value> {
            Ok(json!({"signal": "SELL", "confidence": 0.8}))
        }
    }

    fn snapshot(long: f64, short: f64) -> Arc<MarketSnapshot> {
        Arc::new(MarketSnapshot {
            crypto: "ETH".to_string(),
            range: DateRange {
                start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            },
            candles: vec![],
            long_short: LongShort { long, short },
        })
    }

    #[tokio::test]
    async fn test_sentiment_agent_creation() {
        let agent = SentimentAgent::new(SentimentAgentConfig::default());
        assert_eq!(agent.config().agent_id, "sentiment-agent");
        assert_eq!(agent.source(), SourceId::Sentiment);
    }

    #[test]
    fn test_positioning_dominant_side() {
        let score = SentimentAgent::positioning(&LongShort { long: 60.0, short: 40.0 }).unwrap();
        assert!(score.bullish);
        assert!((score.confidence_pct - 60.0).abs() < 1e-9);

        let score = SentimentAgent::positioning(&LongShort { long: 25.0, short: 75.0 }).unwrap();
        assert!(!score.bullish);
        assert!((score.confidence_pct - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_tie_is_bearish() {
        let score = SentimentAgent::positioning(&LongShort { long: 50.0, short: 50.0 }).unwrap();
        assert!(!score.bullish);
        assert_eq!(score.confidence_pct, 50.0);
    }

    #[test]
    fn test_empty_book_is_error() {
        assert!(SentimentAgent::positioning(&LongShort { long: 0.0, short: 0.0 }).is_err());
    }

    #[tokio::test]
    async fn test_analyze_emits_percent_blob() {
        let agent = SentimentAgent::new(SentimentAgentConfig::default());
        let output = agent
            .analyze(AgentInput::new(Uuid::new_v4(), snapshot(10.0, 0.0)))
            .await
            .unwrap();
        assert_eq!(output.raw["signal"], "bullish");
        assert_eq!(output.raw["confidence"], "100.0%");
        assert!(output.raw["reasoning"].as_str().unwrap().contains("n/a"));
    }

    #[tokio::test]
    async fn test_all_short_book_reports_zero_ratio() {
        let agent = SentimentAgent::new(SentimentAgentConfig::default());
        let output = agent
            .analyze(AgentInput::new(Uuid::new_v4(), snapshot(0.0, 10.0)))
            .await
            .unwrap();
        assert_eq!(output.raw["signal"], "bearish");
        assert_eq!(output.raw["confidence"], "100.0%");
        assert!(output.raw["reasoning"].as_str().unwrap().contains("ratio: 0.00"));
    }

    #[tokio::test]
    async fn test_external_source_is_forwarded() {
        let agent = SentimentAgent::new(SentimentAgentConfig::default()).with_source(Arc::new(StaticSentiment));
        let output = agent
            .analyze(AgentInput::new(Uuid::new_v4(), snapshot(0.0, 0.0)))
            .await
            .unwrap();
        assert_eq!(output.raw, json!({"signal": "SELL", "confidence": 0.8}));
    }
}
