//! Recorded-data connector
//!
//! Serves candles, open interest, sentiment and social blobs from memory.
//! Used by the command-line runner (loaded from a JSON file) and by tests.

use super::{MarketDataProvider, SentimentSource, SocialSource};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use common::{Candle, DateRange, LongShort};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Recorded data for one symbol. Absent parts are reported as unavailable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolFixture {
    #[serde(default)]
    pub candles: Vec<Candle>,
    #[serde(default)]
    pub long_short: Option<LongShort>,
    #[serde(default)]
    pub sentiment: Option<serde_json::Value>,
    #[serde(default)]
    pub social: Option<serde_json::Value>,
}

/// On-disk layout: `{"symbols": {"SOL": {...}, "BTC": {...}}}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureFile {
    pub symbols: HashMap<String, SymbolFixture>,
}

/// In-memory connector implementing every collaborator trait
#[derive(Debug, Clone)]
pub struct FixtureConnector {
    name: String,
    symbols: HashMap<String, SymbolFixture>,
    latency: Option<Duration>,
}

impl FixtureConnector {
    pub fn new(file: FixtureFile) -> Self {
        let symbols = file
            .symbols
            .into_iter()
            .map(|(symbol, fixture)| (symbol.trim().to_uppercase(), fixture))
            .collect();

        Self {
            name: "fixture".to_string(),
            symbols,
            latency: None,
        }
    }

    /// Load a fixture file written as JSON
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture file {}", path.display()))?;
        let file: FixtureFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse fixture file {}", path.display()))?;
        Ok(Self::new(file))
    }

    pub fn with_symbol(mut self, symbol: &str, fixture: SymbolFixture) -> Self {
        self.symbols.insert(symbol.trim().to_uppercase(), fixture);
        self
    }

    /// Delay every call, to stand in for network latency
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.symbols.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    async fn lookup(&self, symbol: &str) -> Result<&SymbolFixture> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.symbols
            .get(&symbol.trim().to_uppercase())
            .ok_or_else(|| anyhow!("No recorded data for symbol {}", symbol))
    }
}

#[async_trait]
impl MarketDataProvider for FixtureConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn price_series(&self, symbol: &str, range: DateRange) -> Result<Vec<Candle>> {
        let fixture = self.lookup(symbol).await?;

        let candles: Vec<Candle> = fixture
            .candles
            .iter()
            .filter(|c| {
                let day = c.time.date_naive();
                day >= range.start && day <= range.end
            })
            .cloned()
            .collect();

        debug!(
            symbol,
            start = %range.start,
            end = %range.end,
            count = candles.len(),
            "Served recorded candles"
        );

        if candles.is_empty() {
            return Err(anyhow!(
                "No price data for {} between {} and {}",
                symbol,
                range.start,
                range.end
            ));
        }

        Ok(candles)
    }

    async fn long_short(&self, symbol: &str) -> Result<LongShort> {
        self.lookup(symbol)
            .await?
            .long_short
            .ok_or_else(|| anyhow!("No long/short data for {}", symbol))
    }
}

#[async_trait]
impl SentimentSource for FixtureConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn sentiment(&self, symbol: &str) -> Result<serde_json::Value> {
        self.lookup(symbol)
            .await?
            .sentiment
            .clone()
            .ok_or_else(|| anyhow!("No sentiment data for {}", symbol))
    }
}

#[async_trait]
impl SocialSource for FixtureConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn social_metrics(&self, symbol: &str) -> Result<serde_json::Value> {
        self.lookup(symbol)
            .await?
            .social
            .clone()
            .ok_or_else(|| anyhow!("No social metrics for {}", symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn candle(day: u32, close: f64) -> Candle {
        Candle {
            time: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    fn connector() -> FixtureConnector {
        FixtureConnector::new(FixtureFile::default()).with_symbol(
            "sol",
            SymbolFixture {
                candles: (1..=10).map(|d| candle(d, 100.0 + d as f64)).collect(),
                long_short: Some(LongShort { long: 3.0, short: 1.0 }),
                sentiment: None,
                social: Some(serde_json::json!({"social_volume": 10.0})),
            },
        )
    }

    #[tokio::test]
    async fn test_price_series_filters_by_range() {
        let range = DateRange {
            start: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
        };
        let candles = connector().price_series("SOL", range).await.unwrap();
        assert_eq!(candles.len(), 3);
        assert_eq!(candles[0].close, 103.0);
    }

    #[tokio::test]
    async fn test_out_of_range_is_unavailable() {
        let range = DateRange {
            start: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2023, 2, 1).unwrap(),
        };
        assert!(connector().price_series("SOL", range).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_parts_are_errors() {
        let c = connector();
        assert!(c.long_short("SOL").await.is_ok());
        assert!(c.sentiment("SOL").await.is_err());
        assert!(c.social_metrics("sol").await.is_ok());
        assert!(c.long_short("BTC").await.is_err());
    }

    #[test]
    fn test_fixture_file_roundtrips_through_json() {
        let json = r#"{"symbols":{"eth":{"long_short":{"long":1.0,"short":2.0}}}}"#;
        let file: FixtureFile = serde_json::from_str(json).unwrap();
        let connector = FixtureConnector::new(file);
        assert_eq!(connector.symbols(), vec!["ETH".to_string()]);
    }
}
