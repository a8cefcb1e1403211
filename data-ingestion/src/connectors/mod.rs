//! Collaborator interfaces for third-party data
//!
//! Concrete HTTP clients live outside this workspace; anything implementing
//! these traits can be plugged into the pipeline. `FixtureConnector` serves
//! recorded data from memory or a JSON file.

pub mod fixture;

pub use fixture::{FixtureConnector, FixtureFile, SymbolFixture};

use async_trait::async_trait;
use common::{Candle, DateRange, LongShort};

/// Price history and open-interest data for a symbol.
///
/// An `Err` means the data is unavailable for this request.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Daily candles within `range`, oldest first
    async fn price_series(&self, symbol: &str, range: DateRange) -> anyhow::Result<Vec<Candle>>;

    /// Current long/short open-interest pair
    async fn long_short(&self, symbol: &str) -> anyhow::Result<LongShort>;
}

/// External sentiment feed returning a loosely-typed signal blob
/// (`{"signal": ..., "confidence": ...}`)
#[async_trait]
pub trait SentimentSource: Send + Sync {
    fn name(&self) -> &str;

    async fn sentiment(&self, symbol: &str) -> anyhow::Result<serde_json::Value>;
}

/// Social-media metrics feed returning a loosely-typed metrics blob
#[async_trait]
pub trait SocialSource: Send + Sync {
    fn name(&self) -> &str;

    async fn social_metrics(&self, symbol: &str) -> anyhow::Result<serde_json::Value>;
}
