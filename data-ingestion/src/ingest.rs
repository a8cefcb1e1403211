//! Ingest stage - resolves the request window and pulls market data
//!
//! Both the price series and the long/short pair are required. If either is
//! unavailable the stage fails with `DataUnavailable`, which aborts the run.

use crate::connectors::MarketDataProvider;
use chrono::{Months, NaiveDate, Utc};
use common::{DateRange, MarketSnapshot, PipelineError, PipelineRequest};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Resolve the analysis window.
///
/// `end` defaults to `today`; `start` defaults to one calendar month before
/// `end` (clamped to the last day of a shorter month).
pub fn resolve_date_range(
    start: Option<&str>,
    end: Option<&str>,
    today: NaiveDate,
) -> Result<DateRange, PipelineError> {
    let end = match end.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_date("end_date", raw)?,
        None => today,
    };

    let start = match start.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_date("start_date", raw)?,
        None => end.checked_sub_months(Months::new(1)).ok_or_else(|| {
            PipelineError::DataUnavailable(format!("cannot compute a start date before {}", end))
        })?,
    };

    if start > end {
        return Err(PipelineError::DataUnavailable(format!(
            "start_date {} is after end_date {}",
            start, end
        )));
    }

    Ok(DateRange { start, end })
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, PipelineError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| {
        PipelineError::DataUnavailable(format!("{} '{}' is not a YYYY-MM-DD date: {}", field, raw, e))
    })
}

/// Normalize a ticker symbol: trimmed, upper-case, non-empty
pub fn normalize_symbol(raw: &str) -> Result<String, PipelineError> {
    let symbol = raw.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(PipelineError::DataUnavailable("crypto symbol is empty".to_string()));
    }
    Ok(symbol)
}

/// First stage of the graph
#[derive(Clone)]
pub struct IngestStage {
    provider: Arc<dyn MarketDataProvider>,
}

impl IngestStage {
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self { provider }
    }

    /// Ingest using the current UTC date as the default window end
    pub async fn run(&self, request: &PipelineRequest) -> Result<MarketSnapshot, PipelineError> {
        self.run_at(request, Utc::now().date_naive()).await
    }

    /// Ingest with an explicit "today"
    pub async fn run_at(
        &self,
        request: &PipelineRequest,
        today: NaiveDate,
    ) -> Result<MarketSnapshot, PipelineError> {
        let start = Instant::now();
        let crypto = normalize_symbol(&request.crypto)?;
        let range = resolve_date_range(
            request.start_date.as_deref(),
            request.end_date.as_deref(),
            today,
        )?;

        info!(
            crypto = %crypto,
            start = %range.start,
            end = %range.end,
            provider = self.provider.name(),
            "Fetching market data"
        );

        // Independent requests; issue them together.
        let (prices, long_short) = tokio::join!(
            self.provider.price_series(&crypto, range),
            self.provider.long_short(&crypto),
        );

        let candles = prices.map_err(|e| {
            warn!(crypto = %crypto, error = %e, "Price series unavailable");
            PipelineError::DataUnavailable(format!("price series for {}: {}", crypto, e))
        })?;

        if candles.is_empty() {
            return Err(PipelineError::DataUnavailable(format!(
                "price series for {} is empty",
                crypto
            )));
        }

        let long_short = long_short.map_err(|e| {
            warn!(crypto = %crypto, error = %e, "Long/short data unavailable");
            PipelineError::DataUnavailable(format!("long/short data for {}: {}", crypto, e))
        })?;

        debug!(
            crypto = %crypto,
            candles = candles.len(),
            long = long_short.long,
            short = long_short.short,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Market data collected"
        );

        Ok(MarketSnapshot {
            crypto,
            range,
            candles,
            long_short,
        })
    }
}
