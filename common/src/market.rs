//! Market data handed from ingest to the analysis branches

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

/// Long/short open-interest pair for a symbol
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LongShort {
    pub long: f64,
    pub short: f64,
}

impl LongShort {
    pub fn total(&self) -> f64 {
        self.long + self.short
    }

    /// Long over short; `None` when there are no shorts.
    pub fn ratio(&self) -> Option<f64> {
        if self.short > 0.0 {
            Some(self.long / self.short)
        } else {
            None
        }
    }
}

/// Inclusive calendar date range (`YYYY-MM-DD` on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Everything ingest produced for one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub crypto: String,
    pub range: DateRange,
    pub candles: Vec<Candle>,
    pub long_short: LongShort,
}

impl MarketSnapshot {
    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.candles.last().map(|c| c.close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_short_ratio() {
        let ls = LongShort { long: 30.0, short: 10.0 };
        assert_eq!(ls.total(), 40.0);
        assert_eq!(ls.ratio(), Some(3.0));

        let no_shorts = LongShort { long: 5.0, short: 0.0 };
        assert_eq!(no_shorts.ratio(), None);
    }

    #[test]
    fn test_date_range_days_inclusive() {
        let range = DateRange {
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        };
        assert_eq!(range.days(), 31);
        let json = serde_json::to_value(range).unwrap();
        assert_eq!(json["start"], "2024-01-01");
    }
}
