//! Caller-supplied request and portfolio state

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Portfolio settings used to size the position.
///
/// Missing fields fall back to the defaults of the public API:
/// $500k cash, 20x leverage, 1% risk per trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Portfolio {
    #[serde(alias = "balance", with = "rust_decimal::serde::float")]
    pub cash: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub leverage: Decimal,
    #[serde(alias = "risk", with = "rust_decimal::serde::float")]
    pub risk_fraction: Decimal,
}

impl Default for Portfolio {
    fn default() -> Self {
        Self {
            cash: Decimal::new(500_000, 0),
            leverage: Decimal::new(20, 0),
            risk_fraction: Decimal::new(1, 2),
        }
    }
}

/// Pipeline input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub crypto: String,
    #[serde(default, alias = "startDate")]
    pub start_date: Option<String>,
    #[serde(default, alias = "endDate")]
    pub end_date: Option<String>,
    #[serde(default)]
    pub portfolio: Portfolio,
}

impl PipelineRequest {
    pub fn new(crypto: impl Into<String>) -> Self {
        Self {
            crypto: crypto.into(),
            start_date: None,
            end_date: None,
            portfolio: Portfolio::default(),
        }
    }

    pub fn with_dates(mut self, start: Option<&str>, end: Option<&str>) -> Self {
        self.start_date = start.map(str::to_string);
        self.end_date = end.map(str::to_string);
        self
    }

    pub fn with_portfolio(mut self, portfolio: Portfolio) -> Self {
        self.portfolio = portfolio;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_portfolio_defaults() {
        let portfolio = Portfolio::default();
        assert_eq!(portfolio.cash, dec!(500000));
        assert_eq!(portfolio.leverage, dec!(20));
        assert_eq!(portfolio.risk_fraction, dec!(0.01));
    }

    #[test]
    fn test_request_accepts_api_field_names() {
        let request: PipelineRequest = serde_json::from_str(
            r#"{"crypto":"SOL","startDate":"2024-01-01","portfolio":{"balance":1000.0,"risk":0.02}}"#,
        )
        .unwrap();

        assert_eq!(request.crypto, "SOL");
        assert_eq!(request.start_date.as_deref(), Some("2024-01-01"));
        assert_eq!(request.end_date, None);
        assert_eq!(request.portfolio.cash, dec!(1000));
        assert_eq!(request.portfolio.leverage, dec!(20));
        assert_eq!(request.portfolio.risk_fraction, dec!(0.02));
    }
}
