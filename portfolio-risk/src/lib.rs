//! Portfolio & Risk Management (Layer 3)
//!
//! Turns the caller's portfolio settings and the ingested price history into
//! the hard constraints every decision must respect: the maximum position
//! margin and volatility-derived stop-loss / take-profit distances.

mod config;
mod metrics;
mod risk;

pub use config::RiskConfig;
pub use metrics::{historical_var, log_returns, max_drawdown, realized_volatility, DrawdownCalculator, RiskMetrics};
pub use risk::{RiskEvaluator, RiskProfile, StopRule};
