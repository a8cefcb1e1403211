//! Shared types for the decision pipeline
//!
//! Every layer (ingestion, agents, risk, fusion) speaks in these types:
//! - `SignalRecord` is the canonical output of an analysis stage
//! - `MarketSnapshot` is what ingest hands to the analysis branches
//! - `Portfolio` / `PipelineRequest` describe the caller's request
//! - `PipelineError` is the failure taxonomy surfaced to callers

pub mod error;
pub mod market;
pub mod portfolio;
pub mod signal;

pub use error::{PipelineError, RiskComputationError};
pub use market::{Candle, DateRange, LongShort, MarketSnapshot};
pub use portfolio::{PipelineRequest, Portfolio};
pub use signal::{Direction, NormalizationFallback, SignalRecord, SourceId};

// Re-exported so downstream crates agree on one version.
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
