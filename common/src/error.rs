//! Failure taxonomy of the decision pipeline

use crate::signal::SourceId;
use thiserror::Error;

/// Fatal pipeline failures. Any of these means no `Decision` was produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Ingest could not obtain the inputs it needs
    #[error("market data unavailable: {0}")]
    DataUnavailable(String),

    /// Fusion invoked without every required upstream output
    #[error("missing required signal from {0}")]
    MissingSignal(String),

    #[error("risk computation failed: {0}")]
    RiskComputation(#[from] RiskComputationError),

    /// A fan-out branch failed under the abort policy
    #[error("{branch} branch failed: {reason}")]
    BranchFailed { branch: SourceId, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid stage graph: {0}")]
    InvalidGraph(String),

    #[error("illegal pipeline transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl PipelineError {
    /// Short machine-readable kind, for structured logs and API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::DataUnavailable(_) => "data_unavailable",
            PipelineError::MissingSignal(_) => "missing_signal",
            PipelineError::RiskComputation(_) => "risk_computation",
            PipelineError::BranchFailed { .. } => "branch_failed",
            PipelineError::InvalidConfig(_) => "invalid_config",
            PipelineError::InvalidGraph(_) => "invalid_graph",
            PipelineError::InvalidTransition { .. } => "invalid_transition",
        }
    }
}

/// Reasons the risk stage cannot produce a complete profile
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskComputationError {
    #[error("cash must be positive, got {0}")]
    NonPositiveCash(String),

    #[error("leverage must be at least 1, got {0}")]
    InvalidLeverage(String),

    #[error("risk fraction must be in (0, 1], got {0}")]
    InvalidRiskFraction(String),

    #[error("need at least {required} returns to estimate volatility, got {available}")]
    InsufficientHistory { required: usize, available: usize },

    #[error("price series contains a non-positive or non-finite close at index {0}")]
    InvalidPrice(usize),

    #[error("volatility estimate is not finite")]
    NonFiniteVolatility,

    #[error("margin overflow computing {0}")]
    Overflow(String),
}
