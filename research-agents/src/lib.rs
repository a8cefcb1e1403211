//! Research Agents - Layer 1
//!
//! The analysis branches of the decision pipeline:
//! - `Agent` trait every fan-out branch implements
//! - Technical, Sentiment and Social specialist agents
//! - `DecisionSuggester` capability for an optional advisory model

pub mod agent;
pub mod sentiment;
pub mod social;
pub mod suggester;
pub mod technical;

// Re-export commonly used types
pub use agent::{format_percent, signal_blob, Agent, AgentConfig, AgentInput, AgentOutput};
pub use sentiment::{PositioningScore, SentimentAgent, SentimentAgentConfig};
pub use social::{SocialAgent, SocialAgentConfig, SocialMetrics, SocialWeights};
pub use suggester::{
    parse_suggestion, strip_code_fences, DecisionSuggester, PromptSignal, StaticSuggester, SuggestionPrompt,
};
pub use technical::{ema, StrategySignal, StrategyWeights, TechnicalAgent, TechnicalAgentConfig};
