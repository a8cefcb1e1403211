//! Base Agent trait and core agent types
//!
//! Each fan-out branch of the pipeline is an `Agent`. Agents read the shared
//! market snapshot and return a raw, loosely-typed signal blob; turning that
//! blob into a `SignalRecord` is the normalizer's job, not the agent's.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{MarketSnapshot, SourceId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Base configuration for any agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_id: String,
    pub name: String,
}

impl AgentConfig {
    pub fn new(agent_id: &str, name: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            name: name.to_string(),
        }
    }
}

/// Input handed to every branch once ingest has finished
#[derive(Debug, Clone)]
pub struct AgentInput {
    pub request_id: Uuid,
    pub snapshot: Arc<MarketSnapshot>,
    pub timestamp: DateTime<Utc>,
}

impl AgentInput {
    pub fn new(request_id: Uuid, snapshot: Arc<MarketSnapshot>) -> Self {
        Self {
            request_id,
            snapshot,
            timestamp: Utc::now(),
        }
    }
}

/// Raw output of one agent run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    pub agent_id: String,
    pub source: SourceId,
    /// Loosely-typed blob, at least `{"signal": ..., "confidence": ...}`
    pub raw: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub processing_time_ms: u64,
}

impl AgentOutput {
    pub fn new(config: &AgentConfig, source: SourceId, raw: serde_json::Value, started: Instant) -> Self {
        Self {
            agent_id: config.agent_id.clone(),
            source,
            raw,
            timestamp: Utc::now(),
            processing_time_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Trait that every analysis branch implements
#[async_trait]
pub trait Agent: Send + Sync {
    /// Get the agent's configuration
    fn config(&self) -> &AgentConfig;

    /// Which `Context.signals` key this agent fills
    fn source(&self) -> SourceId;

    /// Analyze the snapshot and produce a raw signal blob.
    ///
    /// An `Err` is a branch failure; the scheduler applies its failure policy.
    async fn analyze(&self, input: AgentInput) -> anyhow::Result<AgentOutput>;
}

/// Standard blob shape shared by the built-in agents
pub fn signal_blob(signal: &str, confidence: f64, reasoning: String) -> serde_json::Value {
    json!({
        "signal": signal,
        "confidence": format_percent(confidence),
        "reasoning": reasoning,
    })
}

/// `0.735` -> `"73.5%"`
pub fn format_percent(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}
