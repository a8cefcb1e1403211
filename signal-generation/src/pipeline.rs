//! Decision pipeline - schedules the stage graph for one request
//!
//! ingest -> {technical, sentiment, social} -> risk -> fuse
//!
//! The three analysis branches run as independent tokio tasks under one
//! shared timeout. A branch that errors, times out or panics is handled by
//! the configured `BranchPolicy`, identically for every branch. Ingest and
//! risk failures are always fatal.

use crate::config::{BranchPolicy, PipelineConfig};
use crate::context::{Context, ContextDelta};
use crate::dag::StageGraph;
use crate::fusion::{Advisory, Decision, DecisionFuser};
use crate::normalizer::{normalize, normalize_advisory};
use anyhow::anyhow;
use chrono::{NaiveDate, Utc};
use common::{MarketSnapshot, PipelineError, PipelineRequest, SignalRecord, SourceId, Uuid};
use data_ingestion::{IngestStage, MarketDataProvider, SentimentSource, SocialSource};
use portfolio_risk::RiskEvaluator;
use research_agents::{
    parse_suggestion, Agent, AgentInput, DecisionSuggester, PromptSignal, SentimentAgent,
    SentimentAgentConfig, SocialAgent, SocialAgentConfig, SuggestionPrompt, TechnicalAgent,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Per-request state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Init,
    Ingested,
    FannedOut,
    Degraded,
    RiskEvaluated,
    Fused,
    Done,
    Failed,
}

impl PipelineState {
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Done | Failed, _) => false,
            (_, Failed) => true,
            (Init, Ingested)
            | (Ingested, FannedOut)
            | (FannedOut, Degraded)
            | (FannedOut, RiskEvaluated)
            | (Degraded, RiskEvaluated)
            | (RiskEvaluated, Fused)
            | (Fused, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Init => "INIT",
            PipelineState::Ingested => "INGESTED",
            PipelineState::FannedOut => "FANNED_OUT",
            PipelineState::Degraded => "DEGRADED",
            PipelineState::RiskEvaluated => "RISK_EVALUATED",
            PipelineState::Fused => "FUSED",
            PipelineState::Done => "DONE",
            PipelineState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// A branch that was replaced by a neutral record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradedBranch {
    pub source: SourceId,
    pub reason: String,
}

/// States a run passed through, plus any degraded branches
#[derive(Debug, Clone, Serialize)]
pub struct PipelineTrace {
    pub request_id: Uuid,
    states: Vec<PipelineState>,
    degraded: Vec<DegradedBranch>,
}

impl PipelineTrace {
    pub fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            states: vec![PipelineState::Init],
            degraded: Vec::new(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.states.last().copied().unwrap_or(PipelineState::Init)
    }

    pub fn states(&self) -> &[PipelineState] {
        &self.states
    }

    pub fn degraded(&self) -> &[DegradedBranch] {
        &self.degraded
    }

    pub fn transition(&mut self, next: PipelineState) -> Result<(), PipelineError> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: current.to_string(),
                to: next.to_string(),
            });
        }
        self.states.push(next);
        Ok(())
    }
}

/// Successful run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub decision: Decision,
    pub trace: PipelineTrace,
}

/// Failed run: the fatal error and how far the run got
#[derive(Debug, Error)]
#[error("{error}")]
pub struct PipelineFailure {
    pub error: PipelineError,
    pub trace: PipelineTrace,
}

impl PipelineFailure {
    /// Structured failure for callers: kind, human-readable reason and trace
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.error.kind(),
            "reason": self.error.to_string(),
            "trace": self.trace,
        })
    }
}

/// Runs the stage graph for one request at a time; cheap to share behind `Arc`
pub struct DecisionPipeline {
    config: PipelineConfig,
    graph: StageGraph,
    ingest: IngestStage,
    agents: BTreeMap<SourceId, Arc<dyn Agent>>,
    risk: RiskEvaluator,
    fuser: DecisionFuser,
    suggester: Option<Arc<dyn DecisionSuggester>>,
}

impl DecisionPipeline {
    /// Pipeline with the built-in technical, sentiment and social agents
    pub fn new(
        config: PipelineConfig,
        market: Arc<dyn MarketDataProvider>,
        social: Arc<dyn SocialSource>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let graph = StageGraph::standard()?;
        let risk = RiskEvaluator::new(config.risk.clone())
            .map_err(|e| PipelineError::InvalidConfig(format!("risk: {}", e)))?;
        let fuser = DecisionFuser::from_config(&config)?;

        let pipeline = Self {
            config,
            graph,
            ingest: IngestStage::new(market),
            agents: BTreeMap::new(),
            risk,
            fuser,
            suggester: None,
        };
        Ok(pipeline
            .with_agent(Arc::new(TechnicalAgent::default()))
            .with_agent(Arc::new(SentimentAgent::new(SentimentAgentConfig::default())))
            .with_agent(Arc::new(SocialAgent::new(SocialAgentConfig::default(), social))))
    }

    /// Replace the agent serving `agent.source()`
    pub fn with_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        info!(agent = %agent.config().agent_id, source = %agent.source(), "Registering agent");
        self.agents.insert(agent.source(), agent);
        self
    }

    /// Sentiment branch forwards `source`'s blob instead of reading the long/short pair
    pub fn with_sentiment_source(self, source: Arc<dyn SentimentSource>) -> Self {
        info!(source = source.name(), "Using external sentiment feed");
        let agent = SentimentAgent::new(SentimentAgentConfig::default()).with_source(source);
        self.with_agent(Arc::new(agent))
    }

    pub fn with_suggester(mut self, suggester: Arc<dyn DecisionSuggester>) -> Self {
        info!(suggester = suggester.name(), "Registering decision suggester");
        self.suggester = Some(suggester);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    /// Run with the current UTC date as the default window end
    pub async fn run(&self, request: &PipelineRequest) -> Result<PipelineOutcome, PipelineFailure> {
        self.run_at(request, Utc::now().date_naive()).await
    }

    pub async fn run_at(
        &self,
        request: &PipelineRequest,
        today: NaiveDate,
    ) -> Result<PipelineOutcome, PipelineFailure> {
        let request_id = Uuid::new_v4();
        let mut trace = PipelineTrace::new(request_id);
        let span = info_span!("pipeline", request_id = %request_id, crypto = %request.crypto);

        let result = self
            .execute(request, today, &mut trace)
            .instrument(span.clone())
            .await;

        let _entered = span.enter();
        match result {
            Ok(decision) => {
                info!(states = ?trace.states(), "Pipeline finished");
                Ok(PipelineOutcome { decision, trace })
            }
            Err(err) => {
                error!(kind = err.kind(), error = %err, state = %trace.state(), "Pipeline failed");
                if let Err(e) = trace.transition(PipelineState::Failed) {
                    warn!(error = %e, "Could not record failure state");
                }
                Err(PipelineFailure { error: err, trace })
            }
        }
    }

    async fn execute(
        &self,
        request: &PipelineRequest,
        today: NaiveDate,
        trace: &mut PipelineTrace,
    ) -> Result<Decision, PipelineError> {
        let snapshot = self
            .ingest
            .run_at(request, today)
            .instrument(info_span!("stage", stage = "ingest"))
            .await?;
        trace.transition(PipelineState::Ingested)?;

        let snapshot = Arc::new(snapshot);
        let mut context = Context::new(trace.request_id, &snapshot, request.portfolio);

        let deltas = self.fan_out(trace, Arc::clone(&snapshot)).await?;
        context.merge(deltas)?;
        trace.transition(PipelineState::FannedOut)?;
        if !trace.degraded.is_empty() {
            trace.transition(PipelineState::Degraded)?;
        }

        let profile = {
            let _stage = info_span!("stage", stage = "risk").entered();
            self.risk.evaluate(&request.portfolio, &snapshot.candles)?
        };
        context.apply(ContextDelta::Risk(profile))?;
        trace.transition(PipelineState::RiskEvaluated)?;

        let mut decision = {
            let _stage = info_span!("stage", stage = "fuse").entered();
            self.fuser.fuse(&context)?
        };
        trace.transition(PipelineState::Fused)?;

        if let Some(suggester) = &self.suggester {
            match self
                .advise(suggester.as_ref(), &context)
                .instrument(info_span!("stage", stage = "suggest"))
                .await
            {
                Ok(advisory) => decision = decision.with_advisory(advisory),
                Err(e) => warn!(suggester = suggester.name(), error = %e, "Suggester failed, no advisory"),
            }
        }

        trace.transition(PipelineState::Done)?;
        Ok(decision)
    }

    /// Spawn every analysis branch, then resolve each under the branch policy
    async fn fan_out(
        &self,
        trace: &mut PipelineTrace,
        snapshot: Arc<MarketSnapshot>,
    ) -> Result<Vec<ContextDelta>, PipelineError> {
        let timeout = self.config.branch_timeout();
        let mut handles = Vec::new();

        for source in self.graph.fan_out() {
            let agent = self.agents.get(&source).cloned().ok_or_else(|| {
                PipelineError::InvalidGraph(format!("no agent registered for stage '{}'", source))
            })?;
            let input = AgentInput::new(trace.request_id, Arc::clone(&snapshot));
            let span = info_span!("stage", stage = %source, agent = %agent.config().agent_id);

            let handle = tokio::spawn(
                async move {
                    info!("Branch started");
                    let result = tokio::time::timeout(timeout, agent.analyze(input)).await;
                    info!(ok = matches!(result, Ok(Ok(_))), "Branch finished");
                    result
                }
                .instrument(span),
            );
            handles.push((source, handle));
        }

        let mut deltas = Vec::with_capacity(handles.len());
        let mut pending = handles.into_iter();
        while let Some((source, handle)) = pending.next() {
            let outcome = match handle.await {
                Ok(Ok(Ok(output))) => Ok(output),
                Ok(Ok(Err(e))) => Err(format!("{:#}", e)),
                Ok(Err(_)) => Err(format!("timed out after {} ms", timeout.as_millis())),
                Err(e) if e.is_panic() => Err("agent panicked".to_string()),
                Err(e) => Err(format!("agent task failed: {}", e)),
            };

            let record = match outcome {
                Ok(output) => normalize(source, &output.raw),
                Err(reason) => match self.config.branch_policy {
                    BranchPolicy::Downgrade => {
                        warn!(branch = %source, reason = %reason, "Branch downgraded to neutral");
                        trace.degraded.push(DegradedBranch {
                            source,
                            reason: reason.clone(),
                        });
                        SignalRecord::degraded(source, &reason)
                    }
                    BranchPolicy::Abort => {
                        error!(branch = %source, reason = %reason, "Branch failed, aborting");
                        // Siblings must not outlive the failed request.
                        for (_, sibling) in pending {
                            sibling.abort();
                        }
                        return Err(PipelineError::BranchFailed { branch: source, reason });
                    }
                },
            };
            deltas.push(ContextDelta::Signal(record));
        }

        Ok(deltas)
    }

    async fn advise(
        &self,
        suggester: &dyn DecisionSuggester,
        context: &Context,
    ) -> anyhow::Result<Advisory> {
        let risk = context
            .risk_profile()
            .ok_or_else(|| anyhow!("risk profile missing"))?;

        let prompt = SuggestionPrompt {
            crypto: context.crypto.clone(),
            signals: context.signals().values().map(PromptSignal::from).collect(),
            max_position_margin: risk.max_position_margin,
            stop_loss: risk.stop_loss(),
            take_profit: risk.take_profit(),
            portfolio: risk.portfolio,
        };
        debug!(suggester = suggester.name(), prompt = %prompt.render(), "Requesting advisory");

        let text = tokio::time::timeout(self.config.branch_timeout(), suggester.suggest(&prompt))
            .await
            .map_err(|_| anyhow!("suggester timed out"))??;
        let blob = parse_suggestion(&text)?;
        Ok(normalize_advisory(suggester.name(), &blob))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut trace = PipelineTrace::new(Uuid::nil());
        for state in [
            PipelineState::Ingested,
            PipelineState::FannedOut,
            PipelineState::Degraded,
            PipelineState::RiskEvaluated,
            PipelineState::Fused,
            PipelineState::Done,
        ] {
            trace.transition(state).unwrap();
        }
        assert_eq!(trace.state(), PipelineState::Done);
        assert_eq!(trace.states().len(), 7);
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let mut trace = PipelineTrace::new(Uuid::nil());
        match trace.transition(PipelineState::Fused) {
            Err(PipelineError::InvalidTransition { from, to }) => {
                assert_eq!(from, "INIT");
                assert_eq!(to, "FUSED");
            }
            other => panic!("expected InvalidTransition, got {:?}", other),
        }
    }

    #[test]
    fn test_degraded_only_from_fanned_out() {
        assert!(PipelineState::FannedOut.can_transition_to(PipelineState::Degraded));
        assert!(!PipelineState::Ingested.can_transition_to(PipelineState::Degraded));
        assert!(!PipelineState::RiskEvaluated.can_transition_to(PipelineState::Degraded));
    }

    #[test]
    fn test_failed_reachable_until_terminal() {
        for state in [
            PipelineState::Init,
            PipelineState::Ingested,
            PipelineState::FannedOut,
            PipelineState::Degraded,
            PipelineState::RiskEvaluated,
            PipelineState::Fused,
        ] {
            assert!(state.can_transition_to(PipelineState::Failed));
        }
        assert!(!PipelineState::Done.can_transition_to(PipelineState::Failed));
        assert!(!PipelineState::Failed.can_transition_to(PipelineState::Failed));
    }

    #[test]
    fn test_state_wire_names() {
        assert_eq!(
            serde_json::to_value(PipelineState::RiskEvaluated).unwrap(),
            serde_json::json!("RISK_EVALUATED")
        );
        assert_eq!(PipelineState::FannedOut.to_string(), "FANNED_OUT");
    }
}
