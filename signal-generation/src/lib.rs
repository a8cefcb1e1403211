// Signal Generation (Layer 2)
// Schedules the stage graph, normalizes branch outputs and fuses them into a decision

pub mod config;
pub mod context;
pub mod dag;
pub mod fusion;
pub mod normalizer;
pub mod pipeline;

pub use config::{BranchPolicy, FusionWeights, PipelineConfig, ENV_PREFIX, WEIGHT_SUM_TOLERANCE};
pub use context::{Context, ContextDelta};
pub use dag::{StageGraph, StageId};
pub use fusion::{Advisory, Decision, DecisionFuser, FusedSignal};
pub use normalizer::{normalize, normalize_advisory, normalize_parts, parse_confidence, parse_direction};
pub use pipeline::{
    DecisionPipeline, DegradedBranch, PipelineFailure, PipelineOutcome, PipelineState, PipelineTrace,
};
