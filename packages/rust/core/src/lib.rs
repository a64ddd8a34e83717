//! Staged pipeline orchestration for NewsRouter.
//!
//! This crate ties source aggregation to an ordered sequence of content
//! stages (summarization, classification, category analysis) whose actual
//! text transforms are delegated to a [`Reasoner`](reasoner::Reasoner).

pub mod bridge;
pub mod pipeline;
pub mod planner;
pub mod reasoner;
pub mod stage;

pub use bridge::BridgeReasoner;
pub use pipeline::{
    Orchestrator, PipelineOutcome, ProgressReporter, RunOptions, RunState, SilentProgress,
};
pub use planner::{KeywordPlanner, Planner};
pub use reasoner::{Reasoner, StubReasoner, TaskKind, TransformRequest};
pub use stage::{StageDefinition, StageRegistry};
