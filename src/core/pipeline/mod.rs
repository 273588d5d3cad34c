//! Pipeline manifests, execution order, cache staging and node execution.

mod graph;
mod manifest;
mod orchestrator;
mod runner;
mod staging;

pub use graph::order;
pub use manifest::{CacheLink, Dependencies, EdgeSpec, Node, NodeSpec, Pipeline, PipelineManifest};
pub use orchestrator::{
    FailurePhase, NodeFailure, NodeReport, NodeState, Orchestrator, PipelineRunResult,
    PipelineRunSummary, PlanStep, RunPlan, RunStatus,
};
pub use runner::{NodeExecutor, NodeInvocation, ProcessRunner};
pub use staging::{CacheStager, PlannedLink, StageAction, StagedLink, TargetState};
