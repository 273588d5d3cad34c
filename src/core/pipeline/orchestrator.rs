use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::graph;
use super::manifest::Pipeline;
use super::runner::{NodeExecutor, NodeInvocation};
use super::staging::{CacheStager, PlannedLink, StagedLink, TargetState};
use crate::error::{Error, Result};
use crate::module::{Module, ModuleRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Staged,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePhase {
    Staging,
    Execution,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub id: String,
    pub module: String,
    pub state: NodeState,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub staged: Vec<StagedLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NodeReport {
    fn pending(id: &str, module: &str) -> Self {
        Self {
            id: id.to_string(),
            module: module.to_string(),
            state: NodeState::Pending,
            staged: Vec::new(),
            started_at: None,
            duration_ms: None,
            error_code: None,
            error: None,
        }
    }

    fn fail(&mut self, error: &Error) {
        self.state = NodeState::Failed;
        self.error_code = Some(error.code.as_str().to_string());
        self.error = Some(error.message.clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeFailure {
    pub node: String,
    pub phase: FailurePhase,
    pub code: String,
    pub message: String,
    #[serde(skip)]
    pub error: Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineRunSummary {
    pub total_nodes: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineRunResult {
    pub status: RunStatus,
    pub root: PathBuf,
    pub order: Vec<String>,
    pub nodes: Vec<NodeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<NodeFailure>,
    pub summary: PipelineRunSummary,
}

impl PipelineRunResult {
    pub fn node(&self, id: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// A failed run becomes the failing node's error, with the phase and
    /// the nodes that completed before it added to the details.
    pub fn into_result(self) -> Result<Self> {
        let Some(failure) = &self.failure else {
            return Ok(self);
        };

        let mut error = failure.error.clone();
        if let Some(details) = error.details.as_object_mut() {
            details.insert("phase".to_string(), serde_json::json!(failure.phase));
            details.insert(
                "completed".to_string(),
                serde_json::json!(self
                    .nodes
                    .iter()
                    .filter(|n| n.state == NodeState::Completed)
                    .map(|n| n.id.as_str())
                    .collect::<Vec<_>>()),
            );
        }
        Err(error)
    }

    fn summarize(&mut self) {
        let count = |state| self.nodes.iter().filter(|n| n.state == state).count();
        self.summary = PipelineRunSummary {
            total_nodes: self.nodes.len(),
            completed: count(NodeState::Completed),
            failed: count(NodeState::Failed),
            pending: count(NodeState::Pending),
        };
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanStep {
    pub node: String,
    pub module: String,
    pub executable: PathBuf,
    pub working_dir: PathBuf,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<PlannedLink>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunPlan {
    pub root: PathBuf,
    pub order: Vec<String>,
    pub steps: Vec<PlanStep>,
    /// Targets that would make staging fail if the run started now.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<PathBuf>,
}

/// Runs a validated pipeline one node at a time in dependency order.
pub struct Orchestrator<'a> {
    registry: &'a ModuleRegistry,
    stager: CacheStager,
    executor: &'a dyn NodeExecutor,
    stop: Option<Arc<AtomicBool>>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        registry: &'a ModuleRegistry,
        stager: CacheStager,
        executor: &'a dyn NodeExecutor,
    ) -> Self {
        Self {
            registry,
            stager,
            executor,
            stop: None,
        }
    }

    /// Checked before each node starts staging.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn root(&self) -> &Path {
        self.stager.root()
    }

    /// Solve the order and inspect every link target. Nothing is written.
    pub fn plan(&self, pipeline: &Pipeline) -> Result<RunPlan> {
        let order = graph::order(pipeline.nodes(), pipeline.dependencies())?;
        let mut steps = Vec::with_capacity(order.len());
        let mut conflicts = Vec::new();

        for id in &order {
            let module = self.module_for(pipeline, id)?;
            let links = self.stager.plan(id, pipeline.cache_links_for(id))?;
            conflicts.extend(
                links
                    .iter()
                    .filter(|l| matches!(l.existing, TargetState::Conflict { .. }))
                    .map(|l| l.target.clone()),
            );
            steps.push(PlanStep {
                node: id.clone(),
                module: module.id.clone(),
                executable: module.executable_path.clone(),
                working_dir: self.root().join(id),
                links,
            });
        }

        Ok(RunPlan {
            root: self.root().to_path_buf(),
            order,
            steps,
            conflicts,
        })
    }

    /// Execute the pipeline, stopping at the first failed node.
    ///
    /// Only an unsolvable graph is returned as `Err`; node failures are
    /// recorded in the result. Outputs of completed nodes are left in place.
    pub fn run(&self, pipeline: &Pipeline) -> Result<PipelineRunResult> {
        let order = graph::order(pipeline.nodes(), pipeline.dependencies())?;
        log_status!(
            "pipeline",
            "Running {} node(s) in {}",
            order.len(),
            self.root().display()
        );

        let nodes = order
            .iter()
            .filter_map(|id| pipeline.node(id))
            .map(|n| NodeReport::pending(&n.id, &n.module))
            .collect();
        let mut result = PipelineRunResult {
            status: RunStatus::Completed,
            root: self.root().to_path_buf(),
            order: order.clone(),
            nodes,
            failure: None,
            summary: PipelineRunSummary {
                total_nodes: 0,
                completed: 0,
                failed: 0,
                pending: 0,
            },
        };

        for (index, id) in order.iter().enumerate() {
            if self.stop_requested() {
                log_status!("pipeline", "Stop requested before '{}'", id);
                result.status = RunStatus::Stopped;
                break;
            }

            let report = &mut result.nodes[index];
            if let Err((phase, error)) = self.run_node(pipeline, id, report) {
                log_status!("pipeline", "Node '{}' failed: {}", id, error.message);
                report.fail(&error);
                result.status = RunStatus::Failed;
                result.failure = Some(NodeFailure {
                    node: id.clone(),
                    phase,
                    code: error.code.as_str().to_string(),
                    message: error.message.clone(),
                    error,
                });
                break;
            }
        }

        result.summarize();
        Ok(result)
    }

    fn run_node(
        &self,
        pipeline: &Pipeline,
        id: &str,
        report: &mut NodeReport,
    ) -> std::result::Result<(), (FailurePhase, Error)> {
        let module = self
            .module_for(pipeline, id)
            .map_err(|e| (FailurePhase::Staging, e))?;

        report.staged = self
            .stager
            .stage(id, pipeline.cache_links_for(id))
            .map_err(|e| (FailurePhase::Staging, e))?;
        report.state = NodeState::Staged;

        log_status!("pipeline", "Running '{}' ({})", id, module.id);
        report.state = NodeState::Running;
        report.started_at = Some(chrono::Local::now().to_rfc3339());
        let started = Instant::now();

        let outcome = self
            .executor
            .execute(&NodeInvocation::new(self.root(), id, module));
        report.duration_ms = Some(started.elapsed().as_millis() as u64);
        outcome.map_err(|e| (FailurePhase::Execution, e))?;

        report.state = NodeState::Completed;
        Ok(())
    }

    fn module_for(&self, pipeline: &Pipeline, id: &str) -> Result<&'a Module> {
        let module_id = pipeline
            .node(id)
            .map(|n| n.module.as_str())
            .ok_or_else(|| Error::internal_unexpected(format!("Node '{}' is not declared", id)))?;
        self.registry.get(module_id).ok_or_else(|| {
            Error::manifest_module_not_found(id, module_id, self.registry.ids())
        })
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}
