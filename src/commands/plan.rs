use clap::Args;

use misa_pipeline::pipeline::{Orchestrator, ProcessRunner, RunPlan};

use super::{CmdResult, GlobalArgs, PipelineArgs};

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

/// Validate the pipeline and show what `run` would do.
pub fn run(args: PlanArgs, global: &GlobalArgs) -> CmdResult<RunPlan> {
    let loaded = super::load_pipeline(&args.pipeline, global)?;
    let runner = ProcessRunner::default();
    let plan = Orchestrator::new(&loaded.registry, loaded.stager, &runner).plan(&loaded.pipeline)?;
    Ok((plan, 0))
}
