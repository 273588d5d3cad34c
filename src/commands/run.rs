use clap::Args;
use std::time::Duration;

use misa_pipeline::pipeline::{Orchestrator, PipelineRunResult, ProcessRunner};

use super::{CmdResult, GlobalArgs, PipelineArgs};

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Kill a node's module after this many seconds (overrides node_timeout_secs)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

pub fn run(args: RunArgs, global: &GlobalArgs) -> CmdResult<PipelineRunResult> {
    if args.timeout == Some(0) {
        return Err(misa_pipeline::Error::validation_invalid_argument(
            "timeout",
            "must be at least 1 second",
        ));
    }

    let loaded = super::load_pipeline(&args.pipeline, global)?;
    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .or_else(|| loaded.config.node_timeout());
    let runner = ProcessRunner::new(timeout);

    let result = Orchestrator::new(&loaded.registry, loaded.stager, &runner)
        .run(&loaded.pipeline)?
        .into_result()?;

    Ok((result, 0))
}
