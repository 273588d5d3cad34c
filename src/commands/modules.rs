use clap::Args;
use serde::Serialize;

use misa_pipeline::module::{CandidateReport, Module, SearchPaths};

use super::{CmdResult, GlobalArgs};

#[derive(Args)]
pub struct ModulesArgs {
    /// Only list registered modules
    #[arg(long)]
    pub registered_only: bool,
}

#[derive(Serialize)]
pub struct ModulesOutput {
    pub search_paths: SearchPaths,
    pub modules: Vec<Module>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<CandidateReport>,
}

pub fn run(args: ModulesArgs, global: &GlobalArgs) -> CmdResult<ModulesOutput> {
    let config = super::load_config(global)?;
    let (search_paths, registry) = super::discover_modules(&config)?;

    let candidates = if args.registered_only {
        Vec::new()
    } else {
        registry.candidates().to_vec()
    };

    Ok((
        ModulesOutput {
            search_paths,
            modules: registry.modules().cloned().collect(),
            candidates,
        },
        0,
    ))
}
