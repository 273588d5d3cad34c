use clap::Args;
use std::path::PathBuf;

use misa_pipeline::defaults::{self, RunnerConfig};
use misa_pipeline::module::{ModuleRegistry, ProcessProbe, SearchPaths};
use misa_pipeline::paths::MANIFEST_FILE;
use misa_pipeline::pipeline::{CacheStager, Pipeline, PipelineManifest};

pub type CmdResult<T> = misa_pipeline::Result<(T, i32)>;

pub(crate) struct GlobalArgs {
    /// Overrides `<config dir>/MISA-ImageJ/misa-pipeline.json`.
    pub config: Option<PathBuf>,
}

/// Where a pipeline lives on disk.
#[derive(Args, Debug, Default)]
pub struct PipelineArgs {
    /// Pipeline root directory (holds one directory per node)
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub root: PathBuf,

    /// Manifest file [default: <root>/pipeline.json]
    #[arg(long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,
}

impl PipelineArgs {
    pub fn manifest_path(&self) -> PathBuf {
        self.manifest
            .clone()
            .unwrap_or_else(|| self.root.join(MANIFEST_FILE))
    }
}

pub(crate) fn load_config(global: &GlobalArgs) -> misa_pipeline::Result<RunnerConfig> {
    match &global.config {
        Some(path) => defaults::load_config_from(path),
        None => defaults::load_config(),
    }
}

pub(crate) fn discover_modules(
    config: &RunnerConfig,
) -> misa_pipeline::Result<(SearchPaths, ModuleRegistry)> {
    let search_paths = SearchPaths::from_config(config)?;
    let probe = ProcessProbe::new(config.module_info_timeout());
    let registry = ModuleRegistry::discover(&search_paths, &probe);
    Ok((search_paths, registry))
}

/// Registry, validated pipeline and stager for one invocation.
pub(crate) struct LoadedPipeline {
    pub config: RunnerConfig,
    pub registry: ModuleRegistry,
    pub pipeline: Pipeline,
    pub stager: CacheStager,
}

pub(crate) fn load_pipeline(
    args: &PipelineArgs,
    global: &GlobalArgs,
) -> misa_pipeline::Result<LoadedPipeline> {
    if !args.root.is_dir() {
        return Err(misa_pipeline::Error::validation_invalid_argument(
            "root",
            format!("{} is not a directory", args.root.display()),
        ));
    }

    let config = load_config(global)?;
    let (_, registry) = discover_modules(&config)?;
    let manifest = PipelineManifest::from_file(&args.manifest_path())?;
    let pipeline = Pipeline::load(manifest, &registry)?;
    Ok(LoadedPipeline {
        config,
        registry,
        pipeline,
        stager: CacheStager::new(&args.root),
    })
}

pub mod modules;
pub mod plan;
pub mod run;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (misa_pipeline::Result<serde_json::Value>, i32) {
    crate::tty::status("misa-pipeline is working...");

    match command {
        crate::Commands::Run(args) => dispatch!(args, global, run),
        crate::Commands::Plan(args) => dispatch!(args, global, plan),
        crate::Commands::Modules(args) => dispatch!(args, global, modules),
    }
}
