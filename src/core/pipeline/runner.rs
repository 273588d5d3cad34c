use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::module::Module;
use crate::paths::PARAMETERS_FILE;
use crate::utils::command::{self, WaitOutcome};

/// One node's module invocation.
#[derive(Debug, Clone)]
pub struct NodeInvocation<'a> {
    pub node: &'a str,
    pub module: &'a Module,
    /// `<root>/<node-id>`, holding `parameters.json`.
    pub working_dir: PathBuf,
}

impl<'a> NodeInvocation<'a> {
    pub fn new(root: &Path, node: &'a str, module: &'a Module) -> Self {
        Self {
            node,
            module,
            working_dir: root.join(node),
        }
    }
}

/// Runs a node's module to completion. `Ok` means the module succeeded.
pub trait NodeExecutor {
    fn execute(&self, invocation: &NodeInvocation<'_>) -> Result<()>;
}

/// Launches `<executable> --parameters parameters.json` inside the node directory.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl NodeExecutor for ProcessRunner {
    fn execute(&self, invocation: &NodeInvocation<'_>) -> Result<()> {
        let node = invocation.node;
        let executable = &invocation.module.executable_path;
        let exe_display = executable.display().to_string();

        if !invocation.working_dir.is_dir() {
            return Err(Error::process_launch_failed(
                node,
                exe_display,
                format!(
                    "working directory {} does not exist",
                    invocation.working_dir.display()
                ),
            ));
        }

        let mut child = Command::new(executable)
            .arg("--parameters")
            .arg(PARAMETERS_FILE)
            .current_dir(&invocation.working_dir)
            .spawn()
            .map_err(|e| Error::process_launch_failed(node, exe_display.clone(), e.to_string()))?;

        let outcome = command::wait_with_timeout(&mut child, self.timeout).map_err(|e| {
            Error::process_launch_failed(node, exe_display.clone(), format!("wait failed: {}", e))
        })?;

        match outcome {
            WaitOutcome::Exited(status) if status.success() => Ok(()),
            WaitOutcome::Exited(status) => Err(Error::process_non_zero_exit(
                node,
                exe_display,
                command::exit_code(&status),
            )),
            WaitOutcome::TimedOut => Err(Error::process_timeout(
                node,
                exe_display,
                self.timeout.map(|t| t.as_secs()).unwrap_or_default(),
            )),
        }
    }
}
