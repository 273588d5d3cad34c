use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use super::CandidateError;
use crate::utils::command::{self, WaitOutcome};

/// Flag asking a module executable to print its identity as JSON.
pub const MODULE_INFO_FLAG: &str = "--module-info";

/// Identity document printed by `<executable> --module-info`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleInfo {
    /// Registry key for the module.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModuleInfo {
    /// Parse the identity query's stdout.
    pub fn parse(stdout: &str) -> Result<Self, CandidateError> {
        let value: Value =
            serde_json::from_str(stdout.trim()).map_err(|e| CandidateError::InvalidIdentity {
                error: e.to_string(),
            })?;

        let has_name = value
            .get("name")
            .and_then(Value::as_str)
            .is_some_and(|name| !name.trim().is_empty());
        if !has_name {
            return Err(CandidateError::MissingName);
        }

        serde_json::from_value(value).map_err(|e| CandidateError::InvalidIdentity {
            error: e.to_string(),
        })
    }
}

/// Asks a candidate executable who it is.
pub trait ModuleProbe {
    fn query(&self, executable: &Path) -> Result<ModuleInfo, CandidateError>;
}

/// Runs the executable with [`MODULE_INFO_FLAG`] and reads its stdout.
#[derive(Debug, Clone)]
pub struct ProcessProbe {
    timeout: Duration,
}

impl ProcessProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ModuleProbe for ProcessProbe {
    fn query(&self, executable: &Path) -> Result<ModuleInfo, CandidateError> {
        let mut cmd = Command::new(executable);
        cmd.arg(MODULE_INFO_FLAG);

        let run = command::capture_stdout(cmd, self.timeout).map_err(|e| {
            CandidateError::QueryLaunch {
                error: e.to_string(),
            }
        })?;

        match run.outcome {
            WaitOutcome::TimedOut => Err(CandidateError::QueryTimeout {
                timeout_secs: self.timeout.as_secs(),
            }),
            WaitOutcome::Exited(status) if !status.success() => Err(CandidateError::QueryFailed {
                exit_code: command::exit_code(&status),
            }),
            WaitOutcome::Exited(_) => ModuleInfo::parse(&run.stdout),
        }
    }
}
