use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigInvalidJson,
    ConfigInvalidValue,

    ValidationInvalidArgument,

    ManifestInvalidJson,
    ManifestInvalid,
    ManifestModuleNotFound,

    GraphCycle,

    StagingConflict,
    StagingIo,

    ProcessLaunchFailed,
    ProcessNonZeroExit,
    ProcessTimeout,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::ManifestInvalidJson => "manifest.invalid_json",
            ErrorCode::ManifestInvalid => "manifest.invalid",
            ErrorCode::ManifestModuleNotFound => "manifest.module_not_found",

            ErrorCode::GraphCycle => "graph.cycle",

            ErrorCode::StagingConflict => "staging.conflict",
            ErrorCode::StagingIo => "staging.io",

            ErrorCode::ProcessLaunchFailed => "process.launch_failed",
            ErrorCode::ProcessNonZeroExit => "process.non_zero_exit",
            ErrorCode::ProcessTimeout => "process.timeout",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidJsonDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestInvalidDetails {
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleNotFoundDetails {
    pub node: String,
    pub module: String,
    pub available: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleDetails {
    pub unresolved: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingConflictDetails {
    pub node: String,
    pub path: String,
    pub occupied_by: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingIoDetails {
    pub node: String,
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessLaunchDetails {
    pub node: String,
    pub executable: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessExitDetails {
    pub node: String,
    pub executable: String,
    pub exit_code: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessTimeoutDetails {
    pub node: String,
    pub executable: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalJsonErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
        }
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        let details = to_details(ConfigInvalidJsonDetails {
            path: path.into(),
            error: err.to_string(),
        });

        Self::new(
            ErrorCode::ConfigInvalidJson,
            "Invalid JSON in configuration",
            details,
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let details = to_details(ConfigInvalidValueDetails {
            key: key.into(),
            value,
            problem: problem.into(),
        });

        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            details,
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
    ) -> Self {
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.into(),
        });

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            details,
        )
    }

    pub fn manifest_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        let path = path.into();
        let details = serde_json::json!({
            "path": path,
            "error": err.to_string(),
        });

        Self::new(
            ErrorCode::ManifestInvalidJson,
            format!("Pipeline manifest '{}' is not valid JSON", path),
            details,
        )
    }

    pub fn manifest_invalid(problem: impl Into<String>, node: Option<String>) -> Self {
        let problem = problem.into();
        let details = to_details(ManifestInvalidDetails {
            problem: problem.clone(),
            node,
        });

        Self::new(ErrorCode::ManifestInvalid, problem, details)
    }

    pub fn manifest_module_not_found(
        node: impl Into<String>,
        module: impl Into<String>,
        available: Vec<String>,
    ) -> Self {
        let node = node.into();
        let module = module.into();
        let message = format!(
            "Node '{}' requires module '{}', which is not registered",
            node, module
        );
        let details = to_details(ModuleNotFoundDetails {
            node,
            module,
            available,
        });

        Self::new(ErrorCode::ManifestModuleNotFound, message, details).with_hint(
            "Run 'misa-pipeline modules' to see registered modules and skipped candidates",
        )
    }

    pub fn graph_cycle(unresolved: Vec<String>) -> Self {
        let message = format!(
            "Dependencies cannot be resolved for nodes: {}",
            unresolved.join(", ")
        );
        let details = to_details(CycleDetails { unresolved });

        Self::new(ErrorCode::GraphCycle, message, details)
            .with_hint("Check the manifest edges for cycles or references to missing nodes")
    }

    pub fn staging_conflict(
        node: impl Into<String>,
        path: impl Into<String>,
        occupied_by: impl Into<String>,
    ) -> Self {
        let node = node.into();
        let path = path.into();
        let occupied_by = occupied_by.into();
        let message = format!(
            "Cannot stage cache for node '{}': '{}' is occupied by a {}",
            node, path, occupied_by
        );
        let details = to_details(StagingConflictDetails {
            node,
            path,
            occupied_by,
        });

        Self::new(ErrorCode::StagingConflict, message, details)
            .with_hint("Move the existing data out of the way and re-run the pipeline")
    }

    pub fn staging_io(
        node: impl Into<String>,
        path: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let node = node.into();
        let path = path.into();
        let error = error.into();
        let message = format!(
            "Cannot stage cache for node '{}' at '{}': {}",
            node, path, error
        );
        let details = to_details(StagingIoDetails { node, path, error });

        Self::new(ErrorCode::StagingIo, message, details)
    }

    pub fn process_launch_failed(
        node: impl Into<String>,
        executable: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let node = node.into();
        let executable = executable.into();
        let error = error.into();
        let message = format!(
            "Failed to launch module for node '{}' ({}): {}",
            node, executable, error
        );
        let details = to_details(ProcessLaunchDetails {
            node,
            executable,
            error,
        });

        Self::new(ErrorCode::ProcessLaunchFailed, message, details)
    }

    pub fn process_non_zero_exit(
        node: impl Into<String>,
        executable: impl Into<String>,
        exit_code: i32,
    ) -> Self {
        let node = node.into();
        let executable = executable.into();
        let message = format!("Module for node '{}' exited with code {}", node, exit_code);
        let details = to_details(ProcessExitDetails {
            node,
            executable,
            exit_code,
        });

        Self::new(ErrorCode::ProcessNonZeroExit, message, details)
    }

    pub fn process_timeout(
        node: impl Into<String>,
        executable: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        let node = node.into();
        let executable = executable.into();
        let message = format!(
            "Module for node '{}' did not finish within {}s",
            node, timeout_secs
        );
        let details = to_details(ProcessTimeoutDetails {
            node,
            executable,
            timeout_secs,
        });

        Self::new(ErrorCode::ProcessTimeout, message, details)
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalIoErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalIoError, "IO error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalJsonErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    /// Node named in the error details, if the error belongs to one node.
    pub fn node(&self) -> Option<&str> {
        self.details.get("node").and_then(Value::as_str)
    }
}
