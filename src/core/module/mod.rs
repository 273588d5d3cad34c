//! Module discovery: link descriptors, the identity query protocol and the registry.

mod link;
mod probe;
mod registry;

pub use link::{Architecture, ModuleLink, OperatingSystem};
pub use probe::{ModuleInfo, ModuleProbe, ProcessProbe, MODULE_INFO_FLAG};
pub use registry::{
    CandidateOutcome, CandidateReport, ModuleRegistry, SearchPath, SearchPathSource, SearchPaths,
};

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

/// A registered external executable.
#[derive(Debug, Clone, Serialize)]
pub struct Module {
    pub id: String,
    pub executable_path: PathBuf,
    pub link_path: PathBuf,
    pub info: ModuleInfo,
    /// Descriptor fields not interpreted by the runner.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Module {
    /// A module known only by id and executable, with no descriptor on disk.
    pub fn new(id: impl Into<String>, executable_path: impl Into<PathBuf>) -> Self {
        let id = id.into();
        let executable_path = executable_path.into();
        Self {
            info: ModuleInfo {
                name: id.clone(),
                id: None,
                version: None,
                description: None,
                extra: Map::new(),
            },
            link_path: executable_path.clone(),
            id,
            executable_path,
            metadata: Map::new(),
        }
    }
}

/// Why a module link candidate could not be registered.
///
/// Never fatal to discovery: the candidate is reported and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CandidateError {
    Unreadable { error: String },
    InvalidDescriptor { error: String },
    MissingExecutablePath,
    ExecutableNotFound { path: String },
    Incompatible {
        #[serde(skip_serializing_if = "Option::is_none")]
        operating_system: Option<OperatingSystem>,
        #[serde(skip_serializing_if = "Option::is_none")]
        architecture: Option<Architecture>,
    },
    QueryLaunch { error: String },
    QueryFailed { exit_code: i32 },
    QueryTimeout { timeout_secs: u64 },
    InvalidIdentity { error: String },
    MissingName,
}

impl fmt::Display for CandidateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateError::Unreadable { error } => write!(f, "cannot read descriptor: {}", error),
            CandidateError::InvalidDescriptor { error } => {
                write!(f, "invalid descriptor: {}", error)
            }
            CandidateError::MissingExecutablePath => {
                write!(f, "descriptor has no executable-path")
            }
            CandidateError::ExecutableNotFound { path } => {
                write!(f, "executable {} does not exist", path)
            }
            CandidateError::Incompatible {
                operating_system,
                architecture,
            } => write!(
                f,
                "built for {:?}/{:?}, not this platform",
                operating_system, architecture
            ),
            CandidateError::QueryLaunch { error } => {
                write!(f, "{} could not be launched: {}", MODULE_INFO_FLAG, error)
            }
            CandidateError::QueryFailed { exit_code } => {
                write!(f, "{} exited with code {}", MODULE_INFO_FLAG, exit_code)
            }
            CandidateError::QueryTimeout { timeout_secs } => {
                write!(f, "{} did not answer within {}s", MODULE_INFO_FLAG, timeout_secs)
            }
            CandidateError::InvalidIdentity { error } => {
                write!(f, "{} output is not valid JSON: {}", MODULE_INFO_FLAG, error)
            }
            CandidateError::MissingName => {
                write!(f, "{} output has no 'name'", MODULE_INFO_FLAG)
            }
        }
    }
}

impl std::error::Error for CandidateError {}
