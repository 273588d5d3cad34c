use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use super::CandidateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatingSystem {
    Linux,
    Windows,
    Mac,
    #[serde(other)]
    Unknown,
}

impl OperatingSystem {
    pub fn host() -> Self {
        if cfg!(target_os = "linux") {
            OperatingSystem::Linux
        } else if cfg!(windows) {
            OperatingSystem::Windows
        } else if cfg!(target_os = "macos") {
            OperatingSystem::Mac
        } else {
            OperatingSystem::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Architecture {
    #[serde(rename = "x64")]
    X64,
    #[serde(rename = "x32")]
    X32,
    #[serde(other)]
    Unknown,
}

impl Architecture {
    pub fn host() -> Self {
        if cfg!(target_pointer_width = "64") {
            Architecture::X64
        } else {
            Architecture::X32
        }
    }

    /// A 64-bit host also runs 32-bit modules.
    fn runs(self, target: Architecture) -> bool {
        self == target || (self == Architecture::X64 && target == Architecture::X32)
    }
}

/// On-disk descriptor pointing the registry at a candidate executable.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleLink {
    /// A relative path is taken from the descriptor's directory, not the
    /// current working directory.
    #[serde(rename = "executable-path")]
    pub executable_path: Option<String>,

    #[serde(rename = "operating-system", default)]
    pub operating_system: Option<OperatingSystem>,

    #[serde(default)]
    pub architecture: Option<Architecture>,

    /// Everything else in the descriptor, kept opaque.
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl ModuleLink {
    pub fn parse(content: &str) -> Result<Self, CandidateError> {
        serde_json::from_str(content).map_err(|e| CandidateError::InvalidDescriptor {
            error: e.to_string(),
        })
    }

    /// Resolve the executable, relative paths being taken from the descriptor's directory.
    pub fn resolve_executable(&self, link_path: &Path) -> Result<PathBuf, CandidateError> {
        let raw = self
            .executable_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or(CandidateError::MissingExecutablePath)?;

        let path = PathBuf::from(raw);
        let path = if path.is_relative() {
            link_path
                .parent()
                .map(|dir| dir.join(&path))
                .unwrap_or(path)
        } else {
            path
        };

        if !path.exists() {
            return Err(CandidateError::ExecutableNotFound {
                path: path.display().to_string(),
            });
        }
        Ok(path)
    }

    /// Platform fields are optional; only declared ones are checked.
    pub fn check_compatible(
        &self,
        os: OperatingSystem,
        arch: Architecture,
    ) -> Result<(), CandidateError> {
        let os_ok = self
            .operating_system
            .is_none_or(|target| target != OperatingSystem::Unknown && target == os);
        let arch_ok = self
            .architecture
            .is_none_or(|target| target != Architecture::Unknown && arch.runs(target));
        if os_ok && arch_ok {
            Ok(())
        } else {
            Err(CandidateError::Incompatible {
                operating_system: self.operating_system,
                architecture: self.architecture,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parse_keeps_unknown_fields_as_metadata() {
        let link = ModuleLink::parse(
            r#"{"executable-path": "/opt/seg", "operating-system": "Linux", "architecture": "x64", "source": "repo"}"#,
        )
        .unwrap();
        assert_eq!(link.executable_path.as_deref(), Some("/opt/seg"));
        assert_eq!(link.operating_system, Some(OperatingSystem::Linux));
        assert_eq!(link.architecture, Some(Architecture::X64));
        assert_eq!(link.metadata["source"], "repo");
    }

    #[test]
    fn parse_rejects_non_object() {
        let err = ModuleLink::parse("[1, 2]").unwrap_err();
        assert!(matches!(err, CandidateError::InvalidDescriptor { .. }));
    }

    #[test]
    fn missing_executable_path_is_reported() {
        let link = ModuleLink::parse(r#"{"name": "seg"}"#).unwrap();
        let err = link.resolve_executable(Path::new("/links/seg.json")).unwrap_err();
        assert_eq!(err, CandidateError::MissingExecutablePath);
    }

    #[test]
    fn relative_executable_resolves_next_to_descriptor() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("seg-bin"), "").unwrap();
        let link = ModuleLink::parse(r#"{"executable-path": "seg-bin"}"#).unwrap();

        let resolved = link
            .resolve_executable(&dir.path().join("seg.json"))
            .unwrap();
        assert_eq!(resolved, dir.path().join("seg-bin"));
    }

    #[test]
    fn nonexistent_executable_is_reported() {
        let link = ModuleLink::parse(r#"{"executable-path": "/nonexistent/seg"}"#).unwrap();
        let err = link.resolve_executable(Path::new("/links/seg.json")).unwrap_err();
        assert!(matches!(err, CandidateError::ExecutableNotFound { .. }));
    }

    #[test]
    fn compatibility_follows_declared_platform() {
        let any = ModuleLink::parse(r#"{"executable-path": "/x"}"#).unwrap();
        assert!(any
            .check_compatible(OperatingSystem::Linux, Architecture::X64)
            .is_ok());

        let win32 = ModuleLink::parse(
            r#"{"executable-path": "/x", "operating-system": "Windows", "architecture": "x32"}"#,
        )
        .unwrap();
        assert!(win32
            .check_compatible(OperatingSystem::Windows, Architecture::X64)
            .is_ok());
        assert!(win32
            .check_compatible(OperatingSystem::Linux, Architecture::X64)
            .is_err());

        let x64 = ModuleLink::parse(r#"{"executable-path": "/x", "architecture": "x64"}"#).unwrap();
        assert!(x64
            .check_compatible(OperatingSystem::Linux, Architecture::X32)
            .is_err());
    }

    #[test]
    fn unknown_platform_never_matches() {
        let link =
            ModuleLink::parse(r#"{"executable-path": "/x", "operating-system": "Plan9"}"#).unwrap();
        assert_eq!(link.operating_system, Some(OperatingSystem::Unknown));
        assert!(link
            .check_compatible(OperatingSystem::Linux, Architecture::X64)
            .is_err());
    }
}
