use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::paths;

/// Root configuration structure for misa-pipeline.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Extra module link directories, searched after `MISA_MODULE_LINK_PATHS`.
    #[serde(default)]
    pub module_paths: Vec<String>,

    #[serde(default = "default_include_system_paths")]
    pub include_system_paths: bool,

    #[serde(default = "default_module_info_timeout_secs")]
    pub module_info_timeout_secs: u64,

    /// No timeout when unset: a hung module blocks the pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_timeout_secs: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            module_paths: Vec::new(),
            include_system_paths: default_include_system_paths(),
            module_info_timeout_secs: default_module_info_timeout_secs(),
            node_timeout_secs: None,
        }
    }
}

fn default_include_system_paths() -> bool {
    true
}

fn default_module_info_timeout_secs() -> u64 {
    10
}

impl RunnerConfig {
    pub fn module_info_timeout(&self) -> Duration {
        Duration::from_secs(self.module_info_timeout_secs)
    }

    pub fn node_timeout(&self) -> Option<Duration> {
        self.node_timeout_secs.map(Duration::from_secs)
    }

    /// Configured module paths with `~` and `$VAR` expanded.
    pub fn expanded_module_paths(&self) -> Result<Vec<PathBuf>> {
        self.module_paths
            .iter()
            .map(|raw| {
                shellexpand::full(raw)
                    .map(|expanded| PathBuf::from(expanded.as_ref()))
                    .map_err(|e| {
                        Error::config_invalid_value(
                            "module_paths",
                            Some(raw.clone()),
                            e.to_string(),
                        )
                    })
            })
            .collect()
    }

    fn validate(&self) -> Result<()> {
        if self.module_info_timeout_secs == 0 {
            return Err(Error::config_invalid_value(
                "module_info_timeout_secs",
                Some("0".to_string()),
                "must be at least 1 second",
            ));
        }
        if self.node_timeout_secs == Some(0) {
            return Err(Error::config_invalid_value(
                "node_timeout_secs",
                Some("0".to_string()),
                "must be at least 1 second; omit it to disable the timeout",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Loading functions
// =============================================================================

/// Load the user config file, falling back to built-in defaults when it is absent.
pub fn load_config() -> Result<RunnerConfig> {
    let path = paths::config_file()?;
    load_config_from(&path)
}

/// Load config from an explicit path. A missing file yields the defaults;
/// a present but malformed file is an error.
pub fn load_config_from(path: &Path) -> Result<RunnerConfig> {
    if !path.exists() {
        return Ok(RunnerConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;

    let config: RunnerConfig = serde_json::from_str(&content)
        .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))?;

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config_from(&dir.path().join("absent.json")).unwrap();
        assert!(config.module_paths.is_empty());
        assert!(config.include_system_paths);
        assert_eq!(config.module_info_timeout_secs, 10);
        assert!(config.node_timeout().is_none());
    }

    #[test]
    fn partial_file_merges_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("misa-pipeline.json");
        fs::write(&path, r#"{"node_timeout_secs": 120, "module_paths": ["/opt/misa"]}"#).unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.node_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.module_info_timeout_secs, 10);
        assert_eq!(
            config.expanded_module_paths().unwrap(),
            vec![PathBuf::from("/opt/misa")]
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("misa-pipeline.json");
        fs::write(&path, "{ not json").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_json");
    }

    #[test]
    fn zero_node_timeout_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("misa-pipeline.json");
        fs::write(&path, r#"{"node_timeout_secs": 0}"#).unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
    }
}
