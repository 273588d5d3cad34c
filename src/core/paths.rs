use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;

/// Environment variable holding extra module link directories, `;`-separated.
pub const MODULE_LINK_PATHS_ENV: &str = "MISA_MODULE_LINK_PATHS";

/// Default manifest file name inside the pipeline root.
pub const MANIFEST_FILE: &str = "pipeline.json";

/// Per-node parameter file handed to the module.
pub const PARAMETERS_FILE: &str = "parameters.json";

/// Base MISA-ImageJ config directory shared with the ImageJ tooling.
pub fn app_config() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected("APPDATA environment variable not set on Windows")
        })?;
        Ok(PathBuf::from(appdata).join("MISA-ImageJ"))
    }

    #[cfg(not(windows))]
    {
        if let Some(xdg) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(xdg).join("MISA-ImageJ"));
        }
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected("HOME environment variable not set on Unix-like system")
        })?;
        Ok(PathBuf::from(home).join(".config").join("MISA-ImageJ"))
    }
}

/// User-level module link directory
pub fn user_modules() -> Result<PathBuf> {
    Ok(app_config()?.join("misa-modules"))
}

/// Runner configuration file
pub fn config_file() -> Result<PathBuf> {
    Ok(app_config()?.join("misa-pipeline.json"))
}

/// System-wide module link directories, lowest priority.
pub fn system_modules() -> Vec<PathBuf> {
    if cfg!(target_os = "linux") {
        [
            "/usr/lib/misaxx/modules",
            "/usr/local/lib/misaxx/modules",
            "/usr/local/lib32/misaxx/modules",
            "/usr/local/lib64/misaxx/modules",
        ]
        .iter()
        .map(PathBuf::from)
        .collect()
    } else {
        Vec::new()
    }
}

/// Split a `MISA_MODULE_LINK_PATHS` value into directories, dropping empty entries.
pub fn split_link_paths(value: &str) -> Vec<PathBuf> {
    value
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Directories listed in `MISA_MODULE_LINK_PATHS`.
pub fn env_modules() -> Vec<PathBuf> {
    env::var(MODULE_LINK_PATHS_ENV)
        .map(|value| split_link_paths(&value))
        .unwrap_or_default()
}
