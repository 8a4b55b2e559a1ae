// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Locating and parsing config files.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;

use super::types::ConductorConfig;

/// Config file names to search for (in order).
pub const CONFIG_FILES: &[&str] = &[
    ".conductor.json",
    ".conductor/config.json",
    "conductor.config.yaml",
];

/// Local config file name (for per-directory overrides).
pub const LOCAL_CONFIG_FILE: &str = ".conductor.local.json";

/// Global config directory name.
pub const GLOBAL_CONFIG_DIR: &str = ".conductor";

/// Global config file name.
pub const GLOBAL_CONFIG_FILE: &str = "config.json";

/// `~/.conductor`, if a home directory is known.
pub fn get_global_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR))
}

/// `~/.conductor/config.json`, if a home directory is known.
pub fn get_global_config_path() -> Option<PathBuf> {
    get_global_config_dir().map(|dir| dir.join(GLOBAL_CONFIG_FILE))
}

/// Parse `path` if it exists.
fn load_if_present(path: &Path) -> Result<Option<ConductorConfig>, ConfigError> {
    if path.is_file() {
        debug!(path = %path.display(), "Loading config file");
        load_config_file(path).map(Some)
    } else {
        Ok(None)
    }
}

pub fn load_global_config() -> Result<Option<ConductorConfig>, ConfigError> {
    match get_global_config_path() {
        Some(path) => load_if_present(&path),
        None => Ok(None),
    }
}

/// Workspace configuration: the first of [`CONFIG_FILES`] present under
/// `workspace_root`.
pub fn load_workspace_config(workspace_root: &Path) -> Result<Option<ConductorConfig>, ConfigError> {
    match CONFIG_FILES
        .iter()
        .map(|name| workspace_root.join(name))
        .find(|path| path.is_file())
    {
        Some(path) => load_if_present(&path),
        None => Ok(None),
    }
}

/// Personal overrides from [`LOCAL_CONFIG_FILE`], normally gitignored.
pub fn load_local_config(workspace_root: &Path) -> Result<Option<ConductorConfig>, ConfigError> {
    load_if_present(&workspace_root.join(LOCAL_CONFIG_FILE))
}

/// Parse a config file. `.yaml`/`.yml` files are read as YAML, anything
/// else as JSON.
pub fn load_config_file(path: &Path) -> Result<ConductorConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

    if is_yaml {
        Ok(serde_yaml::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(&content)?)
    }
}

/// Find the workspace root by searching for config files.
///
/// Walks up from `start` until a directory containing a config file is
/// found or the filesystem root is reached.
pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| CONFIG_FILES.iter().any(|name| dir.join(name).exists()))
        .map(Path::to_path_buf)
}
