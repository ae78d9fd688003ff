pub mod check;
pub mod daemon;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use fimd_core::config::{load_at, DEFAULT_CONFIG_PATH};
use fimd_core::AgentConfig;

/// `--config` wins; otherwise the system file, then `<config dir>/fimd/fimd.yaml`.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    let system = PathBuf::from(DEFAULT_CONFIG_PATH);
    if system.exists() {
        return system;
    }
    dirs::config_dir()
        .map(|dir| dir.join("fimd").join("fimd.yaml"))
        .filter(|path| path.exists())
        .unwrap_or(system)
}

pub fn load_config(path: &Path) -> Result<AgentConfig> {
    load_at(path).with_context(|| format!("failed to load configuration {}", path.display()))
}
