//! YAML configuration loading.
//!
//! # API pattern
//!
//! - `load_at(path)`: explicit path; used in tests with `TempDir`
//! - `load()`: reads [`DEFAULT_CONFIG_PATH`], delegates to `load_at`
//!
//! Both return a validated snapshot. Nothing in the daemon mutates it
//! afterwards.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::types::AgentConfig;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/fimd/fimd.yaml";

/// Load and validate the configuration at `path`.
///
/// Returns `ConfigError::NotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(path: &Path) -> Result<AgentConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&contents, path)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<AgentConfig, ConfigError> {
    load_at(Path::new(DEFAULT_CONFIG_PATH))
}

/// Parse YAML text; `origin` is only used for error messages.
pub fn parse(contents: &str, origin: &Path) -> Result<AgentConfig, ConfigError> {
    let config: AgentConfig =
        serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
    validate(&config)?;
    Ok(config)
}

/// Reject values the daemon cannot start with.
pub fn validate(config: &AgentConfig) -> Result<(), ConfigError> {
    if config.queue_path.as_os_str().is_empty() {
        return Err(ConfigError::invalid("queue_path", "must not be empty"));
    }
    if config.control_socket.as_os_str().is_empty() {
        return Err(ConfigError::invalid("control_socket", "must not be empty"));
    }

    let mut seen: HashSet<&PathBuf> = HashSet::new();
    for dir in &config.directories {
        if !dir.path.is_absolute() {
            return Err(ConfigError::invalid(
                "directories",
                format!("{} is not an absolute path", dir.path.display()),
            ));
        }
        if !seen.insert(&dir.path) {
            return Err(ConfigError::invalid(
                "directories",
                format!("{} is listed more than once", dir.path.display()),
            ));
        }
    }

    if let Some(command) = &config.scan_command {
        if command.program().is_none() {
            return Err(ConfigError::invalid("scan_command", "empty command"));
        }
    }
    for (field, job) in [("rootcheck", &config.rootcheck), ("inventory", &config.inventory)] {
        if let Some(job) = job {
            if job.command.program().is_none() {
                return Err(ConfigError::invalid(field, "empty command"));
            }
            if job.interval_secs == 0 {
                return Err(ConfigError::invalid(field, "interval_secs must be positive"));
            }
        }
    }
    Ok(())
}
