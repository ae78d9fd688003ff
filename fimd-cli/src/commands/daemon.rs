//! `fimd start|rescan|stop`: daemon lifecycle.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use fimd_daemon::{request_rescan, request_stop, start_blocking, DaemonError};

use super::load_config;

pub fn start(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    start_blocking(config).context("daemon exited with error")
}

pub fn rescan(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    match request_rescan(&config.control_socket) {
        Ok(_) => println!("{} rescan requested", "✓".green().bold()),
        Err(DaemonError::DaemonNotRunning { .. }) => println!("daemon is not running"),
        Err(err) => return Err(err).context("failed to request rescan"),
    }
    Ok(())
}

pub fn stop(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    match request_stop(&config.control_socket) {
        Ok(()) => println!("daemon stop requested"),
        Err(DaemonError::DaemonNotRunning { .. }) => println!("daemon is not running"),
        Err(err) => return Err(err).context("failed to stop daemon"),
    }
    Ok(())
}
