//! `fimd status`: runtime state from the control socket.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde_json::{json, Value};

use fimd_daemon::{request_status, DaemonError};

use super::load_config;

/// Arguments for `fimd status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        let config = load_config(config_path)?;
        let status = match request_status(&config.control_socket) {
            Ok(status) => status,
            Err(DaemonError::DaemonNotRunning { .. }) => json!({
                "running": false,
                "socket": config.control_socket.display().to_string(),
            }),
            Err(err) => return Err(err).context("failed to query daemon status"),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&status)
                    .context("failed to render daemon status JSON")?
            );
        } else {
            print_human(&status);
        }
        Ok(())
    }
}

fn print_human(status: &Value) {
    if status["running"] != Value::Bool(true) {
        println!("{} daemon is not running", "■".red().bold());
        return;
    }

    let realtime = status["realtime"].as_str().unwrap_or("unknown");
    let marker = match realtime {
        "running" => "■".green().bold(),
        "paused" => "■".yellow().bold(),
        _ => "■".dimmed(),
    };
    println!("{} daemon running (pid {})", "■".green().bold(), status["pid"]);
    println!("{marker} real-time monitoring: {realtime}");
    if status["disabled"] == Value::Bool(true) {
        println!("  scanning disabled by configuration");
    }
    println!(
        "  scans completed: {}{}",
        status["scans_completed"],
        if status["scan_in_progress"] == Value::Bool(true) {
            " (scan in progress)"
        } else {
            ""
        }
    );
    println!(
        "  last scan: {}",
        format_unix(status["last_scan_at_unix"].as_i64().unwrap_or(0))
    );
    println!(
        "  started:   {}",
        format_unix(status["started_at_unix"].as_i64().unwrap_or(0))
    );
    println!("  frequency: {}s", status["frequency_secs"]);
}

fn format_unix(secs: i64) -> String {
    if secs <= 0 {
        return "never".to_string();
    }
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}
