//! `fimd check-config`: validate without starting anything.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use super::load_config;

pub fn run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    println!("{} {} is valid", "✓".green().bold(), config_path.display());
    if config.disabled {
        println!("  monitoring: {}", "disabled".yellow());
    }
    println!("  scan frequency: {}s", config.effective_frequency().as_secs());
    if let Some(time) = config.scan_time {
        println!("  scan time: {time}");
    }
    if let Some(days) = config.scan_day {
        println!("  scan days: {days}");
    }
    println!(
        "  directories: {} ({} real-time, {} whodata)",
        config.directories.len(),
        config.realtime_directories().count(),
        config.whodata_directories().count()
    );
    println!("  queue: {}", config.queue_path.display());
    println!("  control socket: {}", config.control_socket.display());
    Ok(())
}
