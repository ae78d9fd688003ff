//! fimd: file integrity monitoring daemon.
//!
//! # Usage
//!
//! ```text
//! fimd [--config <path>] start
//! fimd [--config <path>] status [--json]
//! fimd [--config <path>] rescan
//! fimd [--config <path>] stop
//! fimd [--config <path>] check-config
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::status::StatusArgs;

#[derive(Parser, Debug)]
#[command(
    name = "fimd",
    version,
    about = "File integrity monitoring daemon",
    long_about = None,
)]
struct Cli {
    /// Configuration file (defaults to /etc/fimd/fimd.yaml, then the user config dir).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the daemon in the foreground.
    Start,

    /// Query the running daemon over its control socket.
    Status(StatusArgs),

    /// Ask the running daemon for an immediate baseline scan.
    Rescan,

    /// Request graceful daemon shutdown.
    Stop,

    /// Load and validate the configuration, then print a summary.
    CheckConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = commands::resolve_config_path(cli.config);
    match cli.command {
        Commands::Start => commands::daemon::start(&config_path),
        Commands::Status(args) => args.run(&config_path),
        Commands::Rescan => commands::daemon::rescan(&config_path),
        Commands::Stop => commands::daemon::stop(&config_path),
        Commands::CheckConfig => commands::check::run(&config_path),
    }
}
