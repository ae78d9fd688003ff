//! Domain types for the agent configuration snapshot.
//!
//! All path fields use `PathBuf`. Every type is (de)serializable via
//! serde + serde_yaml and carries defaults so a minimal file stays minimal.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::calendar::{ScanDays, ScanTime};

/// Interval forced onto the elapsed trigger whenever a calendar trigger exists.
pub const CALENDAR_FALLBACK_FREQUENCY_SECS: u64 = 604_800;

pub const DEFAULT_FREQUENCY_SECS: u64 = 43_200;
pub const DEFAULT_PROCESS_PRIORITY: i32 = 10;
pub const DEFAULT_QUEUE_PATH: &str = "/var/lib/fimd/queue/sockets/queue";
pub const DEFAULT_DIFF_DIR: &str = "/var/lib/fimd/diff";
pub const DEFAULT_CONTROL_SOCKET: &str = "/run/fimd/control.sock";
pub const DEFAULT_WHODATA_CHECK_SECS: u64 = 300;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Log output format for the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// A monitored directory and the live monitoring modes applied to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub realtime: bool,
    #[serde(default)]
    pub whodata: bool,
}

/// An external program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandSpec(pub Vec<String>);

impl CommandSpec {
    pub fn program(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn args(&self) -> &[String] {
        self.0.get(1..).unwrap_or(&[])
    }
}

/// A periodically executed external job (rootcheck, inventory sync).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub command: CommandSpec,
    pub interval_secs: u64,
}

impl JobConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Read-only configuration snapshot shared by every daemon task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Seconds to wait after boot before doing anything.
    #[serde(default)]
    pub settle_delay_secs: u64,
    /// Increment passed to `nice(2)`; higher means lower priority.
    #[serde(default = "default_process_priority")]
    pub process_priority: i32,
    /// Pacing delay after every sync/change send, in microseconds.
    #[serde(default)]
    pub send_delay_us: u64,
    #[serde(default = "default_frequency_secs")]
    pub frequency_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_time: Option<ScanTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_day: Option<ScanDays>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub enable_inventory: bool,
    #[serde(default)]
    pub directories: Vec<DirectoryConfig>,
    #[serde(default = "default_queue_path")]
    pub queue_path: PathBuf,
    #[serde(default = "default_diff_dir")]
    pub diff_dir: PathBuf,
    #[serde(default = "default_control_socket")]
    pub control_socket: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_marker: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_command: Option<CommandSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rootcheck: Option<JobConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<JobConfig>,
    #[serde(default = "default_whodata_check_secs")]
    pub whodata_check_secs: u64,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            settle_delay_secs: 0,
            process_priority: DEFAULT_PROCESS_PRIORITY,
            send_delay_us: 0,
            frequency_secs: DEFAULT_FREQUENCY_SECS,
            scan_time: None,
            scan_day: None,
            disabled: false,
            enable_inventory: false,
            directories: Vec::new(),
            queue_path: default_queue_path(),
            diff_dir: default_diff_dir(),
            control_socket: default_control_socket(),
            restart_marker: None,
            scan_command: None,
            rootcheck: None,
            inventory: None,
            whodata_check_secs: DEFAULT_WHODATA_CHECK_SECS,
            log_format: LogFormat::Text,
        }
    }
}

impl AgentConfig {
    pub fn has_calendar_trigger(&self) -> bool {
        self.scan_time.is_some() || self.scan_day.is_some()
    }

    /// Elapsed-interval trigger actually used by the scheduler.
    ///
    /// A calendar trigger pins it to one week so the calendar dominates.
    pub fn effective_frequency(&self) -> Duration {
        if self.has_calendar_trigger() {
            Duration::from_secs(CALENDAR_FALLBACK_FREQUENCY_SECS)
        } else {
            Duration::from_secs(self.frequency_secs)
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_micros(self.send_delay_us)
    }

    pub fn whodata_check_interval(&self) -> Duration {
        Duration::from_secs(self.whodata_check_secs.max(1))
    }

    /// Directories flagged for plain real-time monitoring.
    pub fn realtime_directories(&self) -> impl Iterator<Item = &DirectoryConfig> {
        self.directories.iter().filter(|d| d.realtime)
    }

    /// Directories flagged for whodata, paired with their 1-based position
    /// in the directory list.
    pub fn whodata_directories(&self) -> impl Iterator<Item = (NonZeroUsize, &DirectoryConfig)> {
        self.directories
            .iter()
            .enumerate()
            .filter(|(_, d)| d.whodata)
            .filter_map(|(i, d)| NonZeroUsize::new(i + 1).map(|p| (p, d)))
    }

    /// `<diff_dir>/local`, purged at every daemon start.
    pub fn diff_cache_dir(&self) -> PathBuf {
        self.diff_dir.join("local")
    }
}

fn default_process_priority() -> i32 {
    DEFAULT_PROCESS_PRIORITY
}

fn default_frequency_secs() -> u64 {
    DEFAULT_FREQUENCY_SECS
}

fn default_queue_path() -> PathBuf {
    PathBuf::from(DEFAULT_QUEUE_PATH)
}

fn default_diff_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DIFF_DIR)
}

fn default_control_socket() -> PathBuf {
    PathBuf::from(DEFAULT_CONTROL_SOCKET)
}

fn default_whodata_check_secs() -> u64 {
    DEFAULT_WHODATA_CHECK_SECS
}
