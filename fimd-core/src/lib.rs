//! fimd core library: the configuration snapshot and its calendar triggers.
//!
//! Public API surface:
//! - [`types`]: [`AgentConfig`] and the structs it is built from
//! - [`calendar`]: [`ScanTime`] / [`ScanDays`] calendar trigger values
//! - [`config`]: load / parse / validate
//! - [`error`]: [`ConfigError`]

pub mod calendar;
pub mod config;
pub mod error;
pub mod types;

pub use calendar::{ScanDays, ScanTime};
pub use error::ConfigError;
pub use types::{
    AgentConfig, CommandSpec, DirectoryConfig, JobConfig, LogFormat,
    CALENDAR_FALLBACK_FREQUENCY_SECS,
};
