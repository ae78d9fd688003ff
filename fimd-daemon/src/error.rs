use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the scheduler, watchers, delivery channel and control socket.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("configuration error: {0}")]
    Config(#[from] fimd_core::ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The delivery queue could not be reopened after a send failure.
    #[error("unable to reopen delivery queue at {path}: {source}")]
    QueueReopen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch {task} task: {reason}")]
    TaskLaunch { task: &'static str, reason: String },

    #[error("{name} failed: {reason}")]
    Collaborator { name: &'static str, reason: String },

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

impl DaemonError {
    /// Errors after which the daemon cannot keep its delivery guarantee.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DaemonError::QueueReopen { .. })
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn collaborator_err(name: &'static str, reason: impl ToString) -> DaemonError {
    DaemonError::Collaborator {
        name,
        reason: reason.to_string(),
    }
}
