//! Change-notification capability shared by the real-time watcher and the
//! whodata initializer.

use std::future::Future;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::error::DaemonError;

/// A mechanism that exists on some platforms and not on others.
#[derive(Debug)]
pub enum Capability<T> {
    Supported(T),
    Unsupported,
}

impl<T> Capability<T> {
    pub fn is_supported(&self) -> bool {
        matches!(self, Capability::Supported(_))
    }
}

/// Which monitoring mode registered a directory.
///
/// Whodata carries the directory's 1-based position; plain real-time has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum WatchMode {
    Realtime,
    Whodata { priority: NonZeroUsize },
}

/// Per-directory registration: which live modes apply to it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WatchDescriptor {
    pub realtime: bool,
    pub whodata: Option<NonZeroUsize>,
}

impl WatchDescriptor {
    pub fn apply(&mut self, mode: WatchMode) {
        match mode {
            WatchMode::Realtime => self.realtime = true,
            WatchMode::Whodata { priority } => self.whodata = Some(priority),
        }
    }

    /// Mode used to tag events under this directory; whodata wins.
    pub fn effective_mode(&self) -> Option<WatchMode> {
        match (self.whodata, self.realtime) {
            (Some(priority), _) => Some(WatchMode::Whodata { priority }),
            (None, true) => Some(WatchMode::Realtime),
            (None, false) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Other,
}

/// A single drained filesystem change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    #[serde(flatten)]
    pub mode: WatchMode,
}

/// Result of one bounded wait on a change source.
#[derive(Debug)]
pub enum WaitOutcome {
    Ready,
    Timeout,
    Error(DaemonError),
}

/// The platform change-notification primitive.
pub trait ChangeSource: Send + 'static {
    /// False when the underlying handle is missing or was lost.
    fn is_valid(&self) -> bool;

    /// Block for at most `timeout` until at least one event is ready.
    fn wait(&mut self, timeout: Duration) -> impl Future<Output = WaitOutcome> + Send;

    /// Take every event that is ready right now.
    fn drain(&mut self) -> Vec<ChangeEvent>;
}

/// Adds directories to the live watch set. Shared by the watcher task and the
/// whodata initializer.
pub trait WatchRegistrar: Send + Sync {
    fn register_watch(&self, path: &Path, mode: WatchMode) -> Result<(), DaemonError>;
}

/// Reconciles the registered watch set against the live filesystem.
///
/// Returns how many registrations were repaired.
pub trait WatchReconciler: Send + Sync {
    fn reconcile(&self) -> Result<usize, DaemonError>;
}
