//! Runtime state shared between tasks and the control socket.
//!
//! Everything here is either atomic or behind the status tracker's own lock.
//! The configuration snapshot is not part of it and is never written.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

use crate::status::{RealtimeStatus, StatusTracker};

/// Administrative "rescan now" request.
///
/// Set by the control socket, or by an operator creating the marker file.
#[derive(Debug, Default)]
pub struct ForcedRescan {
    requested: AtomicBool,
    marker: Option<PathBuf>,
}

impl ForcedRescan {
    pub fn new(marker: Option<PathBuf>) -> Self {
        Self {
            requested: AtomicBool::new(false),
            marker,
        }
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Consume a pending request. The marker file is removed when seen.
    pub fn take(&self) -> bool {
        let flagged = self.requested.swap(false, Ordering::SeqCst);
        let marked = match &self.marker {
            Some(marker) => match fs::remove_file(marker) {
                Ok(()) => true,
                Err(err) if err.kind() == ErrorKind::NotFound => false,
                Err(err) => {
                    tracing::warn!(marker = %marker.display(), error = %err, "cannot consume restart marker");
                    marker.exists()
                }
            },
            None => false,
        };
        flagged || marked
    }
}

#[derive(Debug, Default)]
pub struct DaemonState {
    pub status: StatusTracker,
    pub rescan: ForcedRescan,
    scan_in_progress: AtomicBool,
    last_scan_unix: AtomicI64,
    scans_completed: AtomicU64,
    started_at_unix: i64,
}

/// Point-in-time copy of [`DaemonState`] for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub realtime: RealtimeStatus,
    pub scan_in_progress: bool,
    pub last_scan_at_unix: i64,
    pub scans_completed: u64,
    pub started_at_unix: i64,
}

impl DaemonState {
    pub fn new(rescan: ForcedRescan, started_at_unix: i64) -> Self {
        Self {
            status: StatusTracker::new(),
            rescan,
            scan_in_progress: AtomicBool::new(false),
            last_scan_unix: AtomicI64::new(0),
            scans_completed: AtomicU64::new(0),
            started_at_unix,
        }
    }

    pub fn scan_in_progress(&self) -> bool {
        self.scan_in_progress.load(Ordering::SeqCst)
    }

    pub(crate) fn begin_scan(&self) {
        self.scan_in_progress.store(true, Ordering::SeqCst);
    }

    pub(crate) fn finish_scan(&self, at_unix: i64) {
        self.last_scan_unix.store(at_unix, Ordering::SeqCst);
        self.scans_completed.fetch_add(1, Ordering::SeqCst);
        self.scan_in_progress.store(false, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            realtime: self.status.current(),
            scan_in_progress: self.scan_in_progress(),
            last_scan_at_unix: self.last_scan_unix.load(Ordering::SeqCst),
            scans_completed: self.scans_completed.load(Ordering::SeqCst),
            started_at_unix: self.started_at_unix,
        }
    }
}
