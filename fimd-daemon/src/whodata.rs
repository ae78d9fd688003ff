//! Whodata (attribution) initialization.
//!
//! Directories flagged for whodata are registered with their 1-based
//! configured position as priority. What happens next depends on the backend:
//! the audit-log backend synchronizes once, the state-checker backend keeps a
//! periodic reconciliation task running.

use std::sync::Arc;
use std::time::Duration;

use fimd_core::AgentConfig;

use crate::error::DaemonError;
use crate::launcher::{Shutdown, TaskLauncher};
use crate::notify_source::WatchTable;
use crate::source::{Capability, WatchMode, WatchReconciler, WatchRegistrar};
use crate::state::DaemonState;

pub enum WhodataBackend {
    /// Audit subsystem attribution: one-shot consistency sync.
    AuditLog { reconciler: Arc<dyn WatchReconciler> },
    /// Polling attribution: a background task reconciles watch state.
    StateChecker {
        setup_ok: bool,
        reconciler: Arc<dyn WatchReconciler>,
        interval: Duration,
    },
}

impl WhodataBackend {
    /// Backend for this build, attached to the live watch table.
    pub fn for_platform(table: WatchTable, config: &AgentConfig) -> Capability<Self> {
        let reconciler: Arc<dyn WatchReconciler> = Arc::new(table);
        if cfg!(target_os = "linux") {
            Capability::Supported(WhodataBackend::AuditLog { reconciler })
        } else if crate::notify_source::REALTIME_SUPPORTED {
            Capability::Supported(WhodataBackend::StateChecker {
                setup_ok: true,
                reconciler,
                interval: config.whodata_check_interval(),
            })
        } else {
            Capability::Unsupported
        }
    }
}

/// Register whodata directories and start the backend's consistency work.
///
/// An unsupported backend is a warning and `Ok`. Failing to launch the
/// state checker is the only error.
pub fn initialize(
    config: &AgentConfig,
    backend: &Capability<WhodataBackend>,
    registrar: &dyn WatchRegistrar,
    state: &DaemonState,
    launcher: &mut TaskLauncher,
) -> Result<(), DaemonError> {
    let Capability::Supported(backend) = backend else {
        tracing::warn!("whodata monitoring is not supported on this platform");
        return Ok(());
    };

    let mut registered = 0usize;
    for (priority, dir) in config.whodata_directories() {
        match registrar.register_watch(&dir.path, WatchMode::Whodata { priority }) {
            Ok(()) => registered += 1,
            Err(err) => {
                tracing::error!(path = %dir.path.display(), priority = priority.get(), error = %err, "unable to add whodata watch");
            }
        }
    }
    tracing::debug!(registered, "whodata watches registered");

    match backend {
        WhodataBackend::AuditLog { reconciler } => {
            let repaired = reconciler.reconcile()?;
            tracing::info!(repaired, "whodata consistency synchronized");
        }
        WhodataBackend::StateChecker {
            setup_ok,
            reconciler,
            interval,
        } => {
            if *setup_ok && !state.scan_in_progress() {
                let shutdown = launcher.shutdown();
                launcher.spawn(
                    "whodata-checker",
                    state_checker(reconciler.clone(), *interval, shutdown),
                )?;
            } else {
                tracing::debug!(setup_ok, "whodata state checker not started");
            }
        }
    }
    Ok(())
}

async fn state_checker(
    reconciler: Arc<dyn WatchReconciler>,
    interval: Duration,
    mut shutdown: Shutdown,
) -> Result<(), DaemonError> {
    tracing::info!(interval_secs = interval.as_secs(), "whodata state checker started");
    while !shutdown.sleep(interval).await {
        match reconciler.reconcile() {
            Ok(0) => {}
            Ok(repaired) => tracing::info!(repaired, "whodata watches reconciled"),
            Err(err) => tracing::warn!(error = %err, "whodata reconciliation failed"),
        }
    }
    Ok(())
}
