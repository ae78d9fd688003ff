//! File integrity monitoring daemon: scan scheduler, real-time watcher,
//! whodata initialization, delivery channel and control socket.

pub mod collaborators;
pub mod delivery;
mod error;
pub mod launcher;
pub mod notify_source;
pub mod protocol;
pub mod realtime;
mod runtime;
pub mod scheduler;
pub mod source;
pub mod state;
pub mod status;
pub mod system;
pub mod whodata;

#[cfg(test)]
mod test_support;

pub use collaborators::{
    BaselineScanner, ChangeForwarder, CommandJob, CommandScanner, EventProcessor, PeriodicJob,
};
pub use delivery::{DeliveryChannel, RoutingClass, ScanInfo, UnixQueue, SYSCHECK_LOCATION};
pub use error::DaemonError;
pub use launcher::{Shutdown, ShutdownTrigger, TaskLauncher};
pub use protocol::{
    request_rescan, request_status, request_stop, send_request, ControlClient, ControlCommand,
    ControlRequest, ControlResponse,
};
pub use runtime::{run, start_blocking};
pub use scheduler::{Clock, ScanSchedule, ScheduleState, Scheduler, SystemClock, POLL_INTERVAL};
pub use status::{RealtimeStatus, StatusTracker, Transition};
