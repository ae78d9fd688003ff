//! Contracts for the work the daemon orchestrates but does not implement
//! (tree scanning, event processing, rootcheck, inventory sync), plus thin
//! adapters that delegate that work to external commands.

use std::io::{self, BufRead, BufReader};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use fimd_core::{CommandSpec, JobConfig};

use crate::delivery::{DeliveryChannel, RoutingClass, SYSCHECK_LOCATION};
use crate::error::{collaborator_err, io_err, DaemonError};
use crate::launcher::{run_blocking, Shutdown};
use crate::source::ChangeEvent;

/// Full traversal and hashing of monitored paths.
pub trait BaselineScanner: Send + Sync {
    fn scan(&self, channel: &DeliveryChannel) -> Result<(), DaemonError>;
}

/// Turns drained change events into delivered findings.
pub trait EventProcessor: Send + Sync {
    fn process(&self, events: Vec<ChangeEvent>, channel: &DeliveryChannel)
        -> Result<(), DaemonError>;
}

/// A unit of work repeated on a fixed interval until shutdown.
pub trait PeriodicJob: Send + Sync {
    fn name(&self) -> &'static str;
    fn interval(&self) -> Duration;
    fn run_once(&self, channel: &DeliveryChannel) -> Result<(), DaemonError>;
}

// ---------------------------------------------------------------------------
// Command adapters
// ---------------------------------------------------------------------------

/// Runs the configured scan program and forwards every stdout line as a
/// change message.
pub struct CommandScanner {
    command: CommandSpec,
}

impl CommandScanner {
    pub fn new(command: CommandSpec) -> Self {
        Self { command }
    }
}

impl BaselineScanner for CommandScanner {
    fn scan(&self, channel: &DeliveryChannel) -> Result<(), DaemonError> {
        let forwarded = run_command_lines("baseline scan", &self.command, |line| {
            channel.send_change(line)
        })?;
        tracing::debug!(messages = forwarded, "scan output forwarded");
        Ok(())
    }
}

/// Stand-in when no scan command is configured: scans only emit scan info.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoScanner;

impl BaselineScanner for NoScanner {
    fn scan(&self, _channel: &DeliveryChannel) -> Result<(), DaemonError> {
        tracing::debug!("no scan command configured, baseline scan is empty");
        Ok(())
    }
}

/// Periodic external command whose output lines are sent with `class`.
pub struct CommandJob {
    name: &'static str,
    config: JobConfig,
    class: RoutingClass,
}

impl CommandJob {
    /// Rootcheck findings travel as plain log lines.
    pub fn rootcheck(config: JobConfig) -> Self {
        Self {
            name: "rootcheck",
            config,
            class: RoutingClass::Log,
        }
    }

    /// Inventory sync rows travel on the sync class.
    pub fn inventory(config: JobConfig) -> Self {
        Self {
            name: "inventory-sync",
            config,
            class: RoutingClass::Sync,
        }
    }
}

impl PeriodicJob for CommandJob {
    fn name(&self) -> &'static str {
        self.name
    }

    fn interval(&self) -> Duration {
        self.config.interval()
    }

    fn run_once(&self, channel: &DeliveryChannel) -> Result<(), DaemonError> {
        let class = self.class;
        run_command_lines(self.name, &self.config.command, |line| match class {
            RoutingClass::Sync => channel.send_sync(line),
            RoutingClass::Change => channel.send_change(line),
            RoutingClass::Log => channel.send_log(line),
        })
        .map(|_| ())
    }
}

/// Default real-time processor: one JSON change message per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChangeForwarder;

impl EventProcessor for ChangeForwarder {
    fn process(
        &self,
        events: Vec<ChangeEvent>,
        channel: &DeliveryChannel,
    ) -> Result<(), DaemonError> {
        for event in events {
            let payload = serde_json::json!({ "type": "event", "data": event }).to_string();
            channel.send_change(&payload)?;
        }
        Ok(())
    }
}

/// Spawn `command`, hand each non-empty stdout line to `forward`, and require a
/// zero exit status. Returns the number of forwarded lines.
///
/// Output is split on raw newlines; bytes that are not UTF-8 (legal in file
/// names) are replaced rather than failing the run.
fn run_command_lines<F>(
    name: &'static str,
    command: &CommandSpec,
    mut forward: F,
) -> Result<usize, DaemonError>
where
    F: FnMut(&str) -> Result<(), DaemonError>,
{
    let program = command
        .program()
        .ok_or_else(|| collaborator_err(name, "empty command"))?;
    let spawned = Command::new(program)
        .args(command.args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| io_err(program, e))?;
    let mut child = ChildGuard {
        child: spawned,
        reaped: false,
    };

    let mut forwarded = 0usize;
    if let Some(stdout) = child.child.stdout.take() {
        for raw in BufReader::new(stdout).split(b'\n') {
            let raw = raw.map_err(|e| io_err(program, e))?;
            let line = String::from_utf8_lossy(&raw);
            if line.trim().is_empty() {
                continue;
            }
            forward(line.trim_end_matches('\r'))?;
            forwarded += 1;
        }
    }

    let status = child.wait().map_err(|e| io_err(program, e))?;
    if !status.success() {
        return Err(collaborator_err(name, format!("{program} exited with {status}")));
    }
    Ok(forwarded)
}

/// Kills and reaps the child on any early return.
struct ChildGuard {
    child: Child,
    reaped: bool,
}

impl ChildGuard {
    fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait()?;
        self.reaped = true;
        Ok(status)
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Drive `job` every `job.interval()` until shutdown. Only fatal errors end it.
pub async fn run_periodic(
    job: Arc<dyn PeriodicJob>,
    channel: Arc<DeliveryChannel>,
    mut shutdown: Shutdown,
) -> Result<(), DaemonError> {
    tracing::info!(
        task = job.name(),
        interval_secs = job.interval().as_secs(),
        location = SYSCHECK_LOCATION,
        "periodic job started"
    );
    loop {
        let (worker, ch) = (job.clone(), channel.clone());
        match run_blocking(job.name(), move || worker.run_once(&ch)).await {
            Ok(()) => {}
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => tracing::warn!(task = job.name(), error = %err, "periodic job run failed"),
        }
        if shutdown.sleep(job.interval()).await {
            break;
        }
    }
    Ok(())
}
