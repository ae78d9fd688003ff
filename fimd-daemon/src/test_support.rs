//! Shared fakes for unit tests.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::collaborators::{BaselineScanner, EventProcessor};
use crate::delivery::{format_message, DeliveryChannel, QueueConnection, QueueConnector, RoutingClass};
use crate::error::{collaborator_err, DaemonError};
use crate::source::{ChangeEvent, ChangeSource, WaitOutcome, WatchMode, WatchRegistrar};

/// In-memory queue recording every formatted message.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    sent: Arc<Mutex<Vec<String>>>,
}

impl MemoryQueue {
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl QueueConnector for MemoryQueue {
    fn open(&self, _path: &Path) -> io::Result<Box<dyn QueueConnection>> {
        Ok(Box::new(self.clone()))
    }
}

impl QueueConnection for MemoryQueue {
    fn send(&mut self, class: RoutingClass, location: &str, payload: &str) -> io::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push(format_message(class, location, payload));
        Ok(())
    }
}

pub fn memory_channel(queue: &MemoryQueue) -> DeliveryChannel {
    DeliveryChannel::open(queue.clone(), "/test/queue", Duration::ZERO)
        .expect("memory queue opens")
        .with_pacer(|_| {})
}

/// Records every batch it receives; optionally fails with a fatal error.
#[derive(Default)]
pub struct RecordingProcessor {
    pub batches: Mutex<Vec<Vec<ChangeEvent>>>,
    pub fail_fatally: bool,
}

impl EventProcessor for RecordingProcessor {
    fn process(
        &self,
        events: Vec<ChangeEvent>,
        _channel: &DeliveryChannel,
    ) -> Result<(), DaemonError> {
        self.batches.lock().unwrap().push(events);
        if self.fail_fatally {
            return Err(DaemonError::QueueReopen {
                path: PathBuf::from("/test/queue"),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
            });
        }
        Ok(())
    }
}

/// Counts scans; each scan sends one change message.
#[derive(Default)]
pub struct CountingScanner {
    pub scans: Mutex<usize>,
    pub fail: bool,
}

impl CountingScanner {
    pub fn count(&self) -> usize {
        *self.scans.lock().unwrap()
    }
}

impl BaselineScanner for CountingScanner {
    fn scan(&self, channel: &DeliveryChannel) -> Result<(), DaemonError> {
        *self.scans.lock().unwrap() += 1;
        if self.fail {
            return Err(collaborator_err("baseline scan", "walker crashed"));
        }
        channel.send_change("scanned")
    }
}

/// Records every registration.
#[derive(Default)]
pub struct RecordingRegistrar {
    pub registered: Mutex<Vec<(PathBuf, WatchMode)>>,
    pub fail: bool,
}

impl WatchRegistrar for RecordingRegistrar {
    fn register_watch(&self, path: &Path, mode: WatchMode) -> Result<(), DaemonError> {
        if self.fail {
            return Err(DaemonError::Protocol(format!("cannot watch {}", path.display())));
        }
        self.registered
            .lock()
            .unwrap()
            .push((path.to_path_buf(), mode));
        Ok(())
    }
}

/// One scripted outcome of [`ScriptedSource::wait`].
pub enum Step {
    Ready(Vec<ChangeEvent>),
    Timeout,
    Error,
    /// Lose the handle; the source stays invalid afterwards.
    Invalidate,
}

/// Change source replaying a fixed script, then timing out forever.
pub struct ScriptedSource {
    steps: VecDeque<Step>,
    ready: Vec<ChangeEvent>,
    valid: bool,
    pub waits: Arc<Mutex<usize>>,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            ready: Vec::new(),
            valid: true,
            waits: Arc::new(Mutex::new(0)),
        }
    }

    pub fn invalid() -> Self {
        Self {
            valid: false,
            ..Self::new(Vec::new())
        }
    }
}

impl ChangeSource for ScriptedSource {
    fn is_valid(&self) -> bool {
        self.valid
    }

    async fn wait(&mut self, timeout: Duration) -> WaitOutcome {
        *self.waits.lock().unwrap() += 1;
        match self.steps.pop_front() {
            Some(Step::Ready(events)) => {
                self.ready.extend(events);
                WaitOutcome::Ready
            }
            Some(Step::Error) => WaitOutcome::Error(DaemonError::Protocol("wait failed".into())),
            Some(Step::Invalidate) => {
                self.valid = false;
                WaitOutcome::Error(DaemonError::ChannelClosed("scripted source"))
            }
            Some(Step::Timeout) | None => {
                tokio::time::sleep(timeout).await;
                WaitOutcome::Timeout
            }
        }
    }

    fn drain(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.ready)
    }
}
