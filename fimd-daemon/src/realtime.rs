//! Real-time watcher: bounded-wait event loop over a [`ChangeSource`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::collaborators::EventProcessor;
use crate::delivery::DeliveryChannel;
use crate::error::DaemonError;
use crate::launcher::{run_blocking, Shutdown};
use crate::source::{Capability, ChangeSource, WaitOutcome, WatchMode, WatchRegistrar};
use crate::state::DaemonState;
use crate::status::RealtimeStatus;

pub struct RealtimeWatcher<S> {
    source: Capability<S>,
    registrar: Option<Arc<dyn WatchRegistrar>>,
    directories: Vec<PathBuf>,
    state: Arc<DaemonState>,
    processor: Arc<dyn EventProcessor>,
    channel: Arc<DeliveryChannel>,
    poll_interval: Duration,
}

impl<S: ChangeSource> RealtimeWatcher<S> {
    pub fn new(
        source: Capability<S>,
        state: Arc<DaemonState>,
        processor: Arc<dyn EventProcessor>,
        channel: Arc<DeliveryChannel>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            registrar: None,
            directories: Vec::new(),
            state,
            processor,
            channel,
            poll_interval,
        }
    }

    /// Directories to register for real-time monitoring when the task starts.
    pub fn with_directories(
        mut self,
        registrar: Arc<dyn WatchRegistrar>,
        directories: Vec<PathBuf>,
    ) -> Self {
        self.registrar = Some(registrar);
        self.directories = directories;
        self
    }

    /// Run until shutdown. Only a fatal processing error ends it early.
    pub async fn run(self, mut shutdown: Shutdown) -> Result<(), DaemonError> {
        let Capability::Supported(mut source) = self.source else {
            tracing::warn!("real-time monitoring is not supported on this platform");
            return Ok(());
        };

        if let Some(registrar) = &self.registrar {
            for dir in &self.directories {
                if let Err(err) = registrar.register_watch(dir, WatchMode::Realtime) {
                    tracing::error!(path = %dir.display(), error = %err, "unable to add real-time watch");
                }
            }
            tracing::info!(directories = self.directories.len(), "real-time watches registered");
        }

        while !shutdown.is_triggered() {
            if !source.is_valid() {
                self.state.status.announce(RealtimeStatus::Paused);
                if shutdown.sleep(self.poll_interval).await {
                    break;
                }
                continue;
            }

            self.state.status.announce(RealtimeStatus::Running);
            let outcome = tokio::select! {
                _ = shutdown.wait() => break,
                outcome = source.wait(self.poll_interval) => outcome,
            };

            match outcome {
                WaitOutcome::Timeout => {}
                WaitOutcome::Error(err) => {
                    tracing::error!(error = %err, "real-time event wait failed");
                }
                WaitOutcome::Ready => {
                    let events = source.drain();
                    if events.is_empty() {
                        continue;
                    }
                    tracing::debug!(events = events.len(), "dispatching real-time events");
                    let (processor, channel) = (self.processor.clone(), self.channel.clone());
                    match run_blocking("realtime", move || processor.process(events, &channel))
                        .await
                    {
                        Ok(()) => {}
                        Err(err) if err.is_fatal() => return Err(err),
                        Err(err) => {
                            tracing::error!(error = %err, "real-time event processing failed");
                        }
                    }
                }
            }
        }

        tracing::debug!("real-time watcher stopped");
        Ok(())
    }
}
