//! Task launcher and shutdown signal.
//!
//! Every long-lived unit (scheduler helpers, watcher, whodata checker,
//! rootcheck, inventory sync, control socket) is spawned through
//! [`TaskLauncher`]. A task that fails triggers a daemon-wide shutdown; a task
//! that simply finishes (e.g. real-time monitoring unsupported) does not.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};

use crate::error::DaemonError;

/// Sending half of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<bool>>,
}

/// Receiving half, checked at every blocking-wait return.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl ShutdownTrigger {
    pub fn new() -> (Self, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (Self { tx: Arc::new(tx) }, Shutdown { rx })
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is triggered (or the trigger is gone).
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }

    /// Sleep for `duration`. Returns `true` when shutdown cut the sleep short.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        tokio::select! {
            _ = self.wait() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }
}

type TaskOutcome = (&'static str, Result<(), DaemonError>);

pub struct TaskLauncher {
    tasks: JoinSet<TaskOutcome>,
    trigger: ShutdownTrigger,
}

impl TaskLauncher {
    pub fn new(trigger: ShutdownTrigger) -> Self {
        Self {
            tasks: JoinSet::new(),
            trigger,
        }
    }

    pub fn shutdown(&self) -> Shutdown {
        self.trigger.subscribe()
    }

    pub fn trigger(&self) -> &ShutdownTrigger {
        &self.trigger
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Spawn `name` as an independent task on the current runtime.
    pub fn spawn<F>(&mut self, name: &'static str, task: F) -> Result<(), DaemonError>
    where
        F: Future<Output = Result<(), DaemonError>> + Send + 'static,
    {
        let handle = Handle::try_current().map_err(|err| DaemonError::TaskLaunch {
            task: name,
            reason: err.to_string(),
        })?;
        let trigger = self.trigger.clone();
        self.tasks.spawn_on(
            async move {
                let result = task.await;
                match &result {
                    Ok(()) => tracing::debug!(task = name, "task finished"),
                    Err(err) => {
                        tracing::error!(task = name, error = %err, "task failed, shutting down");
                        trigger.trigger();
                    }
                }
                (name, result)
            },
            &handle,
        );
        tracing::debug!(task = name, "task launched");
        Ok(())
    }

    /// Wait for every launched task. Returns the first failure, if any.
    pub async fn join_all(mut self) -> Result<(), DaemonError> {
        let mut first_error = None;
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(err) = flatten(joined) {
                self.trigger.trigger();
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Run blocking collaborator code off the async workers.
pub(crate) async fn run_blocking<T, F>(task: &'static str, work: F) -> Result<T, DaemonError>
where
    F: FnOnce() -> Result<T, DaemonError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| DaemonError::Protocol(format!("{task} join error: {err}")))?
}

fn flatten(joined: Result<TaskOutcome, JoinError>) -> Result<(), DaemonError> {
    match joined {
        Ok((_, result)) => result,
        Err(err) => Err(DaemonError::Protocol(format!("task join failure: {err}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finished_task_does_not_trigger_shutdown() {
        let (trigger, shutdown) = ShutdownTrigger::new();
        let mut launcher = TaskLauncher::new(trigger);
        launcher.spawn("noop", async { Ok(()) }).expect("spawn");
        launcher.join_all().await.expect("join");
        assert!(!shutdown.is_triggered());
    }

    #[tokio::test]
    async fn failing_task_stops_the_others() {
        let (trigger, _shutdown) = ShutdownTrigger::new();
        let mut launcher = TaskLauncher::new(trigger);

        let mut waiter = launcher.shutdown();
        launcher
            .spawn("waiter", async move {
                waiter.wait().await;
                Ok(())
            })
            .expect("spawn waiter");
        launcher
            .spawn("failing", async {
                Err(DaemonError::Protocol("boom".to_string()))
            })
            .expect("spawn failing");

        let err = launcher.join_all().await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn wait_stays_pending_until_triggered() {
        let (trigger, mut shutdown) = ShutdownTrigger::new();
        let mut waiting = tokio_test::task::spawn(async move { shutdown.wait().await });
        tokio_test::assert_pending!(waiting.poll());

        trigger.trigger();
        assert!(waiting.is_woken());
        tokio_test::assert_ready!(waiting.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_is_cut_short_by_shutdown() {
        let (trigger, mut shutdown) = ShutdownTrigger::new();
        let sleeper = tokio::spawn(async move { shutdown.sleep(Duration::from_secs(3600)).await });
        tokio::task::yield_now().await;
        trigger.trigger();
        assert!(sleeper.await.expect("join"), "shutdown must interrupt the sleep");
    }

    #[test]
    fn spawning_outside_a_runtime_is_a_launch_error() {
        let (trigger, _shutdown) = ShutdownTrigger::new();
        let mut launcher = TaskLauncher::new(trigger);
        let err = launcher.spawn("orphan", async { Ok(()) }).unwrap_err();
        assert!(matches!(err, DaemonError::TaskLaunch { task: "orphan", .. }));
    }
}
