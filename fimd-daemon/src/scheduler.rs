//! Scan scheduler: startup sequence and the main scheduling loop.
//!
//! A rescan is due when any of these holds on a tick:
//! - a forced rescan was requested,
//! - the calendar trigger matches and today has not been scanned yet,
//! - more than the effective frequency elapsed since the last scan.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDate};
use fimd_core::{AgentConfig, ScanDays, ScanTime};

use crate::collaborators::{run_periodic, BaselineScanner, PeriodicJob};
use crate::delivery::{DeliveryChannel, ScanInfo};
use crate::error::DaemonError;
use crate::launcher::{run_blocking, Shutdown, TaskLauncher};
use crate::realtime::RealtimeWatcher;
use crate::source::{Capability, ChangeSource, WatchRegistrar};
use crate::state::DaemonState;
use crate::system;
use crate::whodata::{self, WhodataBackend};

/// Fixed pause between scheduler ticks.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Wall-clock source, in local time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Trigger configuration, derived once from the config snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSchedule {
    pub frequency: Duration,
    pub time: Option<ScanTime>,
    pub days: Option<ScanDays>,
}

impl ScanSchedule {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            frequency: config.effective_frequency(),
            time: config.scan_time,
            days: config.scan_day,
        }
    }

    pub fn is_calendar(&self) -> bool {
        self.time.is_some() || self.days.is_some()
    }

    /// Every configured calendar condition holds at `now`.
    pub fn calendar_matches(&self, now: DateTime<FixedOffset>) -> bool {
        self.is_calendar()
            && self.time.map_or(true, |t| t.is_reached(now.time()))
            && self.days.map_or(true, |d| d.contains(now.weekday()))
    }

    fn frequency_secs(&self) -> i64 {
        i64::try_from(self.frequency.as_secs()).unwrap_or(i64::MAX)
    }
}

/// Loop-private trigger bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleState {
    last_scan_time: i64,
    day_already_scanned: bool,
    current_day: Option<NaiveDate>,
}

impl ScheduleState {
    /// State at loop entry, right after the baseline scan.
    ///
    /// If the calendar condition already holds, today counts as scanned.
    pub fn new(schedule: &ScanSchedule, now: DateTime<FixedOffset>) -> Self {
        let calendar = schedule.is_calendar();
        Self {
            last_scan_time: now.timestamp(),
            day_already_scanned: calendar && schedule.calendar_matches(now),
            current_day: calendar.then(|| now.date_naive()),
        }
    }

    pub fn last_scan_time(&self) -> i64 {
        self.last_scan_time
    }

    pub fn day_already_scanned(&self) -> bool {
        self.day_already_scanned
    }

    /// Evaluate one tick. Marks today as scanned when the calendar fires.
    pub fn is_due(&mut self, schedule: &ScanSchedule, now: DateTime<FixedOffset>, forced: bool) -> bool {
        let mut run_now = forced;

        if schedule.is_calendar() {
            let today = now.date_naive();
            if self.current_day != Some(today) {
                self.day_already_scanned = false;
                self.current_day = Some(today);
            }
            if !self.day_already_scanned && schedule.calendar_matches(now) {
                self.day_already_scanned = true;
                run_now = true;
            }
        }

        run_now || now.timestamp() - self.last_scan_time > schedule.frequency_secs()
    }

    pub fn record_scan(&mut self, at: DateTime<FixedOffset>) {
        self.last_scan_time = at.timestamp();
    }
}

/// Whodata backend plus the registrar its directories go to.
pub struct WhodataSetup {
    pub backend: Capability<WhodataBackend>,
    pub registrar: Arc<dyn WatchRegistrar>,
}

pub struct Scheduler<S> {
    config: Arc<AgentConfig>,
    state: Arc<DaemonState>,
    channel: Arc<DeliveryChannel>,
    scanner: Arc<dyn BaselineScanner>,
    realtime: RealtimeWatcher<S>,
    rootcheck: Option<Arc<dyn PeriodicJob>>,
    inventory: Option<Arc<dyn PeriodicJob>>,
    whodata: Option<WhodataSetup>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl<S: ChangeSource> Scheduler<S> {
    pub fn new(
        config: Arc<AgentConfig>,
        state: Arc<DaemonState>,
        channel: Arc<DeliveryChannel>,
        scanner: Arc<dyn BaselineScanner>,
        realtime: RealtimeWatcher<S>,
    ) -> Self {
        Self {
            config,
            state,
            channel,
            scanner,
            realtime,
            rootcheck: None,
            inventory: None,
            whodata: None,
            clock: Arc::new(SystemClock),
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_rootcheck(mut self, job: Arc<dyn PeriodicJob>) -> Self {
        self.rootcheck = Some(job);
        self
    }

    pub fn with_inventory(mut self, job: Arc<dyn PeriodicJob>) -> Self {
        self.inventory = Some(job);
        self
    }

    pub fn with_whodata(mut self, setup: WhodataSetup) -> Self {
        self.whodata = Some(setup);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Startup sequence followed by the scheduling loop.
    ///
    /// Returns `Ok` on shutdown or when monitoring is disabled, and `Err`
    /// only for fatal errors (lost delivery path, task launch failure).
    pub async fn run(
        self,
        launcher: &mut TaskLauncher,
        mut shutdown: Shutdown,
    ) -> Result<(), DaemonError> {
        let Scheduler {
            config,
            state,
            channel,
            scanner,
            realtime,
            rootcheck,
            inventory,
            whodata,
            clock,
            poll_interval,
        } = self;
        let scans = ScanRunner {
            state: state.clone(),
            channel: channel.clone(),
            scanner,
            clock: clock.clone(),
        };

        if shutdown.sleep(config.settle_delay()).await {
            return Ok(());
        }
        tracing::info!("file integrity monitoring daemon started");

        tracing::debug!(priority = config.process_priority, "lowering process priority");
        if let Err(err) = system::lower_priority(config.process_priority) {
            tracing::error!(priority = config.process_priority, error = %err, "unable to set process priority");
        }

        if let Some(job) = rootcheck {
            launcher.spawn("rootcheck", run_periodic(job, channel.clone(), launcher.shutdown()))?;
        }

        let schedule = ScanSchedule::from_config(&config);

        let diff_cache = config.diff_cache_dir();
        match system::purge_dir_contents(&diff_cache) {
            Ok(removed) => tracing::debug!(path = %diff_cache.display(), removed, "diff cache purged"),
            Err(err) => tracing::warn!(path = %diff_cache.display(), error = %err, "unable to purge diff cache"),
        }

        if config.disabled {
            tracing::info!("file integrity monitoring is disabled");
            return Ok(());
        }

        tracing::info!(frequency_secs = schedule.frequency.as_secs(), "scan frequency");
        scans.run().await?;

        launcher.spawn("realtime", realtime.run(launcher.shutdown()))?;
        if config.enable_inventory {
            match inventory {
                Some(job) => launcher.spawn(
                    "inventory-sync",
                    run_periodic(job, channel.clone(), launcher.shutdown()),
                )?,
                None => tracing::warn!("inventory sync enabled without an inventory command"),
            }
        }

        match &whodata {
            Some(setup) => {
                if let Err(err) = whodata::initialize(
                    &config,
                    &setup.backend,
                    setup.registrar.as_ref(),
                    &state,
                    launcher,
                ) {
                    tracing::error!(error = %err, "whodata initialization failed, continuing without attribution");
                }
            }
            None => tracing::debug!("no watch table, whodata initialization skipped"),
        }

        let mut ticks = ScheduleState::new(&schedule, clock.now());
        loop {
            let forced = state.rescan.take();
            if forced {
                tracing::info!("forced rescan requested");
            }
            if ticks.is_due(&schedule, clock.now(), forced) {
                scans.run().await?;
                ticks.record_scan(clock.now());
            }
            if shutdown.sleep(poll_interval).await {
                break;
            }
        }

        tracing::info!("scan scheduler stopped");
        Ok(())
    }
}

/// One baseline scan, bracketed by scan info messages.
struct ScanRunner {
    state: Arc<DaemonState>,
    channel: Arc<DeliveryChannel>,
    scanner: Arc<dyn BaselineScanner>,
    clock: Arc<dyn Clock>,
}

impl ScanRunner {
    /// Non-fatal scan failures are logged; the next due tick tries again.
    async fn run(&self) -> Result<(), DaemonError> {
        self.state.begin_scan();
        let (scanner, channel, clock) = (
            self.scanner.clone(),
            self.channel.clone(),
            self.clock.clone(),
        );
        let result = run_blocking("baseline-scan", move || {
            channel.send_scan_info(ScanInfo::Start {
                timestamp: clock.now().timestamp(),
            })?;
            if let Err(err) = scanner.scan(&channel) {
                if err.is_fatal() {
                    return Err(err);
                }
                tracing::error!(error = %err, "baseline scan failed");
            }
            channel.send_scan_info(ScanInfo::End {
                timestamp: clock.now().timestamp(),
            })
        })
        .await;
        self.state.finish_scan(self.clock.now().timestamp());

        match result {
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                tracing::error!(error = %err, "baseline scan aborted");
                Ok(())
            }
            Ok(()) => {
                tracing::info!("baseline scan finished");
                Ok(())
            }
        }
    }
}
