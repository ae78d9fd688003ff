//! `notify`-backed change source (inotify, FSEvents, kqueue).

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use notify::event::{Event, EventKind};
use notify::{recommended_watcher, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::DaemonError;
use crate::source::{
    Capability, ChangeEvent, ChangeKind, ChangeSource, WaitOutcome, WatchDescriptor, WatchMode,
    WatchReconciler, WatchRegistrar,
};

/// Whether this build has a native change-notification primitive.
pub const REALTIME_SUPPORTED: bool = cfg!(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly",
));

struct WatchTableInner {
    watcher: RecommendedWatcher,
    descriptors: BTreeMap<PathBuf, WatchDescriptor>,
    missing: BTreeSet<PathBuf>,
}

/// Registered directories and the watcher they are attached to.
#[derive(Clone)]
pub struct WatchTable {
    inner: Arc<Mutex<WatchTableInner>>,
}

impl WatchTable {
    fn new(watcher: RecommendedWatcher) -> Self {
        Self {
            inner: Arc::new(Mutex::new(WatchTableInner {
                watcher,
                descriptors: BTreeMap::new(),
                missing: BTreeSet::new(),
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WatchTableInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn descriptor(&self, path: &Path) -> Option<WatchDescriptor> {
        self.lock().descriptors.get(&normalize(path)).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mode of the innermost registered directory containing `path`.
    pub fn mode_for(&self, path: &Path) -> Option<WatchMode> {
        let inner = self.lock();
        inner
            .descriptors
            .iter()
            .filter(|(dir, _)| path.starts_with(dir))
            .max_by_key(|(dir, _)| dir.components().count())
            .and_then(|(_, desc)| desc.effective_mode())
    }
}

impl WatchRegistrar for WatchTable {
    fn register_watch(&self, path: &Path, mode: WatchMode) -> Result<(), DaemonError> {
        let path = normalize(path);
        let mut inner = self.lock();
        let inner = &mut *inner;

        if !inner.descriptors.contains_key(&path) {
            if path.is_dir() {
                inner.watcher.watch(&path, RecursiveMode::Recursive)?;
                tracing::debug!(path = %path.display(), ?mode, "directory watch added");
            } else {
                tracing::warn!(path = %path.display(), "monitored directory does not exist yet");
                inner.missing.insert(path.clone());
            }
        }
        inner.descriptors.entry(path).or_default().apply(mode);
        Ok(())
    }
}

impl WatchReconciler for WatchTable {
    fn reconcile(&self) -> Result<usize, DaemonError> {
        let mut inner = self.lock();
        let inner = &mut *inner;
        let mut repaired = 0;

        let paths: Vec<PathBuf> = inner.descriptors.keys().cloned().collect();
        for path in paths {
            let present = path.is_dir();
            let missing = inner.missing.contains(&path);
            if present && missing {
                inner.watcher.watch(&path, RecursiveMode::Recursive)?;
                inner.missing.remove(&path);
                tracing::info!(path = %path.display(), "monitored directory reappeared, watch restored");
                repaired += 1;
            } else if !present && !missing {
                let _ = inner.watcher.unwatch(&path);
                inner.missing.insert(path.clone());
                tracing::warn!(path = %path.display(), "monitored directory vanished, watch suspended");
                repaired += 1;
            }
        }
        Ok(repaired)
    }
}

/// FSEvents reports real paths (e.g. `/private/var/...`), so registrations
/// are canonicalized when possible.
fn normalize(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

pub struct NotifySource {
    table: WatchTable,
    rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    pending: VecDeque<Event>,
    valid: bool,
}

impl NotifySource {
    /// Create the OS watcher. The returned table registers directories on it.
    pub fn open() -> Result<(Self, WatchTable), DaemonError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = recommended_watcher(move |event| {
            let _ = tx.send(event);
        })?;
        let table = WatchTable::new(watcher);
        let source = Self {
            table: table.clone(),
            rx,
            pending: VecDeque::new(),
            valid: true,
        };
        Ok((source, table))
    }

    /// Platform selection: unsupported builds get no source at all; a failed
    /// open leaves a supported-but-invalid source that the watcher idles on.
    pub fn for_platform() -> (Capability<Option<NotifySource>>, Option<WatchTable>) {
        if !REALTIME_SUPPORTED {
            return (Capability::Unsupported, None);
        }
        match Self::open() {
            Ok((source, table)) => (Capability::Supported(Some(source)), Some(table)),
            Err(err) => {
                tracing::error!(error = %err, "unable to initialize change notification");
                (Capability::Supported(None), None)
            }
        }
    }

    fn convert(&self, event: Event) -> Vec<ChangeEvent> {
        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Added,
            EventKind::Modify(_) => ChangeKind::Modified,
            EventKind::Remove(_) => ChangeKind::Deleted,
            EventKind::Access(_) => return Vec::new(),
            EventKind::Any | EventKind::Other => ChangeKind::Other,
        };
        event
            .paths
            .into_iter()
            .filter_map(|path| {
                let mode = self.table.mode_for(&path)?;
                Some(ChangeEvent { path, kind, mode })
            })
            .collect()
    }
}

impl ChangeSource for NotifySource {
    fn is_valid(&self) -> bool {
        self.valid
    }

    async fn wait(&mut self, timeout: Duration) -> WaitOutcome {
        if !self.pending.is_empty() {
            return WaitOutcome::Ready;
        }
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Err(_) => WaitOutcome::Timeout,
            Ok(None) => {
                self.valid = false;
                WaitOutcome::Error(DaemonError::ChannelClosed("change notifications"))
            }
            Ok(Some(Ok(event))) => {
                self.pending.push_back(event);
                WaitOutcome::Ready
            }
            Ok(Some(Err(err))) => WaitOutcome::Error(err.into()),
        }
    }

    fn drain(&mut self) -> Vec<ChangeEvent> {
        while let Ok(next) = self.rx.try_recv() {
            match next {
                Ok(event) => self.pending.push_back(event),
                Err(err) => tracing::warn!(error = %err, "change notification error"),
            }
        }
        let raw: Vec<Event> = self.pending.drain(..).collect();
        raw.into_iter().flat_map(|e| self.convert(e)).collect()
    }
}

/// A supported platform whose handle could not be opened.
impl<S: ChangeSource> ChangeSource for Option<S> {
    fn is_valid(&self) -> bool {
        self.as_ref().is_some_and(ChangeSource::is_valid)
    }

    async fn wait(&mut self, timeout: Duration) -> WaitOutcome {
        match self {
            Some(source) => source.wait(timeout).await,
            None => {
                tokio::time::sleep(timeout).await;
                WaitOutcome::Timeout
            }
        }
    }

    fn drain(&mut self) -> Vec<ChangeEvent> {
        self.as_mut().map(ChangeSource::drain).unwrap_or_default()
    }
}
